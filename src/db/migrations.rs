use std::{borrow::Cow, fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Transaction};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const EMBEDDED_SCHEMA: &str = include_str!("schemas/schema_v1.sql");

/// Where the schema DDL comes from. A file on disk takes the place of the
/// embedded DDL when the deployment ships its own `schema.sql`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Embedded,
    File(PathBuf),
}

impl SchemaSource {
    pub fn load(&self) -> Result<Cow<'static, str>> {
        match self {
            SchemaSource::Embedded => Ok(Cow::Borrowed(EMBEDDED_SCHEMA)),
            SchemaSource::File(path) => fs::read_to_string(path)
                .map(Cow::Owned)
                .with_context(|| format!("failed to read schema file {}", path.display())),
        }
    }
}

pub fn run_migrations(conn: &mut Connection, schema: &SchemaSource) -> Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    if version < CURRENT_SCHEMA_VERSION {
        let ddl = schema.load()?;
        let tx = conn
            .transaction()
            .context("failed to open migration transaction")?;

        while version < CURRENT_SCHEMA_VERSION {
            let next_version = version + 1;
            apply_migration(&tx, next_version, &ddl)
                .with_context(|| format!("migration to version {next_version} failed"))?;
            version = next_version;
        }

        tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
            .context("failed to update user_version pragma")?;
        tx.commit().context("failed to commit migrations")?;
    }

    ensure_settings_row(conn)
}

fn apply_migration(tx: &Transaction<'_>, version: i32, ddl: &str) -> Result<()> {
    match version {
        1 => {
            tx.execute_batch(ddl)
                .context("failed to execute schema DDL")?;
            Ok(())
        }
        _ => bail!("unknown migration target version: {version}"),
    }
}

/// `tracking_settings` must hold exactly one row even when a custom DDL forgot
/// to seed it.
fn ensure_settings_row(conn: &Connection) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO tracking_settings (id) VALUES (1)", [])
        .context("failed to seed tracking_settings row")?;
    Ok(())
}

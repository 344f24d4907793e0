mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use helpers::iso_timestamp;
pub use migrations::SchemaSource;
pub use models::*;

use std::io;
#[cfg(any(target_os = "macos", target_os = "linux"))]
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The focused window as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowInfo {
    pub app_name: String,
    pub window_title: String,
    pub bundle_id: String,
    pub pid: u32,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("unexpected {tool} output: {output:?}")]
    Parse { tool: &'static str, output: String },

    #[error("probe task aborted: {0}")]
    Aborted(String),
}

/// Source of "which window has focus right now".
///
/// `Ok(None)` means nothing is focused (screen locked, no windows); the
/// tracker treats that like an unchanged sample.
pub trait WindowProbe: Send + Sync + 'static {
    fn active_window(&self) -> Result<Option<WindowInfo>, ProbeError>;
}

/// Platform probe backed by the desktop's own tooling: System Events via
/// `osascript` on macOS, `xdotool` plus the process table on Linux.
#[derive(Debug, Default)]
pub struct SystemWindowProbe;

impl SystemWindowProbe {
    pub fn new() -> Self {
        Self
    }
}

impl WindowProbe for SystemWindowProbe {
    #[cfg(target_os = "macos")]
    fn active_window(&self) -> Result<Option<WindowInfo>, ProbeError> {
        const SCRIPT: &str = r#"
tell application "System Events"
    set frontApp to first application process whose frontmost is true
    set appName to name of frontApp
    set bundleId to ""
    try
        set bundleId to bundle identifier of frontApp
    end try
    set appPid to unix id of frontApp
    set winTitle to ""
    try
        set winTitle to name of front window of frontApp
    end try
end tell
return appName & linefeed & bundleId & linefeed & appPid & linefeed & winTitle
"#;
        let output = run_tool("osascript", Command::new("osascript").args(["-e", SCRIPT]))?;
        parse_osascript_output(&output).map(Some)
    }

    #[cfg(target_os = "linux")]
    fn active_window(&self) -> Result<Option<WindowInfo>, ProbeError> {
        let output = match run_tool(
            "xdotool",
            Command::new("xdotool").args(["getactivewindow", "getwindowpid", "getwindowname"]),
        ) {
            Ok(output) => output,
            // xdotool exits non-zero when no window has focus.
            Err(ProbeError::Failed { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        let (pid, window_title) = parse_xdotool_output(&output)?;
        let app_name = process_name(pid).unwrap_or_else(|| format!("pid {pid}"));
        Ok(Some(WindowInfo {
            bundle_id: app_name.clone(),
            app_name,
            window_title,
            pid,
        }))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    fn active_window(&self) -> Result<Option<WindowInfo>, ProbeError> {
        Ok(None)
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn run_tool(tool: &'static str, command: &mut Command) -> Result<String, ProbeError> {
    let output = command
        .output()
        .map_err(|source| ProbeError::Spawn { tool, source })?;
    if !output.status.success() {
        return Err(ProbeError::Failed {
            tool,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(any(target_os = "macos", test))]
fn parse_osascript_output(output: &str) -> Result<WindowInfo, ProbeError> {
    let parse_error = || ProbeError::Parse {
        tool: "osascript",
        output: output.to_string(),
    };

    let mut fields = output.trim_end_matches('\n').splitn(4, '\n');
    let app_name = fields.next().filter(|s| !s.is_empty()).ok_or_else(parse_error)?;
    let bundle_id = fields.next().ok_or_else(parse_error)?;
    let pid = fields
        .next()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .ok_or_else(parse_error)?;
    let window_title = fields.next().unwrap_or_default();

    Ok(WindowInfo {
        app_name: app_name.to_string(),
        window_title: window_title.to_string(),
        bundle_id: bundle_id.to_string(),
        pid,
    })
}

#[cfg(any(target_os = "linux", test))]
fn parse_xdotool_output(output: &str) -> Result<(u32, String), ProbeError> {
    let mut lines = output.splitn(2, '\n');
    let pid = lines
        .next()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .ok_or_else(|| ProbeError::Parse {
            tool: "xdotool",
            output: output.to_string(),
        })?;
    let title = lines.next().unwrap_or_default().trim_end_matches('\n');
    Ok((pid, title.to_string()))
}

#[cfg(target_os = "linux")]
fn process_name(pid: u32) -> Option<String> {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    system
        .process(pid)
        .map(|process| process.name().to_string_lossy().into_owned())
}

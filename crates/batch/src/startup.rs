//! Startup checks module for vidshrink
//!
//! Preflight verification that the configured encoder can be run at all,
//! so a broken install fails once up front instead of once per file.

use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("encoder not available: {0}")]
    EncoderUnavailable(String),
}

/// Check that `program -version` runs successfully
///
/// Returns the first line the encoder printed, usually its version banner.
pub fn check_encoder_available(program: &str) -> Result<String, StartupError> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::EncoderUnavailable(format!(
                "{} -version failed; is it installed and in PATH? Error: {}",
                program, e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::EncoderUnavailable(format!(
            "{} -version exited with {}",
            program, output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let banner = stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("(no output)")
        .to_string();

    Ok(banner)
}

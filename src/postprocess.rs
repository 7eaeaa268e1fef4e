//! Post-process hook.
//!
//! After a suitcase has been closed, or kept from an earlier run, the
//! configured executable runs once with `SUITCASE_DESTINATION` set to the output directory, plus
//! any extra variables from `post_process_env`.  Its output is inherited.
//! A non-zero exit is an error for the caller.

use std::process::{Command, Stdio};

use tracing::info;

use crate::error::{Error, Result};
use crate::options::ArchiveOptions;

pub const DESTINATION_VAR: &str = "SUITCASE_DESTINATION";

/// Run `options.post_process`, if set.
pub fn run_post_process(options: &ArchiveOptions) -> Result<()> {
    let Some(command) = &options.post_process else {
        return Ok(());
    };

    info!(command = %command.display(), destination = %options.destination.display(), "running post-process");
    let status = Command::new(command)
        .envs(&options.post_process_env)
        .env(DESTINATION_VAR, &options.destination)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| Error::io(format!("spawn post-process {}", command.display()), e))?;

    if !status.success() {
        return Err(Error::PostProcess { command: command.clone(), status: status.to_string() });
    }
    Ok(())
}

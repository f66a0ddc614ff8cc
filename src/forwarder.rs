//! Targeted-mode wrapper around the attack test command.

use std::process::{Command, ExitStatus};

use anyhow::Context;
use tracing::{info, instrument};

use crate::cli::SubmissionArgs;

/// Command running the attack tests.
pub const ATTACK_COMMAND: &str = "avc-test-attack";
pub const TARGETED_MODE: [&str; 2] = ["--mode", "targeted"];

/// Arguments of [`ATTACK_COMMAND`] for `args`, in targeted mode.
pub fn forwarded_args(args: &SubmissionArgs) -> Vec<String> {
    let mut forwarded = vec![args.directory.display().to_string()];
    if args.no_cache {
        forwarded.push("--no-cache".to_owned());
    }
    forwarded.push("--gpu".to_owned());
    forwarded.push(args.gpu.to_string());
    forwarded.extend(TARGETED_MODE.iter().map(|s| s.to_string()));
    forwarded
}

/// Run `command` with the targeted-mode arguments and wait for it.
#[instrument]
pub fn forward(command: &str, args: &SubmissionArgs) -> anyhow::Result<ExitStatus> {
    let forwarded = forwarded_args(args);
    info!(command, ?forwarded);
    Command::new(command)
        .args(&forwarded)
        .status()
        .with_context(|| format!("command '{command}' not found"))
}

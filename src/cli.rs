//! Command line of the validation binaries.

use std::path::PathBuf;

use clap::{Args, Parser};

/// Arguments shared by every validation command.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SubmissionArgs {
    /// Directory of the submission
    pub directory: PathBuf,

    /// Rebuild the image from scratch
    #[arg(long)]
    pub no_cache: bool,

    /// GPU made visible to the submission
    #[arg(long, default_value_t = 0)]
    pub gpu: u32,
}

/// Build a model submission, check its contract and accuracy.
#[derive(Debug, Parser)]
#[command(name = "avc-test-model")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct ModelTestCli {
    #[command(flatten)]
    pub submission: SubmissionArgs,

    /// Labelled sample set the model is scored on
    #[arg(long, env = "AVC_SAMPLES", default_value = "avc_test_samples.bin")]
    pub samples: PathBuf,

    /// Write a trace log file in the working directory
    #[arg(long)]
    pub log: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Print debug logs on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

/// Run the attack tests of a submission in targeted mode.
#[derive(Debug, Parser)]
#[command(name = "avc-test-targeted-attack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct TargetedAttackCli {
    #[command(flatten)]
    pub submission: SubmissionArgs,

    /// Print debug logs on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

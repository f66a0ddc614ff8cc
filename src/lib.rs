//! # Submission Validator
//!
//! Tools checking that a model submitted to the adversarial vision challenge can be built,
//! served and scored before it enters the competition.
//!
//! It provides:
//! - The full validation flow of a model submission (`Validator`)
//! - A container runtime abstraction, implemented over the `docker` and `repo2docker` command
//!   lines (`ContainerRuntime`, `DockerCli`)
//! - An HTTP/BSON client for the model server running inside the submission (`HttpConnector`)
//! - Exact top-1 accuracy scoring over a labelled sample set
//! - The targeted-mode wrapper of the attack tests
//!
//! Each submission runs as a separate container which exposes a model server on a single
//! port. The validator only talks to it through that port.
//!
//! # Documentation Overview
//!
//! - For the validation steps and their failure modes, see the [`validator`] module and
//!   [`ValidationError`](crate::error::ValidationError).
//! - For tuning names, ports, polling and thresholds, see
//!   [`ValidatorConfig`](crate::configuration::ValidatorConfig).
//! - For the file format of the sample set, see the [`samples`] module.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::path::Path;
//! use submission_validator::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ValidatorConfig::from_env().with_gpu(1);
//!
//!     let validator = Validator::new(
//!         DockerCli::from_config(&config),
//!         HttpProbe::from_config(&config)?,
//!         HttpConnector::from_config(&config)?,
//!         config,
//!     );
//!
//!     let samples = SampleSet::load(Path::new("avc_test_samples.bin"))?;
//!     match validator.validate(Path::new("my_submission"), &samples) {
//!         Ok(accuracy) => println!("passed with {accuracy}"),
//!         Err(e) => std::process::exit(e.exit_code()),
//!     }
//!     Ok(())
//! }
//! ```

pub use anyhow;
pub mod cli;
pub mod client;
pub mod configuration;
pub mod error;
pub mod forwarder;
pub mod logger;
pub mod probe;
pub mod runtime;
pub mod samples;
pub mod scoring;
pub mod validator;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use submission_validator::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{HttpConnector, ModelClient, ModelConnector, Prediction};
    pub use crate::configuration::ValidatorConfig;
    pub use crate::error::{ValidationError, ValidationResult};
    pub use crate::probe::{HttpProbe, ReadinessProbe};
    pub use crate::runtime::{ContainerRuntime, DockerCli, LaunchSpec};
    pub use crate::samples::{Image, Sample, SampleSet};
    pub use crate::scoring::Accuracy;
    pub use crate::validator::Validator;
}

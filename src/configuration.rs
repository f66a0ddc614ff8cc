//! Config for the validator behaviors
//!
//! This module gathers every fixed value of a validation run (container name, port, polling
//! budget, accuracy threshold...) into a [`ValidatorConfig`] passed to the
//! [`Validator`](crate::validator::Validator) at construction.
//!
//! Configuration can be created programmatically using [`ValidatorConfig::new()`] or by reading
//! environment variables using [`ValidatorConfig::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Boolean flags are case-insensitive and enabled by `"true"`.
//!
//! - `AVC_VERBOSE`: print the validation report to stdout (default: `true`)
//! - `AVC_LOG`: write a trace log file (default: `false`)
//! - `AVC_CONTAINER_NAME`: name of the container and of the built image (default: [`CONTAINER_NAME`])
//! - `AVC_PORT`: port the model server listens on (default: [`DEFAULT_PORT`])
//! - `AVC_POLL_ATTEMPTS`: readiness polling budget (default: [`POLL_ATTEMPTS`])
//! - `AVC_POLL_INTERVAL_MS`: pause between two readiness attempts (default: [`POLL_INTERVAL`])
//! - `AVC_DOCKER`: container runtime binary (default: [`DOCKER_BINARY`])
//! - `AVC_BUILDER`: image build tool binary (default: [`BUILDER_BINARY`])

use std::{env, time::Duration};

use crate::scoring::Accuracy;

/// Name given to both the built image and the running container.
pub const CONTAINER_NAME: &str = "avc_test_model_submission";
/// Port the model server is expected to listen on inside the container.
pub const DEFAULT_PORT: u16 = 8989;
/// Number of readiness checks before giving up.
pub const POLL_ATTEMPTS: u32 = 30;
/// Pause between two readiness checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Tries of a single readiness probe when the connection is refused.
pub const PROBE_TRIES: u32 = 2;
/// Timeout of a single HTTP request made by the readiness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout of a single request made by the model client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Minimal top-1 accuracy for a submission to pass.
pub const MIN_ACCURACY: Accuracy = Accuracy::new(1, 2);
/// The running accuracy is printed every `REPORT_EVERY` samples.
pub const REPORT_EVERY: usize = 20;
/// Channel axis every submitted model must declare.
pub const EXPECTED_CHANNEL_AXIS: usize = 3;
/// Pixel bounds every submitted model must declare.
pub const EXPECTED_BOUNDS: (f64, f64) = (0.0, 255.0);
pub const DOCKER_BINARY: &str = "docker";
pub const BUILDER_BINARY: &str = "repo2docker";

/// Configuration for validator behaviors.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) container_name: String,
    pub(crate) port: u16,
    pub(crate) gpu: u32,
    pub(crate) no_cache: bool,
    pub(crate) poll_attempts: u32,
    pub(crate) poll_interval: Duration,
    pub(crate) probe_tries: u32,
    pub(crate) probe_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) min_accuracy: Accuracy,
    pub(crate) report_every: usize,
    pub(crate) docker_binary: String,
    pub(crate) builder_binary: String,
}

impl ValidatorConfig {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The validator prints its report to stdout.
    /// - Logging to file is disabled.
    /// - GPU 0 is selected and the build cache is used.
    /// - Readiness is polled [`POLL_ATTEMPTS`] times, [`POLL_INTERVAL`] apart.
    /// - A submission passes with an accuracy of at least [`MIN_ACCURACY`].
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            container_name: CONTAINER_NAME.to_owned(),
            port: DEFAULT_PORT,
            gpu: 0,
            no_cache: false,
            poll_attempts: POLL_ATTEMPTS,
            poll_interval: POLL_INTERVAL,
            probe_tries: PROBE_TRIES,
            probe_timeout: PROBE_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            min_accuracy: MIN_ACCURACY,
            report_every: REPORT_EVERY,
            docker_binary: DOCKER_BINARY.to_owned(),
            builder_binary: BUILDER_BINARY.to_owned(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the [module documentation](self) for the recognized variables. Unset or unparsable
    /// values fall back to the defaults of [`ValidatorConfig::new()`].
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_parsed<T: std::str::FromStr>(var: &str) -> Option<T> {
            env::var(var).ok()?.parse().ok()
        }

        let defaults = Self::new();
        Self {
            verbose: get_env_flag("AVC_VERBOSE", defaults.verbose),
            log: get_env_flag("AVC_LOG", defaults.log),
            container_name: env::var("AVC_CONTAINER_NAME").unwrap_or(defaults.container_name),
            port: get_env_parsed("AVC_PORT").unwrap_or(defaults.port),
            poll_attempts: get_env_parsed("AVC_POLL_ATTEMPTS").unwrap_or(defaults.poll_attempts),
            poll_interval: get_env_parsed("AVC_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            docker_binary: env::var("AVC_DOCKER").unwrap_or(defaults.docker_binary),
            builder_binary: env::var("AVC_BUILDER").unwrap_or(defaults.builder_binary),
            ..defaults
        }
    }

    /// Enable or disable the console report.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Set the name of the container and of the image built from the submission.
    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Select the GPU exposed to the container.
    pub fn with_gpu(mut self, gpu: u32) -> Self {
        self.gpu = gpu;
        self
    }

    /// Rebuild the image from scratch instead of reusing a previous build.
    pub fn with_no_cache(mut self, value: bool) -> Self {
        self.no_cache = value;
        self
    }

    pub fn with_poll_attempts(mut self, attempts: u32) -> Self {
        self.poll_attempts = attempts;
        self
    }

    /// Pause between two readiness checks. Zero disables the pause.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the minimal accuracy a submission needs to pass.
    pub fn with_min_accuracy(mut self, threshold: Accuracy) -> Self {
        self.min_accuracy = threshold;
        self
    }

    /// Print the running accuracy every `every` samples. Zero disables the running report.
    pub fn with_report_every(mut self, every: usize) -> Self {
        self.report_every = every;
        self
    }

    pub fn with_docker_binary(mut self, binary: impl Into<String>) -> Self {
        self.docker_binary = binary.into();
        self
    }

    pub fn with_builder_binary(mut self, binary: impl Into<String>) -> Self {
        self.builder_binary = binary.into();
        self
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn gpu(&self) -> u32 {
        self.gpu
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn log(&self) -> bool {
        self.log
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

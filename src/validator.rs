//! Core validation logic for model submissions.
//!
//! This module defines the [`Validator`] type, which runs a submission through the whole
//! validation flow:
//!
//! 1. Remove the container left by a previous run (same name) and build the submission's image
//! 2. Start it detached, exposing the model server port, with the GPU selection and the port
//!    in its environment, and attach to its error output
//! 3. Poll the model server until it answers. A container that stops meanwhile aborts the run
//!    with its own exit code and error output
//! 4. Connect a client, check the model contract (channel axis and bounds) and that a random
//!    image gets an integer prediction
//! 5. Score the labelled sample set and compare the top-1 accuracy to the threshold
//!
//! The container is left running once the run is over; the next run removes it.
//!
//! Every external collaborator is behind a trait ([`ContainerRuntime`], [`ReadinessProbe`],
//! [`ModelConnector`]) so the flow can be exercised without docker.

use std::{io::Read, path::Path, thread};

use tracing::{error, info, instrument, trace, warn};

use crate::client::{ModelClient, ModelConnector, Prediction};
use crate::configuration::{ValidatorConfig, EXPECTED_BOUNDS, EXPECTED_CHANNEL_AXIS};
use crate::error::{ValidationError, ValidationResult};
use crate::probe::ReadinessProbe;
use crate::runtime::{ContainerRuntime, DiagnosticStream, LaunchSpec};
use crate::samples::{Image, SampleSet};
use crate::scoring::{self, Accuracy};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Environment variable carrying the GPU selection into the container.
pub const GPU_ENV: &str = "NVIDIA_VISIBLE_DEVICES";
/// Environment variable carrying the model server port into the container.
pub const PORT_ENV: &str = "PORT";

/// A started submission container.
pub struct Environment {
    pub name: String,
    pub address: String,
    pub port: u16,
    /// Attached error stream, held until the model server is ready.
    diagnostics: Option<DiagnosticStream>,
}

impl Environment {
    /// Everything the container wrote on its error output. Blocks until the stream ends.
    fn read_diagnostics(&mut self) -> String {
        let Some(mut stream) = self.diagnostics.take() else {
            return String::new();
        };
        let mut buf = Vec::new();
        if let Err(e) = stream.read_to_end(&mut buf) {
            warn!("could not read container output: {e}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Stop capturing the error stream. An unread attachment would eventually block the
    /// container's writes.
    fn detach(&mut self) {
        self.diagnostics = None;
    }

    pub fn is_attached(&self) -> bool {
        self.diagnostics.is_some()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Validates model submissions.
///
/// # Type Parameters
/// - `R`: container runtime and image builder
/// - `P`: liveness probe of the model server
/// - `C`: connector creating model clients
pub struct Validator<R, P, C> {
    runtime: R,
    probe: P,
    connector: C,
    config: ValidatorConfig,
}

impl<R: ContainerRuntime, P: ReadinessProbe, C: ModelConnector> Validator<R, P, C> {
    #[instrument(skip_all)]
    pub fn new(runtime: R, probe: P, connector: C, config: ValidatorConfig) -> Self {
        trace!(?config);
        Validator {
            runtime,
            probe,
            connector,
            config,
        }
    }

    /// Runs the full validation of the submission in `directory` against `samples`.
    ///
    /// # Returns
    /// The accuracy of the submission when it is at least the configured threshold.
    ///
    /// # Errors
    /// See [`ValidationError`]. Nothing is started when `samples` is empty or `directory` is not
    /// a directory.
    #[instrument(skip(self, samples))]
    pub fn validate(&self, directory: &Path, samples: &SampleSet) -> ValidationResult<Accuracy> {
        if !directory.is_dir() {
            return Err(ValidationError::NotADirectory(directory.to_path_buf()));
        }
        if samples.is_empty() {
            return Err(ValidationError::EmptySampleSet);
        }

        let mut environment = self.start_environment(directory)?;
        self.wait_until_ready(&mut environment)?;

        let client = self
            .connector
            .connect(&environment.address, environment.port)?;
        self.check_contract(&client)?;

        self.step("Running test samples...");
        let accuracy = scoring::score(
            &client,
            samples,
            self.config.report_every,
            self.config.verbose,
        )?;
        self.verdict(accuracy)
    }

    /// Remove the previous container, build the submission and start it.
    #[instrument(skip(self))]
    pub fn start_environment(&self, directory: &Path) -> ValidationResult<Environment> {
        let name = &self.config.container_name;

        self.step(&format!("Removing previous container '{name}'..."));
        self.runtime.remove(name)?;

        self.step(&format!("Building image '{name}'..."));
        self.runtime.build(directory, name, self.config.no_cache)?;

        self.step("Starting container...");
        let spec = LaunchSpec {
            name: name.clone(),
            image: name.clone(),
            port: self.config.port,
            env: vec![
                (GPU_ENV.to_owned(), self.config.gpu.to_string()),
                (PORT_ENV.to_owned(), self.config.port.to_string()),
            ],
        };
        self.runtime.launch(&spec)?;
        let diagnostics = self.runtime.attach(name)?;
        let address = self.runtime.address(name)?;
        info!(%address, port = self.config.port, "container started");

        Ok(Environment {
            name: name.clone(),
            address,
            port: self.config.port,
            diagnostics: Some(diagnostics),
        })
    }

    /// Poll the model server until it answers. The error stream is released once it does.
    ///
    /// # Errors
    /// - [`ValidationError::EnvironmentExited`] as soon as the container is seen stopped
    /// - [`ValidationError::NotReady`] once every attempt failed with the container still running
    #[instrument(skip(self))]
    pub fn wait_until_ready(&self, environment: &mut Environment) -> ValidationResult<()> {
        self.step("Waiting for the model server...");
        let attempts = self.config.poll_attempts;
        for attempt in 1..=attempts {
            if self.probe.probe(&environment.address, environment.port) {
                info!(attempt, "model server is ready");
                environment.detach();
                return Ok(());
            }

            if !self.runtime.is_running(&environment.name)? {
                let diagnostics = self.diagnostics(environment);
                let exit_code = self.runtime.exit_code(&environment.name)?;
                error!(exit_code, %diagnostics, "container stopped before serving");
                if self.config.verbose {
                    println!("{RED}Container stopped with exit code {exit_code}:{RESET}");
                    println!("{diagnostics}");
                }
                return Err(ValidationError::EnvironmentExited {
                    name: environment.name.clone(),
                    exit_code,
                    diagnostics,
                });
            }

            trace!(attempt, "model server not ready yet");
            if attempt < attempts {
                thread::sleep(self.config.poll_interval);
            }
        }

        error!(attempts, "model server never became ready");
        Err(ValidationError::NotReady {
            name: environment.name.clone(),
            attempts,
        })
    }

    /// Error output of a stopped container. Falls back to the runtime's logs when the
    /// attachment caught nothing, which happens when the container died before it.
    fn diagnostics(&self, environment: &mut Environment) -> String {
        let diagnostics = environment.read_diagnostics();
        if !diagnostics.trim().is_empty() {
            return diagnostics;
        }
        match self.runtime.logs(&environment.name) {
            Ok(logs) => logs,
            Err(e) => {
                warn!("could not read container logs: {e:#}");
                diagnostics
            }
        }
    }

    /// Check the model declares the expected channel axis and bounds, and that it answers a
    /// random image with an integer.
    #[instrument(skip_all)]
    pub fn check_contract(&self, client: &C::Client) -> ValidationResult<()> {
        let version = client.server_version()?;
        info!(%version, "connected to model server");
        self.step(&format!("Connected to model server {version}"));

        let channel_axis = client.channel_axis();
        if channel_axis != EXPECTED_CHANNEL_AXIS {
            return Err(ValidationError::ChannelAxisMismatch {
                expected: EXPECTED_CHANNEL_AXIS,
                actual: channel_axis,
            });
        }

        let bounds = client.bounds();
        if bounds != EXPECTED_BOUNDS {
            return Err(ValidationError::BoundsMismatch {
                expected: EXPECTED_BOUNDS,
                actual: bounds,
            });
        }

        match client.predict(&Image::random())? {
            Prediction::Label(label) => {
                trace!(label, "random image prediction");
                Ok(())
            }
            Prediction::Other(kind) => Err(ValidationError::NonIntegerPrediction { kind }),
        }
    }

    fn verdict(&self, accuracy: Accuracy) -> ValidationResult<Accuracy> {
        let threshold = self.config.min_accuracy;
        if !accuracy.is_at_least(threshold) {
            error!(%accuracy, %threshold, "accuracy too low");
            return Err(ValidationError::LowAccuracy {
                accuracy,
                threshold,
            });
        }

        info!(%accuracy, "submission passed");
        if self.config.verbose {
            println!("{GREEN}Test passed: accuracy {accuracy}{RESET}");
        }
        Ok(accuracy)
    }

    fn step(&self, message: &str) {
        info!("{message}");
        if self.config.verbose {
            println!("{message}");
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }
}

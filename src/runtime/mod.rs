//! Capabilities the validator needs from a container runtime and an image build tool.

mod docker;

pub use docker::*;

use std::{io::Read, path::Path};

/// What is needed to start a submission's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub name: String,
    pub image: String,
    /// Port published by the container.
    pub port: u16,
    pub env: Vec<(String, String)>,
}

/// Output of an attached container, readable once the container is gone.
pub type DiagnosticStream = Box<dyn Read>;

/// Lifecycle of named containers.
///
/// Every call blocks until the underlying command completed.
pub trait ContainerRuntime {
    /// Force-remove the container `name`. Removing a missing container is not an error.
    fn remove(&self, name: &str) -> anyhow::Result<()>;

    /// Build `directory` into the image `image`.
    ///
    /// With `no_cache`, the image already tagged `image` is removed first.
    fn build(&self, directory: &Path, image: &str, no_cache: bool) -> anyhow::Result<()>;

    /// Start a detached container.
    fn launch(&self, spec: &LaunchSpec) -> anyhow::Result<()>;

    /// Capture the error stream of the container `name`.
    fn attach(&self, name: &str) -> anyhow::Result<DiagnosticStream>;

    /// Error output the container `name` wrote so far, including before any attachment.
    fn logs(&self, name: &str) -> anyhow::Result<String>;

    fn address(&self, name: &str) -> anyhow::Result<String>;

    fn is_running(&self, name: &str) -> anyhow::Result<bool>;

    fn exit_code(&self, name: &str) -> anyhow::Result<i32>;
}

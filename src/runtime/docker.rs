use std::{
    io::{Cursor, Read},
    path::Path,
    process::{Child, Command, Output, Stdio},
};

use anyhow::{anyhow, bail, Context};
use tracing::{debug, error, info, instrument};

use super::{ContainerRuntime, DiagnosticStream, LaunchSpec};
use crate::configuration::ValidatorConfig;

/// [`ContainerRuntime`] driving the `docker` command line, with images built by `repo2docker`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker: String,
    builder: String,
}

impl DockerCli {
    pub fn new(docker: impl Into<String>, builder: impl Into<String>) -> DockerCli {
        DockerCli {
            docker: docker.into(),
            builder: builder.into(),
        }
    }

    pub fn from_config(config: &ValidatorConfig) -> DockerCli {
        Self::new(&config.docker_binary, &config.builder_binary)
    }

    fn docker(&self, args: &[String]) -> anyhow::Result<Output> {
        run_command(&self.docker, args)
    }

    fn inspect(&self, name: &str, format: &str) -> anyhow::Result<String> {
        let output = self.docker(&to_args(&["inspect", "--format", format, name]))?;
        if !output.status.success() {
            bail!(
                "could not inspect container '{name}': {}",
                first_line(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    /// `docker <args>`, where a missing object counts as success.
    fn docker_tolerating_missing(&self, args: &[String], what: &str) -> anyhow::Result<()> {
        let output = self.docker(args)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || is_missing(&stderr) {
            Ok(())
        } else {
            bail!("could not remove {what}: {}", first_line(&output.stderr))
        }
    }
}

impl ContainerRuntime for DockerCli {
    #[instrument(skip(self))]
    fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.docker_tolerating_missing(&to_args(&["rm", "--force", name]), "container")
    }

    #[instrument(skip(self))]
    fn build(&self, directory: &Path, image: &str, no_cache: bool) -> anyhow::Result<()> {
        if no_cache {
            // repo2docker reuses an image already tagged `image`
            self.docker_tolerating_missing(&to_args(&["image", "rm", "--force", image]), "image")?;
        }

        let directory = directory
            .canonicalize()
            .with_context(|| format!("could not resolve '{}'", directory.display()))?;
        let args = vec![
            "--no-run".to_owned(),
            "--image-name".to_owned(),
            image.to_owned(),
            directory.display().to_string(),
        ];
        let output = run_command(&self.builder, &args)?;

        let log = String::from_utf8_lossy(&output.stdout).into_owned()
            + "\n"
            + &String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            debug!("build output: {log}");
            Ok(())
        } else {
            error!("build error: {log}");
            Err(anyhow!("Build error: {}", last_line(&output.stderr)))
        }
    }

    #[instrument(skip(self))]
    fn launch(&self, spec: &LaunchSpec) -> anyhow::Result<()> {
        let output = self.docker(&launch_args(spec))?;
        if !output.status.success() {
            bail!(
                "could not start container '{}': {}",
                spec.name,
                first_line(&output.stderr)
            );
        }
        info!(
            container_id = %String::from_utf8_lossy(&output.stdout).trim(),
            "container started"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    fn attach(&self, name: &str) -> anyhow::Result<DiagnosticStream> {
        let child = Command::new(&self.docker)
            .args(["attach", "--no-stdin", "--sig-proxy=false", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("command '{}' not found", self.docker))?;
        Ok(Box::new(AttachedStream {
            child,
            output: None,
        }))
    }

    #[instrument(skip(self))]
    fn logs(&self, name: &str) -> anyhow::Result<String> {
        let output = self.docker(&to_args(&["logs", name]))?;
        if !output.status.success() {
            bail!(
                "could not read logs of container '{name}': {}",
                first_line(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }

    fn address(&self, name: &str) -> anyhow::Result<String> {
        let address = self.inspect(name, "{{.NetworkSettings.IPAddress}}")?;
        if address.is_empty() {
            bail!("container '{name}' has no IP address");
        }
        Ok(address)
    }

    fn is_running(&self, name: &str) -> anyhow::Result<bool> {
        parse_running(&self.inspect(name, "{{.State.Running}}")?)
    }

    fn exit_code(&self, name: &str) -> anyhow::Result<i32> {
        let code = self.inspect(name, "{{.State.ExitCode}}")?;
        code.parse()
            .with_context(|| format!("invalid exit code '{code}'"))
    }
}

/// Error output of a `docker attach` process. The process is killed on drop.
///
/// The first read collects everything until the attachment ends. When docker could not attach
/// at all, its own complaint is dropped and the stream reads as empty.
#[derive(Debug)]
struct AttachedStream {
    child: Child,
    output: Option<Cursor<Vec<u8>>>,
}

impl AttachedStream {
    fn collect(&mut self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        if let Some(stderr) = self.child.stderr.as_mut() {
            stderr.read_to_end(&mut bytes)?;
        }
        if is_attach_failure(&String::from_utf8_lossy(&bytes)) {
            debug!("docker attach failed: {}", first_line(&bytes));
            bytes.clear();
        }
        Ok(bytes)
    }
}

impl Read for AttachedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.output.is_none() {
            let bytes = self.collect()?;
            self.output = Some(Cursor::new(bytes));
        }
        match self.output.as_mut() {
            Some(output) => output.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for AttachedStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn run_command(command: &str, args: &[String]) -> anyhow::Result<Output> {
    debug!(command, ?args);
    Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("command '{command}' not found"))
}

fn launch_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args = to_args(&["run", "--detach", "--name", &spec.name]);
    args.push("--publish".to_owned());
    args.push(spec.port.to_string());
    for (key, value) in &spec.env {
        args.push("--env".to_owned());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn is_missing(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such image")
}

fn is_attach_failure(output: &str) -> bool {
    output.trim_start().starts_with("You cannot attach to a stopped container")
}

fn parse_running(value: &str) -> anyhow::Result<bool> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => bail!("invalid running state '{other}'"),
    }
}

fn first_line(output: &[u8]) -> String {
    String::from_utf8_lossy(output)
        .trim()
        .lines()
        .next()
        .unwrap_or_default()
        .to_owned()
}

fn last_line(output: &[u8]) -> String {
    String::from_utf8_lossy(output)
        .trim()
        .lines()
        .last()
        .unwrap_or_default()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_publishes_port_and_environment() {
        let spec = LaunchSpec {
            name: "sub".to_owned(),
            image: "sub-image".to_owned(),
            port: 8989,
            env: vec![
                ("NVIDIA_VISIBLE_DEVICES".to_owned(), "1".to_owned()),
                ("PORT".to_owned(), "8989".to_owned()),
            ],
        };
        assert_eq!(
            launch_args(&spec),
            vec![
                "run",
                "--detach",
                "--name",
                "sub",
                "--publish",
                "8989",
                "--env",
                "NVIDIA_VISIBLE_DEVICES=1",
                "--env",
                "PORT=8989",
                "sub-image"
            ]
        );
    }

    #[test]
    fn inspect_values_are_parsed() {
        assert!(parse_running("true\n").unwrap());
        assert!(!parse_running("false").unwrap());
        assert!(parse_running("").is_err());
    }

    #[test]
    fn missing_objects_are_recognized() {
        assert!(is_missing(
            "Error response from daemon: No such container: avc_test_model_submission"
        ));
        assert!(is_missing("Error: No such image: avc"));
        assert!(!is_missing("permission denied while trying to connect"));
    }

    #[test]
    fn attach_failures_are_recognized() {
        assert!(is_attach_failure(
            "You cannot attach to a stopped container, start it first\n"
        ));
        assert!(!is_attach_failure("Traceback (most recent call last):\n"));
        assert!(!is_attach_failure(""));
    }

    #[test]
    fn first_and_last_lines_of_output() {
        let output = b"\n step 1\nstep 2\nerror: failed\n";
        assert_eq!(first_line(output), "step 1");
        assert_eq!(last_line(output), "error: failed");
        assert_eq!(first_line(b""), "");
    }

    #[test]
    fn remove_follows_command_status() {
        assert!(DockerCli::new("true", "true").remove("anything").is_ok());
        assert!(DockerCli::new("false", "true").remove("anything").is_err());
        assert!(DockerCli::new("this-command-does-not-exist", "true")
            .remove("anything")
            .is_err());
    }

    #[cfg(unix)]
    mod recorded {
        use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};

        use tempfile::TempDir;

        use super::*;

        /// Executable writing its name and arguments to `calls.log`, then printing `stderr` on
        /// its error output.
        fn recording_script(dir: &TempDir, name: &str, stderr: &str) -> PathBuf {
            let path = dir.path().join(name);
            let log = dir.path().join("calls.log");
            let script = format!(
                "#!/bin/sh\necho \"{name} $*\" >> '{}'\nprintf '%s' '{stderr}' >&2\n",
                log.display()
            );
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn recorded_calls(dir: &TempDir) -> Vec<String> {
            fs::read_to_string(dir.path().join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_owned)
                .collect()
        }

        fn docker_cli(dir: &TempDir, attach_output: &str) -> DockerCli {
            DockerCli::new(
                recording_script(dir, "docker", attach_output)
                    .display()
                    .to_string(),
                recording_script(dir, "repo2docker", "")
                    .display()
                    .to_string(),
            )
        }

        #[test]
        fn build_without_cache_removes_the_tagged_image_first() {
            let scripts = tempfile::tempdir().unwrap();
            let submission = tempfile::tempdir().unwrap();
            let cli = docker_cli(&scripts, "");

            cli.build(submission.path(), "img", true).unwrap();

            let directory = submission.path().canonicalize().unwrap();
            assert_eq!(
                recorded_calls(&scripts),
                vec![
                    "docker image rm --force img".to_owned(),
                    format!("repo2docker --no-run --image-name img {}", directory.display()),
                ]
            );
        }

        #[test]
        fn build_with_cache_keeps_the_tagged_image() {
            let scripts = tempfile::tempdir().unwrap();
            let submission = tempfile::tempdir().unwrap();
            let cli = docker_cli(&scripts, "");

            cli.build(submission.path(), "img", false).unwrap();

            let calls = recorded_calls(&scripts);
            assert_eq!(calls.len(), 1);
            assert!(calls[0].starts_with("repo2docker --no-run --image-name img "));
        }

        #[test]
        fn attached_stream_reads_the_container_error_output() {
            let scripts = tempfile::tempdir().unwrap();
            let cli = docker_cli(&scripts, "Traceback: boom");

            let mut output = String::new();
            cli.attach("sub").unwrap().read_to_string(&mut output).unwrap();

            assert_eq!(output, "Traceback: boom");
            assert_eq!(
                recorded_calls(&scripts),
                vec!["docker attach --no-stdin --sig-proxy=false sub"]
            );
        }

        #[test]
        fn failed_attachment_reads_as_empty() {
            let scripts = tempfile::tempdir().unwrap();
            let cli = docker_cli(
                &scripts,
                "You cannot attach to a stopped container, start it first",
            );

            let mut output = String::new();
            cli.attach("sub").unwrap().read_to_string(&mut output).unwrap();

            assert!(output.is_empty());
        }

        #[test]
        fn logs_are_the_container_error_output() {
            let scripts = tempfile::tempdir().unwrap();
            let cli = docker_cli(&scripts, "Traceback: boom");

            assert_eq!(cli.logs("sub").unwrap(), "Traceback: boom");
            assert_eq!(recorded_calls(&scripts), vec!["docker logs sub"]);
        }
    }
}

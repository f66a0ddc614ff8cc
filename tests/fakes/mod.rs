//! In-memory stand-ins for docker, the readiness probe and the model server.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io::{Cursor, Read},
    path::Path,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use submission_validator::prelude::*;
use submission_validator::runtime::DiagnosticStream;

pub const ADDRESS: &str = "172.17.0.2";

/// Shared, ordered record of calls made to the fakes.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Records every call; `is_running` answers from a queue whose last value repeats.
///
/// Dropping an attached stream records `detach <name>`.
#[derive(Debug)]
pub struct FakeRuntime {
    calls: CallLog,
    running: Mutex<VecDeque<bool>>,
    exit_code: i32,
    diagnostics: String,
    logs: String,
}

impl FakeRuntime {
    pub fn healthy() -> FakeRuntime {
        Self::with_running_states(vec![true], 0, "")
    }

    pub fn dying(exit_code: i32, diagnostics: &str) -> FakeRuntime {
        Self::with_running_states(vec![false], exit_code, diagnostics)
    }

    pub fn with_running_states(states: Vec<bool>, exit_code: i32, diagnostics: &str) -> FakeRuntime {
        FakeRuntime {
            calls: CallLog::default(),
            running: Mutex::new(states.into()),
            exit_code,
            diagnostics: diagnostics.to_owned(),
            logs: String::new(),
        }
    }

    /// What `logs` answers.
    pub fn with_logs(mut self, logs: &str) -> FakeRuntime {
        self.logs = logs.to_owned();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ContainerRuntime for FakeRuntime {
    fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.record(format!("remove {name}"));
        Ok(())
    }

    fn build(&self, _directory: &Path, image: &str, no_cache: bool) -> anyhow::Result<()> {
        self.record(format!("build {image} no_cache={no_cache}"));
        Ok(())
    }

    fn launch(&self, spec: &LaunchSpec) -> anyhow::Result<()> {
        let env = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        self.record(format!("launch {} port={} {env}", spec.name, spec.port));
        Ok(())
    }

    fn attach(&self, name: &str) -> anyhow::Result<DiagnosticStream> {
        self.record(format!("attach {name}"));
        Ok(Box::new(FakeStream {
            output: Cursor::new(self.diagnostics.clone().into_bytes()),
            name: name.to_owned(),
            calls: self.calls.clone(),
        }))
    }

    fn logs(&self, name: &str) -> anyhow::Result<String> {
        self.record(format!("logs {name}"));
        Ok(self.logs.clone())
    }

    fn address(&self, name: &str) -> anyhow::Result<String> {
        self.record(format!("address {name}"));
        Ok(ADDRESS.to_owned())
    }

    fn is_running(&self, name: &str) -> anyhow::Result<bool> {
        self.record(format!("is_running {name}"));
        let mut running = self.running.lock().unwrap();
        let state = if running.len() > 1 {
            running.pop_front()
        } else {
            running.front().copied()
        };
        Ok(state.unwrap_or(false))
    }

    fn exit_code(&self, name: &str) -> anyhow::Result<i32> {
        self.record(format!("exit_code {name}"));
        Ok(self.exit_code)
    }
}

struct FakeStream {
    output: Cursor<Vec<u8>>,
    name: String,
    calls: CallLog,
}

impl Read for FakeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.output.read(buf)
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.calls.lock().unwrap().push(format!("detach {}", self.name));
    }
}

/// Fails the first `ready_after` probes, then succeeds. Never succeeds when `None`.
#[derive(Debug)]
pub struct FakeProbe {
    ready_after: Option<u32>,
    probes: AtomicU32,
}

impl FakeProbe {
    pub fn ready_after(failures: u32) -> FakeProbe {
        FakeProbe {
            ready_after: Some(failures),
            probes: AtomicU32::new(0),
        }
    }

    pub fn never_ready() -> FakeProbe {
        FakeProbe {
            ready_after: None,
            probes: AtomicU32::new(0),
        }
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ReadinessProbe for FakeProbe {
    fn probe(&self, address: &str, _port: u16) -> bool {
        assert_eq!(address, ADDRESS);
        let count = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        self.ready_after.is_some_and(|failures| count > failures)
    }
}

/// Model answering the first pixel of each image, or a float for every image.
#[derive(Debug, Clone)]
pub struct FakeModel {
    pub channel_axis: usize,
    pub bounds: (f64, f64),
    pub float_predictions: bool,
}

impl Default for FakeModel {
    fn default() -> Self {
        FakeModel {
            channel_axis: 3,
            bounds: (0.0, 255.0),
            float_predictions: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeConnector {
    model: FakeModel,
    connects: AtomicU32,
    predictions: Arc<AtomicU32>,
    log: Option<CallLog>,
}

impl FakeConnector {
    pub fn new(model: FakeModel) -> FakeConnector {
        FakeConnector {
            model,
            ..Default::default()
        }
    }

    /// Also record `connect <address>` in `log`.
    pub fn recording_into(mut self, log: CallLog) -> FakeConnector {
        self.log = Some(log);
        self
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn predictions(&self) -> u32 {
        self.predictions.load(Ordering::SeqCst)
    }
}

impl ModelConnector for FakeConnector {
    type Client = FakeClient;

    fn connect(&self, address: &str, port: u16) -> anyhow::Result<FakeClient> {
        assert_eq!(address, ADDRESS);
        assert_eq!(port, 8989);
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("connect {address}"));
        }
        Ok(FakeClient {
            model: self.model.clone(),
            predictions: self.predictions.clone(),
        })
    }
}

#[derive(Debug)]
pub struct FakeClient {
    model: FakeModel,
    predictions: Arc<AtomicU32>,
}

impl ModelClient for FakeClient {
    fn server_version(&self) -> anyhow::Result<String> {
        Ok("0.1.0".to_owned())
    }

    fn channel_axis(&self) -> usize {
        self.model.channel_axis
    }

    fn bounds(&self) -> (f64, f64) {
        self.model.bounds
    }

    fn predict(&self, image: &Image) -> anyhow::Result<Prediction> {
        self.predictions.fetch_add(1, Ordering::SeqCst);
        if self.model.float_predictions {
            return Ok(Prediction::Other("Double".to_owned()));
        }
        Ok(Prediction::Label(i64::from(image.as_bytes()[0])))
    }
}

/// `total` samples, the first `correct` of which [`FakeClient`] predicts right.
pub fn samples(total: usize, correct: usize) -> SampleSet {
    let samples = (0..total)
        .map(|i| {
            let pixel = (i % 200) as u8;
            let label = if i < correct {
                u32::from(pixel)
            } else {
                (u32::from(pixel) + 1) % 200
            };
            Sample {
                image: Image::filled(pixel),
                label,
            }
        })
        .collect();
    SampleSet::new(samples)
}

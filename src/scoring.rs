//! Top-1 accuracy of a model over a labelled sample set.

use std::fmt::Display;

use tracing::{info, instrument, warn};

use crate::client::{ModelClient, Prediction};
use crate::samples::{SampleSet, NUM_CLASSES};

const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// An exact `correct / total` ratio.
///
/// Comparisons are done on the ratio itself (cross-multiplication), never on a rounded float,
/// so `1/2` is exactly equal to `2/4` and exactly at least `1/2`.
#[derive(Debug, Clone, Copy)]
pub struct Accuracy {
    correct: u64,
    total: u64,
}

impl Accuracy {
    pub const fn new(correct: u64, total: u64) -> Self {
        Self { correct, total }
    }

    pub fn correct(&self) -> u64 {
        self.correct
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Rounded value, for display only. `NaN` when `total` is zero.
    pub fn as_f64(&self) -> f64 {
        self.correct as f64 / self.total as f64
    }

    /// `self >= threshold`, compared exactly.
    pub fn is_at_least(&self, threshold: Accuracy) -> bool {
        u128::from(self.correct) * u128::from(threshold.total)
            >= u128::from(threshold.correct) * u128::from(self.total)
    }
}

impl PartialEq for Accuracy {
    fn eq(&self, other: &Self) -> bool {
        u128::from(self.correct) * u128::from(other.total)
            == u128::from(other.correct) * u128::from(self.total)
    }
}

impl Display for Accuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} ({}/{})", self.as_f64(), self.correct, self.total)
    }
}

/// Query `client` once per sample, in order, and count the predictions matching the label.
///
/// The running accuracy is reported on samples whose index is a multiple of `report_every`
/// (zero disables it). Predictions that are not a valid label count as wrong.
#[instrument(skip_all, fields(samples = samples.len()))]
pub fn score<C: ModelClient>(
    client: &C,
    samples: &SampleSet,
    report_every: usize,
    verbose: bool,
) -> anyhow::Result<Accuracy> {
    let mut correct = 0u64;
    for (index, sample) in samples.iter().enumerate() {
        let prediction = client.predict(&sample.image)?;
        match prediction {
            Prediction::Label(label) if label == i64::from(sample.label) => correct += 1,
            Prediction::Label(label) if !(0..i64::from(NUM_CLASSES)).contains(&label) => {
                warn!(index, label, "prediction is not a valid class")
            }
            Prediction::Label(_) => {}
            Prediction::Other(kind) => warn!(index, %kind, "prediction is not an integer"),
        }

        if should_report(index, report_every) {
            let running = Accuracy::new(correct, index as u64 + 1);
            info!(index, %running, "running accuracy");
            if verbose {
                println!("{GREEN}Sample {index}:{RESET} running accuracy {running}");
            }
        }
    }

    Ok(Accuracy::new(correct, samples.len() as u64))
}

/// Whether the running accuracy is reported after the sample at `index`.
fn should_report(index: usize, report_every: usize) -> bool {
    report_every != 0 && index % report_every == 0
}

//! Test images and the labelled sample set submissions are scored on.
//!
//! A sample set file is a packed sequence of records, each one made of a little-endian `u32`
//! label followed by the [`IMAGE_LEN`] raw bytes of a 64x64 RGB image (channels last).

use std::{
    fmt::Debug,
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use anyhow::{bail, Context};
use rand::Rng;
use tracing::{info, instrument};

pub const IMAGE_SIDE: usize = 64;
pub const IMAGE_CHANNELS: usize = 3;
pub const IMAGE_LEN: usize = IMAGE_SIDE * IMAGE_SIDE * IMAGE_CHANNELS;
/// Tiny ImageNet classes
pub const NUM_CLASSES: u32 = 200;

const LABEL_LEN: usize = std::mem::size_of::<u32>();
const RECORD_LEN: usize = LABEL_LEN + IMAGE_LEN;

/// A 64x64 RGB image, one `u8` per channel, channels last.
#[derive(Clone, PartialEq, Eq)]
pub struct Image(Vec<u8>);

impl Image {
    /// Errors if `bytes` is not exactly [`IMAGE_LEN`] long.
    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Image> {
        if bytes.len() != IMAGE_LEN {
            bail!(
                "image has {} bytes instead of {IMAGE_LEN} ({IMAGE_SIDE}x{IMAGE_SIDE}x{IMAGE_CHANNELS})",
                bytes.len()
            );
        }
        Ok(Image(bytes))
    }

    /// Uniform noise, used to probe a model before scoring it.
    pub fn random() -> Image {
        let mut bytes = vec![0u8; IMAGE_LEN];
        rand::rng().fill(&mut bytes[..]);
        Image(bytes)
    }

    /// Every channel of every pixel set to `value`.
    pub fn filled(value: u8) -> Image {
        Image(vec![value; IMAGE_LEN])
    }

    pub fn shape() -> [usize; 3] {
        [IMAGE_SIDE, IMAGE_SIDE, IMAGE_CHANNELS]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image({:?}, ..)", &self.0[..4])
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub image: Image,
    pub label: u32,
}

/// Ordered, read-only set of labelled images.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new(samples: Vec<Sample>) -> SampleSet {
        SampleSet { samples }
    }

    /// Load a packed sample set file.
    #[instrument]
    pub fn load(path: &Path) -> anyhow::Result<SampleSet> {
        let file = File::open(path)
            .with_context(|| format!("could not open sample set '{}'", path.display()))?;
        let set = Self::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid sample set '{}'", path.display()))?;
        info!(samples = set.len(), "sample set loaded");
        Ok(set)
    }

    pub fn from_reader(mut reader: impl Read) -> anyhow::Result<SampleSet> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .context("could not read sample set")?;

        if buf.len() % RECORD_LEN != 0 {
            bail!(
                "truncated record: {} bytes is not a multiple of the {RECORD_LEN} bytes record size",
                buf.len()
            );
        }

        let mut samples = Vec::with_capacity(buf.len() / RECORD_LEN);
        for (index, record) in buf.chunks_exact(RECORD_LEN).enumerate() {
            let (label, image) = record.split_at(LABEL_LEN);
            let label = u32::from_le_bytes(label.try_into()?);
            if label >= NUM_CLASSES {
                bail!("sample {index}: label {label} is not below {NUM_CLASSES}");
            }
            samples.push(Sample {
                image: Image::from_bytes(image.to_vec())?,
                label,
            });
        }
        Ok(SampleSet { samples })
    }

    /// Write the set in the format read by [`SampleSet::from_reader`].
    pub fn write_to(&self, mut writer: impl Write) -> anyhow::Result<()> {
        for sample in &self.samples {
            writer.write_all(&sample.label.to_le_bytes())?;
            writer.write_all(sample.image.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }
}

//! Client side of the model server running inside a submission's container.
//!
//! The server answers `GET /server_version` with plain text and `POST /predict` with a BSON
//! document `{ prediction: <value> }`. Prediction requests carry the image as a BSON-encoded
//! array: `{ image: { type: "array", shape: [64, 64, 3], dtype: "|u1", data: <bytes> } }`.
//!
//! [`ModelClient`] and [`ModelConnector`] hide this protocol from the validator so the
//! validation flow can run against any model.

use std::time::Duration;

use anyhow::{bail, Context};
use bson::{doc, spec::BinarySubtype, Binary, Bson, Document};
use reqwest::{blocking::Client, header::CONTENT_TYPE};
use tracing::{debug, instrument};

use crate::configuration::ValidatorConfig;
use crate::samples::Image;

const BSON_MIME: &str = "application/bson";
/// Channel axis of the Tiny ImageNet model wrapper.
pub const TINY_IMAGENET_CHANNEL_AXIS: usize = 3;
/// Pixel bounds of the Tiny ImageNet model wrapper.
pub const TINY_IMAGENET_BOUNDS: (f64, f64) = (0.0, 255.0);

/// Raw answer of a model to a prediction request.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Label(i64),
    /// The model answered something else than an integer; holds the kind of value received.
    Other(String),
}

/// A connected model.
pub trait ModelClient {
    fn server_version(&self) -> anyhow::Result<String>;

    fn channel_axis(&self) -> usize;

    fn bounds(&self) -> (f64, f64);

    fn predict(&self, image: &Image) -> anyhow::Result<Prediction>;
}

/// Creates [`ModelClient`]s once a model server is known to be reachable.
pub trait ModelConnector {
    type Client: ModelClient;

    fn connect(&self, address: &str, port: u16) -> anyhow::Result<Self::Client>;
}

/// HTTP/BSON connector for Tiny ImageNet models.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new(request_timeout: Duration) -> anyhow::Result<HttpConnector> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("could not create HTTP client")?;
        Ok(HttpConnector { client })
    }

    pub fn from_config(config: &ValidatorConfig) -> anyhow::Result<HttpConnector> {
        Self::new(config.request_timeout)
    }
}

impl ModelConnector for HttpConnector {
    type Client = HttpModelClient;

    fn connect(&self, address: &str, port: u16) -> anyhow::Result<HttpModelClient> {
        Ok(HttpModelClient {
            base_url: format!("http://{address}:{port}"),
            client: self.client.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpModelClient {
    base_url: String,
    client: Client,
}

impl ModelClient for HttpModelClient {
    #[instrument(skip(self), fields(url = %self.base_url))]
    fn server_version(&self) -> anyhow::Result<String> {
        let version = self
            .client
            .get(format!("{}/server_version", self.base_url))
            .send()
            .and_then(|res| res.error_for_status())
            .and_then(|res| res.text())
            .context("could not get server version")?;
        Ok(version.trim().to_owned())
    }

    fn channel_axis(&self) -> usize {
        TINY_IMAGENET_CHANNEL_AXIS
    }

    fn bounds(&self) -> (f64, f64) {
        TINY_IMAGENET_BOUNDS
    }

    fn predict(&self, image: &Image) -> anyhow::Result<Prediction> {
        let body = encode_image(image)?;
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .header(CONTENT_TYPE, BSON_MIME)
            .body(body)
            .send()
            .and_then(|res| res.error_for_status())
            .and_then(|res| res.bytes())
            .context("prediction request failed")?;
        let prediction = decode_prediction(&response)?;
        debug!(?prediction);
        Ok(prediction)
    }
}

fn encode_image(image: &Image) -> anyhow::Result<Vec<u8>> {
    let shape = Image::shape().map(|dim| Bson::Int32(dim as i32));
    let document = doc! {
        "image": {
            "type": "array",
            "shape": shape.to_vec(),
            "dtype": "|u1",
            "data": Binary {
                subtype: BinarySubtype::Generic,
                bytes: image.as_bytes().to_vec(),
            },
        }
    };
    bson::to_vec(&document).context("could not encode image")
}

fn decode_prediction(bytes: &[u8]) -> anyhow::Result<Prediction> {
    let document: Document =
        bson::from_slice(bytes).context("response is not a BSON document")?;
    match document.get("prediction") {
        Some(Bson::Int32(label)) => Ok(Prediction::Label(i64::from(*label))),
        Some(Bson::Int64(label)) => Ok(Prediction::Label(*label)),
        Some(other) => Ok(Prediction::Other(format!("{:?}", other.element_type()))),
        None => bail!("response has no 'prediction' field"),
    }
}

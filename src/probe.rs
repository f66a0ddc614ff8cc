//! Liveness check of the model server.

use std::{thread, time::Duration};

use anyhow::Context;
use reqwest::blocking::Client;
use tracing::{debug, instrument, trace};

use crate::configuration::ValidatorConfig;

/// Answers whether a server is reachable at `address:port`.
pub trait ReadinessProbe {
    fn probe(&self, address: &str, port: u16) -> bool;
}

/// Single `GET /` retried while the connection is refused.
///
/// Any HTTP response, whatever its status, means the server is up.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    tries: u32,
    retry_delay: Duration,
}

impl HttpProbe {
    const RETRY_DELAY: Duration = Duration::from_millis(500);

    pub fn new(timeout: Duration, tries: u32) -> anyhow::Result<HttpProbe> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("could not create HTTP client")?;
        Ok(HttpProbe {
            client,
            tries: tries.max(1),
            retry_delay: Self::RETRY_DELAY,
        })
    }

    pub fn from_config(config: &ValidatorConfig) -> anyhow::Result<HttpProbe> {
        Self::new(config.probe_timeout, config.probe_tries)
    }
}

impl ReadinessProbe for HttpProbe {
    #[instrument(skip(self))]
    fn probe(&self, address: &str, port: u16) -> bool {
        let url = format!("http://{address}:{port}/");
        for attempt in 1..=self.tries {
            match self.client.get(&url).send() {
                Ok(response) => {
                    trace!(status = %response.status(), "server answered");
                    return true;
                }
                Err(e) if e.is_connect() && attempt < self.tries => {
                    trace!(attempt, "connection refused, retrying");
                    thread::sleep(self.retry_delay);
                }
                Err(e) => {
                    debug!("probe failed: {e}");
                    return false;
                }
            }
        }
        false
    }
}

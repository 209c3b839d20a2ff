//! HTTP client for the doorbell device
//!
//! Every request is digest authenticated. The client answers the first `401`
//! challenge itself and reuses the challenge for later requests, retrying once
//! when the device rotates its nonce.
//!
//! The client plays two roles:
//!
//! - [`EventSource`] for the stream consumer (the long-lived event feed)
//! - [`PresenceProbe`] for the health endpoint (the "online" announcement)

pub mod digest;
pub mod endpoints;

pub use digest::DigestAuth;
pub use endpoints::DeviceEndpoints;

use crate::config::DeviceSection;
use crate::observability::health::{PresenceProbe, ProbeError};
use crate::stream::{EventBody, EventSource, StreamError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Device client errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Invalid device host: {0:?}")]
    InvalidHost(String),
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Device answered 401 without a digest challenge")]
    MissingChallenge,
    #[error("Invalid digest challenge: {0}")]
    InvalidChallenge(String),
}

/// Digest-authenticated client bound to one device
#[derive(Debug)]
pub struct DeviceClient {
    http: Client,
    endpoints: DeviceEndpoints,
    auth: DigestAuth,
    heartbeat_secs: u64,
    probe_timeout: Duration,
}

impl DeviceClient {
    pub fn new(config: &DeviceSection, heartbeat_secs: u64) -> Result<Self, DeviceError> {
        // No overall timeout: the event stream response never completes
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            http,
            endpoints: DeviceEndpoints::new(&config.host)?,
            auth: DigestAuth::new(&config.username, &config.password),
            heartbeat_secs,
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
        })
    }

    pub fn endpoints(&self) -> &DeviceEndpoints {
        &self.endpoints
    }

    /// Digest-authenticated GET
    pub async fn get(&self, url: &Url, timeout: Option<Duration>) -> Result<Response, DeviceError> {
        let target = endpoints::request_target(url);

        let response = self.send(url, &target, timeout).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let had_challenge = self.auth.has_challenge();
        if let Err(e) = self.auth.accept_challenge(response.headers()) {
            // No usable challenge: let the caller see the 401
            warn!(url = %url, error = %e, "Device rejected request without a usable digest challenge");
            return Ok(response);
        }
        debug!(
            url = %url,
            refreshed = had_challenge,
            "Answering digest challenge"
        );
        drop(response);

        let retried = self.send(url, &target, timeout).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            // Credentials are wrong; start clean on the next request
            self.auth.clear();
        }
        Ok(retried)
    }

    async fn send(
        &self,
        url: &Url,
        target: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, DeviceError> {
        let mut request = self.http.get(url.clone());
        if let Some(authorization) = self.auth.authorization(target)? {
            request = request.header(AUTHORIZATION, authorization);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send().await?)
    }
}

/// Streaming body of the device's event feed
pub struct HttpEventBody {
    response: Response,
}

#[async_trait]
impl EventBody for HttpEventBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        self.response
            .chunk()
            .await
            .map_err(|e| StreamError::Read(Box::new(e)))
    }
}

#[async_trait]
impl EventSource for DeviceClient {
    type Body = HttpEventBody;

    async fn open(&self) -> Result<Self::Body, StreamError> {
        let url = self
            .endpoints
            .event_stream(self.heartbeat_secs)
            .map_err(|e| StreamError::Connect(Box::new(e)))?;

        let response = self
            .get(&url, None)
            .await
            .map_err(|e| StreamError::Connect(Box::new(e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(StreamError::Status(status.as_u16()));
        }

        Ok(HttpEventBody { response })
    }
}

#[async_trait]
impl PresenceProbe for DeviceClient {
    async fn announce_online(&self) -> Result<(), ProbeError> {
        let url = self
            .endpoints
            .online_probe()
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let response = self
            .get(&url, Some(self.probe_timeout))
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProbeError::Status(status.to_string()));
        }
        Ok(())
    }
}

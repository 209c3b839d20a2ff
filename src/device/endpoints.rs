//! URL construction for the device CGI endpoints

use super::DeviceError;
use crate::protocol::{
    CONFIG_MANAGER_PATH, EVENT_STREAM_CODES, EVENT_STREAM_PATH, ONLINE_PROBE_QUERY,
};
use url::Url;

/// Device-local endpoints derived from a host or IP
#[derive(Debug, Clone)]
pub struct DeviceEndpoints {
    host: String,
}

impl DeviceEndpoints {
    /// Accepts `host`, `host:port` or an IP, without scheme
    pub fn new(host: &str) -> Result<Self, DeviceError> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() || host.contains("://") {
            return Err(DeviceError::InvalidHost(host.to_string()));
        }

        // Validate once so the builders below cannot fail
        Url::parse(&format!("http://{host}/"))
            .map_err(|_| DeviceError::InvalidHost(host.to_string()))?;

        Ok(Self {
            host: host.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `GET /cgi-bin/eventManager.cgi?action=attach&codes=[AlarmLocal]&heartbeat=<n>`
    pub fn event_stream(&self, heartbeat_secs: u64) -> Result<Url, DeviceError> {
        self.build(&format!(
            "{EVENT_STREAM_PATH}?action=attach&codes={EVENT_STREAM_CODES}&heartbeat={heartbeat_secs}"
        ))
    }

    /// `GET /cgi-bin/configManager.cgi?action=setConfig&VSP_PaaS.Online=true`
    pub fn online_probe(&self) -> Result<Url, DeviceError> {
        self.build(&format!("{CONFIG_MANAGER_PATH}?{ONLINE_PROBE_QUERY}"))
    }

    fn build(&self, path_and_query: &str) -> Result<Url, DeviceError> {
        let raw = format!("http://{}{}", self.host, path_and_query);
        Url::parse(&raw).map_err(|_| DeviceError::InvalidHost(self.host.clone()))
    }
}

/// Request target (path plus query) used in the digest `uri` field
pub fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod command;
pub mod fake;

/// Options handed to every probe invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOptions {
    pub accept_license: bool,
    pub accept_gdpr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

/// Performs one network measurement.
///
/// The scheduler never calls `measure` concurrently with itself, and does not
/// impose a timeout: bounding a run is the probe's job.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn measure(&self, options: &ProbeOptions) -> anyhow::Result<ProbeResult>;
    fn name(&self) -> &'static str;
}

/// Result document produced by a measurement run (speedtest `--format=json`).
///
/// Everything is optional: a sparse document still parses, and missing parts
/// normalize to null columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub timestamp: Option<DateTime<Utc>>,
    pub ping: Option<PingStats>,
    pub download: Option<TransferStats>,
    pub upload: Option<TransferStats>,
    pub packet_loss: Option<f64>,
    pub isp: Option<String>,
    pub interface: Option<InterfaceInfo>,
    pub server: Option<ServerInfo>,
    pub result: Option<ResultLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    pub jitter: Option<f64>,
    pub latency: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Bytes per second.
    pub bandwidth: Option<i64>,
    pub bytes: Option<i64>,
    /// Milliseconds.
    pub elapsed: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceInfo {
    pub internal_ip: Option<String>,
    pub name: Option<String>,
    pub mac_addr: Option<String>,
    pub is_vpn: Option<bool>,
    pub external_ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub id: Option<i64>,
    pub host: Option<String>,
    pub host_functional: Option<String>,
    pub port: Option<i64>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub ip: Option<String>,
    pub sponsor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultLink {
    pub id: Option<String>,
    pub url: Option<String>,
}

impl ProbeResult {
    pub fn result_id(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.id.as_deref())
    }
}

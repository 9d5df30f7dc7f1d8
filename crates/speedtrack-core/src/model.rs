use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Storage column of the `speedtests` table.
///
/// Variants are declared in table order; `crate::normalize::SCHEMA` lists
/// them in the same order and carries the source path and declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    ResultId,
    ResultUrl,
    Timestamp,
    UploadBandwidth,
    UploadBytes,
    UploadElapsed,
    DownloadBandwidth,
    DownloadBytes,
    DownloadElapsed,
    PingJitter,
    PingLatency,
    Isp,
    InterfaceExternalIp,
    InterfaceInternalIp,
    InterfaceIsVpn,
    InterfaceMacAddr,
    InterfaceName,
    PacketLoss,
    ServerCountry,
    ServerHost,
    ServerHostFunctional,
    ServerId,
    ServerIp,
    ServerLocation,
    ServerName,
    ServerPort,
    ServerSponsor,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::ResultId => "result_id",
            Column::ResultUrl => "result_url",
            Column::Timestamp => "timestamp",
            Column::UploadBandwidth => "upload_bandwidth",
            Column::UploadBytes => "upload_bytes",
            Column::UploadElapsed => "upload_elapsed",
            Column::DownloadBandwidth => "download_bandwidth",
            Column::DownloadBytes => "download_bytes",
            Column::DownloadElapsed => "download_elapsed",
            Column::PingJitter => "ping_jitter",
            Column::PingLatency => "ping_latency",
            Column::Isp => "isp",
            Column::InterfaceExternalIp => "interface_external_ip",
            Column::InterfaceInternalIp => "interface_internal_ip",
            Column::InterfaceIsVpn => "interface_is_vpn",
            Column::InterfaceMacAddr => "interface_mac_addr",
            Column::InterfaceName => "interface_name",
            Column::PacketLoss => "packetloss",
            Column::ServerCountry => "server_country",
            Column::ServerHost => "server_host",
            Column::ServerHostFunctional => "server_host_functional",
            Column::ServerId => "server_id",
            Column::ServerIp => "server_ip",
            Column::ServerLocation => "server_location",
            Column::ServerName => "server_name",
            Column::ServerPort => "server_port",
            Column::ServerSponsor => "server_sponsor",
        }
    }

    pub fn ty(self) -> ColumnType {
        crate::normalize::spec(self).ty
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        crate::normalize::SCHEMA
            .iter()
            .map(|spec| spec.column)
            .find(|c| c.as_str() == name)
            .ok_or_else(|| format!("unknown column '{}'", name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Boolean,
    Real,
    Integer,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Real => "REAL",
            ColumnType::Integer => "INTEGER",
        }
    }
}

/// A single stored cell. Serializes as the bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One normalized measurement, or a projection of one.
///
/// Cells keep table order. A record produced by the normalizer carries every
/// column; rows returned by a projected range query only carry the requested
/// ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    cells: Vec<(Column, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            cells: Vec::with_capacity(n),
        }
    }

    /// Sets `column`, replacing an earlier value for the same column.
    pub fn set(&mut self, column: Column, value: Value) {
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: Column) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    pub fn cells(&self) -> &[(Column, Value)] {
        &self.cells
    }

    pub fn columns(&self) -> impl Iterator<Item = Column> + '_ {
        self.cells.iter().map(|(c, _)| *c)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn result_id(&self) -> Option<&str> {
        self.get(Column::ResultId).and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.get(Column::Timestamp).and_then(Value::as_str)
    }

    pub fn download_bandwidth(&self) -> Option<i64> {
        self.get(Column::DownloadBandwidth).and_then(Value::as_i64)
    }

    pub fn upload_bandwidth(&self) -> Option<i64> {
        self.get(Column::UploadBandwidth).and_then(Value::as_i64)
    }

    pub fn ping_latency(&self) -> Option<f64> {
        self.get(Column::PingLatency).and_then(Value::as_f64)
    }

    pub fn packet_loss(&self) -> Option<f64> {
        self.get(Column::PacketLoss).and_then(Value::as_f64)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column.as_str(), value)?;
        }
        map.end()
    }
}

/// Whole-history means. `None` only when no row contributes to the mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Averages {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<f64>,
}

/// Canonical timestamp layout for stored records and range boundaries:
/// millisecond precision, `Z` suffix. Stored values compare lexically in
/// chronological order only because every writer uses this layout.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

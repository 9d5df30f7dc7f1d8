//! Maps a probe result onto the fixed `speedtests` column set.
//!
//! [`SCHEMA`] is the one table both the DDL and the normalizer read from: a
//! column, the dotted path it comes from in the result document, and the type
//! it is stored as. A path that is absent in the result yields a null cell.

use crate::model::{format_timestamp, Column, ColumnType, Record, Value};
use crate::probe::ProbeResult;

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub column: Column,
    pub path: &'static [&'static str],
    pub ty: ColumnType,
}

impl ColumnSpec {
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

const fn col(column: Column, path: &'static [&'static str], ty: ColumnType) -> ColumnSpec {
    ColumnSpec { column, path, ty }
}

pub const SCHEMA: &[ColumnSpec] = &[
    col(Column::ResultId, &["result", "id"], ColumnType::Text),
    col(Column::ResultUrl, &["result", "url"], ColumnType::Text),
    col(Column::Timestamp, &["timestamp"], ColumnType::Text),
    col(Column::UploadBandwidth, &["upload", "bandwidth"], ColumnType::Integer),
    col(Column::UploadBytes, &["upload", "bytes"], ColumnType::Integer),
    col(Column::UploadElapsed, &["upload", "elapsed"], ColumnType::Integer),
    col(Column::DownloadBandwidth, &["download", "bandwidth"], ColumnType::Integer),
    col(Column::DownloadBytes, &["download", "bytes"], ColumnType::Integer),
    col(Column::DownloadElapsed, &["download", "elapsed"], ColumnType::Integer),
    col(Column::PingJitter, &["ping", "jitter"], ColumnType::Real),
    col(Column::PingLatency, &["ping", "latency"], ColumnType::Real),
    col(Column::Isp, &["isp"], ColumnType::Text),
    col(Column::InterfaceExternalIp, &["interface", "externalIp"], ColumnType::Text),
    col(Column::InterfaceInternalIp, &["interface", "internalIp"], ColumnType::Text),
    col(Column::InterfaceIsVpn, &["interface", "isVpn"], ColumnType::Boolean),
    col(Column::InterfaceMacAddr, &["interface", "macAddr"], ColumnType::Text),
    col(Column::InterfaceName, &["interface", "name"], ColumnType::Text),
    col(Column::PacketLoss, &["packetLoss"], ColumnType::Real),
    col(Column::ServerCountry, &["server", "country"], ColumnType::Text),
    col(Column::ServerHost, &["server", "host"], ColumnType::Text),
    col(Column::ServerHostFunctional, &["server", "hostFunctional"], ColumnType::Text),
    col(Column::ServerId, &["server", "id"], ColumnType::Integer),
    col(Column::ServerIp, &["server", "ip"], ColumnType::Text),
    col(Column::ServerLocation, &["server", "location"], ColumnType::Text),
    col(Column::ServerName, &["server", "name"], ColumnType::Text),
    col(Column::ServerPort, &["server", "port"], ColumnType::Integer),
    col(Column::ServerSponsor, &["server", "sponsor"], ColumnType::Text),
];

/// Mapping entry for `column`. `SCHEMA` is declared in `Column` order.
pub fn spec(column: Column) -> &'static ColumnSpec {
    &SCHEMA[column as usize]
}

pub fn normalize(result: &ProbeResult) -> Record {
    let mut record = Record::with_capacity(SCHEMA.len());
    for spec in SCHEMA {
        let value = resolve(result, spec.path)
            .map(|v| shape(v, spec.ty))
            .unwrap_or(Value::Null);
        record.set(spec.column, value);
    }
    record
}

/// Looks up `path` in the result document. Dates come back as ISO-8601 text.
pub fn resolve(result: &ProbeResult, path: &[&str]) -> Option<Value> {
    let text = |s: &Option<String>| s.clone().map(Value::Text);
    let int = |v: Option<i64>| v.map(Value::Integer);
    let real = |v: Option<f64>| v.map(Value::Real);

    match path {
        ["timestamp"] => result.timestamp.map(|ts| Value::Text(format_timestamp(ts))),
        ["isp"] => text(&result.isp),
        ["packetLoss"] => real(result.packet_loss),
        ["result", field] => {
            let r = result.result.as_ref()?;
            match *field {
                "id" => text(&r.id),
                "url" => text(&r.url),
                _ => None,
            }
        }
        ["ping", field] => {
            let p = result.ping.as_ref()?;
            match *field {
                "jitter" => real(p.jitter),
                "latency" => real(p.latency),
                _ => None,
            }
        }
        [direction @ ("download" | "upload"), field] => {
            let t = match *direction {
                "download" => result.download.as_ref()?,
                _ => result.upload.as_ref()?,
            };
            match *field {
                "bandwidth" => int(t.bandwidth),
                "bytes" => int(t.bytes),
                "elapsed" => int(t.elapsed),
                _ => None,
            }
        }
        ["interface", field] => {
            let i = result.interface.as_ref()?;
            match *field {
                "externalIp" => text(&i.external_ip),
                "internalIp" => text(&i.internal_ip),
                "isVpn" => i.is_vpn.map(Value::Boolean),
                "macAddr" => text(&i.mac_addr),
                "name" => text(&i.name),
                _ => None,
            }
        }
        ["server", field] => {
            let s = result.server.as_ref()?;
            match *field {
                "id" => int(s.id),
                "host" => text(&s.host),
                "hostFunctional" => text(&s.host_functional),
                "port" => int(s.port),
                "name" => text(&s.name),
                "location" => text(&s.location),
                "country" => text(&s.country),
                "ip" => text(&s.ip),
                "sponsor" => text(&s.sponsor),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Coerces a resolved value to the column's declared type. Values that cannot
/// be represented become null rather than a made-up zero.
pub fn shape(value: Value, ty: ColumnType) -> Value {
    match (ty, value) {
        (_, Value::Null) => Value::Null,

        (ColumnType::Text, Value::Text(s)) => Value::Text(s),
        (ColumnType::Text, Value::Integer(v)) => Value::Text(v.to_string()),
        (ColumnType::Text, Value::Real(v)) => Value::Text(v.to_string()),
        (ColumnType::Text, Value::Boolean(v)) => Value::Text(v.to_string()),

        (ColumnType::Integer, Value::Integer(v)) => Value::Integer(v),
        (ColumnType::Integer, Value::Real(v)) if v.is_finite() => Value::Integer(v as i64),
        (ColumnType::Integer, Value::Boolean(v)) => Value::Integer(i64::from(v)),
        (ColumnType::Integer, Value::Text(s)) => {
            s.trim().parse().map(Value::Integer).unwrap_or(Value::Null)
        }

        (ColumnType::Real, Value::Real(v)) => Value::Real(v),
        (ColumnType::Real, Value::Integer(v)) => Value::Real(v as f64),
        (ColumnType::Real, Value::Boolean(v)) => Value::Real(if v { 1.0 } else { 0.0 }),
        (ColumnType::Real, Value::Text(s)) => s.trim().parse().map(Value::Real).unwrap_or(Value::Null),

        (ColumnType::Boolean, Value::Boolean(v)) => Value::Boolean(v),
        (ColumnType::Boolean, Value::Integer(v)) => Value::Boolean(v != 0),
        (ColumnType::Boolean, Value::Real(v)) => Value::Boolean(v != 0.0),
        (ColumnType::Boolean, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Boolean(true),
            "false" | "0" | "no" => Value::Boolean(false),
            _ => Value::Null,
        },

        (ColumnType::Integer, Value::Real(_)) => Value::Null,
    }
}

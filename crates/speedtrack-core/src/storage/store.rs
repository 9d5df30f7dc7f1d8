use crate::errors::StoreError;
use crate::model::{format_timestamp, Averages, Column, ColumnType, Record, Value};
use crate::normalize::SCHEMA;
use crate::storage::schema;
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// SQLite-backed measurement history.
///
/// Writes are single-row inserts; readers and the writer share one
/// connection behind a mutex, so a read issued after a write returns sees it.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        tracing::debug!(event = "store_open", path = %path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the table and timestamp index when missing. Safe on every start.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        let ddl = schema::ddl();
        tracing::debug!(event = "store_init_schema", sql = %ddl);
        conn.execute_batch(&ddl)?;
        Ok(())
    }

    pub fn insert_record(&self, record: &Record) -> Result<(), StoreError> {
        let result_id = record
            .result_id()
            .ok_or(StoreError::MissingResultId)?
            .to_string();

        let values: Vec<&Value> = SCHEMA
            .iter()
            .map(|spec| record.get(spec.column).unwrap_or(&Value::Null))
            .collect();

        let conn = self.lock();
        match conn.execute(&schema::insert_sql(), params_from_iter(values)) {
            Ok(_) => {
                tracing::debug!(event = "store_insert", result_id = %result_id);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateKey { result_id })
            }
            Err(e) => Err(StoreError::Unavailable(e)),
        }
    }

    /// Records with `begin <= timestamp <= end`, oldest first.
    ///
    /// `columns` narrows the projection; `None` or an empty slice selects
    /// every column.
    pub fn records_in_range(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        columns: Option<&[Column]>,
    ) -> Result<Vec<Record>, StoreError> {
        let selected: Vec<Column> = match columns {
            Some(cols) if !cols.is_empty() => cols.to_vec(),
            _ => SCHEMA.iter().map(|s| s.column).collect(),
        };

        let sql = format!(
            "SELECT {} FROM {} WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY timestamp ASC",
            schema::projection(&selected),
            schema::TABLE
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![format_timestamp(begin), format_timestamp(end)],
            |row| read_record(row, &selected),
        )?;

        let mut records = Vec::new();
        for r in rows {
            records.push(r?);
        }
        Ok(records)
    }

    /// Means over the whole history. SQL `AVG` skips null cells and yields
    /// null on an empty table.
    pub fn averages(&self) -> Result<Averages, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT AVG(download_bandwidth), AVG(upload_bandwidth), AVG(ping_latency) FROM {}",
            schema::TABLE
        );
        let averages = conn.query_row(&sql, [], |r| {
            Ok(Averages {
                download: r.get(0)?,
                upload: r.get(1)?,
                ping: r.get(2)?,
            })
        })?;
        Ok(averages)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", schema::TABLE),
            [],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Boolean(v) => ToSqlOutput::from(*v),
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Real(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::from(v.as_str()),
        })
    }
}

fn read_record(row: &Row<'_>, columns: &[Column]) -> rusqlite::Result<Record> {
    let mut record = Record::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        record.set(*column, read_cell(row, idx, *column)?);
    }
    Ok(record)
}

fn read_cell(row: &Row<'_>, idx: usize, column: Column) -> rusqlite::Result<Value> {
    let ty = column.ty();
    let value = match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => match ty {
            ColumnType::Boolean => Value::Boolean(v != 0),
            ColumnType::Real => Value::Real(v as f64),
            ColumnType::Text => Value::Text(v.to_string()),
            ColumnType::Integer => Value::Integer(v),
        },
        ValueRef::Real(v) => match ty {
            ColumnType::Integer => Value::Integer(v as i64),
            ColumnType::Boolean => Value::Boolean(v != 0.0),
            ColumnType::Text => Value::Text(v.to_string()),
            ColumnType::Real => Value::Real(v),
        },
        ValueRef::Text(bytes) => {
            Value::Text(std::str::from_utf8(bytes).map_err(rusqlite::Error::Utf8Error)?.to_string())
        }
        ValueRef::Blob(_) => {
            return Err(rusqlite::Error::InvalidColumnType(
                idx,
                column.as_str().to_string(),
                Type::Blob,
            ))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, ts: DateTime<Utc>, down: Option<i64>, ping: Option<f64>) -> Record {
        let mut r = Record::new();
        for spec in SCHEMA {
            r.set(spec.column, Value::Null);
        }
        r.set(Column::ResultId, Value::Text(id.into()));
        r.set(Column::Timestamp, Value::Text(format_timestamp(ts)));
        if let Some(d) = down {
            r.set(Column::DownloadBandwidth, Value::Integer(d));
        }
        if let Some(p) = ping {
            r.set(Column::PingLatency, Value::Real(p));
        }
        r
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn test_init_schema_is_idempotent() -> anyhow::Result<()> {
        let s = Store::memory()?;
        s.init_schema()?;
        s.init_schema()?;
        assert_eq!(s.count()?, 0);
        Ok(())
    }

    #[test]
    fn test_write_then_query_window_returns_record() -> anyhow::Result<()> {
        let s = store();
        let ts = at(10, 0);
        let r = record("a", ts, Some(100), Some(1.5));
        s.insert_record(&r)?;

        let got = s.records_in_range(
            ts - chrono::Duration::seconds(1),
            ts + chrono::Duration::seconds(1),
            None,
        )?;
        assert_eq!(got, vec![r]);
        Ok(())
    }

    #[test]
    fn test_duplicate_result_id_is_rejected() -> anyhow::Result<()> {
        let s = store();
        s.insert_record(&record("dup", at(1, 0), Some(1), None))?;
        let err = s
            .insert_record(&record("dup", at(2, 0), Some(2), None))
            .unwrap_err();
        assert!(err.is_duplicate(), "{err}");
        assert_eq!(s.count()?, 1);

        let kept = s.records_in_range(at(0, 0), at(3, 0), Some(&[Column::DownloadBandwidth]))?;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].download_bandwidth(), Some(1));
        Ok(())
    }

    #[test]
    fn test_missing_result_id_is_rejected() {
        let s = store();
        let mut r = record("x", at(1, 0), None, None);
        r.set(Column::ResultId, Value::Null);
        assert!(matches!(
            s.insert_record(&r),
            Err(StoreError::MissingResultId)
        ));
    }

    #[test]
    fn test_range_is_ordered_and_inclusive() -> anyhow::Result<()> {
        let s = store();
        s.insert_record(&record("c", at(12, 0), None, None))?;
        s.insert_record(&record("a", at(10, 0), None, None))?;
        s.insert_record(&record("b", at(11, 0), None, None))?;
        s.insert_record(&record("z", at(13, 0), None, None))?;

        let got = s.records_in_range(at(10, 0), at(12, 0), Some(&[Column::ResultId]))?;
        let ids: Vec<_> = got.iter().filter_map(|r| r.result_id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(got.iter().all(|r| r.len() == 1));
        Ok(())
    }

    #[test]
    fn test_empty_range_is_ok() -> anyhow::Result<()> {
        let s = store();
        assert!(s.records_in_range(at(0, 0), at(23, 0), None)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_averages_skip_nulls_and_empty_table() -> anyhow::Result<()> {
        let s = store();
        assert_eq!(s.averages()?, Averages::default());

        s.insert_record(&record("a", at(1, 0), Some(100), Some(10.0)))?;
        s.insert_record(&record("b", at(2, 0), Some(300), None))?;
        s.insert_record(&record("c", at(3, 0), None, Some(20.0)))?;

        let avg = s.averages()?;
        assert_eq!(avg.download, Some(200.0));
        assert_eq!(avg.ping, Some(15.0));
        assert_eq!(avg.upload, None);
        Ok(())
    }

    #[test]
    fn test_values_keep_declared_types() -> anyhow::Result<()> {
        let s = store();
        let mut r = record("typed", at(5, 0), Some(42), Some(3.0));
        r.set(Column::InterfaceIsVpn, Value::Boolean(true));
        r.set(Column::ServerPort, Value::Integer(8080));
        r.set(Column::Isp, Value::Text("O'Reilly \"Net\"; DROP TABLE speedtests".into()));
        s.insert_record(&r)?;

        let got = s.records_in_range(at(0, 0), at(23, 0), None)?;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].get(Column::InterfaceIsVpn), Some(&Value::Boolean(true)));
        assert_eq!(got[0].get(Column::ServerPort), Some(&Value::Integer(8080)));
        assert_eq!(got[0].get(Column::PingLatency), Some(&Value::Real(3.0)));
        assert_eq!(got[0].get(Column::Isp), r.get(Column::Isp));
        assert_eq!(got[0].get(Column::PacketLoss), Some(&Value::Null));
        Ok(())
    }
}

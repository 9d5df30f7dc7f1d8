use crate::model::Column;
use crate::normalize::SCHEMA;

pub const TABLE: &str = "speedtests";

/// DDL for the measurement table and its timestamp index, generated from the
/// column mapping. Only static column identifiers end up in the text.
pub fn ddl() -> String {
    let columns = SCHEMA
        .iter()
        .map(|spec| {
            let not_null = if spec.column == Column::ResultId {
                " NOT NULL"
            } else {
                ""
            };
            format!("  {} {}{}", spec.column.as_str(), spec.ty.sql_type(), not_null)
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "CREATE TABLE IF NOT EXISTS {TABLE} (\n{columns},\n  CONSTRAINT result_id_pk PRIMARY KEY (result_id)\n);\n\
         CREATE INDEX IF NOT EXISTS timestamp_index ON {TABLE} (timestamp);\n"
    )
}

pub fn insert_sql() -> String {
    let names = SCHEMA
        .iter()
        .map(|s| s.column.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let params = (1..=SCHEMA.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {TABLE} ({names}) VALUES ({params})")
}

pub fn projection(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

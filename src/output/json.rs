//! JSON output: one array (`--json`) or one object per line
//! (`--jsonl`).

use crate::walk::Row;
use serde_json::{Map, Value as Json};
use std::io::{self, Write};

fn record_object(keys: &[String], row: &Row) -> Json {
    let mut object = Map::with_capacity(keys.len());
    for (key, value) in keys.iter().zip(&row.values) {
        object.insert(key.clone(), value.to_json());
    }
    Json::Object(object)
}

/// `--json`: a single array of objects. Missing attributes encode as
/// null (`--all` semantics are implied).
pub fn write_json_array(out: &mut impl Write, keys: &[String], rows: &[Row]) -> io::Result<()> {
    let records: Vec<Json> = rows.iter().map(|row| record_object(keys, row)).collect();
    serde_json::to_writer(&mut *out, &records)?;
    out.write_all(b"\n")
}

/// `--jsonl`/`--ndjson`: one object per line.
pub fn write_json_lines(out: &mut impl Write, keys: &[String], rows: &[Row]) -> io::Result<()> {
    for row in rows {
        serde_json::to_writer(&mut *out, &record_object(keys, row))?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

//! Write-only listings of the store. Neither format is ever read back.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::DateTime;
use tracing::info;

use crate::error::Result;
use crate::model::{PatientRecord, Timestamp};
use crate::RecordStore;

pub fn format_timestamp(ts: Timestamp) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => ts.to_string(),
    }
}

/// Labeled block for one record, no trailing blank line.
pub fn write_record<W: Write>(out: &mut W, record: &PatientRecord) -> io::Result<()> {
    writeln!(out, "ID: {}", record.id)?;
    writeln!(out, "Name: {}", record.name)?;
    writeln!(out, "Age: {}", record.age)?;
    writeln!(out, "Gender: {}", record.gender)?;
    writeln!(out, "Status: {}", if record.is_discharged { "Discharged" } else { "Active" })?;
    writeln!(out, "Admitted: {}", format_timestamp(record.admission_timestamp))?;
    match record.discharge_timestamp {
        Some(ts) => writeln!(out, "Discharged: {}", format_timestamp(ts))?,
        None => writeln!(out, "Discharged: -")?,
    }
    let history = if record.medical_history.is_empty() { "(none)" } else { record.medical_history.as_str() };
    writeln!(out, "Medical History: {}", history)
}

pub fn write_text<W: Write>(store: &RecordStore, out: &mut W, include_discharged: bool) -> io::Result<usize> {
    writeln!(out, "=== Patient Records ({}/{}) ===", store.len(), store.max_capacity())?;
    let mut written = 0;
    for record in store.list(include_discharged) {
        writeln!(out)?;
        write_record(out, record)?;
        written += 1;
    }
    Ok(written)
}

pub fn export_text(store: &RecordStore, path: &Path) -> Result<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    let written = write_text(store, &mut out, true)?;
    out.flush()?;
    info!(records = written, path = %path.display(), "text report written");
    Ok(written)
}

pub fn write_json<W: Write>(store: &RecordStore, out: W) -> io::Result<()> {
    let records: Vec<&PatientRecord> = store.list(true).collect();
    serde_json::to_writer_pretty(out, &records).map_err(io::Error::from)
}

pub fn export_json(store: &RecordStore, path: &Path) -> Result<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    write_json(store, &mut out)?;
    out.flush()?;
    info!(records = store.len(), path = %path.display(), "json export written");
    Ok(store.len())
}

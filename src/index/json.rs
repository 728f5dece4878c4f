// src/index/json.rs

//! JSON index files
//!
//! A JSON index is an array of [`RawVersionRecord`]s. It is the format of
//! the installed-package snapshot and is handy for local repositories.

use super::RawVersionRecord;
use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub(super) fn parse_records(path: &Path) -> Result<Vec<RawVersionRecord>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write records as a JSON index
pub fn write_records(path: &Path, records: &[RawVersionRecord]) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, records)?;
    Ok(())
}

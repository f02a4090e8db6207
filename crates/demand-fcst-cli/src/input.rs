//! CSV input: raw table extraction into a [`RawBatch`].
//!
//! No interpretation happens here. Header strings and row order are kept as
//! they appear in the file; cells are only trimmed.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use demand_fcst_core::RawBatch;
use tracing::debug;

/// How to read an input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter byte
    pub delimiter: u8,
    /// Lines dropped before the header row (e.g. the SQL line of ERP exports)
    pub skip_lines: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            skip_lines: 0,
        }
    }
}

/// Read a batch from a file on disk.
pub fn read_batch_from_path(path: &Path, options: &CsvOptions) -> Result<RawBatch> {
    let file = File::open(path).with_context(|| format!("opening input {}", path.display()))?;
    read_batch(file, options).with_context(|| format!("reading input {}", path.display()))
}

/// Read a batch from any reader. The first line after `skip_lines` is the
/// header row; shorter or longer records are accepted as they are.
pub fn read_batch<R: Read>(reader: R, options: &CsvOptions) -> Result<RawBatch> {
    let mut reader = BufReader::new(reader);
    let mut discarded = String::new();
    for line_no in 1..=options.skip_lines {
        discarded.clear();
        let read = reader
            .read_line(&mut discarded)
            .with_context(|| format!("skipping line {}", line_no))?;
        if read == 0 {
            bail!(
                "input ended after {} line(s) while skipping {}",
                line_no - 1,
                options.skip_lines
            );
        }
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("reading header row")?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        bail!("input has no header row");
    }

    let mut records = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("reading record {}", idx + 1))?;
        records.push(record.iter().map(str::to_string).collect());
    }

    debug!(columns = headers.len(), records = records.len(), "input read");
    Ok(RawBatch::new(headers, records))
}

//! Read table construction from `ccs` output.
//!
//! Supported inputs:
//! - `.sam`, `.bam`: `ccs` records; passes from the `np` tag and accuracy from
//!   the `rq` tag
//! - `.fastq`, `.fq` and their `.gz` forms: accuracy falls back to the mean
//!   base quality and passes are unknown

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::RecordBuf;
use noodles::{bam, fastq, sam};
use tracing::{debug, warn};

use super::ParseError;
use crate::core::quality::SANGER_OFFSET;
use crate::core::read::{reads_to_table, Read};
use crate::core::table::Table;

const PASSES_TAG: Tag = Tag::new(b'n', b'p');
const ACCURACY_TAG: Tag = Tag::new(b'r', b'q');

/// Input file kinds holding CCS reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFormat {
    Sam,
    Bam,
    Fastq { gzipped: bool },
}

impl ReadFormat {
    /// Detect the format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::UnsupportedFormat` for unknown extensions.
    #[allow(clippy::case_sensitive_file_extension_comparisons)] // Already lowercased
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let name = path.to_string_lossy().to_lowercase();
        let (stem, gzipped) = match name.strip_suffix(".gz") {
            Some(stem) => (stem, true),
            None => (name.as_str(), false),
        };

        if stem.ends_with(".fastq") || stem.ends_with(".fq") {
            return Ok(Self::Fastq { gzipped });
        }
        match (stem.rsplit_once('.').map(|(_, ext)| ext), gzipped) {
            (Some("sam"), false) => Ok(Self::Sam),
            (Some("bam"), false) => Ok(Self::Bam),
            _ => Err(ParseError::UnsupportedFormat(name.clone())),
        }
    }
}

/// Sample name derived from a read file: the file name up to its first `.`
#[must_use]
pub fn sample_from_path(path: &Path) -> String {
    path.file_name()
        .and_then(OsStr::to_str)
        .and_then(|name| name.split('.').next())
        .unwrap_or_default()
        .to_string()
}

/// Read every CCS in `path`.
///
/// `sample` defaults to [`sample_from_path`].
///
/// # Errors
///
/// Returns `ParseError::UnsupportedFormat` for unknown file types,
/// `ParseError::Io` if the file cannot be read, or `ParseError::Noodles` if a
/// record is malformed.
pub fn read_ccs_file(path: &Path, sample: Option<&str>) -> Result<Vec<Read>, ParseError> {
    let sample = sample.map_or_else(|| sample_from_path(path), str::to_string);
    let format = ReadFormat::from_path(path)?;
    debug!(path = %path.display(), ?format, sample = %sample, "Reading CCS file");

    let file = File::open(path)?;
    let reads = match format {
        ReadFormat::Sam => read_sam(BufReader::new(file), &sample)?,
        ReadFormat::Bam => {
            let mut reader = bam::io::Reader::new(file);
            let header = reader
                .read_header()
                .map_err(|e| ParseError::Noodles(e.to_string()))?;
            collect_records(reader.record_bufs(&header), &sample)?
        }
        ReadFormat::Fastq { gzipped: true } => {
            read_fastq(BufReader::new(GzDecoder::new(file)), &sample)?
        }
        ReadFormat::Fastq { gzipped: false } => read_fastq(BufReader::new(file), &sample)?,
    };

    debug!(path = %path.display(), reads = reads.len(), "Read CCS file");
    Ok(reads)
}

/// Read a CCS file into a read table.
///
/// # Errors
///
/// Returns the errors of [`read_ccs_file`], plus `ParseError::Table` for
/// duplicate read names or reads whose sequence and qualities differ in
/// length.
pub fn load_read_table(path: &Path, sample: Option<&str>) -> Result<Table, ParseError> {
    Ok(reads_to_table(read_ccs_file(path, sample)?)?)
}

/// Read CCS records from SAM text.
///
/// # Errors
///
/// Returns `ParseError::Noodles` if the header or a record is malformed.
pub fn read_sam<R: BufRead>(reader: R, sample: &str) -> Result<Vec<Read>, ParseError> {
    let mut reader = sam::io::Reader::new(reader);
    let header = reader
        .read_header()
        .map_err(|e| ParseError::Noodles(e.to_string()))?;
    collect_records(reader.record_bufs(&header), sample)
}

fn collect_records<I>(records: I, sample: &str) -> Result<Vec<Read>, ParseError>
where
    I: Iterator<Item = std::io::Result<RecordBuf>>,
{
    let mut reads = Vec::new();
    for result in records {
        let record = result
            .map_err(|e| ParseError::Noodles(format!("Failed to parse record: {e}")))?;
        reads.push(record_to_read(&record, sample)?);
    }
    Ok(reads)
}

fn record_to_read(record: &RecordBuf, sample: &str) -> Result<Read, ParseError> {
    let id = record
        .name()
        .map(|name| String::from_utf8_lossy(name).to_string())
        .ok_or_else(|| ParseError::InvalidFormat("record without a name".to_string()))?;

    let data = record.data();
    let passes = data.get(&PASSES_TAG).and_then(integer_value);
    let accuracy = data.get(&ACCURACY_TAG).and_then(float_value);
    if passes.is_none() || accuracy.is_none() {
        warn!(read = %id, "Record lacks an np or rq tag");
    }

    Ok(Read {
        id,
        sample: sample.to_string(),
        sequence: String::from_utf8_lossy(record.sequence().as_ref()).to_string(),
        qualities: record.quality_scores().as_ref().to_vec(),
        passes,
        accuracy,
    })
}

fn integer_value(value: &Value) -> Option<i64> {
    match *value {
        Value::Int8(n) => Some(i64::from(n)),
        Value::UInt8(n) => Some(i64::from(n)),
        Value::Int16(n) => Some(i64::from(n)),
        Value::UInt16(n) => Some(i64::from(n)),
        Value::Int32(n) => Some(i64::from(n)),
        Value::UInt32(n) => Some(i64::from(n)),
        _ => None,
    }
}

fn float_value(value: &Value) -> Option<f64> {
    match *value {
        Value::Float(x) => Some(f64::from(x)),
        _ => integer_value(value).map(|n| n as f64),
    }
}

/// Read CCS records from FASTQ text.
///
/// # Errors
///
/// Returns `ParseError::Noodles` if a record is malformed.
pub fn read_fastq<R: BufRead>(reader: R, sample: &str) -> Result<Vec<Read>, ParseError> {
    let mut reader = fastq::io::Reader::new(reader);
    let mut reads = Vec::new();

    for result in reader.records() {
        let record = result
            .map_err(|e| ParseError::Noodles(format!("Failed to parse FASTQ record: {e}")))?;

        let qualities = record
            .quality_scores()
            .iter()
            .map(|q| q.saturating_sub(SANGER_OFFSET))
            .collect();

        reads.push(Read {
            id: String::from_utf8_lossy(record.name()).to_string(),
            sample: sample.to_string(),
            sequence: String::from_utf8_lossy(record.sequence()).to_string(),
            qualities,
            passes: None,
            accuracy: None,
        });
    }

    Ok(reads)
}

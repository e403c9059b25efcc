//! Parsers for the files the pipeline consumes.
//!
//! | Module | Input | Output |
//! |--------|-------|--------|
//! | [`reads`] | `ccs` SAM/BAM, FASTQ (optionally gzipped) | read table |
//! | [`report`] | `ccs` run report text | per-status counts, multi-sample summary |
//! | [`isoforms`] | one isoform group per line | [`TargetIsoforms`](crate::align::TargetIsoforms) |
//!
//! ## Example
//!
//! ```rust,no_run
//! use ccs_match::parsing::reads::load_read_table;
//! use std::path::Path;
//!
//! let table = load_read_table(Path::new("lib1.ccs.bam"), None).unwrap();
//! println!("{} reads", table.n_rows());
//! ```

pub mod isoforms;
pub mod reads;
pub mod report;

use thiserror::Error;

use crate::core::table::TableError;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("noodles error: {0}")]
    Noodles(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

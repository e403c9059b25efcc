//! Read annotation stages.
//!
//! Each stage takes a [`Table`](crate::core::table::Table) and returns a new
//! table with columns appended; the input table is never modified and row
//! order is preserved.
//!
//! - [`match_seqs`]: match a pattern against each read in both orientations
//! - [`align_seqs`]: align a sequence column with an external aligner
//! - [`pipeline`]: the fixed match-then-align composition for CCS reads
//!
//! Rows that fail to match or align are not errors; they get sentinel
//! values (`false`, `0`, `""`, `-1`, empty lists) in the new columns.

pub mod align_seqs;
pub mod match_seqs;
pub mod pipeline;

pub use align_seqs::{align_seqs, AlignHooks, AlignOptions};
pub use match_seqs::{match_pattern, match_seqs, MatchOptions};
pub use pipeline::{Pipeline, PipelineConfig};

use thiserror::Error;

use crate::align::AlignError;
use crate::core::table::TableError;
use crate::pattern::PatternError;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Alignment error: {0}")]
    Align(#[from] AlignError),
}

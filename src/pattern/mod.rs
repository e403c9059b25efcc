//! Read-layout patterns.
//!
//! A pattern describes the expected layout of a read as a sequence of named
//! segments (termini, gene, UMI, barcode, ...). This module provides:
//!
//! - [`iupac`]: rewriting of ambiguous nucleotide codes into byte classes
//! - [`parser`]: the pattern dialect, including bounded-error constraints
//! - [`matcher`]: compiled patterns and the leftmost backtracking search
//!
//! ```
//! use ccs_match::pattern::Pattern;
//!
//! let pattern = Pattern::compile_iupac("ACG(?P<barcode>N{3})(?P<read>N+)CTT").unwrap();
//! let m = pattern.search(b"TACGTTCACGCTTA").unwrap();
//! assert_eq!(m.group(0), Some(4..7));
//! ```

pub mod iupac;
pub mod matcher;
pub mod parser;

pub use iupac::expand_iupac;
pub use matcher::{Pattern, PatternMatch, Segment};
pub use parser::FuzzyLimits;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Invalid pattern at offset {offset}: {reason}")]
    Syntax { offset: usize, reason: String },

    #[error("Duplicate group name: {0}")]
    DuplicateGroup(String),

    #[error("Invalid group name: {0}")]
    InvalidGroupName(String),

    #[error("Unsupported error constraint: {0}")]
    InvalidFuzzy(String),
}

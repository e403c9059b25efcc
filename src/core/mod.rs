//! Core data types for CCS read annotation.
//!
//! This module provides the fundamental types used throughout the library:
//!
//! - [`Read`](read::Read): one consensus read with its base qualities
//! - [`Table`](table::Table): the immutable column table every annotator reads and returns
//! - [`Polarity`](types::Polarity), [`Strand`](types::Strand): match and alignment orientation
//! - [`sequence`]: nucleotide lookup tables and reverse complementation
//! - [`quality`]: the Phred accuracy model
//!
//! ## Column conventions
//!
//! A sequence column `X` may carry its per-base qualities in `X_qvals`. The
//! read table produced from CCS files has:
//!
//! | Column | Contents |
//! |--------|----------|
//! | name | unique read id |
//! | samplename | sample label |
//! | CCS | read sequence |
//! | CCS_qvals | numeric Phred scores |
//! | passes | subread passes, `-1` if unknown |
//! | CCS_accuracy | read-level accuracy |
//! | CCS_length | read length |

pub mod quality;
pub mod read;
pub mod sequence;
pub mod table;
pub mod types;

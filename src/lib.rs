//! # ccs-match
//!
//! A library for matching and annotating PacBio circular consensus sequences (CCS).
//!
//! Amplicon libraries are often sequenced as long reads that carry a known layout:
//! fixed termini, a variable gene, a spacer, a UMI and a barcode. Because a CCS can
//! come off either strand, every read has to be checked in both orientations before
//! its regions can be extracted and compared against the expected targets.
//!
//! `ccs-match` does this on whole read tables at once.
//!
//! ## Features
//!
//! - **IUPAC patterns**: Ambiguous nucleotide codes expand to byte classes
//! - **Error-tolerant matching**: `{e<=k}`-style budgets on any sub-pattern
//! - **Both orientations**: Reads are tried as given, then reverse complemented
//! - **Quality-aware extraction**: Each named region keeps its qualities and accuracy
//! - **Alignment fusion**: Best minimap2 alignment, trimming and multi-mapping counts
//! - **Mutation calls**: Substitutions, insertions and deletions from `cs` strings
//!
//! ## Example
//!
//! ```rust,no_run
//! use ccs_match::annotate::{match_seqs, MatchOptions};
//! use ccs_match::parsing::reads::load_read_table;
//! use std::path::Path;
//!
//! let reads = load_read_table(Path::new("lib1.ccs.bam"), None).unwrap();
//! let table = match_seqs(
//!     &reads,
//!     "ACG(?P<barcode>N{3})(?P<gene>N+)CTT",
//!     "CCS",
//!     "barcoded",
//!     &MatchOptions::default(),
//! )
//! .unwrap();
//!
//! let barcodes = table.text("barcode").unwrap();
//! for (matched, barcode) in table.bools("barcoded").unwrap().iter().zip(barcodes) {
//!     if *matched {
//!         println!("{barcode}");
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Reads, the column table, orientation types and the accuracy model
//! - [`pattern`]: Pattern dialect, IUPAC expansion and the fuzzy matcher
//! - [`align`]: Alignment records, PAF parsing, minimap2 and mutation calling
//! - [`annotate`]: The match and align annotators and the CCS pipeline
//! - [`parsing`]: Parsers for CCS files, run reports and isoform groups
//! - [`cli`]: Command-line interface implementation

pub mod align;
pub mod annotate;
pub mod cli;
pub mod core;
pub mod parsing;
pub mod pattern;
pub mod utils;

// Re-export commonly used types for convenience
pub use align::{Alignment, Mapper, TargetIsoforms};
pub use annotate::{align_seqs, match_seqs, AlignOptions, MatchOptions, Pipeline, PipelineConfig};
pub use core::read::Read;
pub use core::table::Table;
pub use core::types::*;
pub use pattern::{expand_iupac, Pattern};

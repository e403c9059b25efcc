//! Alignment records and the external aligner contract.
//!
//! The annotators never run an aligner directly. They talk to a [`Mapper`],
//! which takes one batch of `(id, sequence)` queries and returns the best
//! alignment per aligned id. [`minimap2::Minimap2`] is the production
//! implementation; tests substitute an in-memory one.
//!
//! Two optional hooks refine an alignment after mapping:
//!
//! - [`TargetVariantCaller`] labels which variant of the target a query
//!   carries and may return an adjusted alignment
//! - [`MutationCaller`] lists the substitutions, insertions and deletions
//!   in an alignment (see [`mutations::CsMutationCaller`])

pub mod minimap2;
pub mod mutations;
pub mod paf;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::Strand;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to run aligner {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("Aligner exited with {status}: {stderr}")]
    AlignerFailed { status: String, stderr: String },

    #[error("Invalid PAF at line {line}: {reason}")]
    InvalidPaf { line: usize, reason: String },

    #[error("Alignment of {query} is on the reverse strand; only forward alignments are handled")]
    ReverseStrand { query: String },

    #[error("Invalid cs string '{cs}': {reason}")]
    InvalidCs { cs: String, reason: String },

    #[error("Hook failed: {0}")]
    Hook(String),
}

/// One alignment of a query to a target.
///
/// Coordinates are 0-based, half open, as in PAF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub target: String,
    pub r_st: usize,
    pub r_en: usize,
    pub r_len: usize,
    pub q_st: usize,
    pub q_en: usize,
    pub q_len: usize,
    pub strand: Strand,
    /// Long-form `cs` difference string
    pub cigar_str: String,
    /// Aligner score (`AS` tag, or matching bases when absent)
    pub score: i64,
    /// Whether the aligner flagged this as a primary alignment
    pub primary: bool,
    /// Remaining alignments of the same query, best first
    pub additional: Vec<Alignment>,
}

impl Alignment {
    /// Query bases before the aligned region
    #[must_use]
    pub fn n_trimmed_query_start(&self) -> usize {
        self.q_st
    }

    /// Query bases after the aligned region
    #[must_use]
    pub fn n_trimmed_query_end(&self) -> usize {
        self.q_len.saturating_sub(self.q_en)
    }

    /// Target bases before the aligned region
    #[must_use]
    pub fn n_trimmed_target_start(&self) -> usize {
        self.r_st
    }

    /// Target bases after the aligned region
    #[must_use]
    pub fn n_trimmed_target_end(&self) -> usize {
        self.r_len.saturating_sub(self.r_en)
    }

    /// Additional alignments to targets outside this alignment's isoform group
    #[must_use]
    pub fn n_additional_difftarget(&self, isoforms: &TargetIsoforms) -> usize {
        self.additional
            .iter()
            .filter(|a| !isoforms.equivalent(&self.target, &a.target))
            .count()
    }

    /// Short text form: `target:start-end(strand)`
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}:{}-{}({})", self.target, self.r_st, self.r_en, self.strand)
    }
}

/// Groups of targets treated as one for multiplicity counting.
///
/// Every target is implicitly equivalent to itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetIsoforms {
    groups: HashMap<String, HashSet<String>>,
}

impl TargetIsoforms {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a group of mutually equivalent targets
    pub fn add_group<I, S>(&mut self, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group: HashSet<String> = targets.into_iter().map(Into::into).collect();
        for target in &group {
            self.groups
                .entry(target.clone())
                .or_default()
                .extend(group.iter().cloned());
        }
    }

    /// Whether `other` is `target` or one of its declared isoforms
    #[must_use]
    pub fn equivalent(&self, target: &str, other: &str) -> bool {
        target == other
            || self
                .groups
                .get(target)
                .is_some_and(|group| group.contains(other))
    }

    /// Number of targets that belong to a declared group
    #[must_use]
    pub fn n_grouped_targets(&self) -> usize {
        self.groups.len()
    }
}

/// Batched request/response contract for an external aligner.
pub trait Mapper: Send + Sync {
    /// Align every query in one round trip.
    ///
    /// Returns the best alignment for each query id that aligned; ids that
    /// did not align are absent. If `audit` is given the raw aligner output
    /// is kept there.
    ///
    /// # Errors
    ///
    /// Any failure of the aligner is fatal for the whole batch.
    fn map(
        &self,
        queries: &[(String, String)],
        audit: Option<&Path>,
    ) -> Result<HashMap<String, Alignment>, AlignError>;

    /// Isoform groups used for counting additional alignments
    fn target_isoforms(&self) -> &TargetIsoforms;
}

/// Calls which variant of its target an aligned query carries.
pub trait TargetVariantCaller: Send + Sync {
    /// Whether [`TargetVariantCaller::call`] needs per-base qualities
    fn requires_qualities(&self) -> bool {
        false
    }

    /// Returns the variant label and the alignment to use from here on.
    ///
    /// # Errors
    ///
    /// Implementations return `AlignError::Hook` on failure.
    fn call(
        &self,
        alignment: &Alignment,
        qualities: Option<&[u8]>,
    ) -> Result<(String, Alignment), AlignError>;
}

/// Mutations of an alignment relative to its target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mutations {
    pub substitutions: Vec<String>,
    pub insertions: Vec<String>,
    pub deletions: Vec<String>,
}

impl Mutations {
    /// Substitutions, insertions and deletions, in that order
    #[must_use]
    pub fn lists(&self) -> [&Vec<String>; 3] {
        [&self.substitutions, &self.insertions, &self.deletions]
    }
}

/// Lists the mutations in an alignment.
pub trait MutationCaller: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the alignment's difference string is malformed.
    fn call(&self, alignment: &Alignment) -> Result<Mutations, AlignError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory mapper for annotator tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Returns pre-registered alignments keyed by query sequence
    #[derive(Default)]
    pub struct StaticMapper {
        pub by_sequence: HashMap<String, Alignment>,
        pub isoforms: TargetIsoforms,
        pub calls: AtomicUsize,
        pub last_batch: Mutex<Vec<(String, String)>>,
    }

    impl StaticMapper {
        pub fn with(mut self, sequence: &str, alignment: Alignment) -> Self {
            self.by_sequence.insert(sequence.to_string(), alignment);
            self
        }
    }

    impl Mapper for StaticMapper {
        fn map(
            &self,
            queries: &[(String, String)],
            _audit: Option<&Path>,
        ) -> Result<HashMap<String, Alignment>, AlignError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = self.last_batch.lock() {
                *last = queries.to_vec();
            }
            Ok(queries
                .iter()
                .filter_map(|(id, seq)| {
                    self.by_sequence
                        .get(seq)
                        .map(|a| (id.clone(), a.clone()))
                })
                .collect())
        }

        fn target_isoforms(&self) -> &TargetIsoforms {
            &self.isoforms
        }
    }

    /// Forward alignment of a query of length `len` covering `target` fully
    pub fn alignment(target: &str, len: usize) -> Alignment {
        Alignment {
            target: target.to_string(),
            r_st: 0,
            r_en: len,
            r_len: len,
            q_st: 0,
            q_en: len,
            q_len: len,
            strand: Strand::Forward,
            cigar_str: format!(":{len}"),
            score: i64::try_from(len).unwrap_or(i64::MAX),
            primary: true,
            additional: Vec::new(),
        }
    }
}

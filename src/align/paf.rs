//! PAF parsing and best-alignment selection.
//!
//! Each PAF line has twelve mandatory tab-separated fields followed by
//! optional `TAG:TYPE:VALUE` fields. The tags used here:
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | tp  | alignment type, `P` for primary |
//! | AS  | alignment score |
//! | cs  | difference string |

use std::collections::HashMap;
use std::io::BufRead;

use tracing::debug;

use super::{AlignError, Alignment};
use crate::core::types::Strand;

const MANDATORY_FIELDS: usize = 12;

/// Parse one PAF line into its query name and alignment.
///
/// # Errors
///
/// Returns `AlignError::InvalidPaf` if a mandatory field is missing or
/// malformed.
pub fn parse_record(line: &str, line_no: usize) -> Result<(String, Alignment), AlignError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MANDATORY_FIELDS {
        return Err(AlignError::InvalidPaf {
            line: line_no,
            reason: format!(
                "expected at least {MANDATORY_FIELDS} fields, found {}",
                fields.len()
            ),
        });
    }

    let number = |idx: usize, what: &str| -> Result<usize, AlignError> {
        fields[idx].parse().map_err(|_| AlignError::InvalidPaf {
            line: line_no,
            reason: format!("invalid {what} '{}'", fields[idx]),
        })
    };

    let strand = Strand::parse(fields[4]).ok_or_else(|| AlignError::InvalidPaf {
        line: line_no,
        reason: format!("invalid strand '{}'", fields[4]),
    })?;
    let n_matches = number(9, "match count")?;

    let mut primary = true;
    let mut score = None;
    let mut cigar_str = String::new();
    for tag in &fields[MANDATORY_FIELDS..] {
        if let Some(value) = tag.strip_prefix("tp:A:") {
            primary = value == "P";
        } else if let Some(value) = tag.strip_prefix("AS:i:") {
            score = value.parse::<i64>().ok();
        } else if let Some(value) = tag.strip_prefix("cs:Z:") {
            cigar_str = value.to_string();
        }
    }

    let alignment = Alignment {
        target: fields[5].to_string(),
        r_st: number(7, "target start")?,
        r_en: number(8, "target end")?,
        r_len: number(6, "target length")?,
        q_st: number(2, "query start")?,
        q_en: number(3, "query end")?,
        q_len: number(1, "query length")?,
        strand,
        cigar_str,
        score: score.unwrap_or_else(|| i64::try_from(n_matches).unwrap_or(i64::MAX)),
        primary,
        additional: Vec::new(),
    };

    Ok((fields[0].to_string(), alignment))
}

/// Parse a whole PAF stream into the best alignment per query.
///
/// # Errors
///
/// Returns an error on I/O failure or on the first malformed line.
pub fn parse_paf<R: BufRead>(reader: R) -> Result<HashMap<String, Alignment>, AlignError> {
    let mut by_query: HashMap<String, Vec<Alignment>> = HashMap::new();
    let mut n_records = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (query, alignment) = parse_record(&line, idx + 1)?;
        by_query.entry(query).or_default().push(alignment);
        n_records += 1;
    }

    debug!(records = n_records, queries = by_query.len(), "Parsed PAF");

    Ok(by_query
        .into_iter()
        .filter_map(|(query, alignments)| select_best(alignments).map(|best| (query, best)))
        .collect())
}

/// Pick the best of a query's alignments and attach the others to it.
///
/// The best is the highest-scoring primary alignment, or the highest-scoring
/// alignment overall if none is primary. The rest follow in decreasing score,
/// ties kept in input order.
#[must_use]
pub fn select_best(mut alignments: Vec<Alignment>) -> Option<Alignment> {
    alignments.sort_by(|a, b| b.primary.cmp(&a.primary).then(b.score.cmp(&a.score)));
    if alignments.is_empty() {
        return None;
    }

    let mut best = alignments.remove(0);
    alignments.sort_by(|a, b| b.score.cmp(&a.score));
    best.additional = alignments;
    Some(best)
}

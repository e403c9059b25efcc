//! Mutation calling from `cs` difference strings.
//!
//! Mutations are named by 1-based target position:
//!
//! - substitution: `A12G` (target base, position, query base)
//! - insertion: `ins12ACG` (inserted before target position 12)
//! - deletion: `del12to14` (target positions 12 through 14 missing)

use super::{AlignError, Alignment, MutationCaller, Mutations};

/// One operation of a `cs` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsOp {
    /// Identical stretch of the given length
    Match(usize),
    Substitution { target: char, query: char },
    Insertion(String),
    Deletion(String),
}

/// Parse a short- or long-form `cs` string.
///
/// # Errors
///
/// Returns `AlignError::InvalidCs` for unknown operators, truncated
/// operations and intron (`~`) operations.
pub fn parse_cs(cs: &str) -> Result<Vec<CsOp>, AlignError> {
    let invalid = |reason: &str| AlignError::InvalidCs {
        cs: cs.to_string(),
        reason: reason.to_string(),
    };

    let bytes = cs.as_bytes();
    let mut ops = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let op = bytes[i];
        i += 1;
        let start = i;

        match op {
            b'=' | b'+' | b'-' => {
                while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                    i += 1;
                }
                if i == start {
                    return Err(invalid("empty operation"));
                }
                let bases = cs[start..i].to_ascii_uppercase();
                ops.push(match op {
                    b'=' => CsOp::Match(bases.len()),
                    b'+' => CsOp::Insertion(bases),
                    _ => CsOp::Deletion(bases),
                });
            }
            b':' => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let n = cs[start..i]
                    .parse()
                    .map_err(|_| invalid("invalid match length"))?;
                ops.push(CsOp::Match(n));
            }
            b'*' => {
                let pair = bytes
                    .get(start..start + 2)
                    .filter(|p| p.iter().all(u8::is_ascii_alphabetic))
                    .ok_or_else(|| invalid("truncated substitution"))?;
                ops.push(CsOp::Substitution {
                    target: char::from(pair[0].to_ascii_uppercase()),
                    query: char::from(pair[1].to_ascii_uppercase()),
                });
                i += 2;
            }
            b'~' => return Err(invalid("introns are not supported")),
            _ => return Err(invalid("unknown operator")),
        }
    }

    Ok(ops)
}

/// Calls mutations from an alignment's `cs` string
#[derive(Debug, Clone, Copy, Default)]
pub struct CsMutationCaller;

impl MutationCaller for CsMutationCaller {
    fn call(&self, alignment: &Alignment) -> Result<Mutations, AlignError> {
        if alignment.cigar_str.is_empty() {
            return Err(AlignError::InvalidCs {
                cs: String::new(),
                reason: format!("alignment to {} has no cs string", alignment.target),
            });
        }

        let mut mutations = Mutations::default();
        // 0-based target position of the next base
        let mut pos = alignment.r_st;

        for op in parse_cs(&alignment.cigar_str)? {
            match op {
                CsOp::Match(n) => pos += n,
                CsOp::Substitution { target, query } => {
                    mutations
                        .substitutions
                        .push(format!("{target}{}{query}", pos + 1));
                    pos += 1;
                }
                CsOp::Insertion(seq) => {
                    mutations.insertions.push(format!("ins{}{seq}", pos + 1));
                }
                CsOp::Deletion(seq) => {
                    mutations
                        .deletions
                        .push(format!("del{}to{}", pos + 1, pos + seq.len()));
                    pos += seq.len();
                }
            }
        }

        if pos != alignment.r_en {
            return Err(AlignError::InvalidCs {
                cs: alignment.cigar_str.clone(),
                reason: format!(
                    "covers target up to {pos} but alignment ends at {}",
                    alignment.r_en
                ),
            });
        }

        Ok(mutations)
    }
}

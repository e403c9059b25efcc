//! Parser for isoform group files.
//!
//! One group per line, target names separated by whitespace or commas.
//! Blank lines and lines starting with `#` are skipped.

use std::collections::HashMap;
use std::path::Path;

use crate::align::TargetIsoforms;

use super::ParseError;

/// Parse an isoform group file.
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or
/// `ParseError::InvalidFormat` if a target appears in more than one group.
pub fn parse_isoforms_file(path: &Path) -> Result<TargetIsoforms, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_isoforms_text(&content)
}

/// Parse isoform groups from text.
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if a target appears in more than one
/// group.
pub fn parse_isoforms_text(text: &str) -> Result<TargetIsoforms, ParseError> {
    let mut isoforms = TargetIsoforms::new();
    let mut group_line: HashMap<String, usize> = HashMap::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_num = i + 1;

        let targets: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();

        for target in &targets {
            if let Some(previous) = group_line.insert((*target).to_string(), line_num) {
                if previous != line_num {
                    return Err(ParseError::InvalidFormat(format!(
                        "Target '{target}' on line {line_num} is already in the group on line {previous}"
                    )));
                }
            }
        }

        isoforms.add_group(targets);
    }

    Ok(isoforms)
}

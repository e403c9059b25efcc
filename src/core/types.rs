use serde::{Deserialize, Serialize};

/// Orientation in which a pattern matched a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Matched the read as given
    Forward,
    /// Matched the reverse complement of the read
    Reverse,
    /// No match in either orientation
    Unmatched,
}

impl Polarity {
    /// Integer encoding used in output columns: `1`, `-1` or `0`
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Forward => 1,
            Self::Reverse => -1,
            Self::Unmatched => 0,
        }
    }

    #[must_use]
    pub fn is_match(self) -> bool {
        !matches!(self, Self::Unmatched)
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Strand of an alignment relative to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    /// Parse the strand column of a PAF record (`+` or `-`)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Self::Forward),
            "-" => Some(Self::Reverse),
            _ => None,
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward => write!(f, "+"),
            Self::Reverse => write!(f, "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity_encoding() {
        assert_eq!(Polarity::Forward.as_i64(), 1);
        assert_eq!(Polarity::Reverse.as_i64(), -1);
        assert_eq!(Polarity::Unmatched.as_i64(), 0);
        assert!(Polarity::Reverse.is_match());
        assert!(!Polarity::Unmatched.is_match());
    }

    #[test]
    fn test_strand_parse() {
        assert_eq!(Strand::parse("+"), Some(Strand::Forward));
        assert_eq!(Strand::parse("-"), Some(Strand::Reverse));
        assert_eq!(Strand::parse("*"), None);
    }
}

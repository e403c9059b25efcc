//! Nucleotide lookup tables and reverse complementation.
//!
//! Both tables are built at compile time and have no mutation path.

/// Complement of every byte; IUPAC codes map to their complementary code and
/// anything else (gaps, unknown symbols) maps to itself.
static COMPLEMENT_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];

    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }

    let pairs: [(u8, u8); 11] = [
        (b'A', b'T'),
        (b'C', b'G'),
        (b'R', b'Y'),
        (b'K', b'M'),
        (b'B', b'V'),
        (b'D', b'H'),
        (b'S', b'S'),
        (b'W', b'W'),
        (b'N', b'N'),
        (b'U', b'A'),
        (b'-', b'-'),
    ];

    let mut j = 0;
    while j < pairs.len() {
        let (a, b) = pairs[j];
        table[a as usize] = b;
        table[a.to_ascii_lowercase() as usize] = b.to_ascii_lowercase();
        // U has no reverse entry, A already complements to T
        if a != b'U' {
            table[b as usize] = a;
            table[b.to_ascii_lowercase() as usize] = a.to_ascii_lowercase();
        }
        j += 1;
    }

    table
};

/// Ambiguous IUPAC nucleotide codes and the bases each one stands for.
///
/// Unambiguous bases (`A`, `C`, `G`, `T`) are deliberately absent; they expand
/// to themselves.
pub const AMBIGUOUS_NUCLEOTIDES: [(char, &str); 11] = [
    ('R', "AG"),
    ('Y', "CT"),
    ('S', "CG"),
    ('W', "AT"),
    ('K', "GT"),
    ('M', "AC"),
    ('B', "CGT"),
    ('D', "AGT"),
    ('H', "ACT"),
    ('V', "ACG"),
    ('N', "ACGT"),
];

/// Bases represented by an ambiguous upper-case IUPAC code, or `None` for
/// anything else.
#[must_use]
pub fn ambiguous_bases(code: char) -> Option<&'static str> {
    AMBIGUOUS_NUCLEOTIDES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, bases)| *bases)
}

#[inline]
#[must_use]
pub fn complement(base: u8) -> u8 {
    COMPLEMENT_TABLE[base as usize]
}

/// Reverse complement of a nucleotide sequence
#[must_use]
pub fn reverse_complement(seq: &str) -> String {
    let bytes: Vec<u8> = seq.bytes().rev().map(complement).collect();
    // The table only maps ASCII to ASCII and leaves other bytes untouched, but
    // reversing a multi-byte character would break UTF-8, so fall back lossily.
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Reversed copy of a per-base quality array
#[must_use]
pub fn reversed_qualities(qualities: &[u8]) -> Vec<u8> {
    qualities.iter().rev().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement("ACGT"), "ACGT");
        assert_eq!(reverse_complement("AACGTTC"), "GAACGTT");
        assert_eq!(reverse_complement(""), "");
        assert_eq!(reverse_complement("acgN"), "Ncgt");
    }

    #[test]
    fn test_reverse_complement_iupac() {
        assert_eq!(reverse_complement("RYKM"), "KMRY");
        assert_eq!(reverse_complement("BDHV"), "BDHV");
        assert_eq!(reverse_complement("SWN"), "NWS");
    }

    #[test]
    fn test_reverse_complement_involution() {
        let seq = "TACGTTCACGCTTA";
        assert_eq!(reverse_complement(&reverse_complement(seq)), seq);
    }

    #[test]
    fn test_ambiguous_bases() {
        assert_eq!(ambiguous_bases('N'), Some("ACGT"));
        assert_eq!(ambiguous_bases('R'), Some("AG"));
        assert_eq!(ambiguous_bases('A'), None);
        assert_eq!(ambiguous_bases('n'), None);
    }

    #[test]
    fn test_reversed_qualities() {
        assert_eq!(reversed_qualities(&[1, 2, 3]), vec![3, 2, 1]);
        assert!(reversed_qualities(&[]).is_empty());
    }
}

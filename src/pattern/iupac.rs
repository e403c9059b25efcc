use crate::core::sequence::ambiguous_bases;

/// Opening of a named capture group; everything up to the closing `>` is the
/// group name and is never rewritten.
const GROUP_NAME_OPEN: &str = "(?P<";

/// Expand ambiguous IUPAC nucleotide codes in a pattern into character classes.
///
/// Every upper-case ambiguous code outside a group-name marker is rewritten,
/// so `N` becomes `[ACGT]` and `R` becomes `[AG]`. Inside an existing
/// character class the bases are spliced in without extra brackets. Group
/// names, escaped characters and the contents of `{...}` quantifiers are left
/// verbatim, so group count, group names and quantifiers are unchanged.
///
/// # Examples
///
/// ```
/// use ccs_match::pattern::iupac::expand_iupac;
///
/// assert_eq!(
///     expand_iupac("^(?P<termini5>ATG)(?P<cDNA>N+)A+(?P<barcode>N{4})$"),
///     "^(?P<termini5>ATG)(?P<cDNA>[ACGT]+)A+(?P<barcode>[ACGT]{4})$",
/// );
/// ```
#[must_use]
pub fn expand_iupac(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    let mut in_class = false;
    let mut in_braces = false;

    while let Some(c) = rest.chars().next() {
        if !in_class && !in_braces && rest.starts_with(GROUP_NAME_OPEN) {
            let marker_len = rest.find('>').map_or(rest.len(), |i| i + 1);
            out.push_str(&rest[..marker_len]);
            rest = &rest[marker_len..];
            continue;
        }

        let c_len = c.len_utf8();
        match c {
            '\\' => {
                // Copy the escape and the escaped character untouched
                let escaped_len = rest[c_len..].chars().next().map_or(0, char::len_utf8);
                out.push_str(&rest[..c_len + escaped_len]);
                rest = &rest[c_len + escaped_len..];
                continue;
            }
            '[' if !in_braces => in_class = true,
            ']' if in_class => in_class = false,
            '{' if !in_class => in_braces = true,
            '}' if in_braces => in_braces = false,
            _ => {}
        }

        match ambiguous_bases(c) {
            Some(bases) if !in_braces => {
                if in_class {
                    out.push_str(bases);
                } else {
                    out.push('[');
                    out.push_str(bases);
                    out.push(']');
                }
            }
            _ => out.push(c),
        }
        rest = &rest[c_len..];
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_iupac_basic() {
        assert_eq!(expand_iupac("ACGT"), "ACGT");
        assert_eq!(expand_iupac("N"), "[ACGT]");
        assert_eq!(expand_iupac("RY"), "[AG][CT]");
    }

    #[test]
    fn test_group_names_untouched() {
        // Group names made entirely of IUPAC letters must survive
        assert_eq!(
            expand_iupac("(?P<N>N+)(?P<BDHV>A{3})"),
            "(?P<N>[ACGT]+)(?P<BDHV>A{3})"
        );
    }

    #[test]
    fn test_nested_and_adjacent_groups() {
        assert_eq!(
            expand_iupac("(?P<SWK>(?P<RY>N)(?P<M>V))"),
            "(?P<SWK>(?P<RY>[ACGT])(?P<M>[ACG]))"
        );
    }

    #[test]
    fn test_fuzzy_and_quantifiers_untouched() {
        assert_eq!(
            expand_iupac("AA(A{5,}){e<=1}AA"),
            "AA(A{5,}){e<=1}AA"
        );
        assert_eq!(expand_iupac("N{2,4}"), "[ACGT]{2,4}");
    }

    #[test]
    fn test_existing_class_is_spliced() {
        assert_eq!(expand_iupac("[NT]"), "[ACGTT]");
        assert_eq!(expand_iupac("[^R]"), "[^AG]");
    }

    #[test]
    fn test_escapes_untouched() {
        assert_eq!(expand_iupac(r"\SN"), r"\S[ACGT]");
    }

    #[test]
    fn test_only_characters_outside_markers_change() {
        let pattern = "ACG(?P<barcode>N{3})(?P<read>N+)CTT";
        let expanded = expand_iupac(pattern);
        assert_eq!(expanded, "ACG(?P<barcode>[ACGT]{3})(?P<read>[ACGT]+)CTT");
        assert_eq!(
            expanded.matches("(?P<").count(),
            pattern.matches("(?P<").count()
        );
    }
}

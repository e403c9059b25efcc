//! Phred quality scores and the accuracy model.
//!
//! The probability that a base with Phred score `Q` is correct is
//! `1 - 10^(-Q/10)`. The accuracy of a run of bases is the mean of that
//! probability over the run. An empty run has no defined accuracy and yields
//! `NaN` rather than zero.

/// Offset subtracted from each character of a Sanger-encoded quality string
pub const SANGER_OFFSET: u8 = 33;

/// Quality scores in one of the shapes callers hold them in
#[derive(Debug, Clone, Copy)]
pub enum Qualities<'a> {
    /// A single quality value
    Scalar(u8),
    /// Numeric per-base quality values
    Values(&'a [u8]),
    /// Sanger encoding: each character's code point minus 33
    Sanger(&'a str),
}

impl From<u8> for Qualities<'_> {
    fn from(q: u8) -> Self {
        Qualities::Scalar(q)
    }
}

impl<'a> From<&'a [u8]> for Qualities<'a> {
    fn from(q: &'a [u8]) -> Self {
        Qualities::Values(q)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Qualities<'a> {
    fn from(q: &'a [u8; N]) -> Self {
        Qualities::Values(q)
    }
}

impl<'a> From<&'a Vec<u8>> for Qualities<'a> {
    fn from(q: &'a Vec<u8>) -> Self {
        Qualities::Values(q)
    }
}

impl<'a> From<&'a str> for Qualities<'a> {
    fn from(q: &'a str) -> Self {
        Qualities::Sanger(q)
    }
}

/// Probability that a single base with Phred score `q` is correct
#[inline]
#[must_use]
pub fn base_accuracy(q: u8) -> f64 {
    1.0 - 10f64.powf(-f64::from(q) / 10.0)
}

/// Decode a Sanger quality string into numeric Phred scores.
///
/// Characters below the offset decode to zero.
#[must_use]
pub fn decode_sanger(encoded: &str) -> Vec<u8> {
    encoded
        .bytes()
        .map(|b| b.saturating_sub(SANGER_OFFSET))
        .collect()
}

/// Mean per-base accuracy of a set of quality scores, `NaN` if empty.
///
/// # Examples
///
/// ```
/// use ccs_match::core::quality::accuracy;
///
/// assert!((accuracy(&[13u8, 77, 93]) - 0.983).abs() < 1e-3);
/// assert!((accuracy(15u8) - 0.968).abs() < 1e-3);
/// assert!(accuracy(".n~") > 0.98);
/// assert!(accuracy(&[] as &[u8]).is_nan());
/// ```
#[must_use]
pub fn accuracy<'a>(qualities: impl Into<Qualities<'a>>) -> f64 {
    match qualities.into() {
        Qualities::Scalar(q) => base_accuracy(q),
        Qualities::Values(values) => mean_accuracy(values.iter().copied()),
        Qualities::Sanger(encoded) => {
            mean_accuracy(encoded.bytes().map(|b| b.saturating_sub(SANGER_OFFSET)))
        }
    }
}

fn mean_accuracy(values: impl Iterator<Item = u8>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), q| {
        (sum + base_accuracy(q), count + 1)
    });

    if count == 0 {
        return f64::NAN;
    }

    #[allow(clippy::cast_precision_loss)]
    {
        sum / count as f64
    }
}

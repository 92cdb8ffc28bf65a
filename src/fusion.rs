//! Pit temperature fusion.
//!
//! Combines the ambient readings of all currently connected probes into a
//! single pit temperature. A freshly clipped-on probe reads far cooler
//! than the pit for a minute or two; the lower-trimmed mean drops such
//! outliers while leaving agreeing probes untouched.

/// How many population standard deviations below the mean a reading may
/// sit before it is dropped from the fusion.
pub const DEVIATION_THRESHOLD: f32 = 0.5;

/// Fuse N ambient readings into one pit temperature.
///
/// Readings below `mean - DEVIATION_THRESHOLD * stddev` are discarded and
/// the arithmetic mean of the rest is returned. With one reading (or
/// none) the input passes through unchanged.
pub fn fuse(ambients: &[f32]) -> Option<f32> {
    match ambients {
        [] => None,
        [only] => Some(*only),
        _ => {
            let n = ambients.len() as f32;
            let mean = ambients.iter().sum::<f32>() / n;
            let variance = ambients.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
            let floor = mean - DEVIATION_THRESHOLD * variance.sqrt();

            // Values at or above the mean always pass, so the retained set
            // is never empty.
            let (sum, count) = ambients
                .iter()
                .filter(|v| **v >= floor)
                .fold((0.0f32, 0u32), |(s, c), v| (s + v, c + 1));

            Some(sum / count as f32)
        }
    }
}

//! Fixed-point log-domain arithmetic.
//!
//! Scores are integer logarithms in a configurable base. All sums go through
//! [`add`], which saturates at [`LOGPROB_ZERO`] instead of wrapping.

pub type Score = i32;

/// Log-zero sentinel. Every impossible path sits at exactly this value.
pub const LOGPROB_ZERO: Score = -939_524_096;

/// Marker for "no score recorded yet". Lower than any reachable score.
pub const WORST_SCORE: Score = i32::MIN;

/// Log-domain product of two scores, clamped at [`LOGPROB_ZERO`].
#[inline]
pub fn add(a: Score, b: Score) -> Score {
    a.saturating_add(b).max(LOGPROB_ZERO)
}

/// `true` if the score is at or below the log-zero sentinel.
#[inline]
pub fn is_zero(score: Score) -> bool {
    score <= LOGPROB_ZERO
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogMath {
    base: f64,
    inv_ln_base: f64,
}

impl LogMath {
    pub const DEFAULT_BASE: f64 = 1.0003;

    /// Returns `None` unless `base > 1`.
    pub fn new(base: f64) -> Option<Self> {
        if !(base > 1.0) || !base.is_finite() {
            return None;
        }
        Some(Self {
            base,
            inv_ln_base: 1.0 / base.ln(),
        })
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    /// Converts a probability to a score. Non-positive probabilities map to log-zero.
    pub fn log(&self, prob: f64) -> Score {
        if !(prob > 0.0) {
            return LOGPROB_ZERO;
        }
        self.clamp(prob.ln() * self.inv_ln_base)
    }

    /// Converts a base-10 logarithm (ARPA convention) to a score.
    pub fn from_log10(&self, log10: f64) -> Score {
        self.clamp(log10 * std::f64::consts::LN_10 * self.inv_ln_base)
    }

    /// Scales a score by a real weight, e.g. a language weight.
    pub fn scale(&self, score: Score, weight: f64) -> Score {
        if is_zero(score) {
            return LOGPROB_ZERO;
        }
        self.clamp(score as f64 * weight)
    }

    pub fn from_ln(&self, ln: f64) -> Score {
        self.clamp(ln * self.inv_ln_base)
    }

    fn clamp(&self, value: f64) -> Score {
        if value.is_nan() || value <= LOGPROB_ZERO as f64 {
            LOGPROB_ZERO
        } else if value >= i32::MAX as f64 {
            i32::MAX
        } else {
            value.round() as Score
        }
    }
}

impl Default for LogMath {
    fn default() -> Self {
        Self {
            base: Self::DEFAULT_BASE,
            inv_ln_base: 1.0 / Self::DEFAULT_BASE.ln(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_saturates_at_log_zero() {
        assert_eq!(add(LOGPROB_ZERO, LOGPROB_ZERO), LOGPROB_ZERO);
        assert_eq!(add(LOGPROB_ZERO, -5), LOGPROB_ZERO);
        assert_eq!(add(WORST_SCORE, -1), LOGPROB_ZERO);
        assert_eq!(add(-10, -20), -30);
    }

    #[test]
    fn add_does_not_wrap_on_positive_overflow() {
        assert_eq!(add(i32::MAX, 10), i32::MAX);
    }

    #[test]
    fn log_of_one_is_zero_and_monotonic() {
        let lm = LogMath::default();
        assert_eq!(lm.log(1.0), 0);
        assert!(lm.log(0.5) < lm.log(0.9));
        assert_eq!(lm.log(0.0), LOGPROB_ZERO);
        assert_eq!(lm.log(-1.0), LOGPROB_ZERO);
    }

    #[test]
    fn log10_matches_probability_conversion() {
        let lm = LogMath::default();
        let a = lm.from_log10(-2.0);
        let b = lm.log(0.01);
        assert!((a - b).abs() <= 1);
    }

    #[test]
    fn default_beam_magnitude() {
        let lm = LogMath::default();
        // ln(1e-55) / ln(1.0003) is roughly -422_000
        let beam = lm.log(1e-55);
        assert!(beam < -420_000 && beam > -425_000, "beam = {beam}");
    }

    #[test]
    fn rejects_bad_bases() {
        assert!(LogMath::new(1.0).is_none());
        assert!(LogMath::new(0.5).is_none());
        assert!(LogMath::new(f64::NAN).is_none());
        assert!(LogMath::new(10.0).is_some());
    }

    #[test]
    fn scale_keeps_log_zero() {
        let lm = LogMath::default();
        assert_eq!(lm.scale(LOGPROB_ZERO, 9.5), LOGPROB_ZERO);
        assert_eq!(lm.scale(-100, 2.0), -200);
    }
}

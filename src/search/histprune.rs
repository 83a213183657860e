//! Adaptive histogram beam.
//!
//! When far more chains are active than the configured cap, the survival
//! beam is narrowed to the smallest histogram bin boundary that still keeps
//! at least `cap` chains.

use crate::logmath::Score;
use crate::pipeline::context::BeamSet;

pub const HISTOGRAM_BINS: usize = 1000;

/// Effective relative beams of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBeams {
    pub hmm: Score,
    pub phone: Score,
    pub word: Score,
    pub tightened: bool,
}

impl FrameBeams {
    /// Phone and word beams follow a narrowed survival beam but are never
    /// loosened past their configured values.
    pub fn from_hmm_beam(beams: &BeamSet, hmm: Score) -> Self {
        Self {
            hmm,
            phone: hmm.max(beams.phone),
            word: hmm.max(beams.word),
            tightened: hmm > beams.hmm,
        }
    }
}

/// `true` when the active count exceeds the cap by the margin that triggers
/// histogram pruning.
pub fn needs_tightening(cap: usize, n_active: usize) -> bool {
    n_active > cap + cap / 2
}

/// Width of one histogram bin for a survival beam.
pub fn bin_width(hmm_beam: Score) -> Score {
    (hmm_beam.saturating_neg() / HISTOGRAM_BINS as Score).max(1)
}

/// Narrowest bin boundary keeping at least `cap` chains. Bins count chains
/// by distance from the frame best, `width` per bin.
pub fn tightened_beam(hmm_beam: Score, cap: usize, bins: &[u32], width: Score) -> Score {
    let mut total = 0usize;
    for (i, &n) in bins.iter().enumerate() {
        total += n as usize;
        if total >= cap {
            let edge = (i as i64 + 1) * i64::from(width) - 1;
            let beam = Score::try_from(-edge).unwrap_or(hmm_beam);
            return beam.max(hmm_beam);
        }
    }
    hmm_beam
}

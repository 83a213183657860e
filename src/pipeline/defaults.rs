use crate::error::DecoderError;
use crate::logmath::{LogMath, Score};
use crate::pipeline::traits::AcousticScorer;

/// Acoustic scorer over senone scores computed ahead of time, one row per
/// frame.
#[derive(Debug, Clone)]
pub struct PrecomputedScores {
    n_senones: usize,
    frames: Vec<Vec<Score>>,
    next: usize,
}

impl PrecomputedScores {
    pub fn new(n_senones: usize, frames: Vec<Vec<Score>>) -> Result<Self, DecoderError> {
        if let Some((i, row)) = frames.iter().enumerate().find(|(_, r)| r.len() != n_senones) {
            return Err(DecoderError::invalid_input(format!(
                "frame {i} has {} senone scores, expected {n_senones}",
                row.len()
            )));
        }
        Ok(Self {
            n_senones,
            frames,
            next: 0,
        })
    }

    /// Converts natural-log likelihoods into the integer log domain.
    pub fn from_ln(
        logmath: &LogMath,
        n_senones: usize,
        frames: &[Vec<f64>],
    ) -> Result<Self, DecoderError> {
        let rows = frames
            .iter()
            .map(|row| row.iter().map(|&ln| logmath.from_ln(ln)).collect())
            .collect();
        Self::new(n_senones, rows)
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn rewind(&mut self) {
        self.next = 0;
    }
}

impl AcousticScorer for PrecomputedScores {
    fn n_senones(&self) -> usize {
        self.n_senones
    }

    fn next_frame(&mut self, scores: &mut [Score]) -> Result<bool, DecoderError> {
        let Some(row) = self.frames.get(self.next) else {
            return Ok(false);
        };
        if scores.len() != row.len() {
            return Err(DecoderError::acoustic(
                self.next as u32,
                format!("score buffer holds {} senones, frame has {}", scores.len(), row.len()),
            ));
        }
        scores.copy_from_slice(row);
        self.next += 1;
        Ok(true)
    }
}

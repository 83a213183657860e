use serde::Deserialize;

use crate::error::DecoderError;
use crate::logmath::{LogMath, Score, LOGPROB_ZERO};
use crate::types::{SenoneId, TmatId};

/// Shape of a transition matrix, selecting the HMM evaluation kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Three emitting states, left-to-right with skips.
    ThreeState,
    /// Five emitting states, left-to-right with skips.
    FiveState,
    Arbitrary,
}

/// Log transition scores for `n_emit` emitting states plus one
/// non-emitting exit state (column `n_emit`).
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    n_emit: usize,
    tp: Vec<Score>,
    topology: Topology,
}

impl TransitionMatrix {
    /// Builds from a row-per-emitting-state probability table, each row
    /// `n_emit + 1` wide.
    pub fn from_probs(rows: &[Vec<f64>], logmath: &LogMath) -> Result<Self, DecoderError> {
        let n_emit = rows.len();
        if n_emit == 0 {
            return Err(DecoderError::config("transition matrix has no states"));
        }
        let mut tp = Vec::with_capacity(n_emit * (n_emit + 1));
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_emit + 1 {
                return Err(DecoderError::config(format!(
                    "transition matrix row {i} has {} columns, expected {}",
                    row.len(),
                    n_emit + 1
                )));
            }
            tp.extend(row.iter().map(|&p| logmath.log(p)));
        }
        Ok(Self::from_scores(n_emit, tp))
    }

    pub(crate) fn from_scores(n_emit: usize, tp: Vec<Score>) -> Self {
        let mut tmat = Self {
            n_emit,
            tp,
            topology: Topology::Arbitrary,
        };
        tmat.topology = match n_emit {
            3 if tmat.is_left_to_right() => Topology::ThreeState,
            5 if tmat.is_left_to_right() => Topology::FiveState,
            _ => Topology::Arbitrary,
        };
        tmat
    }

    pub fn n_emit(&self) -> usize {
        self.n_emit
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    #[inline]
    pub fn tp(&self, from: usize, to: usize) -> Score {
        self.tp[from * (self.n_emit + 1) + to]
    }

    fn is_left_to_right(&self) -> bool {
        (0..self.n_emit).all(|i| {
            (0..=self.n_emit).all(|j| (i <= j && j <= i + 2) || self.tp(i, j) == LOGPROB_ZERO)
        })
    }
}

/// A concrete state-tied phone model: one senone per emitting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneModel {
    pub senones: Vec<SenoneId>,
    pub tmat: TmatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionMatrixDefinition {
    pub probs: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bakis(n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| {
                let mut row = vec![0.0; n + 1];
                row[i] = 0.5;
                row[i + 1] = 0.4;
                if i + 2 <= n {
                    row[i + 2] = 0.1;
                }
                row
            })
            .collect()
    }

    #[test]
    fn detects_topology() {
        let lm = LogMath::default();
        let t3 = TransitionMatrix::from_probs(&bakis(3), &lm).unwrap();
        assert_eq!(t3.topology(), Topology::ThreeState);
        let t5 = TransitionMatrix::from_probs(&bakis(5), &lm).unwrap();
        assert_eq!(t5.topology(), Topology::FiveState);
        let t4 = TransitionMatrix::from_probs(&bakis(4), &lm).unwrap();
        assert_eq!(t4.topology(), Topology::Arbitrary);

        let mut back = bakis(3);
        back[2][0] = 0.1;
        let tb = TransitionMatrix::from_probs(&back, &lm).unwrap();
        assert_eq!(tb.topology(), Topology::Arbitrary);
    }

    #[test]
    fn zero_probabilities_become_log_zero() {
        let lm = LogMath::default();
        let t = TransitionMatrix::from_probs(&bakis(3), &lm).unwrap();
        assert_eq!(t.tp(0, 3), LOGPROB_ZERO);
        assert_eq!(t.tp(2, 0), LOGPROB_ZERO);
        assert!(t.tp(2, 3) > LOGPROB_ZERO);
    }

    #[test]
    fn rejects_ragged_rows() {
        let lm = LogMath::default();
        let rows = vec![vec![0.5, 0.5], vec![0.5]];
        assert!(TransitionMatrix::from_probs(&rows, &lm).is_err());
        assert!(TransitionMatrix::from_probs(&[], &lm).is_err());
    }
}

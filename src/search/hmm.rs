//! Per-frame Viterbi update of a single phone HMM instance.
//!
//! Each emitting state takes the best of its predecessors plus the
//! transition score, then adds the frame's senone score. State 0 may also
//! be fed by the pending entry score. The non-emitting exit state consumes
//! no senone score. Ties keep the first candidate in ascending source order.

use crate::logmath::{self, Score, LOGPROB_ZERO};
use crate::model::tmat::{Topology, TransitionMatrix};
use crate::types::{HistoryId, SenoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateScore {
    pub score: Score,
    pub hist: Option<HistoryId>,
}

impl StateScore {
    pub const ZERO: Self = Self {
        score: LOGPROB_ZERO,
        hist: None,
    };
}

/// Mutable score state of one phone occurrence.
#[derive(Debug, Clone)]
pub struct ChainInstance {
    pub(crate) states: Vec<StateScore>,
    pub(crate) entry: StateScore,
    pub(crate) exit: StateScore,
    pub(crate) best: Score,
    /// Frame in which this chain is scheduled to be evaluated next.
    pub(crate) active_frame: Option<u32>,
}

impl ChainInstance {
    pub fn new(n_emit: usize) -> Self {
        Self {
            states: vec![StateScore::ZERO; n_emit],
            entry: StateScore::ZERO,
            exit: StateScore::ZERO,
            best: LOGPROB_ZERO,
            active_frame: None,
        }
    }

    pub fn clear(&mut self) {
        self.states.fill(StateScore::ZERO);
        self.entry = StateScore::ZERO;
        self.exit = StateScore::ZERO;
        self.best = LOGPROB_ZERO;
        self.active_frame = None;
    }

    /// Offers an entry score for the next evaluation; keeps the better proposal.
    /// Returns `true` if the proposal was taken.
    pub fn enter(&mut self, score: Score, hist: HistoryId) -> bool {
        if score > self.entry.score {
            self.entry = StateScore {
                score,
                hist: Some(hist),
            };
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> Score {
        self.best
    }

    pub fn exit(&self) -> StateScore {
        self.exit
    }

    pub fn n_emit(&self) -> usize {
        self.states.len()
    }
}

/// Runs one frame, dispatching on the matrix topology.
pub fn eval(chain: &mut ChainInstance, tmat: &TransitionMatrix, senones: &[SenoneId], senscr: &[Score]) {
    debug_assert_eq!(chain.n_emit(), tmat.n_emit());
    match tmat.topology() {
        Topology::ThreeState => eval_3st(chain, tmat, senones, senscr),
        Topology::FiveState => eval_5st(chain, tmat, senones, senscr),
        Topology::Arbitrary => eval_anytopo(chain, tmat, senones, senscr),
    }
}

#[inline]
fn pick(best: &mut StateScore, from: StateScore, tp: Score) {
    let cand = logmath::add(from.score, tp);
    if cand > best.score {
        *best = StateScore {
            score: cand,
            hist: from.hist,
        };
    }
}

#[inline]
fn finish(chain: &mut ChainInstance, new: &[StateScore], tmat: &TransitionMatrix, exit_from: &[usize]) {
    let n = tmat.n_emit();
    let mut best = LOGPROB_ZERO;
    for (dst, src) in chain.states.iter_mut().zip(new) {
        *dst = *src;
        best = best.max(src.score);
    }
    let mut exit = StateScore::ZERO;
    for &i in exit_from {
        pick(&mut exit, chain.states[i], tmat.tp(i, n));
    }
    chain.best = best;
    chain.exit = exit;
    chain.entry = StateScore::ZERO;
}

pub fn eval_3st(chain: &mut ChainInstance, tmat: &TransitionMatrix, senones: &[SenoneId], senscr: &[Score]) {
    let s = [chain.states[0], chain.states[1], chain.states[2]];
    let emit = |j: usize| senscr[senones[j] as usize];

    let mut n0 = StateScore::ZERO;
    pick(&mut n0, s[0], tmat.tp(0, 0));
    pick(&mut n0, chain.entry, 0);

    let mut n1 = StateScore::ZERO;
    pick(&mut n1, s[0], tmat.tp(0, 1));
    pick(&mut n1, s[1], tmat.tp(1, 1));

    let mut n2 = StateScore::ZERO;
    pick(&mut n2, s[0], tmat.tp(0, 2));
    pick(&mut n2, s[1], tmat.tp(1, 2));
    pick(&mut n2, s[2], tmat.tp(2, 2));

    n0.score = logmath::add(n0.score, emit(0));
    n1.score = logmath::add(n1.score, emit(1));
    n2.score = logmath::add(n2.score, emit(2));
    finish(chain, &[n0, n1, n2], tmat, &[1, 2]);
}

pub fn eval_5st(chain: &mut ChainInstance, tmat: &TransitionMatrix, senones: &[SenoneId], senscr: &[Score]) {
    let mut s = [StateScore::ZERO; 5];
    s.copy_from_slice(&chain.states[..5]);
    let mut new = [StateScore::ZERO; 5];
    for (j, out) in new.iter_mut().enumerate() {
        for i in j.saturating_sub(2)..=j {
            pick(out, s[i], tmat.tp(i, j));
        }
        if j == 0 {
            pick(out, chain.entry, 0);
        }
        out.score = logmath::add(out.score, senscr[senones[j] as usize]);
    }
    finish(chain, &new, tmat, &[3, 4]);
}

/// Full-matrix recurrence for mixed or irregular topologies.
pub fn eval_anytopo(chain: &mut ChainInstance, tmat: &TransitionMatrix, senones: &[SenoneId], senscr: &[Score]) {
    let n = tmat.n_emit();
    let old = chain.states.clone();
    let mut new = vec![StateScore::ZERO; n];
    for (j, out) in new.iter_mut().enumerate() {
        for (i, from) in old.iter().enumerate() {
            pick(out, *from, tmat.tp(i, j));
        }
        if j == 0 {
            pick(out, chain.entry, 0);
        }
        out.score = logmath::add(out.score, senscr[senones[j] as usize]);
    }
    let exit_from: Vec<usize> = (0..n).collect();
    finish(chain, &new, tmat, &exit_from);
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::logmath::LogMath;

    fn bakis(n: usize) -> TransitionMatrix {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let mut row = vec![0.0; n + 1];
                row[i] = 0.6;
                row[i + 1] = 0.3;
                if i + 2 <= n {
                    row[i + 2] = 0.1;
                }
                row
            })
            .collect();
        TransitionMatrix::from_probs(&rows, &LogMath::default()).unwrap()
    }

    #[test]
    fn entry_feeds_first_state_and_is_consumed() {
        let tmat = bakis(3);
        let mut chain = ChainInstance::new(3);
        assert!(chain.enter(-100, 7));
        assert!(!chain.enter(-200, 8));
        let senscr = vec![-10, -20, -30];
        eval(&mut chain, &tmat, &[0, 1, 2], &senscr);
        assert_eq!(chain.states[0].score, -110);
        assert_eq!(chain.states[0].hist, Some(7));
        assert_eq!(chain.states[1].score, LOGPROB_ZERO);
        assert_eq!(chain.best(), -110);
        assert_eq!(chain.entry, StateScore::ZERO);
        assert_eq!(chain.exit().score, LOGPROB_ZERO);
    }

    #[test]
    fn scores_walk_through_the_chain_to_the_exit() {
        let tmat = bakis(3);
        let mut chain = ChainInstance::new(3);
        chain.enter(0, 1);
        let senscr = vec![0, 0, 0];
        for _ in 0..3 {
            eval(&mut chain, &tmat, &[0, 1, 2], &senscr);
        }
        // after frame 1: s0 = tp00, s1 = tp01, s2 = tp02
        let expect_s2 = [
            tmat.tp(0, 0) + tmat.tp(0, 2),
            tmat.tp(0, 1) + tmat.tp(1, 2),
            tmat.tp(0, 2) + tmat.tp(2, 2),
        ]
        .into_iter()
        .max()
        .unwrap();
        assert_eq!(chain.states[2].score, expect_s2);
        let exit = chain.exit();
        assert_eq!(exit.hist, Some(1));
        let via_s1 = chain.states[1].score + tmat.tp(1, 3);
        let via_s2 = chain.states[2].score + tmat.tp(2, 3);
        assert_eq!(exit.score, via_s1.max(via_s2));
    }

    #[test]
    fn log_zero_states_stay_at_log_zero() {
        let tmat = bakis(3);
        let mut chain = ChainInstance::new(3);
        eval(&mut chain, &tmat, &[0, 1, 2], &[-5, -5, -5]);
        assert!(chain.states.iter().all(|s| s.score == LOGPROB_ZERO));
        assert_eq!(chain.best(), LOGPROB_ZERO);
    }

    fn random_chain(rng: &mut StdRng, n: usize) -> ChainInstance {
        let mut chain = ChainInstance::new(n);
        for (i, s) in chain.states.iter_mut().enumerate() {
            s.score = rng.gen_range(-50_000..-1);
            s.hist = Some(i as HistoryId + 10);
        }
        chain.enter(rng.gen_range(-50_000..-1), 99);
        chain
    }

    #[test]
    fn specialized_kernels_match_full_recurrence() {
        let mut rng = StdRng::seed_from_u64(17);
        for n in [3usize, 5] {
            let tmat = bakis(n);
            let senones: Vec<SenoneId> = (0..n as SenoneId).collect();
            for _ in 0..200 {
                let senscr: Vec<Score> = (0..n).map(|_| rng.gen_range(-3_000..=0)).collect();
                let base = random_chain(&mut rng, n);
                let mut fast = base.clone();
                let mut full = base.clone();
                eval(&mut fast, &tmat, &senones, &senscr);
                eval_anytopo(&mut full, &tmat, &senones, &senscr);
                assert_eq!(fast.states, full.states);
                assert_eq!(fast.best(), full.best());
                assert_eq!(fast.exit().score, full.exit().score);
            }
        }
    }

    #[test]
    fn arbitrary_topology_allows_backward_transitions() {
        let rows = vec![vec![0.5, 0.5, 0.0], vec![0.5, 0.25, 0.25]];
        let tmat = TransitionMatrix::from_probs(&rows, &LogMath::default()).unwrap();
        let mut chain = ChainInstance::new(2);
        chain.states[1] = StateScore {
            score: -10,
            hist: Some(3),
        };
        eval(&mut chain, &tmat, &[0, 0], &[0]);
        assert_eq!(chain.states[0].hist, Some(3));
        assert_eq!(chain.states[0].score, -10 + tmat.tp(1, 0));
    }

    #[test]
    fn clear_resets_everything() {
        let mut chain = ChainInstance::new(3);
        chain.enter(-1, 2);
        chain.active_frame = Some(4);
        chain.best = -3;
        chain.clear();
        assert_eq!(chain.entry, StateScore::ZERO);
        assert_eq!(chain.best(), LOGPROB_ZERO);
        assert_eq!(chain.active_frame, None);
    }
}

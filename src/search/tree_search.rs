//! Per-session score state of one lexical tree copy.
//!
//! The tree structure is shared; each instance owns one chain per node and
//! the lists of nodes active in the current and the next frame.

use std::sync::Arc;

use crate::logmath::{self, Score, LOGPROB_ZERO, WORST_SCORE};
use crate::pipeline::context::DecoderContext;
use crate::search::hmm::{self, ChainInstance};
use crate::search::lextree::{lm_share, LexTree, NodeId};
use crate::search::vithist::VithistTable;
use crate::types::{HistoryId, PhoneId, WordId};

/// Absolute pruning thresholds of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameThresholds {
    pub hmm: Score,
    pub phone: Score,
    pub word: Score,
}

/// A word-final chain that cleared the word threshold.
#[derive(Debug, Clone)]
pub struct WordExit {
    pub word: WordId,
    pub score: Score,
    pub history: HistoryId,
    pub rc: Option<(Arc<[u16]>, u16)>,
}

#[derive(Debug)]
pub struct TreeInstance {
    tree: Arc<LexTree>,
    chains: Vec<ChainInstance>,
    active: Vec<NodeId>,
    next_active: Vec<NodeId>,
    best: Score,
    word_best: Score,
}

impl TreeInstance {
    pub fn new(tree: Arc<LexTree>) -> Self {
        let chains = tree.nodes().iter().map(|n| ChainInstance::new(n.n_emit)).collect();
        Self {
            tree,
            chains,
            active: Vec::new(),
            next_active: Vec::new(),
            best: WORST_SCORE,
            word_best: WORST_SCORE,
        }
    }

    pub fn tree(&self) -> &LexTree {
        &self.tree
    }

    pub fn n_active(&self) -> usize {
        self.active.len()
    }

    pub fn n_scheduled(&self) -> usize {
        self.next_active.len()
    }

    /// Best chain score of the last evaluated frame.
    pub fn best(&self) -> Score {
        self.best
    }

    /// Best chain score among word-final nodes of the last evaluated frame.
    pub fn word_best(&self) -> Score {
        self.word_best
    }

    #[cfg(test)]
    pub(crate) fn chain(&self, id: NodeId) -> &ChainInstance {
        &self.chains[id as usize]
    }

    fn schedule(&mut self, id: NodeId, frame: u32) {
        let chain = &mut self.chains[id as usize];
        if chain.active_frame != Some(frame) {
            chain.active_frame = Some(frame);
            self.next_active.push(id);
        }
    }

    /// Enters the roots reachable after a word ending in phone `lc`, for
    /// evaluation in `frame`. Flat roots pay their LM share. Returns the
    /// number of roots whose entry improved.
    pub fn enter(
        &mut self,
        ctx: &DecoderContext,
        history: &VithistTable,
        lc: PhoneId,
        hist: HistoryId,
        frame: u32,
        threshold: Score,
    ) -> usize {
        let tree = Arc::clone(&self.tree);
        let lmstate = history.entry(hist).lmstate;
        let mut entered = 0;
        for &root in tree.roots_for(lc) {
            let node = tree.node(root);
            let mut score = history.successor_score(hist, node.phone);
            if let Some((word, index, len)) = node.flat_position() {
                score = logmath::add(score, lm_share(ctx.word_lm_score(lmstate, word), len, index));
            }
            if score < threshold {
                continue;
            }
            if self.chains[root as usize].enter(score, hist) {
                self.schedule(root, frame);
                entered += 1;
            }
        }
        entered
    }

    /// Runs the Viterbi update on every active chain. Returns the number of
    /// chains evaluated.
    pub fn eval(&mut self, ctx: &DecoderContext, senscr: &[Score]) -> usize {
        let mut best = WORST_SCORE;
        let mut word_best = WORST_SCORE;
        for &id in &self.active {
            let node = self.tree.node(id);
            let model = ctx.phones.phone_model(node.model);
            let tmat = ctx.phones.transition_matrix(model.tmat);
            let chain = &mut self.chains[id as usize];
            hmm::eval(chain, tmat, &model.senones, senscr);
            best = best.max(chain.best());
            if node.is_word_end() {
                word_best = word_best.max(chain.best());
            }
        }
        self.best = best;
        self.word_best = word_best;
        self.active.len()
    }

    /// Counts active chains by distance from `best`, `bin_width` per bin.
    /// The last bin also takes everything beyond it.
    pub fn histogram(&self, best: Score, bin_width: Score, bins: &mut [u32]) {
        let Some(last) = bins.len().checked_sub(1) else {
            return;
        };
        let width = i64::from(bin_width.max(1));
        for &id in &self.active {
            let gap = (i64::from(best) - i64::from(self.chains[id as usize].best())).max(0);
            let k = ((gap / width) as usize).min(last);
            bins[k] += 1;
        }
    }

    /// Moves surviving chains into the next frame and passes exit scores on
    /// to children. Word-final exits above the word threshold are collected
    /// in `exits` instead. Returns how many active chains survived the
    /// HMM threshold.
    pub fn propagate(
        &mut self,
        ctx: &DecoderContext,
        history: &VithistTable,
        frame: u32,
        th: &FrameThresholds,
        exits: &mut Vec<WordExit>,
    ) -> usize {
        let next = frame + 1;
        let tree = Arc::clone(&self.tree);
        let active = std::mem::take(&mut self.active);
        let mut survivors = 0;
        for &id in &active {
            let chain = &mut self.chains[id as usize];
            if chain.best() < th.hmm {
                if chain.active_frame != Some(next) {
                    chain.clear();
                }
                continue;
            }
            let exit = chain.exit();
            self.schedule(id, next);
            survivors += 1;

            let node = tree.node(id);
            let Some(hist) = exit.hist else {
                continue;
            };
            if node.is_word_end() {
                if exit.score >= th.word && exit.score > LOGPROB_ZERO {
                    if let Some((word, _, _)) = node.flat_position() {
                        exits.push(WordExit {
                            word,
                            score: exit.score,
                            history: hist,
                            rc: node
                                .rc_class
                                .and_then(|c| tree.rc_map(word).map(|m| (Arc::clone(m), c))),
                        });
                    }
                }
                continue;
            }
            if exit.score < th.phone {
                continue;
            }
            for &child in &node.children {
                let c = tree.node(child);
                let mut score = exit.score;
                if let Some((word, index, len)) = c.flat_position() {
                    let total = ctx.word_lm_score(history.entry(hist).lmstate, word);
                    score = logmath::add(score, lm_share(total, len, index));
                }
                if score < th.hmm {
                    continue;
                }
                if self.chains[child as usize].enter(score, hist) {
                    self.schedule(child, next);
                }
            }
        }
        self.active = active;
        survivors
    }

    /// Makes the chains scheduled for the next frame the active set.
    pub fn swap(&mut self) {
        self.active = std::mem::take(&mut self.next_active);
    }

    pub fn reset(&mut self) {
        for chain in &mut self.chains {
            chain.clear();
        }
        self.active.clear();
        self.next_active.clear();
        self.best = WORST_SCORE;
        self.word_best = WORST_SCORE;
    }
}

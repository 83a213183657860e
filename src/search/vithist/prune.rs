use std::collections::HashSet;

use super::{EntryKind, VithistTable};
use crate::error::DecoderError;
use crate::logmath::{Score, WORST_SCORE};
use crate::types::{HistoryId, WordId};

/// Per-frame limits applied to the entries of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneLimits {
    /// Word-exit beam, relative to the frame best.
    pub beam: Score,
    pub max_words: usize,
    pub max_histories: usize,
    /// Keep at most one LM context per word.
    pub bigram_history: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub kept: usize,
    pub dropped: usize,
}

impl VithistTable {
    /// Ranks the entries of `frame`, invalidates those over the limits and
    /// compacts the region. The frame best and its best filler always survive.
    pub fn prune(&mut self, frame: u32, limits: &PruneLimits) -> Result<PruneSummary, DecoderError> {
        let range = self.frame_range(frame);
        let mut ranked: Vec<(Score, HistoryId)> = range
            .clone()
            .filter(|&id| self.entry(id).valid)
            .map(|id| (self.entry(id).score, id))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for id in range.clone() {
            self.entry_mut(id).valid = false;
        }

        let threshold = ranked
            .first()
            .map_or(WORST_SCORE, |&(best, _)| best.saturating_add(limits.beam));
        let mut words: HashSet<WordId> = HashSet::new();
        let mut histories_left = limits.max_histories;
        let mut filler_kept = false;
        let mut kept = 0;

        for (rank, &(score, id)) in ranked.iter().enumerate() {
            let (word, is_filler) = {
                let e = self.entry(id);
                (e.word, e.kind == EntryKind::Filler)
            };
            let keep = if rank == 0 {
                true
            } else if is_filler {
                !filler_kept
            } else if score < threshold || histories_left == 0 {
                false
            } else if words.contains(&word) {
                !limits.bigram_history
            } else {
                words.len() < limits.max_words
            };
            if !keep {
                continue;
            }
            if is_filler {
                filler_kept = true;
            } else {
                words.insert(word);
            }
            histories_left = histories_left.saturating_sub(1);
            self.entry_mut(id).valid = true;
            kept += 1;
        }

        let dropped = ranked.len() - kept;
        self.collect_garbage(frame)?;
        Ok(PruneSummary { kept, dropped })
    }

    /// Moves the valid entries of `frame` to the front of its region and
    /// releases the trailing storage.
    fn collect_garbage(&mut self, frame: u32) -> Result<(), DecoderError> {
        let start = self.frame_range(frame).start as usize;
        if start > self.n_entries || frame != self.n_frames {
            return Err(DecoderError::invalid_input(format!(
                "cannot compact closed frame {frame}"
            )));
        }
        let mut region = Vec::with_capacity(self.n_entries - start);
        while self.n_entries > start {
            match self.pop() {
                Some(e) => region.push(e),
                None => break,
            }
        }
        region.reverse();

        let f = frame as usize;
        self.best_score[f] = WORST_SCORE;
        self.best_entry[f] = None;
        for e in region.into_iter().filter(|e| e.valid) {
            let id = self.push(e)?;
            self.note_best(id);
        }
        self.index.clear();
        Ok(())
    }
}

//! Cross-word transition: histories of a frame re-enter the tree roots.

use crate::config::RootEntry;
use crate::logmath::Score;
use crate::pipeline::context::DecoderContext;
use crate::search::tree_search::TreeInstance;
use crate::search::vithist::VithistTable;
use crate::types::HistoryId;

/// Rotates root entry over the tree copies, `per_copy` consecutive
/// transition frames each.
#[derive(Debug, Clone, Copy)]
pub struct CopySchedule {
    copies: usize,
    per_copy: usize,
    transitions: usize,
}

impl CopySchedule {
    pub fn new(copies: usize, per_copy: usize) -> Self {
        Self {
            copies: copies.max(1),
            per_copy: per_copy.max(1),
            transitions: 0,
        }
    }

    /// Copy used by the next transition frame.
    pub fn advance(&mut self) -> usize {
        let k = (self.transitions / self.per_copy) % self.copies;
        self.transitions += 1;
        k
    }

    pub fn reset(&mut self) {
        self.transitions = 0;
    }
}

/// Enters the roots of one word tree copy and one filler tree copy with the
/// surviving histories of `frame`, for evaluation in `frame + 1`. Returns
/// the number of roots entered.
pub fn word_transition(
    ctx: &DecoderContext,
    history: &VithistTable,
    words: &mut [TreeInstance],
    fillers: &mut [TreeInstance],
    schedule: &mut CopySchedule,
    frame: u32,
    threshold: Score,
) -> usize {
    let range = history.frame_range(frame);
    let Some(best) = history.best_entry(frame) else {
        return 0;
    };
    if range.is_empty() {
        return 0;
    }
    let k = schedule.advance();
    let next = frame + 1;
    let mut entered = 0;

    if let Some(tree) = words.get_mut(k % words.len().max(1)) {
        match ctx.root_entry {
            RootEntry::BestPerFinalPhone => {
                let word_end = ctx
                    .beams
                    .word_end
                    .map(|b| history.best_score(frame).saturating_add(b));
                let mut per_phone: Vec<Option<(Score, HistoryId)>> = vec![None; ctx.phones.n_phones()];
                for id in range.clone() {
                    let e = history.entry(id);
                    if !e.valid {
                        continue;
                    }
                    let lc = ctx.context_phone(e.word) as usize;
                    if let Some(slot) = per_phone.get_mut(lc) {
                        if slot.map_or(true, |(s, _)| e.score > s) {
                            *slot = Some((e.score, id));
                        }
                    }
                }
                for (lc, slot) in per_phone.iter().enumerate() {
                    let Some((score, id)) = *slot else {
                        continue;
                    };
                    if word_end.is_some_and(|th| score < th) {
                        continue;
                    }
                    entered += tree.enter(ctx, history, lc as u32, id, next, threshold);
                }
            }
            RootEntry::AllSurvivors => {
                for id in range.clone() {
                    let e = history.entry(id);
                    if e.valid {
                        let lc = ctx.context_phone(e.word);
                        entered += tree.enter(ctx, history, lc, id, next, threshold);
                    }
                }
            }
        }
    }

    if let Some(tree) = fillers.get_mut(k % fillers.len().max(1)) {
        entered += tree.enter(ctx, history, ctx.phones.silence_phone(), best, next, threshold);
    }
    entered
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::DecoderConfig;
    use crate::search::fixtures::cat_cap_context;
    use crate::search::lextree::{LexTree, LexTreeParams};
    use crate::search::vithist::{EntryKind, HistoryCandidate, LmState};
    use crate::types::WordId;

    #[test]
    fn copies_rotate_in_runs() {
        let mut s = CopySchedule::new(3, 2);
        let seq: Vec<usize> = (0..8).map(|_| s.advance()).collect();
        assert_eq!(seq, vec![0, 0, 1, 1, 2, 2, 0, 0]);
        s.reset();
        assert_eq!(s.advance(), 0);
    }

    fn trees(ctx: &DecoderContext, copies: usize) -> (Vec<TreeInstance>, Vec<TreeInstance>) {
        let n = ctx.dictionary.n_words() as WordId;
        let words: Vec<bool> = (0..n)
            .map(|w| ["cat", "cap"].contains(&ctx.dictionary.word_str(w)))
            .collect();
        let fillers: Vec<bool> = (0..n).map(|w| ctx.is_filler(w)).collect();
        let p = LexTreeParams {
            flatten_depth: 2,
            left_context_roots: true,
            cross_word_triphones: false,
        };
        let wt = Arc::new(
            LexTree::build("words", &words, ctx.dictionary.as_ref(), ctx.phones.as_ref(), p).unwrap(),
        );
        let ft = Arc::new(
            LexTree::build(
                "fillers",
                &fillers,
                ctx.dictionary.as_ref(),
                ctx.phones.as_ref(),
                LexTreeParams {
                    flatten_depth: 0,
                    left_context_roots: false,
                    cross_word_triphones: false,
                },
            )
            .unwrap(),
        );
        (
            (0..copies).map(|_| TreeInstance::new(Arc::clone(&wt))).collect(),
            (0..copies).map(|_| TreeInstance::new(Arc::clone(&ft))).collect(),
        )
    }

    #[test]
    fn entries_go_to_the_scheduled_copy() {
        let ctx = cat_cap_context(&DecoderConfig::default());
        let mut vh = VithistTable::new();
        vh.utt_begin(&ctx).unwrap();
        let (mut words, mut fillers) = trees(&ctx, 2);
        let mut schedule = CopySchedule::new(2, 1);

        let entered = word_transition(&ctx, &vh, &mut words, &mut fillers, &mut schedule, 0, Score::MIN);
        assert_eq!(entered, 0, "frame 0 has no histories yet");

        vh.insert(HistoryCandidate {
            word: ctx.silence_word,
            base_word: ctx.silence_word,
            kind: EntryKind::Filler,
            start_frame: 0,
            end_frame: 0,
            ascr: -10,
            lscr: 0,
            score: -10,
            pred: 0,
            lmstate: LmState {
                newer: Some(ctx.start_lm),
                older: None,
            },
            rc: None,
        })
        .unwrap();
        let entered = word_transition(&ctx, &vh, &mut words, &mut fillers, &mut schedule, 0, Score::MIN);
        // one shared K root, plus <sil> and ++noise++ roots
        assert_eq!(entered, 3);
        assert_eq!(words[0].n_scheduled(), 1);
        assert_eq!(words[1].n_scheduled(), 0);
        assert_eq!(fillers[0].n_scheduled(), 2);

        let again = word_transition(&ctx, &vh, &mut words, &mut fillers, &mut schedule, 0, Score::MIN);
        assert_eq!(again, 3);
        assert_eq!(words[1].n_scheduled(), 1);
    }
}

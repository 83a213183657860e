use super::{EntryKind, HistoryCandidate, VithistTable};
use crate::error::DecoderError;
use crate::logmath::{self, Score};
use crate::pipeline::context::DecoderContext;
use crate::search::tree_search::WordExit;

impl VithistTable {
    /// Turns a word exit into history entries for the open frame.
    ///
    /// The exit carries the path through one predecessor. Its acoustic part
    /// is recombined with every valid entry sharing that predecessor's end
    /// frame, each paying its own LM score, so later words see the best
    /// segmentation for every LM context. Fillers keep the predecessor's LM
    /// state and only follow real words, or the exit's own predecessor.
    /// Returns the number of candidates inserted.
    pub fn rescore(&mut self, ctx: &DecoderContext, exit: &WordExit, beam: Score) -> Result<usize, DecoderError> {
        let frame = self.current_frame();
        let pred = exit.history;
        if pred as usize >= self.len() {
            return Err(DecoderError::invalid_input(format!(
                "word exit refers to missing history {pred}"
            )));
        }
        let phone = ctx.first_phone(exit.word);
        let filler = ctx.is_filler(exit.word);
        let lm_paid = ctx.word_lm_score(self.entry(pred).lmstate, exit.word);
        let ascr = exit
            .score
            .saturating_sub(self.successor_score(pred, phone))
            .saturating_sub(lm_paid);
        let start_frame = self.successor_start(pred);
        let base_word = ctx.dictionary.base_word(exit.word);

        let mut inserted = 0;
        for id in self.region_of(pred) {
            let e = self.entry(id);
            if !e.valid || (filler && id != pred && e.kind == EntryKind::Filler) {
                continue;
            }
            let lscr = if filler {
                lm_paid
            } else {
                ctx.word_lm_score(e.lmstate, exit.word)
            };
            let lmstate = ctx.successor_lmstate(e.lmstate, exit.word);
            let score = logmath::add(logmath::add(self.successor_score(id, phone), ascr), lscr);
            let exempt = filler && id == pred;
            if !exempt && score < self.best_score(frame).saturating_add(beam) {
                continue;
            }
            self.insert(HistoryCandidate {
                word: exit.word,
                base_word,
                kind: if filler { EntryKind::Filler } else { EntryKind::Word },
                start_frame,
                end_frame: frame,
                ascr,
                lscr,
                score,
                pred: id,
                lmstate,
                rc: exit.rc.clone(),
            })?;
            inserted += 1;
        }
        Ok(inserted)
    }
}

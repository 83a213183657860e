//! Viterbi history table.
//!
//! Every word exit that survives the word beam becomes an entry. Entries are
//! appended to a block store in frame order, so each frame owns a contiguous
//! region and a predecessor index is always smaller than its successor's.
//! Within the open frame, entries are deduplicated by word class and LM
//! state. Once the frame is pruned its region is compacted and closed.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::error::DecoderError;
use crate::logmath::{self, Score, WORST_SCORE};
use crate::pipeline::context::DecoderContext;
use crate::types::{HistoryId, LmWordId, PhoneId, WordId};

mod prune;
mod rescore;

pub use prune::{PruneLimits, PruneSummary};

/// log2 of the number of entries per storage block.
pub const BLOCK_SHIFT: u32 = 14;
pub const MAX_BLOCKS: usize = 16_384;

/// The two most recent LM words of a history, newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LmState {
    pub newer: Option<LmWordId>,
    pub older: Option<LmWordId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The `<s>` sentinel at index 0.
    Start,
    Word,
    Filler,
    /// The `</s>` entry appended at utterance end.
    End,
}

/// Best path into one right-context class of a word entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcSlot {
    pub score: Score,
    pub pred: Option<HistoryId>,
    pub start_frame: u32,
    pub ascr: Score,
    pub lscr: Score,
}

impl RcSlot {
    const EMPTY: Self = Self {
        score: WORST_SCORE,
        pred: None,
        start_frame: 0,
        ascr: 0,
        lscr: 0,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RightContexts {
    map: Arc<[u16]>,
    slots: Vec<RcSlot>,
}

impl RightContexts {
    fn with_slot(map: Arc<[u16]>, class: u16, slot: RcSlot) -> Self {
        let n = map.iter().copied().max().map_or(1, |m| m as usize + 1);
        let mut slots = vec![RcSlot::EMPTY; n];
        if let Some(s) = slots.get_mut(class as usize) {
            *s = slot;
        }
        Self { map, slots }
    }

    pub fn slots(&self) -> &[RcSlot] {
        &self.slots
    }

    /// Slot read by a successor whose first phone is `phone`.
    pub fn slot_for(&self, phone: PhoneId) -> Option<&RcSlot> {
        let class = *self.map.get(phone as usize)?;
        self.slots
            .get(class as usize)
            .filter(|s| s.score != WORST_SCORE)
    }

    fn best(&self) -> &RcSlot {
        let mut best = &self.slots[0];
        for s in &self.slots[1..] {
            if s.score > best.score {
                best = s;
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VithistEntry {
    pub word: WordId,
    pub kind: EntryKind,
    pub start_frame: u32,
    pub end_frame: u32,
    pub ascr: Score,
    pub lscr: Score,
    pub score: Score,
    pub pred: Option<HistoryId>,
    pub lmstate: LmState,
    pub valid: bool,
    pub(crate) rc: Option<Box<RightContexts>>,
}

impl VithistEntry {
    pub fn right_contexts(&self) -> Option<&RightContexts> {
        self.rc.as_deref()
    }

    fn mirror(&mut self, slot: &RcSlot) {
        self.score = slot.score;
        self.pred = slot.pred;
        self.start_frame = slot.start_frame;
        self.ascr = slot.ascr;
        self.lscr = slot.lscr;
    }
}

/// A word exit rescored against one predecessor, ready for insertion.
#[derive(Debug, Clone)]
pub struct HistoryCandidate {
    pub word: WordId,
    /// Dedup identity of a real word; alternate pronunciations share it.
    pub base_word: WordId,
    pub kind: EntryKind,
    pub start_frame: u32,
    pub end_frame: u32,
    pub ascr: Score,
    pub lscr: Score,
    pub score: Score,
    pub pred: HistoryId,
    pub lmstate: LmState,
    /// Right-context class map of the word and the class this exit reached.
    pub rc: Option<(Arc<[u16]>, u16)>,
}

impl HistoryCandidate {
    fn slot(&self) -> RcSlot {
        RcSlot {
            score: self.score,
            pred: Some(self.pred),
            start_frame: self.start_frame,
            ascr: self.ascr,
            lscr: self.lscr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyClass {
    Word(WordId),
    Filler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct HistoryKey {
    class: KeyClass,
    lmstate: LmState,
}

/// One step of a backtrace, with the right-context slot already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub id: HistoryId,
    pub word: WordId,
    pub kind: EntryKind,
    pub start_frame: u32,
    pub end_frame: u32,
    pub ascr: Score,
    pub lscr: Score,
    pub score: Score,
}

#[derive(Debug)]
pub struct VithistTable {
    blocks: Vec<Vec<VithistEntry>>,
    n_entries: usize,
    block_shift: u32,
    max_blocks: usize,
    frame_start: Vec<HistoryId>,
    best_score: Vec<Score>,
    best_entry: Vec<Option<HistoryId>>,
    index: HashMap<HistoryKey, HistoryId>,
    n_frames: u32,
}

impl Default for VithistTable {
    fn default() -> Self {
        Self::with_limits(BLOCK_SHIFT, MAX_BLOCKS)
    }
}

impl VithistTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_limits(block_shift: u32, max_blocks: usize) -> Self {
        Self {
            blocks: Vec::new(),
            n_entries: 0,
            block_shift,
            max_blocks,
            frame_start: Vec::new(),
            best_score: Vec::new(),
            best_entry: Vec::new(),
            index: HashMap::new(),
            n_frames: 0,
        }
    }

    fn block_size(&self) -> usize {
        1 << self.block_shift
    }

    /// Drops all storage and frame bookkeeping.
    pub fn reset(&mut self) {
        self.blocks = Vec::new();
        self.n_entries = 0;
        self.frame_start = Vec::new();
        self.best_score = Vec::new();
        self.best_entry = Vec::new();
        self.index = HashMap::new();
        self.n_frames = 0;
    }

    /// Starts an utterance with the `<s>` sentinel as entry 0.
    pub fn utt_begin(&mut self, ctx: &DecoderContext) -> Result<HistoryId, DecoderError> {
        self.reset();
        let id = self.push(VithistEntry {
            word: ctx.start_word,
            kind: EntryKind::Start,
            start_frame: 0,
            end_frame: 0,
            ascr: 0,
            lscr: 0,
            score: 0,
            pred: None,
            lmstate: LmState {
                newer: Some(ctx.start_lm),
                older: None,
            },
            valid: true,
            rc: None,
        })?;
        self.frame_start.push(self.n_entries as HistoryId);
        self.best_score.push(WORST_SCORE);
        self.best_entry.push(None);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.n_entries
    }

    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Frame currently open for insertion.
    pub fn current_frame(&self) -> u32 {
        self.n_frames
    }

    pub fn entry(&self, id: HistoryId) -> &VithistEntry {
        let id = id as usize;
        &self.blocks[id >> self.block_shift][id & (self.block_size() - 1)]
    }

    fn entry_mut(&mut self, id: HistoryId) -> &mut VithistEntry {
        let id = id as usize;
        let mask = self.block_size() - 1;
        &mut self.blocks[id >> self.block_shift][id & mask]
    }

    pub fn entries(&self) -> impl Iterator<Item = (HistoryId, &VithistEntry)> + '_ {
        self.blocks
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, e)| (i as HistoryId, e))
    }

    fn push(&mut self, entry: VithistEntry) -> Result<HistoryId, DecoderError> {
        if self.n_entries == self.blocks.len() << self.block_shift {
            if self.blocks.len() >= self.max_blocks {
                return Err(DecoderError::exhausted("history blocks", self.max_blocks));
            }
            self.blocks.push(Vec::with_capacity(self.block_size()));
        }
        let id = HistoryId::try_from(self.n_entries)
            .map_err(|_| DecoderError::exhausted("history entries", u32::MAX as usize))?;
        if let Some(block) = self.blocks.last_mut() {
            block.push(entry);
        }
        self.n_entries += 1;
        Ok(id)
    }

    fn pop(&mut self) -> Option<VithistEntry> {
        let block = self.blocks.last_mut()?;
        let entry = block.pop();
        if block.is_empty() {
            self.blocks.pop();
        }
        if entry.is_some() {
            self.n_entries -= 1;
        }
        entry
    }

    /// Entries that ended in `frame`. The open frame extends to the table end.
    pub fn frame_range(&self, frame: u32) -> Range<HistoryId> {
        let f = frame as usize;
        let end = self.n_entries as HistoryId;
        match self.frame_start.get(f) {
            Some(&start) => start..self.frame_start.get(f + 1).copied().unwrap_or(end),
            None => end..end,
        }
    }

    /// Region of entries that share `pred`'s segmentation.
    pub fn region_of(&self, pred: HistoryId) -> Range<HistoryId> {
        let e = self.entry(pred);
        match e.kind {
            EntryKind::Start => pred..pred + 1,
            _ => self.frame_range(e.end_frame),
        }
    }

    /// First frame of a word following `pred`.
    pub fn successor_start(&self, pred: HistoryId) -> u32 {
        let e = self.entry(pred);
        match e.kind {
            EntryKind::Start => 0,
            _ => e.end_frame + 1,
        }
    }

    /// Path score seen by a successor starting with `phone`.
    pub fn successor_score(&self, id: HistoryId, phone: PhoneId) -> Score {
        let e = self.entry(id);
        e.rc
            .as_ref()
            .and_then(|rc| rc.slot_for(phone))
            .map_or(e.score, |s| s.score)
    }

    pub fn best_score(&self, frame: u32) -> Score {
        self.best_score
            .get(frame as usize)
            .copied()
            .unwrap_or(WORST_SCORE)
    }

    pub fn best_entry(&self, frame: u32) -> Option<HistoryId> {
        self.best_entry.get(frame as usize).copied().flatten()
    }

    fn note_best(&mut self, id: HistoryId) {
        let score = self.entry(id).score;
        let f = self.n_frames as usize;
        if score > self.best_score[f] {
            self.best_score[f] = score;
            self.best_entry[f] = Some(id);
        }
    }

    /// Records a word exit in the open frame, merging it with an existing
    /// entry of the same word class and LM state. Returns the entry index.
    pub fn insert(&mut self, cand: HistoryCandidate) -> Result<HistoryId, DecoderError> {
        if cand.end_frame != self.n_frames || self.frame_start.is_empty() {
            return Err(DecoderError::invalid_input(format!(
                "history insert for frame {} while frame {} is open",
                cand.end_frame, self.n_frames
            )));
        }
        if cand.pred as usize >= self.n_entries {
            return Err(DecoderError::invalid_input(format!(
                "history predecessor {} does not exist",
                cand.pred
            )));
        }
        let key = HistoryKey {
            class: match cand.kind {
                EntryKind::Filler => KeyClass::Filler,
                _ => KeyClass::Word(cand.base_word),
            },
            lmstate: cand.lmstate,
        };
        let id = match self.index.get(&key).copied() {
            Some(id) => {
                self.merge(id, cand);
                id
            }
            None => {
                let rc = cand.rc.as_ref().map(|(map, class)| {
                    Box::new(RightContexts::with_slot(Arc::clone(map), *class, cand.slot()))
                });
                let id = self.push(VithistEntry {
                    word: cand.word,
                    kind: cand.kind,
                    start_frame: cand.start_frame,
                    end_frame: cand.end_frame,
                    ascr: cand.ascr,
                    lscr: cand.lscr,
                    score: cand.score,
                    pred: Some(cand.pred),
                    lmstate: cand.lmstate,
                    valid: true,
                    rc,
                })?;
                self.index.insert(key, id);
                id
            }
        };
        self.note_best(id);
        Ok(id)
    }

    fn merge(&mut self, id: HistoryId, cand: HistoryCandidate) {
        let slot = cand.slot();
        let e = self.entry_mut(id);
        if let (Some(rc), Some((map, class))) = (e.rc.as_mut(), cand.rc.as_ref()) {
            if Arc::ptr_eq(&rc.map, map) || rc.map == *map {
                if let Some(s) = rc.slots.get_mut(*class as usize) {
                    if slot.score > s.score {
                        *s = slot;
                    }
                }
                let best = *rc.best();
                e.mirror(&best);
                return;
            }
        }
        if cand.score <= e.score {
            return;
        }
        e.word = cand.word;
        e.start_frame = cand.start_frame;
        e.ascr = cand.ascr;
        e.lscr = cand.lscr;
        e.score = cand.score;
        e.pred = Some(cand.pred);
        e.rc = cand.rc.map(|(map, class)| Box::new(RightContexts::with_slot(map, class, slot)));
    }

    /// Closes the open frame and opens the next one.
    pub fn frame_windup(&mut self, frame: u32) -> Result<(), DecoderError> {
        if frame != self.n_frames || self.frame_start.is_empty() {
            return Err(DecoderError::invalid_input(format!(
                "cannot close frame {frame} while frame {} is open",
                self.n_frames
            )));
        }
        self.frame_start.push(self.n_entries as HistoryId);
        self.best_score.push(WORST_SCORE);
        self.best_entry.push(None);
        self.index.clear();
        self.n_frames += 1;
        Ok(())
    }

    fn reopen_last_frame(&mut self) {
        self.frame_start.pop();
        self.best_score.pop();
        self.best_entry.pop();
        self.n_frames -= 1;
        let f = self.n_frames as usize;
        self.best_score[f] = WORST_SCORE;
        self.best_entry[f] = None;
        self.index.clear();
    }

    /// Best entry of `frame` to be followed by `word`: its index, the score
    /// it passes on and the total including the LM score of `word`.
    fn best_final(
        &self,
        ctx: &DecoderContext,
        frame: u32,
        word: WordId,
    ) -> Option<(HistoryId, Score, Score)> {
        let phone = ctx.first_phone(word);
        let mut best: Option<(HistoryId, Score, Score)> = None;
        for id in self.frame_range(frame) {
            let e = self.entry(id);
            if !e.valid {
                continue;
            }
            let base = self.successor_score(id, phone);
            let total = logmath::add(base, ctx.word_lm_score(e.lmstate, word));
            if best.map_or(true, |(_, _, s)| total > s) {
                best = Some((id, base, total));
            }
        }
        best
    }

    /// Appends the `</s>` entry after the final frame. Returns `None` when no
    /// frame ever produced a word exit.
    pub fn utt_end(&mut self, ctx: &DecoderContext) -> Result<Option<HistoryId>, DecoderError> {
        let n = self.n_frames;
        if n == 0 {
            return Ok(None);
        }
        let last = n - 1;
        let Some(frame) = (0..n)
            .rev()
            .find(|&f| self.frame_range(f).any(|id| self.entry(id).valid))
        else {
            return Ok(None);
        };

        if frame != last {
            tracing::warn!(
                last_frame = last,
                exit_frame = frame,
                "no word exit in the final frame, bridging with silence"
            );
            let Some((pred, _, _)) = self.best_final(ctx, frame, ctx.finish_word) else {
                return Ok(None);
            };
            let sil = ctx.silence_word;
            let base = self.successor_score(pred, ctx.first_phone(sil));
            let lscr = ctx.lm.filler_penalty(sil);
            let (start_frame, lmstate) = (self.successor_start(pred), self.entry(pred).lmstate);
            self.reopen_last_frame();
            self.insert(HistoryCandidate {
                word: sil,
                base_word: sil,
                kind: EntryKind::Filler,
                start_frame,
                end_frame: last,
                ascr: 0,
                lscr,
                score: logmath::add(base, lscr),
                pred,
                lmstate,
                rc: None,
            })?;
            self.frame_windup(last)?;
        }

        let Some((pred, base, total)) = self.best_final(ctx, last, ctx.finish_word) else {
            return Ok(None);
        };
        let older = self.entry(pred).lmstate.newer;
        let id = self.push(VithistEntry {
            word: ctx.finish_word,
            kind: EntryKind::End,
            start_frame: self.successor_start(pred),
            end_frame: n,
            ascr: 0,
            lscr: total.saturating_sub(base),
            score: total,
            pred: Some(pred),
            lmstate: LmState {
                newer: Some(ctx.finish_lm),
                older,
            },
            valid: true,
            rc: None,
        })?;
        Ok(Some(id))
    }

    /// Follows predecessors from `end` back to `<s>`, oldest step first. The
    /// right-context slot of each entry is the one its successor entered.
    pub fn backtrace(&self, ctx: &DecoderContext, end: HistoryId) -> Result<Vec<TraceStep>, DecoderError> {
        let mut steps = Vec::new();
        let mut cur = end;
        let mut next_phone: Option<PhoneId> = None;
        loop {
            if cur as usize >= self.n_entries {
                return Err(DecoderError::invalid_input(format!(
                    "backtrace reached missing history {cur}"
                )));
            }
            let e = self.entry(cur);
            if e.kind == EntryKind::Start {
                break;
            }
            let slot = e
                .rc
                .as_ref()
                .zip(next_phone)
                .and_then(|(rc, p)| rc.slot_for(p).copied());
            let (pred, start_frame, ascr, lscr, score) = match slot {
                Some(s) => (s.pred, s.start_frame, s.ascr, s.lscr, s.score),
                None => (e.pred, e.start_frame, e.ascr, e.lscr, e.score),
            };
            steps.push(TraceStep {
                id: cur,
                word: e.word,
                kind: e.kind,
                start_frame,
                end_frame: e.end_frame,
                ascr,
                lscr,
                score,
            });
            next_phone = Some(ctx.first_phone(e.word));
            match pred {
                Some(p) if p < cur => cur = p,
                Some(p) => {
                    return Err(DecoderError::invalid_input(format!(
                        "history {cur} points forward to {p}"
                    )))
                }
                None => break,
            }
        }
        steps.reverse();
        Ok(steps)
    }
}

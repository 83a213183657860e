use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::DecoderError;
use crate::logmath::{Score, LOGPROB_ZERO, WORST_SCORE};
use crate::pipeline::context::DecoderContext;
use crate::pipeline::traits::AcousticScorer;
use crate::search::histprune::{self, FrameBeams, HISTOGRAM_BINS};
use crate::search::lattice::Lattice;
use crate::search::lextree::LexTree;
use crate::search::tree_search::{FrameThresholds, TreeInstance, WordExit};
use crate::search::vithist::{EntryKind, PruneLimits, TraceStep, VithistTable};
use crate::search::word_trans::{word_transition, CopySchedule};
use crate::types::{
    DecodeOutcome, Hypothesis, SegmentKind, UttStats, UtteranceResult, WordSegment,
};

/// Shared cancellation signal, checked at every frame boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Immutable decoder: models, trees and beams. Cheap to share across
/// threads; each thread decodes through its own [`SearchSession`].
pub struct Decoder {
    context: Arc<DecoderContext>,
    word_tree: Arc<LexTree>,
    filler_tree: Arc<LexTree>,
    tree_copies: usize,
    entries_per_copy: usize,
    write_lattice: bool,
}

pub(crate) struct DecoderParts {
    pub context: Arc<DecoderContext>,
    pub word_tree: Arc<LexTree>,
    pub filler_tree: Arc<LexTree>,
    pub tree_copies: usize,
    pub entries_per_copy: usize,
    pub write_lattice: bool,
}

impl Decoder {
    pub(crate) fn from_parts(parts: DecoderParts) -> Self {
        Self {
            context: parts.context,
            word_tree: parts.word_tree,
            filler_tree: parts.filler_tree,
            tree_copies: parts.tree_copies,
            entries_per_copy: parts.entries_per_copy,
            write_lattice: parts.write_lattice,
        }
    }

    pub fn context(&self) -> &DecoderContext {
        &self.context
    }

    pub fn word_tree(&self) -> &LexTree {
        &self.word_tree
    }

    pub fn filler_tree(&self) -> &LexTree {
        &self.filler_tree
    }

    /// Fresh per-utterance search state bound to this decoder.
    pub fn session(&self) -> SearchSession {
        let copies = self.tree_copies.max(1);
        SearchSession {
            ctx: Arc::clone(&self.context),
            words: (0..copies)
                .map(|_| TreeInstance::new(Arc::clone(&self.word_tree)))
                .collect(),
            fillers: (0..copies)
                .map(|_| TreeInstance::new(Arc::clone(&self.filler_tree)))
                .collect(),
            history: VithistTable::new(),
            schedule: CopySchedule::new(copies, self.entries_per_copy),
            senscr: vec![0; self.context.phones.n_senones()],
            bins: vec![0; HISTOGRAM_BINS],
            exits: Vec::new(),
            write_lattice: self.write_lattice,
        }
    }

    /// Decodes one utterance with a throwaway session.
    pub fn decode(
        &self,
        utt_id: &str,
        scorer: &mut dyn AcousticScorer,
        cancel: &CancelFlag,
    ) -> UtteranceResult {
        self.session().decode(utt_id, scorer, cancel)
    }
}

/// Mutable search state for one utterance at a time. Reusable: every
/// decode ends with a full reset, whatever its outcome.
pub struct SearchSession {
    ctx: Arc<DecoderContext>,
    words: Vec<TreeInstance>,
    fillers: Vec<TreeInstance>,
    history: VithistTable,
    schedule: CopySchedule,
    senscr: Vec<Score>,
    bins: Vec<u32>,
    exits: Vec<WordExit>,
    write_lattice: bool,
}

impl SearchSession {
    pub fn decode(
        &mut self,
        utt_id: &str,
        scorer: &mut dyn AcousticScorer,
        cancel: &CancelFlag,
    ) -> UtteranceResult {
        let mut stats = UttStats::default();
        let outcome = match self.run(scorer, cancel, &mut stats) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(utt_id, frame = stats.frames, error = %error, "utterance aborted");
                DecodeOutcome::Aborted { error }
            }
        };
        self.reset();

        tracing::info!(
            utt_id,
            outcome = outcome.label(),
            frames = stats.frames,
            hmm_evaluated = stats.hmm_evaluated,
            word_exits = stats.word_exits,
            history_entries = stats.history_entries,
            peak_active = stats.peak_active,
            peak_survivors = stats.peak_survivors,
            tightened_frames = stats.tightened_frames,
            "decoded utterance"
        );
        UtteranceResult {
            utt_id: utt_id.to_string(),
            outcome,
            stats,
        }
    }

    /// Drops all per-utterance state.
    pub fn reset(&mut self) {
        for tree in self.words.iter_mut().chain(self.fillers.iter_mut()) {
            tree.reset();
        }
        self.history.reset();
        self.schedule.reset();
        self.exits.clear();
    }

    fn run(
        &mut self,
        scorer: &mut dyn AcousticScorer,
        cancel: &CancelFlag,
        stats: &mut UttStats,
    ) -> Result<DecodeOutcome, DecoderError> {
        if scorer.n_senones() != self.senscr.len() {
            return Err(DecoderError::invalid_input(format!(
                "acoustic scorer provides {} senones, phone model has {}",
                scorer.n_senones(),
                self.senscr.len()
            )));
        }
        self.begin()?;

        let mut frame = 0u32;
        loop {
            stats.frames = frame;
            if cancel.is_cancelled() {
                return Err(DecoderError::Cancelled { frame });
            }
            if !scorer.next_frame(&mut self.senscr)? {
                break;
            }
            self.step(frame, stats)?;
            frame += 1;
        }
        self.finish(frame)
    }

    /// Opens the history with `<s>` and enters the roots for frame 0.
    fn begin(&mut self) -> Result<(), DecoderError> {
        let ctx = Arc::clone(&self.ctx);
        let start = self.history.utt_begin(&ctx)?;
        let sil = ctx.phones.silence_phone();
        self.words[0].enter(&ctx, &self.history, sil, start, 0, WORST_SCORE);
        self.fillers[0].enter(&ctx, &self.history, sil, start, 0, WORST_SCORE);
        for tree in self.words.iter_mut().chain(self.fillers.iter_mut()) {
            tree.swap();
        }
        Ok(())
    }

    fn step(&mut self, frame: u32, stats: &mut UttStats) -> Result<(), DecoderError> {
        let ctx = Arc::clone(&self.ctx);

        // Best senone becomes 0 so path scores stay well inside i32.
        let top = self.senscr.iter().copied().max().unwrap_or(0);
        if top != 0 {
            for s in &mut self.senscr {
                *s = s.saturating_sub(top).max(LOGPROB_ZERO);
            }
            stats.senone_scale += i64::from(top);
        }

        let mut n_active = 0usize;
        let mut best = WORST_SCORE;
        let mut word_best = WORST_SCORE;
        for tree in self.words.iter_mut().chain(self.fillers.iter_mut()) {
            n_active += tree.eval(&ctx, &self.senscr);
            best = best.max(tree.best());
            word_best = word_best.max(tree.word_best());
        }
        stats.hmm_evaluated += n_active as u64;
        stats.record_active(n_active.min(u32::MAX as usize) as u32);

        if n_active == 0 {
            return Err(DecoderError::DisconnectedGraph { frame });
        }
        if best > 0 {
            return Err(DecoderError::ScoreOverflow { frame, score: best });
        }

        let mut hmm_beam = ctx.beams.hmm;
        if let Some(cap) = ctx.beams.max_hmm_per_frame {
            if histprune::needs_tightening(cap, n_active) {
                let width = histprune::bin_width(hmm_beam);
                self.bins.fill(0);
                for tree in self.words.iter().chain(self.fillers.iter()) {
                    tree.histogram(best, width, &mut self.bins);
                }
                hmm_beam = histprune::tightened_beam(hmm_beam, cap, &self.bins, width);
            }
        }
        let beams = FrameBeams::from_hmm_beam(&ctx.beams, hmm_beam);
        if beams.tightened {
            stats.tightened_frames += 1;
            tracing::debug!(frame, active = n_active, beam = beams.hmm, "tightened hmm beam");
        }
        if i64::from(best) + i64::from(beams.hmm) < i64::from(LOGPROB_ZERO) {
            return Err(DecoderError::ScoreUnderflow { frame, score: best });
        }

        let hmm = best.saturating_add(beams.hmm);
        let word = word_best.saturating_add(beams.word);
        let skip = ctx.beams.phone_transition_skip;
        let phone = if skip > 0 && frame % skip == 0 && word_best > WORST_SCORE {
            word
        } else {
            best.saturating_add(beams.phone)
        };
        let th = FrameThresholds { hmm, phone, word };

        self.exits.clear();
        let mut survivors = 0usize;
        for tree in self.words.iter_mut().chain(self.fillers.iter_mut()) {
            survivors += tree.propagate(&ctx, &self.history, frame, &th, &mut self.exits);
        }
        stats.peak_survivors = stats
            .peak_survivors
            .max(survivors.min(u32::MAX as usize) as u32);
        self.exits.sort_by(|a, b| b.score.cmp(&a.score));
        stats.word_exits += self.exits.len() as u64;
        for exit in &self.exits {
            self.history.rescore(&ctx, exit, beams.word)?;
        }

        let summary = self.history.prune(
            frame,
            &PruneLimits {
                beam: beams.word,
                max_words: ctx.beams.max_words_per_frame,
                max_histories: ctx.beams.max_histories_per_frame,
                bigram_history: ctx.bigram_history,
            },
        )?;
        stats.history_entries += summary.kept as u64;

        word_transition(
            &ctx,
            &self.history,
            &mut self.words,
            &mut self.fillers,
            &mut self.schedule,
            frame,
            hmm,
        );
        self.history.frame_windup(frame)?;
        for tree in self.words.iter_mut().chain(self.fillers.iter_mut()) {
            tree.swap();
        }
        Ok(())
    }

    fn finish(&mut self, n_frames: u32) -> Result<DecodeOutcome, DecoderError> {
        let ctx = Arc::clone(&self.ctx);
        if n_frames == 0 {
            return Ok(DecodeOutcome::NoRecognition {
                reason: "utterance has no frames".to_string(),
            });
        }
        let Some(end) = self.history.utt_end(&ctx)? else {
            return Ok(DecodeOutcome::NoRecognition {
                reason: "no word exit survived in any frame".to_string(),
            });
        };
        let path = self.history.backtrace(&ctx, end)?;
        let hypothesis = hypothesis(&ctx, &path, self.history.entry(end).score);
        let lattice = if self.write_lattice {
            Some(Lattice::build(&ctx, &self.history, end, &path, n_frames)?)
        } else {
            None
        };
        Ok(DecodeOutcome::Recognized { hypothesis, lattice })
    }
}

fn hypothesis(ctx: &DecoderContext, path: &[TraceStep], total_score: Score) -> Hypothesis {
    let segments = path
        .iter()
        .filter_map(|step| {
            let kind = match step.kind {
                EntryKind::Start => return None,
                EntryKind::Word => SegmentKind::Word,
                EntryKind::Filler => SegmentKind::Filler,
                EntryKind::End => SegmentKind::End,
            };
            let base = ctx.dictionary.base_word(step.word);
            Some(WordSegment {
                word_id: step.word,
                word: ctx.dictionary.word_str(base).to_string(),
                start_frame: step.start_frame,
                end_frame: step.end_frame,
                acoustic_score: step.ascr,
                lm_score: step.lscr,
                kind,
            })
        })
        .collect();
    Hypothesis {
        segments,
        total_score,
    }
}

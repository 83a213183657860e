use std::sync::Arc;

use crate::config::{DecoderConfig, RootEntry};
use crate::error::DecoderError;
use crate::logmath::{LogMath, Score};
use crate::pipeline::traits::{Dictionary, LanguageModel, PhoneContextModel};
use crate::search::vithist::LmState;
use crate::types::{LmWordId, PhoneId, WordId};

/// Pruning thresholds in the log domain, offsets from the relevant best score.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamSet {
    pub hmm: Score,
    pub phone: Score,
    pub word: Score,
    pub word_end: Option<Score>,
    pub max_hmm_per_frame: Option<usize>,
    pub max_words_per_frame: usize,
    pub max_histories_per_frame: usize,
    pub phone_transition_skip: u32,
}

impl BeamSet {
    fn from_config(config: &DecoderConfig, logmath: &LogMath) -> Self {
        Self {
            hmm: logmath.log(config.beam),
            phone: logmath.log(config.phone_beam),
            word: logmath.log(config.word_beam),
            word_end: config.word_end_beam.map(|b| logmath.log(b)),
            max_hmm_per_frame: (config.max_hmm_per_frame > 0).then_some(config.max_hmm_per_frame),
            max_words_per_frame: config.max_words_per_frame,
            max_histories_per_frame: config.max_histories_per_frame,
            phone_transition_skip: config.phone_transition_skip,
        }
    }
}

/// Everything the search reads but never mutates: external models, the
/// resolved sentinels and the beam configuration.
pub struct DecoderContext {
    pub dictionary: Arc<dyn Dictionary>,
    pub phones: Arc<dyn PhoneContextModel>,
    pub lm: Arc<dyn LanguageModel>,
    pub beams: BeamSet,
    pub logmath: LogMath,
    pub root_entry: RootEntry,
    pub bigram_history: bool,
    pub start_word: WordId,
    pub finish_word: WordId,
    pub silence_word: WordId,
    pub start_lm: LmWordId,
    pub finish_lm: LmWordId,
}

impl DecoderContext {
    pub fn new(
        config: &DecoderConfig,
        dictionary: Arc<dyn Dictionary>,
        phones: Arc<dyn PhoneContextModel>,
        lm: Arc<dyn LanguageModel>,
    ) -> Result<Self, DecoderError> {
        let logmath = config.validate()?;
        let start_word = dictionary
            .start_word()
            .ok_or_else(|| DecoderError::config("dictionary has no start word"))?;
        let finish_word = dictionary
            .finish_word()
            .ok_or_else(|| DecoderError::config("dictionary has no finish word"))?;
        let silence_word = dictionary
            .silence_word()
            .ok_or_else(|| DecoderError::config("dictionary has no silence word"))?;
        let start_lm = lm
            .start_lm_word()
            .ok_or_else(|| DecoderError::config("language model has no start word"))?;
        let finish_lm = lm
            .finish_lm_word()
            .ok_or_else(|| DecoderError::config("language model has no finish word"))?;
        if phones.n_senones() == 0 {
            return Err(DecoderError::config("phone model defines no senones"));
        }
        for w in [start_word, finish_word, silence_word] {
            if dictionary.pronunciation(w).is_empty() {
                return Err(DecoderError::config(format!(
                    "sentinel word '{}' has an empty pronunciation",
                    dictionary.word_str(w)
                )));
            }
        }
        Ok(Self {
            beams: BeamSet::from_config(config, &logmath),
            logmath,
            root_entry: config.root_entry,
            bigram_history: config.bigram_history,
            dictionary,
            phones,
            lm,
            start_word,
            finish_word,
            silence_word,
            start_lm,
            finish_lm,
        })
    }

    pub fn is_filler(&self, word: WordId) -> bool {
        self.dictionary.is_filler(word)
    }

    /// Language score of `word` following the given context. Fillers pay a
    /// fixed penalty; words unknown to the LM fall back to the filler path.
    pub fn word_lm_score(&self, lmstate: LmState, word: WordId) -> Score {
        if self.is_filler(word) {
            return self.lm.filler_penalty(word);
        }
        match self.lm.lm_word(word) {
            Some(candidate) => self.lm.trigram_score(lmstate.older, lmstate.newer, candidate),
            None => self.lm.filler_penalty(word),
        }
    }

    /// LM state of a word entry whose predecessor had `pred`.
    pub fn successor_lmstate(&self, pred: LmState, word: WordId) -> LmState {
        if self.is_filler(word) {
            return pred;
        }
        LmState {
            newer: self.lm.lm_word(word),
            older: pred.newer,
        }
    }

    pub fn first_phone(&self, word: WordId) -> PhoneId {
        self.dictionary
            .pronunciation(word)
            .first()
            .copied()
            .unwrap_or_else(|| self.phones.silence_phone())
    }

    /// Final phone of a word as left context for the next; fillers map to silence.
    pub fn context_phone(&self, word: WordId) -> PhoneId {
        let sil = self.phones.silence_phone();
        match self.dictionary.pronunciation(word).last() {
            Some(&p) if !self.phones.is_filler_phone(p) => p,
            _ => sil,
        }
    }
}

impl std::fmt::Debug for DecoderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderContext")
            .field("words", &self.dictionary.n_words())
            .field("phones", &self.phones.n_phones())
            .field("beams", &self.beams)
            .finish()
    }
}

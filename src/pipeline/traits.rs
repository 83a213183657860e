use crate::error::DecoderError;
use crate::logmath::Score;
use crate::model::tmat::{PhoneModel, TransitionMatrix};
use crate::types::{LmWordId, PhoneId, PhoneModelId, WordId, WordPosition};

pub trait Dictionary: Send + Sync {
    fn n_words(&self) -> usize;
    fn word_str(&self, word: WordId) -> &str;
    fn pronunciation(&self, word: WordId) -> &[PhoneId];
    /// Collapses alternate pronunciations to one logical word.
    fn base_word(&self, word: WordId) -> WordId;
    /// Filler and noise words, excluding the start and finish sentinels.
    fn is_filler(&self, word: WordId) -> bool;
    fn start_word(&self) -> Option<WordId>;
    fn finish_word(&self) -> Option<WordId>;
    fn silence_word(&self) -> Option<WordId>;
}

pub trait LanguageModel: Send + Sync {
    fn lm_word(&self, word: WordId) -> Option<LmWordId>;
    fn start_lm_word(&self) -> Option<LmWordId>;
    fn finish_lm_word(&self) -> Option<LmWordId>;
    /// Weighted trigram score with backoff. Missing context words back off.
    fn trigram_score(
        &self,
        older: Option<LmWordId>,
        newer: Option<LmWordId>,
        candidate: LmWordId,
    ) -> Score;
    fn filler_penalty(&self, word: WordId) -> Score;

    fn unigram_score(&self, candidate: LmWordId) -> Score {
        self.trigram_score(None, None, candidate)
    }
}

pub trait PhoneContextModel: Send + Sync {
    fn n_phones(&self) -> usize;
    fn phone_name(&self, phone: PhoneId) -> &str;
    fn phone_id(&self, name: &str) -> Option<PhoneId>;
    fn is_filler_phone(&self, phone: PhoneId) -> bool;
    fn silence_phone(&self) -> PhoneId;
    fn n_senones(&self) -> usize;
    fn exact_model(
        &self,
        center: PhoneId,
        left: PhoneId,
        right: PhoneId,
        position: WordPosition,
    ) -> Option<PhoneModelId>;
    /// Context-independent model of a phone. Always defined.
    fn ci_model(&self, phone: PhoneId) -> PhoneModelId;
    fn phone_model(&self, model: PhoneModelId) -> &PhoneModel;
    fn transition_matrix(&self, tmat: crate::types::TmatId) -> &TransitionMatrix;

    /// Resolves a context-dependent model with a deterministic fallback:
    /// exact context, then silence in place of each context, then the other
    /// word positions, then the bare center phone. Missing contexts (word
    /// boundaries) and filler contexts are treated as silence.
    fn resolve(
        &self,
        center: PhoneId,
        left: Option<PhoneId>,
        right: Option<PhoneId>,
        position: WordPosition,
    ) -> PhoneModelId {
        if self.is_filler_phone(center) {
            return self.ci_model(center);
        }
        let sil = self.silence_phone();
        let as_context = |p: Option<PhoneId>| match p {
            Some(p) if !self.is_filler_phone(p) => p,
            _ => sil,
        };
        let (l, r) = (as_context(left), as_context(right));
        let tries = [(l, r), (sil, r), (l, sil), (sil, sil)];
        for (tl, tr) in tries {
            if let Some(m) = self.exact_model(center, tl, tr, position) {
                return m;
            }
        }
        for alt in position.alternates() {
            if let Some(m) = self.exact_model(center, l, r, alt) {
                return m;
            }
        }
        self.ci_model(center)
    }
}

/// Source of per-frame senone scores.
pub trait AcousticScorer: Send {
    fn n_senones(&self) -> usize;
    /// Fills `scores` for the next frame. Returns `false` at end of utterance.
    fn next_frame(&mut self, scores: &mut [Score]) -> Result<bool, DecoderError>;
}

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::DecoderError;
use crate::logmath::{self, LogMath, Score};
use crate::model::dictionary::{FINISH_WORD, START_WORD};
use crate::pipeline::traits::{Dictionary, LanguageModel};
use crate::types::{LmWordId, WordId};

#[derive(Debug, Clone, Deserialize)]
pub struct UnigramDefinition {
    pub word: String,
    pub log10_prob: f64,
    #[serde(default)]
    pub log10_backoff: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NgramDefinition {
    pub words: Vec<String>,
    pub log10_prob: f64,
    #[serde(default)]
    pub log10_backoff: f64,
}

/// ARPA-style n-gram tables plus the scoring weights applied on lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageModelDefinition {
    pub unigrams: Vec<UnigramDefinition>,
    #[serde(default)]
    pub bigrams: Vec<NgramDefinition>,
    #[serde(default)]
    pub trigrams: Vec<NgramDefinition>,
    #[serde(default = "default_language_weight")]
    pub language_weight: f64,
    #[serde(default = "default_word_insertion_penalty")]
    pub word_insertion_penalty: f64,
    #[serde(default = "default_filler_prob")]
    pub silence_prob: f64,
    #[serde(default = "default_filler_prob")]
    pub filler_prob: f64,
}

fn default_language_weight() -> f64 {
    9.5
}
fn default_word_insertion_penalty() -> f64 {
    0.7
}
fn default_filler_prob() -> f64 {
    0.1
}

#[derive(Debug, Clone, Copy)]
struct Gram {
    prob: Score,
    backoff: Score,
}

/// Trigram model with Katz-style backoff, linked to one dictionary.
#[derive(Debug, Clone)]
pub struct TrigramModel {
    words: Vec<String>,
    unigrams: Vec<Gram>,
    bigrams: HashMap<(LmWordId, LmWordId), Gram>,
    trigrams: HashMap<(LmWordId, LmWordId, LmWordId), Score>,
    dict_to_lm: Vec<Option<LmWordId>>,
    silence_word: Option<WordId>,
    start: Option<LmWordId>,
    finish: Option<LmWordId>,
    logmath: LogMath,
    language_weight: f64,
    insertion_penalty: Score,
    silence_penalty: Score,
    filler_penalty: Score,
}

impl TrigramModel {
    pub fn from_definition(
        def: &LanguageModelDefinition,
        logmath: &LogMath,
        dict: &dyn Dictionary,
    ) -> Result<Self, DecoderError> {
        if def.language_weight <= 0.0 {
            return Err(DecoderError::config("language weight must be positive"));
        }
        if !(def.word_insertion_penalty > 0.0 && def.word_insertion_penalty <= 1.0) {
            return Err(DecoderError::config(
                "word insertion penalty must be a probability in (0, 1]",
            ));
        }
        let mut index: HashMap<&str, LmWordId> = HashMap::new();
        let mut words = Vec::with_capacity(def.unigrams.len());
        let mut unigrams = Vec::with_capacity(def.unigrams.len());
        for u in &def.unigrams {
            if index.insert(u.word.as_str(), words.len() as LmWordId).is_some() {
                return Err(DecoderError::config(format!(
                    "duplicate unigram '{}'",
                    u.word
                )));
            }
            words.push(u.word.clone());
            unigrams.push(Gram {
                prob: logmath.from_log10(u.log10_prob),
                backoff: logmath.from_log10(u.log10_backoff),
            });
        }
        let lookup = |w: &str| {
            index
                .get(w)
                .copied()
                .ok_or_else(|| DecoderError::config(format!("n-gram uses unknown word '{w}'")))
        };

        let mut bigrams = HashMap::with_capacity(def.bigrams.len());
        for b in &def.bigrams {
            let [w1, w2] = b.words.as_slice() else {
                return Err(DecoderError::config("bigram entry needs exactly two words"));
            };
            bigrams.insert(
                (lookup(w1.as_str())?, lookup(w2.as_str())?),
                Gram {
                    prob: logmath.from_log10(b.log10_prob),
                    backoff: logmath.from_log10(b.log10_backoff),
                },
            );
        }
        let mut trigrams = HashMap::with_capacity(def.trigrams.len());
        for t in &def.trigrams {
            let [w1, w2, w3] = t.words.as_slice() else {
                return Err(DecoderError::config("trigram entry needs exactly three words"));
            };
            trigrams.insert(
                (lookup(w1.as_str())?, lookup(w2.as_str())?, lookup(w3.as_str())?),
                logmath.from_log10(t.log10_prob),
            );
        }

        let dict_to_lm = (0..dict.n_words() as WordId)
            .map(|w| {
                let base = dict.base_word(w);
                index.get(dict.word_str(base)).copied()
            })
            .collect();

        let weighted = |p: f64| {
            logmath::add(
                logmath.scale(logmath.log(p), def.language_weight),
                logmath.log(def.word_insertion_penalty),
            )
        };
        Ok(Self {
            start: index.get(START_WORD).copied(),
            finish: index.get(FINISH_WORD).copied(),
            words,
            unigrams,
            bigrams,
            trigrams,
            dict_to_lm,
            silence_word: dict.silence_word(),
            logmath: *logmath,
            language_weight: def.language_weight,
            insertion_penalty: logmath.log(def.word_insertion_penalty),
            silence_penalty: weighted(def.silence_prob),
            filler_penalty: weighted(def.filler_prob),
        })
    }

    pub fn lm_word_str(&self, lm_word: LmWordId) -> &str {
        &self.words[lm_word as usize]
    }

    fn raw_bigram(&self, newer: Option<LmWordId>, candidate: LmWordId) -> Score {
        let uni = self.unigrams[candidate as usize].prob;
        match newer {
            Some(w) => match self.bigrams.get(&(w, candidate)) {
                Some(g) => g.prob,
                None => logmath::add(self.unigrams[w as usize].backoff, uni),
            },
            None => uni,
        }
    }

    fn raw_trigram(
        &self,
        older: Option<LmWordId>,
        newer: Option<LmWordId>,
        candidate: LmWordId,
    ) -> Score {
        if let (Some(w1), Some(w2)) = (older, newer) {
            if let Some(&p) = self.trigrams.get(&(w1, w2, candidate)) {
                return p;
            }
            let backoff = self.bigrams.get(&(w1, w2)).map_or(0, |g| g.backoff);
            return logmath::add(backoff, self.raw_bigram(newer, candidate));
        }
        self.raw_bigram(newer, candidate)
    }
}

impl LanguageModel for TrigramModel {
    fn lm_word(&self, word: WordId) -> Option<LmWordId> {
        self.dict_to_lm.get(word as usize).copied().flatten()
    }

    fn start_lm_word(&self) -> Option<LmWordId> {
        self.start
    }

    fn finish_lm_word(&self) -> Option<LmWordId> {
        self.finish
    }

    fn trigram_score(
        &self,
        older: Option<LmWordId>,
        newer: Option<LmWordId>,
        candidate: LmWordId,
    ) -> Score {
        let raw = self.raw_trigram(older, newer, candidate);
        logmath::add(
            self.logmath.scale(raw, self.language_weight),
            self.insertion_penalty,
        )
    }

    fn filler_penalty(&self, word: WordId) -> Score {
        if Some(word) == self.silence_word {
            self.silence_penalty
        } else {
            self.filler_penalty
        }
    }
}

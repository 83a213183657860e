//! Tiny in-memory models shared by the search unit tests.

use std::sync::Arc;

use crate::config::DecoderConfig;
use crate::logmath::{LogMath, Score};
use crate::model::context_table::{
    ContextTable, ContextTableDefinition, ModelDefinition, PhoneDefinition,
};
use crate::model::dictionary::{PronunciationDictionary, FINISH_WORD, SILENCE_WORD, START_WORD};
use crate::model::tmat::TransitionMatrixDefinition;
use crate::model::trigram::{
    LanguageModelDefinition, NgramDefinition, TrigramModel, UnigramDefinition,
};
use crate::pipeline::context::DecoderContext;
use crate::pipeline::traits::Dictionary;
use crate::types::{PhoneId, WordId, WordPosition};

pub(crate) const SIL: PhoneId = 0;
pub(crate) const K: PhoneId = 1;
pub(crate) const AE: PhoneId = 2;
pub(crate) const T: PhoneId = 3;
pub(crate) const P: PhoneId = 4;
pub(crate) const NOISE: PhoneId = 5;

const PHONES: [(&str, bool); 6] = [
    ("SIL", true),
    ("K", false),
    ("AE", false),
    ("T", false),
    ("P", false),
    ("+NOISE+", true),
];

fn model(phone: &str, ctx: Option<(&str, &str, WordPosition)>, first: u32) -> ModelDefinition {
    ModelDefinition {
        phone: phone.to_string(),
        left: ctx.map(|c| c.0.to_string()),
        right: ctx.map(|c| c.1.to_string()),
        position: ctx.map(|c| c.2),
        senones: vec![first, first + 1, first + 2],
        tmat: 0,
    }
}

/// Context-independent 3-state models, senones `3p..3p+2` for phone `p`.
/// With `triphones`, adds T(AE,SIL,End), T(AE,K,End) and K(T,AE,Begin).
pub(crate) fn phone_table(triphones: bool) -> ContextTable {
    let mut models: Vec<ModelDefinition> = PHONES
        .iter()
        .enumerate()
        .map(|(i, (name, _))| model(name, None, 3 * i as u32))
        .collect();
    if triphones {
        models.push(model("T", Some(("AE", "SIL", WordPosition::End)), 18));
        models.push(model("T", Some(("AE", "K", WordPosition::End)), 21));
        models.push(model("K", Some(("T", "AE", WordPosition::Begin)), 24));
    }
    let def = ContextTableDefinition {
        phones: PHONES
            .iter()
            .map(|(name, filler)| PhoneDefinition {
                name: name.to_string(),
                filler: *filler,
            })
            .collect(),
        silence: "SIL".to_string(),
        transition_matrices: vec![TransitionMatrixDefinition {
            probs: vec![
                vec![0.1, 0.9, 0.0, 0.0],
                vec![0.0, 0.1, 0.9, 0.0],
                vec![0.0, 0.0, 0.1, 0.9],
            ],
        }],
        models,
    };
    ContextTable::from_definition(&def, &LogMath::default()).expect("fixture phone table")
}

/// `<s>`, `</s>`, `<sil>`, `++noise++` plus the given words.
pub(crate) fn dictionary(words: &[(&str, &[PhoneId])]) -> PronunciationDictionary {
    let mut dict = PronunciationDictionary::default();
    dict.add_word(START_WORD, vec![SIL], false).unwrap();
    dict.add_word(FINISH_WORD, vec![SIL], false).unwrap();
    dict.add_word(SILENCE_WORD, vec![SIL], true).unwrap();
    dict.add_word("++noise++", vec![NOISE], true).unwrap();
    for (w, pron) in words {
        dict.add_word(w, pron.to_vec(), false).unwrap();
    }
    dict
}

pub(crate) fn cat_cap_dictionary() -> PronunciationDictionary {
    dictionary(&[("cat", &[K, AE, T]), ("cap", &[K, AE, P])])
}

fn gram(words: &[&str], p: f64) -> NgramDefinition {
    NgramDefinition {
        words: words.iter().map(|w| w.to_string()).collect(),
        log10_prob: p.log10(),
        log10_backoff: 0.0,
    }
}

/// Unweighted bigram model over the dictionary's real words with the given
/// probabilities after `<s>`. Every word is followed by `</s>` with certainty.
pub(crate) fn language_model(
    dict: &PronunciationDictionary,
    after_start: &[(&str, f64)],
) -> TrigramModel {
    let mut unigrams = vec![
        UnigramDefinition {
            word: START_WORD.to_string(),
            log10_prob: -99.0,
            log10_backoff: 0.0,
        },
        UnigramDefinition {
            word: FINISH_WORD.to_string(),
            log10_prob: -1.0,
            log10_backoff: 0.0,
        },
    ];
    let mut bigrams = Vec::new();
    for (w, p) in after_start {
        unigrams.push(UnigramDefinition {
            word: w.to_string(),
            log10_prob: -1.0,
            log10_backoff: 0.0,
        });
        bigrams.push(gram(&[START_WORD, w], *p));
        bigrams.push(gram(&[w, FINISH_WORD], 1.0));
    }
    let def = LanguageModelDefinition {
        unigrams,
        bigrams,
        trigrams: Vec::new(),
        language_weight: 1.0,
        word_insertion_penalty: 1.0,
        silence_prob: 0.5,
        filler_prob: 0.5,
    };
    TrigramModel::from_definition(&def, &LogMath::default(), dict).expect("fixture lm")
}

pub(crate) fn context_with(
    config: &DecoderConfig,
    phones: ContextTable,
    dict: PronunciationDictionary,
    after_start: &[(&str, f64)],
) -> Arc<DecoderContext> {
    let lm = language_model(&dict, after_start);
    Arc::new(
        DecoderContext::new(config, Arc::new(dict), Arc::new(phones), Arc::new(lm))
            .expect("fixture context"),
    )
}

pub(crate) fn cat_cap_context(config: &DecoderConfig) -> Arc<DecoderContext> {
    context_with(
        config,
        phone_table(false),
        cat_cap_dictionary(),
        &[("cat", 0.5), ("cap", 0.5)],
    )
}

pub(crate) fn word(ctx: &DecoderContext, text: &str) -> WordId {
    (0..ctx.dictionary.n_words() as WordId)
        .find(|&w| ctx.dictionary.word_str(w) == text)
        .expect("word in fixture dictionary")
}

/// Senone frame where the three senones of `phone` score 0 and all others `other`.
pub(crate) fn phone_frame(phone: PhoneId, other: Score) -> Vec<Score> {
    let mut frame = vec![other; 3 * PHONES.len()];
    for s in 3 * phone as usize..3 * phone as usize + 3 {
        frame[s] = 0;
    }
    frame
}

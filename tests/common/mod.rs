#![allow(dead_code)]

use lextree_decoder::{
    Decoder, DecoderBuilder, DecoderConfig, ModelDefinitions, PrecomputedScores, Score,
};

pub const SIL: usize = 0;
pub const K: usize = 1;
pub const AE: usize = 2;
pub const T: usize = 3;
pub const P: usize = 4;
pub const NOISE: usize = 5;

pub const N_SENONES: usize = 18;
pub const MISMATCH: Score = -100_000;

const MODELS: &str = r#"{
    "phones": {
        "phones": [
            {"name": "SIL", "filler": true},
            {"name": "K"},
            {"name": "AE"},
            {"name": "T"},
            {"name": "P"},
            {"name": "+NOISE+", "filler": true}
        ],
        "silence": "SIL",
        "transition_matrices": [
            {"probs": [[0.1, 0.9, 0.0, 0.0], [0.0, 0.1, 0.9, 0.0], [0.0, 0.0, 0.1, 0.9]]}
        ],
        "models": [
            {"phone": "SIL", "senones": [0, 1, 2], "tmat": 0},
            {"phone": "K", "senones": [3, 4, 5], "tmat": 0},
            {"phone": "AE", "senones": [6, 7, 8], "tmat": 0},
            {"phone": "T", "senones": [9, 10, 11], "tmat": 0},
            {"phone": "P", "senones": [12, 13, 14], "tmat": 0},
            {"phone": "+NOISE+", "senones": [15, 16, 17], "tmat": 0}
        ]
    },
    "dictionary": [
        {"word": "<s>", "phones": ["SIL"]},
        {"word": "</s>", "phones": ["SIL"]},
        {"word": "<sil>", "phones": ["SIL"], "filler": true},
        {"word": "++noise++", "phones": ["+NOISE+"], "filler": true},
        {"word": "cat", "phones": ["K", "AE", "T"]},
        {"word": "cap", "phones": ["K", "AE", "P"]}
    ],
    "language_model": {
        "unigrams": [
            {"word": "<s>", "log10_prob": -99.0},
            {"word": "</s>", "log10_prob": -1.0},
            {"word": "cat", "log10_prob": -1.0},
            {"word": "cap", "log10_prob": -1.0}
        ],
        "bigrams": [
            {"words": ["<s>", "cat"], "log10_prob": -0.30103},
            {"words": ["<s>", "cap"], "log10_prob": -0.30103},
            {"words": ["cat", "</s>"], "log10_prob": -0.30103},
            {"words": ["cap", "</s>"], "log10_prob": -0.30103},
            {"words": ["cat", "cap"], "log10_prob": -0.30103}
        ],
        "language_weight": 1.0,
        "word_insertion_penalty": 1.0,
        "silence_prob": 0.5,
        "filler_prob": 0.5
    }
}"#;

pub fn definitions() -> ModelDefinitions {
    serde_json::from_str(MODELS).expect("test model definitions parse")
}

/// Same models with the `<s> cat` and `<s> cap` bigrams replaced.
pub fn definitions_with_start(cat_log10: f64, cap_log10: f64) -> ModelDefinitions {
    let mut models: serde_json::Value = serde_json::from_str(MODELS).expect("test models parse");
    let bigrams = models["language_model"]["bigrams"]
        .as_array_mut()
        .expect("bigram list");
    for gram in bigrams {
        let next = match (gram["words"][0].as_str(), gram["words"][1].as_str()) {
            (Some("<s>"), Some("cat")) => cat_log10,
            (Some("<s>"), Some("cap")) => cap_log10,
            _ => continue,
        };
        gram["log10_prob"] = serde_json::json!(next);
    }
    serde_json::from_value(models).expect("edited model definitions parse")
}

pub fn decoder(config: DecoderConfig) -> Decoder {
    decoder_from(config, definitions())
}

pub fn decoder_from(config: DecoderConfig, definitions: ModelDefinitions) -> Decoder {
    DecoderBuilder::new(config)
        .with_definitions(definitions)
        .build()
        .expect("test decoder builds")
}

/// One frame per phone in `phones`: the three senones of that phone score 0,
/// everything else `MISMATCH`.
pub fn frames(phones: &[usize]) -> Vec<Vec<Score>> {
    phones
        .iter()
        .map(|&p| {
            let mut row = vec![MISMATCH; N_SENONES];
            row[3 * p..3 * p + 3].fill(0);
            row
        })
        .collect()
}

/// Three frames per phone, the fastest path through a 3-state model.
pub fn spoken(phones: &[usize]) -> Vec<usize> {
    phones.iter().flat_map(|&p| [p, p, p]).collect()
}

pub fn scorer(phones: &[usize]) -> PrecomputedScores {
    PrecomputedScores::new(N_SENONES, frames(&spoken(phones))).expect("test scores")
}

/// `phones` spoken as usual, then three frames where every phone in `tied`
/// matches equally well.
pub fn scorer_with_tied_end(phones: &[usize], tied: &[usize]) -> PrecomputedScores {
    let mut rows = frames(&spoken(phones));
    for _ in 0..3 {
        let mut row = vec![MISMATCH; N_SENONES];
        for &p in tied {
            row[3 * p..3 * p + 3].fill(0);
        }
        rows.push(row);
    }
    PrecomputedScores::new(N_SENONES, rows).expect("test scores")
}

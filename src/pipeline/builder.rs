use std::sync::Arc;

use crate::config::DecoderConfig;
use crate::error::DecoderError;
use crate::model::ModelDefinitions;
use crate::pipeline::context::DecoderContext;
use crate::pipeline::runtime::{Decoder, DecoderParts};
use crate::pipeline::traits::{Dictionary, LanguageModel, PhoneContextModel};
use crate::search::lextree::{LexTree, LexTreeParams};
use crate::types::WordId;

pub struct DecoderBuilder {
    config: DecoderConfig,
    definitions: Option<ModelDefinitions>,
    dictionary: Option<Arc<dyn Dictionary>>,
    phones: Option<Arc<dyn PhoneContextModel>>,
    language_model: Option<Arc<dyn LanguageModel>>,
}

impl DecoderBuilder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            definitions: None,
            dictionary: None,
            phones: None,
            language_model: None,
        }
    }

    /// In-memory models used for every collaborator not set explicitly.
    pub fn with_definitions(mut self, definitions: ModelDefinitions) -> Self {
        self.definitions = Some(definitions);
        self
    }

    pub fn with_dictionary(mut self, dictionary: Arc<dyn Dictionary>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn with_phone_model(mut self, phones: Arc<dyn PhoneContextModel>) -> Self {
        self.phones = Some(phones);
        self
    }

    pub fn with_language_model(mut self, language_model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(language_model);
        self
    }

    pub fn build(self) -> Result<Decoder, DecoderError> {
        let logmath = self.config.validate()?;
        let (dictionary, phones, language_model) = match &self.definitions {
            Some(defs) => {
                let models = defs.build(&logmath)?;
                (
                    Some(Arc::new(models.dictionary) as Arc<dyn Dictionary>),
                    Some(Arc::new(models.phones) as Arc<dyn PhoneContextModel>),
                    Some(Arc::new(models.language_model) as Arc<dyn LanguageModel>),
                )
            }
            None => (None, None, None),
        };
        let dictionary = self
            .dictionary
            .or(dictionary)
            .ok_or_else(|| DecoderError::config("no dictionary configured"))?;
        let phones = self
            .phones
            .or(phones)
            .ok_or_else(|| DecoderError::config("no phone model configured"))?;
        let language_model = self
            .language_model
            .or(language_model)
            .ok_or_else(|| DecoderError::config("no language model configured"))?;

        let context = DecoderContext::new(&self.config, dictionary, phones, language_model)?;
        let word_tree = build_word_tree(&context, &self.config)?;
        let filler_tree = build_filler_tree(&context)?;

        tracing::info!(
            hmm_beam = context.beams.hmm,
            phone_beam = context.beams.phone,
            word_beam = context.beams.word,
            max_hmm_per_frame = self.config.max_hmm_per_frame,
            tree_copies = self.config.lextree_copies,
            entries_per_copy = self.config.entries_per_lextree,
            "built decoder"
        );

        Ok(Decoder::from_parts(DecoderParts {
            context: Arc::new(context),
            word_tree: Arc::new(word_tree),
            filler_tree: Arc::new(filler_tree),
            tree_copies: self.config.lextree_copies,
            entries_per_copy: self.config.entries_per_lextree,
            write_lattice: self.config.write_lattice,
        }))
    }
}

/// Real words with an LM id; sentinels and fillers are excluded.
fn build_word_tree(ctx: &DecoderContext, config: &DecoderConfig) -> Result<LexTree, DecoderError> {
    let n_words = ctx.dictionary.n_words() as WordId;
    let mut skipped = 0usize;
    let active: Vec<bool> = (0..n_words)
        .map(|w| {
            if w == ctx.start_word || w == ctx.finish_word || ctx.is_filler(w) {
                return false;
            }
            let known = ctx.lm.lm_word(w).is_some();
            if !known {
                skipped += 1;
            }
            known
        })
        .collect();
    if skipped > 0 {
        tracing::warn!(skipped, "words without a language model entry left out of the search");
    }
    if !active.iter().any(|&on| on) {
        return Err(DecoderError::config("no decodable words in the dictionary"));
    }
    LexTree::build(
        "words",
        &active,
        ctx.dictionary.as_ref(),
        ctx.phones.as_ref(),
        LexTreeParams {
            flatten_depth: config.flatten_depth,
            left_context_roots: config.left_context_roots,
            cross_word_triphones: config.cross_word_triphones,
        },
    )
}

/// Filler words, each a private context-free chain.
fn build_filler_tree(ctx: &DecoderContext) -> Result<LexTree, DecoderError> {
    let active: Vec<bool> = (0..ctx.dictionary.n_words() as WordId)
        .map(|w| ctx.is_filler(w))
        .collect();
    LexTree::build(
        "fillers",
        &active,
        ctx.dictionary.as_ref(),
        ctx.phones.as_ref(),
        LexTreeParams {
            flatten_depth: 0,
            left_context_roots: false,
            cross_word_triphones: false,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dictionary::PronunciationDictionary;
    use crate::search::fixtures::{cat_cap_dictionary, dictionary, language_model, phone_table, AE, K, T};

    fn builder(config: DecoderConfig, dict: PronunciationDictionary, lm_words: &[(&str, f64)]) -> DecoderBuilder {
        let lm = language_model(&dict, lm_words);
        DecoderBuilder::new(config)
            .with_dictionary(Arc::new(dict))
            .with_phone_model(Arc::new(phone_table(false)))
            .with_language_model(Arc::new(lm))
    }

    #[test]
    fn builds_word_and_filler_trees() {
        let decoder = builder(DecoderConfig::default(), cat_cap_dictionary(), &[("cat", 0.5), ("cap", 0.5)])
            .build()
            .expect("decoder builds");
        assert_eq!(decoder.word_tree().n_words(), 2);
        assert_eq!(decoder.filler_tree().n_words(), 2);
        assert_eq!(decoder.filler_tree().root_lists().len(), 1);
    }

    #[test]
    fn words_missing_from_the_lm_are_left_out() {
        let dict = dictionary(&[("cat", &[K, AE, T]), ("oov", &[AE])]);
        let decoder = builder(DecoderConfig::default(), dict, &[("cat", 1.0)]).build().unwrap();
        assert_eq!(decoder.word_tree().n_words(), 1);
    }

    #[test]
    fn missing_collaborator_is_a_configuration_error() {
        let err = DecoderBuilder::new(DecoderConfig::default())
            .with_phone_model(Arc::new(phone_table(false)))
            .build()
            .err()
            .expect("build fails");
        assert!(matches!(err, DecoderError::Config { .. }));
    }

    #[test]
    fn invalid_beam_is_rejected() {
        let config = DecoderConfig {
            beam: 0.0,
            ..DecoderConfig::default()
        };
        let result = builder(config, cat_cap_dictionary(), &[("cat", 1.0)]).build();
        assert!(matches!(result, Err(DecoderError::Config { .. })));
    }

    #[test]
    fn builds_from_json_definitions() {
        let json = r#"{
            "phones": {
                "phones": [
                    {"name": "SIL", "filler": true},
                    {"name": "AH"}
                ],
                "silence": "SIL",
                "transition_matrices": [
                    {"probs": [[0.5, 0.5, 0.0, 0.0], [0.0, 0.5, 0.5, 0.0], [0.0, 0.0, 0.5, 0.5]]}
                ],
                "models": [
                    {"phone": "SIL", "senones": [0, 1, 2], "tmat": 0},
                    {"phone": "AH", "senones": [3, 4, 5], "tmat": 0}
                ]
            },
            "dictionary": [
                {"word": "<s>", "phones": ["SIL"]},
                {"word": "</s>", "phones": ["SIL"]},
                {"word": "<sil>", "phones": ["SIL"], "filler": true},
                {"word": "ah", "phones": ["AH"]}
            ],
            "language_model": {
                "unigrams": [
                    {"word": "<s>", "log10_prob": -99.0},
                    {"word": "</s>", "log10_prob": -0.3},
                    {"word": "ah", "log10_prob": -0.3}
                ]
            }
        }"#;
        let defs: ModelDefinitions = serde_json::from_str(json).expect("definitions parse");
        let decoder = DecoderBuilder::new(DecoderConfig::default())
            .with_definitions(defs)
            .build()
            .expect("decoder builds");
        assert_eq!(decoder.word_tree().n_words(), 1);
        assert_eq!(decoder.context().phones.n_senones(), 6);
    }
}

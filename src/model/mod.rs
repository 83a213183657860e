use std::path::Path;

use serde::Deserialize;

use crate::error::DecoderError;
use crate::logmath::LogMath;

pub mod context_table;
pub mod dictionary;
pub mod tmat;
pub mod trigram;

use context_table::{ContextTable, ContextTableDefinition};
use dictionary::{DictionaryEntry, PronunciationDictionary};
use trigram::{LanguageModelDefinition, TrigramModel};

/// JSON form of the three in-memory models.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDefinitions {
    pub phones: ContextTableDefinition,
    pub dictionary: Vec<DictionaryEntry>,
    pub language_model: LanguageModelDefinition,
}

/// Models built from [`ModelDefinitions`].
#[derive(Debug, Clone)]
pub struct InMemoryModels {
    pub phones: ContextTable,
    pub dictionary: PronunciationDictionary,
    pub language_model: TrigramModel,
}

impl ModelDefinitions {
    pub fn load(path: &Path) -> Result<Self, DecoderError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DecoderError::io("read model definitions", e))?;
        serde_json::from_str(&data).map_err(|e| DecoderError::json("parse model definitions", e))
    }

    pub fn build(&self, logmath: &LogMath) -> Result<InMemoryModels, DecoderError> {
        let phones = ContextTable::from_definition(&self.phones, logmath)?;
        let dictionary = PronunciationDictionary::from_entries(&self.dictionary, &phones)?;
        let language_model = TrigramModel::from_definition(&self.language_model, logmath, &dictionary)?;
        Ok(InMemoryModels {
            phones,
            dictionary,
            language_model,
        })
    }
}

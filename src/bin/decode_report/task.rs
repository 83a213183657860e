use std::fs;
use std::path::Path;

use serde::Deserialize;

use lextree_decoder::{DecoderConfig, ModelDefinitions, Score};

/// A decoding task: the models plus one senone-score matrix per utterance.
#[derive(Debug, Deserialize)]
pub struct Task {
    pub models: ModelDefinitions,
    #[serde(default)]
    pub config: Option<DecoderConfig>,
    pub utterances: Vec<TaskUtterance>,
}

#[derive(Debug, Deserialize)]
pub struct TaskUtterance {
    pub id: String,
    /// Expected word sequence, space separated.
    #[serde(default)]
    pub reference: Option<String>,
    /// Senone scores in the decoder's integer log domain, one row per frame.
    pub frames: Vec<Vec<Score>>,
}

pub fn load_task(path: &Path) -> Result<Task, String> {
    let data = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read task file '{}': {err}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|err| format!("Failed to parse task file '{}': {err}", path.display()))
}

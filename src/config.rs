use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DecoderError;
use crate::logmath::LogMath;

/// How exits of a frame re-enter the word tree roots for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootEntry {
    /// One entry per distinct final phone, using the best exit ending in it.
    BestPerFinalPhone,
    /// Every surviving history enters the roots of its own final phone.
    AllSurvivors,
}

/// Decoder parameters. Beams are probabilities relative to the frame best,
/// converted to log-domain integers once at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub beam: f64,
    pub phone_beam: f64,
    pub word_beam: f64,
    /// Relative beam for root re-entry per final phone; disabled when `None`.
    pub word_end_beam: Option<f64>,
    /// 0 disables the adaptive histogram beam.
    pub max_hmm_per_frame: usize,
    pub max_words_per_frame: usize,
    pub max_histories_per_frame: usize,
    /// Every n-th frame phone transitions use the word beam; 0 disables.
    pub phone_transition_skip: u32,
    pub flatten_depth: usize,
    pub lextree_copies: usize,
    pub entries_per_lextree: usize,
    pub left_context_roots: bool,
    pub cross_word_triphones: bool,
    pub bigram_history: bool,
    pub root_entry: RootEntry,
    pub log_base: f64,
    pub write_lattice: bool,
}

impl DecoderConfig {
    pub const DEFAULT_BEAM: f64 = 1e-55;
    pub const DEFAULT_PHONE_BEAM: f64 = 1e-50;
    pub const DEFAULT_WORD_BEAM: f64 = 1e-35;
    pub const DEFAULT_MAX_WORDS_PER_FRAME: usize = 20;
    pub const DEFAULT_MAX_HISTORIES_PER_FRAME: usize = 100;
    pub const DEFAULT_FLATTEN_DEPTH: usize = 2;
    pub const DEFAULT_LEXTREE_COPIES: usize = 3;
    pub const DEFAULT_ENTRIES_PER_LEXTREE: usize = 3;

    pub fn load(path: &Path) -> Result<Self, DecoderError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DecoderError::io("read decoder config", e))?;
        serde_json::from_str(&data).map_err(|e| DecoderError::json("parse decoder config", e))
    }

    pub(crate) fn validate(&self) -> Result<LogMath, DecoderError> {
        let logmath = LogMath::new(self.log_base).ok_or_else(|| {
            DecoderError::config(format!("log base must be > 1, got {}", self.log_base))
        })?;
        let beams = [
            ("beam", Some(self.beam)),
            ("phone_beam", Some(self.phone_beam)),
            ("word_beam", Some(self.word_beam)),
            ("word_end_beam", self.word_end_beam),
        ];
        for (name, value) in beams {
            if let Some(p) = value {
                if !(p > 0.0 && p <= 1.0) {
                    return Err(DecoderError::config(format!(
                        "{name} must be a probability in (0, 1], got {p}"
                    )));
                }
            }
        }
        if self.lextree_copies == 0 || self.entries_per_lextree == 0 {
            return Err(DecoderError::config(
                "lextree_copies and entries_per_lextree must be at least 1",
            ));
        }
        if self.max_words_per_frame == 0 || self.max_histories_per_frame == 0 {
            return Err(DecoderError::config(
                "per-frame word and history limits must be at least 1",
            ));
        }
        Ok(logmath)
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam: Self::DEFAULT_BEAM,
            phone_beam: Self::DEFAULT_PHONE_BEAM,
            word_beam: Self::DEFAULT_WORD_BEAM,
            word_end_beam: None,
            max_hmm_per_frame: 0,
            max_words_per_frame: Self::DEFAULT_MAX_WORDS_PER_FRAME,
            max_histories_per_frame: Self::DEFAULT_MAX_HISTORIES_PER_FRAME,
            phone_transition_skip: 0,
            flatten_depth: Self::DEFAULT_FLATTEN_DEPTH,
            lextree_copies: Self::DEFAULT_LEXTREE_COPIES,
            entries_per_lextree: Self::DEFAULT_ENTRIES_PER_LEXTREE,
            left_context_roots: true,
            cross_word_triphones: false,
            bigram_history: false,
            root_entry: RootEntry::BestPerFinalPhone,
            log_base: LogMath::DEFAULT_BASE,
            write_lattice: true,
        }
    }
}

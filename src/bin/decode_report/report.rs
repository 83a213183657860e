use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use lextree_decoder::{DecodeOutcome, UttStats, UtteranceResult, WordSegment};

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub schema_version: u32,
    pub meta: Meta,
    pub utterances: Vec<UtteranceReport>,
    pub aggregates: Aggregates,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub generated_at: String,
    pub task_path: String,
    pub log_base: f64,
    pub utterance_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UtteranceReport {
    pub id: String,
    pub outcome: &'static str,
    pub hypothesis: Option<String>,
    pub reference: Option<String>,
    pub sentence_correct: Option<bool>,
    pub total_score: Option<i32>,
    pub segments: Vec<WordSegment>,
    pub detail: Option<String>,
    pub lattice_path: Option<String>,
    pub stats: UttStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregates {
    pub recognized: usize,
    pub no_recognition: usize,
    pub aborted: usize,
    pub sentence_accuracy: Option<f64>,
    pub total_frames: u64,
    pub hmm_evaluated_per_frame: f64,
    pub peak_active: u32,
    pub peak_survivors: u32,
    pub tightened_frames: u64,
}

impl Report {
    /// Writes the report as pretty JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), String> {
        let describe = |what: &str, err: &dyn std::fmt::Display| {
            format!("Failed to {what} report '{}': {err}", path.display())
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|err| describe("create the directory of", &err))?;
        }
        let file = fs::File::create(path).map_err(|err| describe("create", &err))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, self).map_err(|err| describe("serialize", &err))?;
        writeln!(out)
            .and_then(|()| out.flush())
            .map_err(|err| describe("finish", &err))
    }
}

impl UtteranceReport {
    pub fn from_result(
        result: &UtteranceResult,
        reference: Option<&str>,
        lattice_path: Option<String>,
    ) -> Self {
        let hypothesis = result.outcome.hypothesis();
        let text = hypothesis.map(|h| h.text());
        let sentence_correct = match (&text, reference) {
            (Some(hyp), Some(reference)) => Some(normalize(hyp) == normalize(reference)),
            (None, Some(_)) => Some(false),
            _ => None,
        };
        let detail = match &result.outcome {
            DecodeOutcome::Recognized { .. } => None,
            DecodeOutcome::NoRecognition { reason } => Some(reason.clone()),
            DecodeOutcome::Aborted { error } => Some(error.to_string()),
        };
        Self {
            id: result.utt_id.clone(),
            outcome: result.outcome.label(),
            hypothesis: text,
            reference: reference.map(str::to_string),
            sentence_correct,
            total_score: hypothesis.map(|h| h.total_score),
            segments: hypothesis.map(|h| h.segments.clone()).unwrap_or_default(),
            detail,
            lattice_path,
            stats: result.stats.clone(),
        }
    }

    /// Input that never reached the decoder, e.g. a malformed score matrix.
    pub fn rejected(id: &str, reference: Option<&str>, detail: String) -> Self {
        Self {
            id: id.to_string(),
            outcome: "aborted",
            hypothesis: None,
            reference: reference.map(str::to_string),
            sentence_correct: reference.map(|_| false),
            total_score: None,
            segments: Vec::new(),
            detail: Some(detail),
            lattice_path: None,
            stats: UttStats::default(),
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn aggregate(utterances: &[UtteranceReport]) -> Aggregates {
    let mut agg = Aggregates::default();
    let mut hmm_evaluated = 0u64;
    let (mut scored, mut correct) = (0usize, 0usize);
    for u in utterances {
        match u.outcome {
            "recognized" => agg.recognized += 1,
            "no_recognition" => agg.no_recognition += 1,
            _ => agg.aborted += 1,
        }
        if let Some(ok) = u.sentence_correct {
            scored += 1;
            correct += usize::from(ok);
        }
        agg.total_frames += u64::from(u.stats.frames);
        hmm_evaluated += u.stats.hmm_evaluated;
        agg.peak_active = agg.peak_active.max(u.stats.peak_active);
        agg.peak_survivors = agg.peak_survivors.max(u.stats.peak_survivors);
        agg.tightened_frames += u64::from(u.stats.tightened_frames);
    }
    if scored > 0 {
        agg.sentence_accuracy = Some(correct as f64 / scored as f64);
    }
    if agg.total_frames > 0 {
        agg.hmm_evaluated_per_frame = hmm_evaluated as f64 / agg.total_frames as f64;
    }
    agg
}

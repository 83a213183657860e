use serde::Serialize;

use crate::logmath::Score;

pub type WordId = u32;
pub type LmWordId = u32;
pub type PhoneId = u32;
pub type SenoneId = u32;
pub type PhoneModelId = u32;
pub type TmatId = u32;
/// Index of an entry in the word history table.
pub type HistoryId = u32;

/// Position of a phone within its word, used for context-dependent model lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordPosition {
    Begin,
    Internal,
    End,
    Single,
}

impl WordPosition {
    pub fn of(index: usize, len: usize) -> Self {
        match (index, len) {
            (_, 1) => Self::Single,
            (0, _) => Self::Begin,
            (i, n) if i + 1 == n => Self::End,
            _ => Self::Internal,
        }
    }

    /// Lookup order tried after the exact position fails.
    pub(crate) fn alternates(self) -> [Self; 3] {
        match self {
            Self::Begin => [Self::Internal, Self::Single, Self::End],
            Self::Internal => [Self::Begin, Self::End, Self::Single],
            Self::End => [Self::Internal, Self::Single, Self::Begin],
            Self::Single => [Self::Begin, Self::End, Self::Internal],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Word,
    Filler,
    End,
}

/// One word of a decoded hypothesis. Frames are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordSegment {
    pub word_id: WordId,
    pub word: String,
    pub start_frame: u32,
    pub end_frame: u32,
    pub acoustic_score: Score,
    pub lm_score: Score,
    pub kind: SegmentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    pub segments: Vec<WordSegment>,
    pub total_score: Score,
}

impl Hypothesis {
    /// Real words only, without fillers and the end sentinel.
    pub fn words(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Word)
            .map(|s| s.word.as_str())
            .collect()
    }

    pub fn text(&self) -> String {
        self.words().join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UttStats {
    pub frames: u32,
    pub hmm_evaluated: u64,
    pub word_exits: u64,
    pub history_entries: u64,
    pub peak_active: u32,
    /// Most chains kept by the survival beam in a single frame.
    pub peak_survivors: u32,
    pub tightened_frames: u32,
    /// Number of frames whose active HMM count fell in each bucket of
    /// `ACTIVE_HISTOGRAM_BUCKET` chains.
    pub active_histogram: Vec<u32>,
    /// Sum of per-frame senone rebasing offsets.
    pub senone_scale: i64,
}

impl UttStats {
    pub const ACTIVE_HISTOGRAM_BUCKET: u32 = 100;

    pub(crate) fn record_active(&mut self, active: u32) {
        self.peak_active = self.peak_active.max(active);
        let bucket = (active / Self::ACTIVE_HISTOGRAM_BUCKET) as usize;
        if self.active_histogram.len() <= bucket {
            self.active_histogram.resize(bucket + 1, 0);
        }
        self.active_histogram[bucket] += 1;
    }
}

#[derive(Debug)]
pub enum DecodeOutcome {
    Recognized {
        hypothesis: Hypothesis,
        lattice: Option<crate::search::lattice::Lattice>,
    },
    NoRecognition {
        reason: String,
    },
    Aborted {
        error: crate::error::DecoderError,
    },
}

impl DecodeOutcome {
    pub fn hypothesis(&self) -> Option<&Hypothesis> {
        match self {
            Self::Recognized { hypothesis, .. } => Some(hypothesis),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Recognized { .. } => "recognized",
            Self::NoRecognition { .. } => "no_recognition",
            Self::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug)]
pub struct UtteranceResult {
    pub utt_id: String,
    pub outcome: DecodeOutcome,
    pub stats: UttStats,
}

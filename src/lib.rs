pub mod config;
pub mod error;
pub mod logmath;
pub mod model;
pub mod pipeline;
pub mod search;
pub mod types;

pub use config::{DecoderConfig, RootEntry};
pub use error::DecoderError;
pub use logmath::{LogMath, Score};
pub use model::ModelDefinitions;
pub use pipeline::builder::DecoderBuilder;
pub use pipeline::context::DecoderContext;
pub use pipeline::defaults::PrecomputedScores;
pub use pipeline::runtime::{CancelFlag, Decoder, SearchSession};
pub use pipeline::traits::{AcousticScorer, Dictionary, LanguageModel, PhoneContextModel};
pub use search::lattice::Lattice;
pub use types::{
    DecodeOutcome, Hypothesis, SegmentKind, UttStats, UtteranceResult, WordSegment,
};

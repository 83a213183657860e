use std::collections::HashMap;

use serde::Deserialize;

use crate::error::DecoderError;
use crate::logmath::LogMath;
use crate::model::tmat::{PhoneModel, TransitionMatrix, TransitionMatrixDefinition};
use crate::pipeline::traits::PhoneContextModel;
use crate::types::{PhoneId, PhoneModelId, TmatId, WordPosition};

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneDefinition {
    pub name: String,
    #[serde(default)]
    pub filler: bool,
}

/// One phone model. Models without contexts are the context-independent
/// models; every phone needs exactly one.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDefinition {
    pub phone: String,
    #[serde(default)]
    pub left: Option<String>,
    #[serde(default)]
    pub right: Option<String>,
    #[serde(default)]
    pub position: Option<WordPosition>,
    pub senones: Vec<u32>,
    pub tmat: TmatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextTableDefinition {
    pub phones: Vec<PhoneDefinition>,
    pub silence: String,
    pub transition_matrices: Vec<TransitionMatrixDefinition>,
    pub models: Vec<ModelDefinition>,
}

type TriphoneKey = (PhoneId, PhoneId, PhoneId, WordPosition);

/// In-memory phone inventory with a triphone table and transition matrices.
#[derive(Debug, Clone)]
pub struct ContextTable {
    names: Vec<String>,
    fillers: Vec<bool>,
    index: HashMap<String, PhoneId>,
    silence: PhoneId,
    n_senones: usize,
    models: Vec<PhoneModel>,
    ci: Vec<PhoneModelId>,
    triphones: HashMap<TriphoneKey, PhoneModelId>,
    tmats: Vec<TransitionMatrix>,
}

impl ContextTable {
    pub fn from_definition(
        def: &ContextTableDefinition,
        logmath: &LogMath,
    ) -> Result<Self, DecoderError> {
        let mut index = HashMap::with_capacity(def.phones.len());
        for (i, phone) in def.phones.iter().enumerate() {
            if index.insert(phone.name.clone(), i as PhoneId).is_some() {
                return Err(DecoderError::config(format!(
                    "duplicate phone '{}'",
                    phone.name
                )));
            }
        }
        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| DecoderError::config(format!("unknown phone '{name}'")))
        };
        let silence = lookup(def.silence.as_str())?;

        let tmats = def
            .transition_matrices
            .iter()
            .map(|t| TransitionMatrix::from_probs(&t.probs, logmath))
            .collect::<Result<Vec<_>, _>>()?;

        let mut models = Vec::with_capacity(def.models.len());
        let mut ci: Vec<Option<PhoneModelId>> = vec![None; def.phones.len()];
        let mut triphones = HashMap::new();
        let mut n_senones = 0usize;
        for m in &def.models {
            let center = lookup(m.phone.as_str())?;
            let tmat = tmats.get(m.tmat as usize).ok_or_else(|| {
                DecoderError::config(format!("model for '{}' uses unknown tmat {}", m.phone, m.tmat))
            })?;
            if tmat.n_emit() != m.senones.len() {
                return Err(DecoderError::config(format!(
                    "model for '{}' has {} senones but its tmat has {} states",
                    m.phone,
                    m.senones.len(),
                    tmat.n_emit()
                )));
            }
            let id = models.len() as PhoneModelId;
            n_senones = n_senones.max(m.senones.iter().map(|&s| s as usize + 1).max().unwrap_or(0));
            models.push(PhoneModel {
                senones: m.senones.clone(),
                tmat: m.tmat,
            });
            match (&m.left, &m.right) {
                (None, None) => {
                    if ci[center as usize].replace(id).is_some() {
                        return Err(DecoderError::config(format!(
                            "phone '{}' has more than one context-independent model",
                            m.phone
                        )));
                    }
                }
                (Some(l), Some(r)) => {
                    let position = m.position.unwrap_or(WordPosition::Internal);
                    triphones.insert((center, lookup(l.as_str())?, lookup(r.as_str())?, position), id);
                }
                _ => {
                    return Err(DecoderError::config(format!(
                        "model for '{}' must give both contexts or neither",
                        m.phone
                    )))
                }
            }
        }
        let ci = ci
            .into_iter()
            .enumerate()
            .map(|(p, m)| {
                m.ok_or_else(|| {
                    DecoderError::config(format!(
                        "phone '{}' has no context-independent model",
                        def.phones[p].name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            names: def.phones.iter().map(|p| p.name.clone()).collect(),
            fillers: def.phones.iter().map(|p| p.filler).collect(),
            index,
            silence,
            n_senones,
            models,
            ci,
            triphones,
            tmats,
        })
    }

    pub fn n_models(&self) -> usize {
        self.models.len()
    }
}

impl PhoneContextModel for ContextTable {
    fn n_phones(&self) -> usize {
        self.names.len()
    }

    fn phone_name(&self, phone: PhoneId) -> &str {
        &self.names[phone as usize]
    }

    fn phone_id(&self, name: &str) -> Option<PhoneId> {
        self.index.get(name).copied()
    }

    fn is_filler_phone(&self, phone: PhoneId) -> bool {
        self.fillers[phone as usize]
    }

    fn silence_phone(&self) -> PhoneId {
        self.silence
    }

    fn n_senones(&self) -> usize {
        self.n_senones
    }

    fn exact_model(
        &self,
        center: PhoneId,
        left: PhoneId,
        right: PhoneId,
        position: WordPosition,
    ) -> Option<PhoneModelId> {
        self.triphones.get(&(center, left, right, position)).copied()
    }

    fn ci_model(&self, phone: PhoneId) -> PhoneModelId {
        self.ci[phone as usize]
    }

    fn phone_model(&self, model: PhoneModelId) -> &PhoneModel {
        &self.models[model as usize]
    }

    fn transition_matrix(&self, tmat: TmatId) -> &TransitionMatrix {
        &self.tmats[tmat as usize]
    }
}

//! Shared-prefix lexical tree of phone HMMs.
//!
//! The first `flatten_depth` phones of each word are shared among words with
//! a common prefix. The rest of the pronunciation, always including the
//! final phone, is a private chain of "flat" nodes, so the language model
//! score of a word is attached to nodes that belong to that word alone.
//!
//! Roots are grouped by left context (the final phone of the preceding word).
//! The tree is immutable once built and shared between decoding sessions.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DecoderError;
use crate::logmath::Score;
use crate::pipeline::traits::{Dictionary, PhoneContextModel};
use crate::types::{PhoneId, PhoneModelId, WordId, WordPosition};

pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Shared prefix node; no word identity.
    Internal,
    /// Word-specific node. `phones_left` counts the phones after this one;
    /// `flat_len` is the number of flat phones of the word.
    Word {
        word: WordId,
        phones_left: u16,
        flat_len: u16,
    },
}

#[derive(Debug, Clone)]
pub struct LexNode {
    pub kind: NodeKind,
    pub phone: PhoneId,
    pub model: PhoneModelId,
    pub n_emit: usize,
    /// Right-context class of a fanned-out word-final node.
    pub rc_class: Option<u16>,
    pub children: Vec<NodeId>,
}

impl LexNode {
    pub fn is_word_end(&self) -> bool {
        matches!(self.kind, NodeKind::Word { phones_left: 0, .. })
    }

    /// `(word, index within the flat chain, flat chain length)` for flat nodes.
    pub fn flat_position(&self) -> Option<(WordId, u16, u16)> {
        match self.kind {
            NodeKind::Word {
                word,
                phones_left,
                flat_len,
            } => Some((word, flat_len - 1 - phones_left, flat_len)),
            NodeKind::Internal => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RootList {
    /// `None` for a context-free tree.
    pub left_context: Option<PhoneId>,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy)]
pub struct LexTreeParams {
    pub flatten_depth: usize,
    pub left_context_roots: bool,
    pub cross_word_triphones: bool,
}

#[derive(Debug)]
pub struct LexTree {
    name: String,
    nodes: Vec<LexNode>,
    roots: Vec<RootList>,
    lc_lists: HashMap<PhoneId, usize>,
    silence: PhoneId,
    rc_maps: HashMap<WordId, Arc<[u16]>>,
    n_words: usize,
}

/// Share of a word's LM score paid on entry to flat node `index` of
/// `flat_len`. Every node pays the truncated quotient; the last pays the
/// remainder, so the shares sum to `total` exactly.
pub fn lm_share(total: Score, flat_len: u16, index: u16) -> Score {
    let n = Score::from(flat_len.max(1));
    let part = total / n;
    if index + 1 >= flat_len {
        total - part * (n - 1)
    } else {
        part
    }
}

struct Builder<'a> {
    phones: &'a dyn PhoneContextModel,
    nodes: Vec<LexNode>,
    roots: Vec<RootList>,
    root_index: HashMap<(PhoneId, PhoneModelId, Option<WordId>), NodeId>,
    rc_maps: HashMap<WordId, Arc<[u16]>>,
    cross_word: bool,
}

impl Builder<'_> {
    fn new_node(
        &mut self,
        kind: NodeKind,
        phone: PhoneId,
        model: PhoneModelId,
        rc_class: Option<u16>,
    ) -> Result<NodeId, DecoderError> {
        let id = NodeId::try_from(self.nodes.len())
            .map_err(|_| DecoderError::exhausted("lexical tree nodes", u32::MAX as usize))?;
        let tmat = self.phones.phone_model(model).tmat;
        self.nodes.push(LexNode {
            kind,
            phone,
            model,
            n_emit: self.phones.transition_matrix(tmat).n_emit(),
            rc_class,
            children: Vec::new(),
        });
        Ok(id)
    }

    fn root(
        &mut self,
        kind: NodeKind,
        phone: PhoneId,
        model: PhoneModelId,
        lists: &[usize],
    ) -> Result<NodeId, DecoderError> {
        let owner = match kind {
            NodeKind::Word { word, .. } => Some(word),
            NodeKind::Internal => None,
        };
        let id = match self.root_index.get(&(phone, model, owner)) {
            Some(&id) => id,
            None => {
                let id = self.new_node(kind, phone, model, None)?;
                self.root_index.insert((phone, model, owner), id);
                id
            }
        };
        for &l in lists {
            let list = &mut self.roots[l].nodes;
            if !list.contains(&id) {
                list.push(id);
            }
        }
        Ok(id)
    }

    fn child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        phone: PhoneId,
        model: PhoneModelId,
    ) -> Result<NodeId, DecoderError> {
        if kind == NodeKind::Internal {
            let found = self.nodes[parent as usize].children.iter().copied().find(|&c| {
                let n = &self.nodes[c as usize];
                n.kind == NodeKind::Internal && n.phone == phone && n.model == model
            });
            if let Some(c) = found {
                return Ok(c);
            }
        }
        let id = self.new_node(kind, phone, model, None)?;
        self.nodes[parent as usize].children.push(id);
        Ok(id)
    }

    /// Adds one pronunciation under a given root model.
    fn add_path(
        &mut self,
        word: WordId,
        pron: &[PhoneId],
        shared: usize,
        root_model: PhoneModelId,
        lists: &[usize],
    ) -> Result<(), DecoderError> {
        let len = pron.len();
        let flat_len = (len - shared) as u16;
        let mut parent: Option<NodeId> = None;
        for (i, &ph) in pron.iter().enumerate() {
            let kind = if i >= shared {
                NodeKind::Word {
                    word,
                    phones_left: (len - 1 - i) as u16,
                    flat_len,
                }
            } else {
                NodeKind::Internal
            };
            let node = match parent {
                None => self.root(kind, ph, root_model, lists)?,
                Some(p) if i + 1 == len && self.cross_word => {
                    return self.add_final_fanout(p, kind, word, pron);
                }
                Some(p) => {
                    let model = self.phones.resolve(
                        ph,
                        Some(pron[i - 1]),
                        pron.get(i + 1).copied(),
                        WordPosition::of(i, len),
                    );
                    self.child(p, kind, ph, model)?
                }
            };
            parent = Some(node);
        }
        Ok(())
    }

    /// Expands a word-final phone into one node per distinct right-context model.
    fn add_final_fanout(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        word: WordId,
        pron: &[PhoneId],
    ) -> Result<(), DecoderError> {
        let len = pron.len();
        let last = pron[len - 1];
        let prev = Some(pron[len - 2]);
        let mut classes: Vec<PhoneModelId> = Vec::new();
        let mut map = Vec::with_capacity(self.phones.n_phones());
        for rc in 0..self.phones.n_phones() as PhoneId {
            let model = self.phones.resolve(last, prev, Some(rc), WordPosition::End);
            let class = match classes.iter().position(|&m| m == model) {
                Some(c) => c,
                None => {
                    classes.push(model);
                    classes.len() - 1
                }
            };
            map.push(class as u16);
        }
        if classes.len() <= 1 {
            let model = self.phones.resolve(last, prev, None, WordPosition::End);
            self.child(parent, kind, last, model)?;
            return Ok(());
        }
        for (c, &model) in classes.iter().enumerate() {
            let id = self.new_node(kind, last, model, Some(c as u16))?;
            self.nodes[parent as usize].children.push(id);
        }
        self.rc_maps.entry(word).or_insert_with(|| Arc::from(map));
        Ok(())
    }
}

impl LexTree {
    /// Builds the tree over the words whose `active` flag is set.
    pub fn build(
        name: &str,
        active: &[bool],
        dict: &dyn Dictionary,
        phones: &dyn PhoneContextModel,
        params: LexTreeParams,
    ) -> Result<Self, DecoderError> {
        let silence = phones.silence_phone();
        let left_contexts: Vec<Option<PhoneId>> = if params.left_context_roots {
            let mut lcs: Vec<PhoneId> = (0..dict.n_words() as WordId)
                .filter_map(|w| dict.pronunciation(w).last().copied())
                .map(|p| if phones.is_filler_phone(p) { silence } else { p })
                .chain(std::iter::once(silence))
                .collect();
            lcs.sort_unstable();
            lcs.dedup();
            lcs.into_iter().map(Some).collect()
        } else {
            vec![None]
        };

        let mut b = Builder {
            phones,
            nodes: Vec::new(),
            roots: left_contexts
                .iter()
                .map(|&lc| RootList {
                    left_context: lc,
                    nodes: Vec::new(),
                })
                .collect(),
            root_index: HashMap::new(),
            rc_maps: HashMap::new(),
            cross_word: params.cross_word_triphones,
        };

        let mut n_words = 0;
        for (w, _) in active.iter().enumerate().filter(|(_, on)| **on) {
            let word = w as WordId;
            let pron = dict.pronunciation(word);
            if pron.is_empty() {
                return Err(DecoderError::config(format!(
                    "word '{}' has an empty pronunciation",
                    dict.word_str(word)
                )));
            }
            if pron.len() > u16::MAX as usize {
                return Err(DecoderError::exhausted(
                    "pronunciation length",
                    u16::MAX as usize,
                ));
            }
            let shared = params.flatten_depth.min(pron.len() - 1);
            let right = pron.get(1).copied();
            let position = WordPosition::of(0, pron.len());

            let mut groups: Vec<(PhoneModelId, Vec<usize>)> = Vec::new();
            for (l, lc) in left_contexts.iter().enumerate() {
                let model = phones.resolve(pron[0], *lc, right, position);
                match groups.iter_mut().find(|(m, _)| *m == model) {
                    Some((_, lists)) => lists.push(l),
                    None => groups.push((model, vec![l])),
                }
            }
            for (model, lists) in &groups {
                b.add_path(word, pron, shared, *model, lists)?;
            }
            n_words += 1;
        }

        let lc_lists = b
            .roots
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.left_context.map(|p| (p, i)))
            .collect();
        let tree = Self {
            name: name.to_string(),
            nodes: b.nodes,
            roots: b.roots,
            lc_lists,
            silence,
            rc_maps: b.rc_maps,
            n_words,
        };
        tracing::info!(
            tree = tree.name.as_str(),
            nodes = tree.nodes.len(),
            root_lists = tree.roots.len(),
            words = n_words,
            flatten_depth = params.flatten_depth,
            "built lexical tree"
        );
        Ok(tree)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_words(&self) -> usize {
        self.n_words
    }

    pub fn node(&self, id: NodeId) -> &LexNode {
        &self.nodes[id as usize]
    }

    pub fn nodes(&self) -> &[LexNode] {
        &self.nodes
    }

    pub fn root_lists(&self) -> &[RootList] {
        &self.roots
    }

    /// Roots to enter after a word ending in phone `lc`. Unknown contexts
    /// use the silence list; context-free trees ignore `lc`.
    pub fn roots_for(&self, lc: PhoneId) -> &[NodeId] {
        if self.lc_lists.is_empty() {
            return self.roots.first().map_or(&[], |r| r.nodes.as_slice());
        }
        let list = self
            .lc_lists
            .get(&lc)
            .or_else(|| self.lc_lists.get(&self.silence))
            .copied();
        list.map_or(&[], |l| self.roots[l].nodes.as_slice())
    }

    /// Right-context class map of a word with fanned-out final phones.
    pub fn rc_map(&self, word: WordId) -> Option<&Arc<[u16]>> {
        self.rc_maps.get(&word)
    }

    /// First root-to-leaf path that ends in `word`.
    pub fn find_word_path(&self, word: WordId) -> Option<Vec<NodeId>> {
        let mut path = Vec::new();
        self.roots
            .iter()
            .flat_map(|l| l.nodes.iter())
            .find_map(|&root| {
                path.clear();
                self.descend(root, word, &mut path).then(|| path.clone())
            })
    }

    fn descend(&self, id: NodeId, word: WordId, path: &mut Vec<NodeId>) -> bool {
        let node = self.node(id);
        if let NodeKind::Word { word: w, .. } = node.kind {
            if w != word {
                return false;
            }
        }
        path.push(id);
        if node.is_word_end() {
            return true;
        }
        if node.children.iter().any(|&c| self.descend(c, word, path)) {
            return true;
        }
        path.pop();
        false
    }
}

//! Word lattice over the retained history entries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::DecoderError;
use crate::logmath::Score;
use crate::pipeline::context::DecoderContext;
use crate::search::vithist::{EntryKind, TraceStep, VithistTable};
use crate::types::{HistoryId, WordId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeNode {
    pub id: u32,
    pub word: WordId,
    pub text: String,
    pub start_frame: u32,
    pub first_end_frame: u32,
    pub last_end_frame: u32,
    /// Best acoustic score among the node's segments and where it ended.
    pub best_ascr: Score,
    pub best_end_frame: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeEdge {
    pub from: u32,
    pub to: u32,
    pub ascr: Score,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub log_base: f64,
    pub n_frames: u32,
    pub nodes: Vec<LatticeNode>,
    pub initial: u32,
    pub final_node: u32,
    pub edges: Vec<LatticeEdge>,
}

struct Pending {
    word: WordId,
    start_frame: u32,
    first_end: u32,
    last_end: u32,
    best_ascr: Score,
    best_end: u32,
    pinned: bool,
}

impl Lattice {
    /// One node per distinct (word, start frame) among valid entries. Nodes
    /// with a single end frame are dropped unless they lie on `path` or are
    /// the start or final node. Parallel edges keep the best acoustic score.
    pub fn build(
        ctx: &DecoderContext,
        history: &VithistTable,
        end: HistoryId,
        path: &[TraceStep],
        n_frames: u32,
    ) -> Result<Self, DecoderError> {
        if end as usize >= history.len() {
            return Err(DecoderError::invalid_input(format!(
                "lattice end history {end} does not exist"
            )));
        }
        let on_path: HashSet<HistoryId> = path.iter().map(|s| s.id).chain([0, end]).collect();

        let mut pending: Vec<Pending> = Vec::new();
        let mut by_key: HashMap<(WordId, u32), usize> = HashMap::new();
        let mut node_of: HashMap<HistoryId, usize> = HashMap::new();
        for (id, e) in history.entries() {
            if !e.valid {
                continue;
            }
            let pinned = on_path.contains(&id) || matches!(e.kind, EntryKind::Start | EntryKind::End);
            let n = *by_key.entry((e.word, e.start_frame)).or_insert_with(|| {
                pending.push(Pending {
                    word: e.word,
                    start_frame: e.start_frame,
                    first_end: e.end_frame,
                    last_end: e.end_frame,
                    best_ascr: e.ascr,
                    best_end: e.end_frame,
                    pinned: false,
                });
                pending.len() - 1
            });
            let p = &mut pending[n];
            p.first_end = p.first_end.min(e.end_frame);
            p.last_end = p.last_end.max(e.end_frame);
            if e.ascr > p.best_ascr {
                p.best_ascr = e.ascr;
                p.best_end = e.end_frame;
            }
            p.pinned |= pinned;
            node_of.insert(id, n);
        }

        let mut renumber: Vec<Option<u32>> = vec![None; pending.len()];
        let mut nodes = Vec::new();
        for (i, p) in pending.iter().enumerate() {
            if p.last_end == p.first_end && !p.pinned {
                continue;
            }
            let id = nodes.len() as u32;
            renumber[i] = Some(id);
            nodes.push(LatticeNode {
                id,
                word: p.word,
                text: ctx.dictionary.word_str(p.word).to_string(),
                start_frame: p.start_frame,
                first_end_frame: p.first_end,
                last_end_frame: p.last_end,
                best_ascr: p.best_ascr,
                best_end_frame: p.best_end,
            });
        }
        let kept = |id: HistoryId| node_of.get(&id).and_then(|&n| renumber[n]);

        let mut edges: BTreeMap<(u32, u32), Score> = BTreeMap::new();
        for (id, e) in history.entries() {
            let (Some(to), Some(from)) = (kept(id), e.pred.and_then(kept)) else {
                continue;
            };
            if !e.valid || from == to {
                continue;
            }
            edges
                .entry((from, to))
                .and_modify(|a| *a = (*a).max(e.ascr))
                .or_insert(e.ascr);
        }

        let initial = kept(0).ok_or_else(|| DecoderError::invalid_input("lattice has no start node"))?;
        let final_node = kept(end).ok_or_else(|| DecoderError::invalid_input("lattice has no final node"))?;
        Ok(Self {
            log_base: ctx.logmath.base(),
            n_frames,
            nodes,
            initial,
            final_node,
            edges: edges
                .into_iter()
                .map(|((from, to), ascr)| LatticeEdge { from, to, ascr })
                .collect(),
        })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# -logbase {}", self.log_base);
        let _ = writeln!(out, "Frames {}", self.n_frames);
        out.push_str("#\n");
        let _ = writeln!(
            out,
            "Nodes {} (NODEID WORD STARTFRAME FIRST-ENDFRAME LAST-ENDFRAME)",
            self.nodes.len()
        );
        for n in &self.nodes {
            let _ = writeln!(
                out,
                "{} {} {} {} {}",
                n.id, n.text, n.start_frame, n.first_end_frame, n.last_end_frame
            );
        }
        out.push_str("#\n");
        let _ = writeln!(out, "Initial {}", self.initial);
        let _ = writeln!(out, "Final {}", self.final_node);
        out.push_str("#\n");
        let _ = writeln!(out, "BestSegAscr {} (NODEID ENDFRAME ASCORE)", self.nodes.len());
        for n in &self.nodes {
            let _ = writeln!(out, "{} {} {}", n.id, n.best_end_frame, n.best_ascr);
        }
        out.push_str("#\n");
        out.push_str("Edges (FROM-NODEID TO-NODEID ASCORE)\n");
        for e in &self.edges {
            let _ = writeln!(out, "{} {} {}", e.from, e.to, e.ascr);
        }
        out.push_str("End\n");
        out
    }

    pub fn write(&self, path: &Path) -> Result<(), DecoderError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DecoderError::io("create lattice directory", e))?;
        }
        std::fs::write(path, self.to_text()).map_err(|e| DecoderError::io("write lattice", e))
    }
}

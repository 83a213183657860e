pub mod histprune;
pub mod hmm;
pub mod lattice;
pub mod lextree;
pub mod tree_search;
pub mod vithist;
pub mod word_trans;

#[cfg(test)]
pub(crate) mod fixtures;

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::DecoderError;
use crate::pipeline::traits::{Dictionary, PhoneContextModel};
use crate::types::{PhoneId, WordId};

pub const START_WORD: &str = "<s>";
pub const FINISH_WORD: &str = "</s>";
pub const SILENCE_WORD: &str = "<sil>";

#[derive(Debug, Clone, Deserialize)]
pub struct DictionaryEntry {
    pub word: String,
    pub phones: Vec<String>,
    #[serde(default)]
    pub filler: bool,
}

#[derive(Debug, Clone)]
struct DictWord {
    text: String,
    phones: Vec<PhoneId>,
    base: WordId,
    filler: bool,
}

/// Word list with pronunciations. Alternate pronunciations are written
/// `word(2)` and share the base word of `word`.
#[derive(Debug, Clone, Default)]
pub struct PronunciationDictionary {
    words: Vec<DictWord>,
    index: HashMap<String, WordId>,
}

impl PronunciationDictionary {
    pub fn from_entries(
        entries: &[DictionaryEntry],
        phones: &dyn PhoneContextModel,
    ) -> Result<Self, DecoderError> {
        let mut dict = Self::default();
        for entry in entries {
            let pron = entry
                .phones
                .iter()
                .map(|p| {
                    phones.phone_id(p).ok_or_else(|| {
                        DecoderError::config(format!(
                            "word '{}' uses unknown phone '{p}'",
                            entry.word
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            dict.add_word(&entry.word, pron, entry.filler)?;
        }
        Ok(dict)
    }

    pub fn add_word(
        &mut self,
        text: &str,
        phones: Vec<PhoneId>,
        filler: bool,
    ) -> Result<WordId, DecoderError> {
        if self.index.contains_key(text) {
            return Err(DecoderError::config(format!("duplicate word '{text}'")));
        }
        let id = self.words.len() as WordId;
        let base = match base_text(text) {
            Some(base) => *self.index.get(base).ok_or_else(|| {
                DecoderError::config(format!(
                    "alternate pronunciation '{text}' precedes its base word"
                ))
            })?,
            None => id,
        };
        let is_sentinel = text == START_WORD || text == FINISH_WORD;
        self.words.push(DictWord {
            text: text.to_string(),
            phones,
            base,
            filler: (filler || text == SILENCE_WORD) && !is_sentinel,
        });
        self.index.insert(text.to_string(), id);
        Ok(id)
    }

    pub fn word_id(&self, text: &str) -> Option<WordId> {
        self.index.get(text).copied()
    }
}

fn base_text(text: &str) -> Option<&str> {
    let open = text.rfind('(')?;
    let inner = text.strip_suffix(')')?.get(open + 1..)?;
    if open == 0 || inner.is_empty() || !inner.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(&text[..open])
}

impl Dictionary for PronunciationDictionary {
    fn n_words(&self) -> usize {
        self.words.len()
    }

    fn word_str(&self, word: WordId) -> &str {
        &self.words[word as usize].text
    }

    fn pronunciation(&self, word: WordId) -> &[PhoneId] {
        &self.words[word as usize].phones
    }

    fn base_word(&self, word: WordId) -> WordId {
        self.words[word as usize].base
    }

    fn is_filler(&self, word: WordId) -> bool {
        self.words[word as usize].filler
    }

    fn start_word(&self) -> Option<WordId> {
        self.word_id(START_WORD)
    }

    fn finish_word(&self) -> Option<WordId> {
        self.word_id(FINISH_WORD)
    }

    fn silence_word(&self) -> Option<WordId> {
        self.word_id(SILENCE_WORD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternate_pronunciations_share_base_word() {
        let mut dict = PronunciationDictionary::default();
        let a = dict.add_word("tomato", vec![1, 2], false).unwrap();
        let b = dict.add_word("tomato(2)", vec![1, 3], false).unwrap();
        assert_eq!(dict.base_word(b), a);
        assert_eq!(dict.base_word(a), a);
        assert_eq!(dict.word_str(b), "tomato(2)");
    }

    #[test]
    fn alternate_without_base_is_rejected() {
        let mut dict = PronunciationDictionary::default();
        assert!(dict.add_word("cat(2)", vec![1], false).is_err());
    }

    #[test]
    fn sentinels_are_not_fillers() {
        let mut dict = PronunciationDictionary::default();
        let s = dict.add_word(START_WORD, vec![0], true).unwrap();
        let e = dict.add_word(FINISH_WORD, vec![0], true).unwrap();
        let sil = dict.add_word(SILENCE_WORD, vec![0], false).unwrap();
        assert!(!dict.is_filler(s));
        assert!(!dict.is_filler(e));
        assert!(dict.is_filler(sil));
        assert_eq!(dict.start_word(), Some(s));
        assert_eq!(dict.finish_word(), Some(e));
        assert_eq!(dict.silence_word(), Some(sil));
    }

    #[test]
    fn base_text_parsing() {
        assert_eq!(base_text("read(2)"), Some("read"));
        assert_eq!(base_text("(2)"), None);
        assert_eq!(base_text("read()"), None);
        assert_eq!(base_text("read(x)"), None);
        assert_eq!(base_text("read"), None);
    }
}

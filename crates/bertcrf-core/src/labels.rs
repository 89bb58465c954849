//! # Label Alphabet
//!
//! The closed label set a tagger is trained on, with the three sentinel
//! symbols the CRF relies on: START (`[CLS]`), STOP (`[SEP]`) and the filler
//! label `X` that marks non-first sub-word pieces.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::error::{CrfError, Result};

/// Default NER label set, in id order.
pub const NER_LABELS: &[&str] = &[
    "X", "[CLS]", "[SEP]", "O", "I-loc", "B-pers", "I-pers", "I-org", "I-pro", "B-pro", "I-fac",
    "B-fac", "B-loc", "B-org", "B-event", "I-event",
];

/// Symbol used as the START sentinel in [`NER_LABELS`].
pub const START_SYMBOL: &str = "[CLS]";
/// Symbol used as the STOP sentinel in [`NER_LABELS`].
pub const STOP_SYMBOL: &str = "[SEP]";
/// Symbol assigned to continuation sub-word pieces.
pub const FILLER_SYMBOL: &str = "X";
/// The "outside any entity" label.
pub const OUTSIDE_SYMBOL: &str = "O";

/// Ordered, closed set of label symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelAlphabet {
    symbols: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    start: usize,
    stop: usize,
    filler: usize,
    ignored: Vec<usize>,
}

impl LabelAlphabet {
    /// Build an alphabet from symbols in id order.
    ///
    /// Fails if a symbol repeats, if a sentinel is missing, or if two sentinels
    /// share a symbol.
    pub fn new<S: AsRef<str>>(
        symbols: &[S],
        start: &str,
        stop: &str,
        filler: &str,
    ) -> Result<Self> {
        let symbols: Vec<String> = symbols.iter().map(|s| s.as_ref().to_string()).collect();

        let mut index = HashMap::with_capacity(symbols.len());
        for (id, symbol) in symbols.iter().enumerate() {
            if index.insert(symbol.clone(), id).is_some() {
                return Err(CrfError::InvalidAlphabet(format!(
                    "duplicate label {symbol:?}"
                )));
            }
        }

        let lookup = |symbol: &str| {
            index.get(symbol).copied().ok_or_else(|| {
                CrfError::InvalidAlphabet(format!("missing sentinel label {symbol:?}"))
            })
        };
        let start_id = lookup(start)?;
        let stop_id = lookup(stop)?;
        let filler_id = lookup(filler)?;

        let distinct: HashSet<usize> = [start_id, stop_id, filler_id].into_iter().collect();
        if distinct.len() != 3 {
            return Err(CrfError::InvalidAlphabet(
                "START, STOP and filler must be distinct labels".into(),
            ));
        }

        Ok(Self {
            symbols,
            index,
            start: start_id,
            stop: stop_id,
            filler: filler_id,
            ignored: vec![filler_id, start_id, stop_id],
        })
    }

    /// The default NER alphabet ([`NER_LABELS`]).
    pub fn ner() -> Self {
        let symbols: Vec<String> = NER_LABELS.iter().map(|s| s.to_string()).collect();
        let index = symbols
            .iter()
            .enumerate()
            .map(|(id, s)| (s.clone(), id))
            .collect();
        // Sentinel positions are fixed by NER_LABELS.
        Self {
            symbols,
            index,
            start: 1,
            stop: 2,
            filler: 0,
            ignored: vec![0, 1, 2],
        }
    }

    /// Also treat `symbols` as non-entity labels when computing metrics.
    ///
    /// Unknown symbols are rejected.
    pub fn with_ignored(mut self, symbols: &[&str]) -> Result<Self> {
        for symbol in symbols {
            let id = self.id_of(symbol).ok_or_else(|| {
                CrfError::InvalidAlphabet(format!("cannot ignore unknown label {symbol:?}"))
            })?;
            if !self.ignored.contains(&id) {
                self.ignored.push(id);
            }
        }
        Ok(self)
    }

    /// Number of labels, L.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the alphabet has no labels (never true for a valid alphabet).
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Id of a symbol.
    pub fn id_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    /// Symbol of an id.
    pub fn symbol(&self, id: usize) -> Option<&str> {
        self.symbols.get(id).map(String::as_str)
    }

    /// All symbols in id order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn start_id(&self) -> usize {
        self.start
    }

    pub fn stop_id(&self) -> usize {
        self.stop
    }

    pub fn filler_id(&self) -> usize {
        self.filler
    }

    /// Whether `id` is one of START, STOP or filler.
    pub fn is_special(&self, id: usize) -> bool {
        id == self.start || id == self.stop || id == self.filler
    }

    /// Whether `id` counts as an entity token for precision/recall.
    pub fn is_positive(&self, id: usize) -> bool {
        id < self.len() && !self.ignored.contains(&id)
    }
}

impl Default for LabelAlphabet {
    fn default() -> Self {
        Self::ner()
    }
}

impl fmt::Display for LabelAlphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbols.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ner_alphabet_sentinels() {
        let alphabet = LabelAlphabet::ner();
        assert_eq!(alphabet.len(), 16);
        assert_eq!(alphabet.start_id(), alphabet.id_of(START_SYMBOL).unwrap());
        assert_eq!(alphabet.stop_id(), alphabet.id_of(STOP_SYMBOL).unwrap());
        assert_eq!(alphabet.filler_id(), alphabet.id_of(FILLER_SYMBOL).unwrap());
    }

    #[test]
    fn test_ner_matches_validated_constructor() {
        let checked =
            LabelAlphabet::new(NER_LABELS, START_SYMBOL, STOP_SYMBOL, FILLER_SYMBOL).unwrap();
        assert_eq!(checked, LabelAlphabet::ner());
    }

    #[test]
    fn test_id_symbol_roundtrip() {
        let alphabet = LabelAlphabet::ner();
        for (id, symbol) in alphabet.symbols().iter().enumerate() {
            assert_eq!(alphabet.id_of(symbol), Some(id));
            assert_eq!(alphabet.symbol(id), Some(symbol.as_str()));
        }
        assert_eq!(alphabet.id_of("B-misc"), None);
        assert_eq!(alphabet.symbol(99), None);
    }

    #[test]
    fn test_positive_labels() {
        let alphabet = LabelAlphabet::ner();
        assert!(!alphabet.is_positive(alphabet.filler_id()));
        assert!(!alphabet.is_positive(alphabet.start_id()));
        assert!(!alphabet.is_positive(alphabet.stop_id()));
        assert!(alphabet.is_positive(alphabet.id_of("O").unwrap()));
        assert!(alphabet.is_positive(alphabet.id_of("B-pers").unwrap()));
        assert!(!alphabet.is_positive(99));
    }

    #[test]
    fn test_with_ignored_outside() {
        let alphabet = LabelAlphabet::ner().with_ignored(&[OUTSIDE_SYMBOL]).unwrap();
        assert!(!alphabet.is_positive(alphabet.id_of("O").unwrap()));
        assert!(alphabet.is_positive(alphabet.id_of("I-org").unwrap()));
        assert!(LabelAlphabet::ner().with_ignored(&["nope"]).is_err());
    }

    #[test]
    fn test_invalid_alphabets() {
        let dup = LabelAlphabet::new(&["S", "E", "X", "O", "O"], "S", "E", "X");
        assert!(matches!(dup, Err(CrfError::InvalidAlphabet(_))));

        let missing = LabelAlphabet::new(&["S", "X", "O"], "S", "E", "X");
        assert!(missing.is_err());

        let shared = LabelAlphabet::new(&["S", "X", "O"], "S", "S", "X");
        assert!(shared.is_err());
    }
}

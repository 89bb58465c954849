//! # Corpus Files
//!
//! Reading and rewriting the whitespace-separated NER corpus format: one
//! token per line, first field the word, last field the label, sentences
//! separated by blank lines.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CrfError, Result};

/// File holding the training split.
pub const TRAIN_FILE: &str = "train.txt";
/// File holding the evaluation split.
pub const VALID_FILE: &str = "valid.txt";
/// Lock file guarding split rewrites.
pub const LOCK_FILE: &str = ".splits.lock";

/// One labelled sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub words: Vec<String>,
    pub labels: Vec<String>,
}

impl Sentence {
    pub fn new(words: Vec<String>, labels: Vec<String>) -> Self {
        Self { words, labels }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Where blank lines go when a corpus is written back out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentenceBoundary {
    /// A blank line after every literal `.` token. Sentences that do not end
    /// in `.` run into the next one when the file is read back.
    #[default]
    Period,
    /// A blank line after every sentence.
    Example,
}

impl FromStr for SentenceBoundary {
    type Err = CrfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "period" => Ok(Self::Period),
            "example" => Ok(Self::Example),
            other => Err(CrfError::InvalidConfig(format!(
                "unknown sentence boundary {other:?} (expected period or example)"
            ))),
        }
    }
}

impl fmt::Display for SentenceBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentenceBoundary::Period => write!(f, "period"),
            SentenceBoundary::Example => write!(f, "example"),
        }
    }
}

/// Parse corpus text. Empty sentences are dropped.
pub fn parse_corpus(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut words = Vec::new();
    let mut labels = Vec::new();

    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(word) = fields.next() else {
            if !words.is_empty() {
                sentences.push(Sentence::new(
                    std::mem::take(&mut words),
                    std::mem::take(&mut labels),
                ));
            }
            continue;
        };
        let label = fields.last().unwrap_or(word);
        words.push(word.to_string());
        labels.push(label.to_string());
    }

    // Don't forget the last sentence
    if !words.is_empty() {
        sentences.push(Sentence::new(words, labels));
    }

    sentences
}

/// Load a corpus file. A missing or unreadable file is an error.
pub fn read_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<Sentence>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| CrfError::io(path, e))?;
    let sentences = parse_corpus(&text);
    debug!(path = %path.display(), sentences = sentences.len(), "loaded corpus");
    Ok(sentences)
}

/// Write sentences as `word label` lines.
pub fn write_corpus<'a, W, I>(
    writer: &mut W,
    sentences: I,
    boundary: SentenceBoundary,
) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Sentence>,
{
    for sentence in sentences {
        for (word, label) in sentence.words.iter().zip(&sentence.labels) {
            writeln!(writer, "{word} {label}")?;
            if boundary == SentenceBoundary::Period && word == "." {
                writeln!(writer)?;
            }
        }
        if boundary == SentenceBoundary::Example {
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Exclusive guard over split rewrites in one directory.
///
/// Created with `create_new`, so a second writer fails with
/// [`CrfError::SplitsLocked`]. The lock file is removed on drop.
#[derive(Debug)]
pub struct SplitLock {
    path: PathBuf,
}

impl SplitLock {
    pub fn acquire<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(CrfError::SplitsLocked(dir.to_path_buf()))
            }
            Err(e) => Err(CrfError::io(&path, e)),
        }
    }
}

impl Drop for SplitLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Replace `train.txt` and `valid.txt` in `dir`.
///
/// Holds a [`SplitLock`] for the duration. Both files are staged as
/// temporary siblings first and only renamed into place once both are fully
/// written, so a failed write leaves the old splits untouched.
pub fn write_splits<P: AsRef<Path>>(
    dir: P,
    train: &[&Sentence],
    valid: &[&Sentence],
    boundary: SentenceBoundary,
) -> Result<()> {
    let dir = dir.as_ref();
    let _lock = SplitLock::acquire(dir)?;
    let train_path = dir.join(TRAIN_FILE);
    let valid_path = dir.join(VALID_FILE);
    let train_tmp = staging_path(&train_path);
    let valid_tmp = staging_path(&valid_path);

    let staged = stage_file(&train_tmp, train, boundary)
        .and_then(|_| stage_file(&valid_tmp, valid, boundary));
    if let Err(e) = staged {
        let _ = fs::remove_file(&train_tmp);
        let _ = fs::remove_file(&valid_tmp);
        return Err(e);
    }

    fs::rename(&train_tmp, &train_path).map_err(|e| CrfError::io(&train_path, e))?;
    fs::rename(&valid_tmp, &valid_path).map_err(|e| CrfError::io(&valid_path, e))?;
    debug!(
        dir = %dir.display(),
        train = train.len(),
        valid = valid.len(),
        "rewrote corpus splits"
    );
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("txt.tmp")
}

fn stage_file(tmp: &Path, sentences: &[&Sentence], boundary: SentenceBoundary) -> Result<()> {
    let file = File::create(tmp).map_err(|e| CrfError::io(tmp, e))?;
    let mut writer = BufWriter::new(file);
    write_corpus(&mut writer, sentences.iter().copied(), boundary)
        .and_then(|_| writer.flush())
        .map_err(|e| CrfError::io(tmp, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Ali B-pers NNP
Rezaei I-pers
went O
. O

to O
Tehran B-loc

";

    fn sentence(pairs: &[(&str, &str)]) -> Sentence {
        Sentence::new(
            pairs.iter().map(|(w, _)| w.to_string()).collect(),
            pairs.iter().map(|(_, l)| l.to_string()).collect(),
        )
    }

    #[test]
    fn test_parse_first_and_last_fields() {
        let sentences = parse_corpus(SAMPLE);
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].words, vec!["Ali", "Rezaei", "went", "."]);
        assert_eq!(sentences[0].labels, vec!["NNP", "I-pers", "O", "O"]);
        assert_eq!(sentences[1].words, vec!["to", "Tehran"]);
        assert_eq!(sentences[1].labels, vec!["O", "B-loc"]);
    }

    #[test]
    fn test_parse_skips_repeated_blank_lines() {
        let sentences = parse_corpus("\n\n  \na O\n\n\n\nb B-loc");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[1].labels, vec!["B-loc"]);
    }

    #[test]
    fn test_read_missing_file_is_fatal() {
        let err = read_corpus("/definitely/not/here/train.txt").unwrap_err();
        assert!(matches!(err, CrfError::Io { .. }));
    }

    #[test]
    fn test_period_boundary_quirk() {
        let a = sentence(&[("Hi", "O"), (".", "O")]);
        let b = sentence(&[("no", "O"), ("stop", "O")]);
        let c = sentence(&[("end", "O")]);
        let mut out = Vec::new();
        write_corpus(&mut out, [&a, &b, &c], SentenceBoundary::Period).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Hi O\n. O\n\nno O\nstop O\nend O\n");

        // b and c merge on re-read
        assert_eq!(parse_corpus(&text).len(), 2);
    }

    #[test]
    fn test_example_boundary_round_trips() {
        let a = sentence(&[("Hi", "O"), (".", "O")]);
        let b = sentence(&[("Tehran", "B-loc")]);
        let mut out = Vec::new();
        write_corpus(&mut out, [&a, &b], SentenceBoundary::Example).unwrap();
        let parsed = parse_corpus(&String::from_utf8(out).unwrap());
        assert_eq!(parsed, vec![a, b]);
    }

    #[test]
    fn test_boundary_from_str() {
        assert_eq!("period".parse::<SentenceBoundary>().unwrap(), SentenceBoundary::Period);
        assert_eq!("example".parse::<SentenceBoundary>().unwrap(), SentenceBoundary::Example);
        assert!("dot".parse::<SentenceBoundary>().is_err());
    }

    #[test]
    fn test_write_splits_replaces_files_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TRAIN_FILE), "old O\n").unwrap();

        let a = sentence(&[("a", "O")]);
        let b = sentence(&[("b", "B-org")]);
        write_splits(dir.path(), &[&a], &[&b], SentenceBoundary::Example).unwrap();

        assert_eq!(read_corpus(dir.path().join(TRAIN_FILE)).unwrap(), vec![a]);
        assert_eq!(read_corpus(dir.path().join(VALID_FILE)).unwrap(), vec![b]);
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_second_writer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let _held = SplitLock::acquire(dir.path()).unwrap();
        let err = write_splits(dir.path(), &[], &[], SentenceBoundary::Period).unwrap_err();
        assert!(matches!(err, CrfError::SplitsLocked(_)));
    }

    #[test]
    fn test_failed_staging_keeps_old_splits() {
        let dir = tempfile::tempdir().unwrap();
        let t = sentence(&[("t", "O")]);
        let a = sentence(&[("a", "O")]);
        let b = sentence(&[("b", "B-org")]);
        write_splits(dir.path(), &[&t], &[&a, &b], SentenceBoundary::Example).unwrap();

        // a directory in the way makes the validation staging file uncreatable
        let blocker = dir.path().join("valid.txt.tmp");
        fs::create_dir(&blocker).unwrap();
        let err = write_splits(dir.path(), &[&t, &b], &[&a], SentenceBoundary::Example);
        assert!(matches!(err, Err(CrfError::Io { .. })));

        assert_eq!(read_corpus(dir.path().join(TRAIN_FILE)).unwrap(), vec![t]);
        assert_eq!(read_corpus(dir.path().join(VALID_FILE)).unwrap(), vec![a, b]);
        assert!(!dir.path().join("train.txt.tmp").exists());
        assert!(!dir.path().join(LOCK_FILE).exists());
    }
}

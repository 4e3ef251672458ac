//! Local persistence: the cached bearer token and the refinement attempt log.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{PromptTunerError, Result};
use crate::schema::{value_text, AttemptLogEntry, Token};

pub trait TokenStore {
    /// `Ok(None)` when nothing has been cached yet.
    fn load(&self) -> Result<Option<Token>>;

    fn save(&self, token: &Token) -> Result<()>;
}

pub trait AttemptLog {
    fn append(&mut self, entry: &AttemptLogEntry) -> Result<()>;
}

/// Token cache as a two-line file: the token, then the expiry in epoch seconds.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Token>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_token(&contents).map(Some)
    }

    fn save(&self, token: &Token) -> Result<()> {
        fs::write(&self.path, format_token(token))?;
        Ok(())
    }
}

fn format_token(token: &Token) -> String {
    let secs = token.expiry.timestamp() as f64
        + f64::from(token.expiry.timestamp_subsec_micros()) / 1_000_000.0;
    format!("{}\n{}", token.value, secs)
}

fn parse_token(contents: &str) -> Result<Token> {
    let mut lines = contents.lines();
    let (Some(value), Some(expiry), None) = (lines.next(), lines.next(), lines.next()) else {
        return Err(PromptTunerError::InvalidTokenCache(
            "expected a token line and an expiry line".to_string(),
        ));
    };

    let secs: f64 = expiry.trim().parse().map_err(|_| {
        PromptTunerError::InvalidTokenCache(format!("expiry '{}' is not a timestamp", expiry))
    })?;
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
    let expiry = DateTime::<Utc>::from_timestamp(whole as i64, nanos.min(999_999_999))
        .ok_or_else(|| {
            PromptTunerError::InvalidTokenCache(format!("expiry '{}' is out of range", expiry))
        })?;

    Ok(Token {
        value: value.to_string(),
        expiry,
    })
}

/// Append-only text log of every verification call made while refining prompts.
pub struct FileAttemptLog {
    path: PathBuf,
}

impl FileAttemptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AttemptLog for FileAttemptLog {
    fn append(&mut self, entry: &AttemptLogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format_entry(entry).as_bytes())?;
        Ok(())
    }
}

pub fn format_entry(entry: &AttemptLogEntry) -> String {
    format!(
        "Document: {}\n\
         Datapoint: {}\n\
         Prompt: {}\n\
         New Value: {}\n\
         Expected: {}\n\
         UID for Prompt Refinement:{}\n\
         UID for Prompt Test:{}\n\
         -----------------------------\n",
        entry.document,
        entry.datapoint,
        entry.prompt,
        value_text(&entry.new_value),
        value_text(&entry.expected),
        entry.refinement_test_id,
        entry.verification_test_id,
    )
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RefCell<Option<Token>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: Token) -> Self {
        Self {
            token: RefCell::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Token>> {
        Ok(self.token.borrow().clone())
    }

    fn save(&self, token: &Token) -> Result<()> {
        *self.token.borrow_mut() = Some(token.clone());
        Ok(())
    }
}

/// In-memory log, handy when the attempts only need to be inspected.
#[derive(Debug, Default)]
pub struct MemoryAttemptLog {
    pub entries: Vec<AttemptLogEntry>,
}

impl AttemptLog for MemoryAttemptLog {
    fn append(&mut self, entry: &AttemptLogEntry) -> Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

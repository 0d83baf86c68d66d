//! # Sentence Normalizer
//!
//! Cleans raw corpus lines into whitespace-separated token strings:
//! accents are stripped, text is lowercased, punctuation and digits become
//! their own tokens and everything outside the allowed alphabet collapses
//! to a single space.

use regex::Regex;
use tokenizers::normalizers::{Lowercase, NFD, StripAccents};
use tokenizers::{NormalizedString, Normalizer};

use crate::error::{Result, RosettaError};

/// Sentinel opening every sentence in the attention variant.
pub const START_TOKEN: &str = "<start>";

/// Sentinel closing every sentence in the attention variant.
pub const END_TOKEN: &str = "<end>";

/// Normalizer for corpus sentences.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    re_isolate: Regex,
    re_spaces: Regex,
    re_disallowed: Regex,
    sentinels: bool,
}

impl TextNormalizer {
    /// Creates a normalizer that emits bare token strings.
    ///
    /// # Errors
    ///
    /// Returns `RosettaError::Regex` if a pattern fails to compile
    /// (should never happen with the static patterns defined here).
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_isolate: Regex::new(r"([!',\-.0-9?])")?,
            re_spaces: Regex::new(r#"[" ]+"#)?,
            re_disallowed: Regex::new(r"[^a-zA-Z!',\-.0-9?]+")?,
            sentinels: false,
        })
    }

    /// Wraps every normalized sentence in `<start>` / `<end>` sentinels.
    pub fn with_sentinels(mut self, enabled: bool) -> Self {
        self.sentinels = enabled;
        self
    }

    /// Returns `true` if this normalizer wraps output in sentinels.
    pub fn sentinels(&self) -> bool {
        self.sentinels
    }

    /// Normalizes a raw sentence.
    ///
    /// The result may be empty (or consist of the two sentinels only) when
    /// nothing of the input survives cleaning.
    ///
    /// # Examples
    /// ```
    /// use rosetta_core::text::TextNormalizer;
    ///
    /// let normalizer = TextNormalizer::new().unwrap();
    /// assert_eq!(
    ///     normalizer.normalize("Je cherche de l'eau.").unwrap(),
    ///     "je cherche de l ' eau ."
    /// );
    /// ```
    pub fn normalize(&self, raw: &str) -> Result<String> {
        let ascii = strip_accents(raw.trim())?;

        let spaced = self.re_isolate.replace_all(&ascii, " $1 ");
        let collapsed = self.re_spaces.replace_all(&spaced, " ");
        let cleaned = self.re_disallowed.replace_all(&collapsed, " ");
        let cleaned = cleaned.trim();

        if !self.sentinels {
            return Ok(cleaned.to_string());
        }

        let mut wrapped =
            String::with_capacity(cleaned.len() + START_TOKEN.len() + END_TOKEN.len() + 2);
        wrapped.push_str(START_TOKEN);
        if !cleaned.is_empty() {
            wrapped.push(' ');
            wrapped.push_str(cleaned);
        }
        wrapped.push(' ');
        wrapped.push_str(END_TOKEN);
        Ok(wrapped)
    }
}

/// Decomposes, drops combining marks and lowercases.
fn strip_accents(text: &str) -> Result<String> {
    let mut normalized = NormalizedString::from(text);
    NFD.normalize(&mut normalized)
        .and_then(|_| StripAccents.normalize(&mut normalized))
        .and_then(|_| Lowercase.normalize(&mut normalized))
        .map_err(|e| RosettaError::Normalization(e.to_string()))?;
    Ok(normalized.get().to_string())
}

/// Removes a leading `<start>` and trailing `<end>` sentinel if present.
pub fn strip_sentinels(sentence: &str) -> &str {
    let sentence = sentence.trim();
    let sentence = sentence.strip_prefix(START_TOKEN).unwrap_or(sentence);
    let sentence = sentence.strip_suffix(END_TOKEN).unwrap_or(sentence);
    sentence.trim()
}

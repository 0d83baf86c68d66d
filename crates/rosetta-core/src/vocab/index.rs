//! # Vocabulary Index
//!
//! Frozen bidirectional token <-> id mapping for one language. Id 0 is
//! always the padding entry; real tokens occupy ids `1..size`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosettaError};

/// Token stored at id 0.
pub const PAD_TOKEN: &str = "<pad>";

/// Id reserved for padding.
pub const PAD_ID: u32 = 0;

/// How ids are assigned to the unique tokens of a corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// Lexicographic order of the token set.
    #[default]
    Sorted,
    /// Order of first appearance in a single pass over the corpus.
    FirstSeen,
    /// Descending frequency, ties broken by first appearance.
    Frequency,
}

impl fmt::Display for OrderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sorted => write!(f, "sorted"),
            Self::FirstSeen => write!(f, "first-seen"),
            Self::Frequency => write!(f, "frequency"),
        }
    }
}

/// Bidirectional mapping between tokens and integer ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct VocabularyIndex {
    id_to_token: Vec<String>,
    token_to_id: HashMap<String, u32>,
}

impl VocabularyIndex {
    /// Builds an index from whitespace-tokenized sentences.
    ///
    /// # Examples
    /// ```
    /// use rosetta_core::vocab::{OrderPolicy, VocabularyIndex};
    ///
    /// let vocab = VocabularyIndex::build(["go .", "hi ."], OrderPolicy::Sorted);
    /// assert_eq!(vocab.vocabulary_size(), 4);
    /// assert_eq!(vocab.token_to_id(".").unwrap(), 1);
    /// ```
    pub fn build<I, S>(sentences: I, policy: OrderPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens: Vec<String> = match policy {
            OrderPolicy::Sorted => {
                let mut set = BTreeSet::new();
                for sentence in sentences {
                    for token in sentence.as_ref().split_whitespace() {
                        if !set.contains(token) {
                            set.insert(token.to_string());
                        }
                    }
                }
                set.into_iter().collect()
            }
            OrderPolicy::FirstSeen => {
                let mut seen = HashMap::new();
                let mut ordered = Vec::new();
                for sentence in sentences {
                    for token in sentence.as_ref().split_whitespace() {
                        if !seen.contains_key(token) {
                            seen.insert(token.to_string(), ordered.len());
                            ordered.push(token.to_string());
                        }
                    }
                }
                ordered
            }
            OrderPolicy::Frequency => {
                // token -> (count, first position)
                let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
                for sentence in sentences {
                    for token in sentence.as_ref().split_whitespace() {
                        let next = counts.len();
                        counts.entry(token.to_string()).or_insert((0, next)).0 += 1;
                    }
                }
                let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
                ranked.sort_by(|(_, (ca, fa)), (_, (cb, fb))| cb.cmp(ca).then(fa.cmp(fb)));
                ranked.into_iter().map(|(token, _)| token).collect()
            }
        };

        let mut id_to_token = Vec::with_capacity(tokens.len() + 1);
        id_to_token.push(PAD_TOKEN.to_string());
        id_to_token.extend(tokens.into_iter().filter(|t| t != PAD_TOKEN));

        let token_to_id = id_to_token
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();

        Self {
            id_to_token,
            token_to_id,
        }
    }

    /// Looks up the id of a token.
    ///
    /// # Errors
    ///
    /// Returns `RosettaError::UnknownToken` if the token is not in the index.
    pub fn token_to_id(&self, token: &str) -> Result<u32> {
        self.token_to_id
            .get(token)
            .copied()
            .ok_or_else(|| RosettaError::UnknownToken {
                token: token.to_string(),
            })
    }

    /// Looks up the token stored at an id. Id 0 yields the padding token.
    ///
    /// # Errors
    ///
    /// Returns `RosettaError::UnknownId` if the id is out of range.
    pub fn id_to_token(&self, id: u32) -> Result<&str> {
        self.id_to_token
            .get(id as usize)
            .map(String::as_str)
            .ok_or(RosettaError::UnknownId {
                id,
                size: self.id_to_token.len(),
            })
    }

    /// Returns `true` if the token has an id.
    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    /// Number of entries including the padding entry.
    pub fn vocabulary_size(&self) -> usize {
        self.id_to_token.len()
    }

    /// Iterates over `(id, token)` pairs of the real tokens.
    pub fn tokens(&self) -> impl Iterator<Item = (u32, &str)> {
        self.id_to_token
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, token)| (id as u32, token.as_str()))
    }
}

impl TryFrom<Vec<String>> for VocabularyIndex {
    type Error = RosettaError;

    fn try_from(id_to_token: Vec<String>) -> Result<Self> {
        match id_to_token.first() {
            Some(first) if first == PAD_TOKEN => {}
            _ => {
                return Err(RosettaError::InvalidVocabulary(format!(
                    "id 0 must hold {PAD_TOKEN:?}"
                )));
            }
        }

        let mut token_to_id = HashMap::with_capacity(id_to_token.len());
        for (id, token) in id_to_token.iter().enumerate().skip(1) {
            if token == PAD_TOKEN || token_to_id.insert(token.clone(), id as u32).is_some() {
                return Err(RosettaError::InvalidVocabulary(format!(
                    "duplicate token {token:?} at id {id}"
                )));
            }
        }

        Ok(Self {
            id_to_token,
            token_to_id,
        })
    }
}

impl From<VocabularyIndex> for Vec<String> {
    fn from(index: VocabularyIndex) -> Self {
        index.id_to_token
    }
}

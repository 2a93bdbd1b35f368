//! Label sets, fingerprints and matchers
//!
//! A [`LabelSet`] identifies an alert. Its [`Fingerprint`] is the stable
//! digest every peer derives from the same labels, so it is safe to use as a
//! replicated key. [`Matcher`]s select label sets for silences.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::errors::{MurmurError, Result};

const LABEL_SEPARATOR: u8 = 0xff;

/// Stable 64-bit digest of a label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Raw digest value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for Fingerprint {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Ordered mapping of label names to label values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Create an empty label set
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a label, replacing any previous value for the name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Value of a label, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterate labels in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no labels
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Digest of the sorted label pairs.
    ///
    /// Depends only on the labels themselves, so every peer computes the same
    /// fingerprint for the same alert.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        for (name, value) in &self.0 {
            hasher.update(name.as_bytes());
            hasher.update(&[LABEL_SEPARATOR]);
            hasher.update(value.as_bytes());
            hasher.update(&[LABEL_SEPARATOR]);
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        Fingerprint(u64::from_be_bytes(prefix))
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Whether `name` is a legal label name (`[a-zA-Z_][a-zA-Z0-9_]*`).
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Selects alerts by a single label.
///
/// Equality matchers compare the label value verbatim; regex matchers are
/// anchored at both ends. A label missing from the set matches as the empty
/// string.
#[derive(Clone, Serialize, Deserialize)]
pub struct Matcher {
    /// Label name to inspect
    pub name: String,
    /// Literal value or regex pattern
    pub value: String,
    /// Whether `value` is a regex
    pub is_regex: bool,
    #[serde(skip)]
    compiled: OnceCell<Option<Regex>>,
}

impl Matcher {
    /// Equality matcher
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_regex: false,
            compiled: OnceCell::new(),
        }
    }

    /// Anchored regex matcher
    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: pattern.into(),
            is_regex: true,
            compiled: OnceCell::new(),
        }
    }

    /// Check the label name and, for regex matchers, the pattern.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_label_name(&self.name) {
            return Err(MurmurError::validation(format!(
                "invalid label name {:?}",
                self.name
            )));
        }
        if self.is_regex {
            anchored(&self.value).map_err(|e| {
                MurmurError::validation(format!("invalid regex for {}: {e}", self.name))
            })?;
        }
        Ok(())
    }

    /// Whether the label set satisfies this matcher.
    ///
    /// A regex that does not compile never matches.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let value = labels.get(&self.name).unwrap_or("");
        if !self.is_regex {
            return value == self.value;
        }
        self.compiled
            .get_or_init(|| anchored(&self.value).ok())
            .as_ref()
            .is_some_and(|re| re.is_match(value))
    }

    fn sort_key(&self) -> (&str, &str, bool) {
        (&self.name, &self.value, self.is_regex)
    }
}

fn anchored(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("is_regex", &self.is_regex)
            .finish()
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.is_regex { "=~" } else { "=" };
        write!(f, "{}{}{:?}", self.name, op, self.value)
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Matcher {}

impl PartialOrd for Matcher {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Matcher {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl Hash for Matcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

/// Conjunction of matchers.
pub type Matchers = Vec<Matcher>;

/// Whether every matcher accepts the label set.
pub fn matches_all(matchers: &[Matcher], labels: &LabelSet) -> bool {
    matchers.iter().all(|m| m.matches(labels))
}

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for talker IDs derived from labels (no member code available)
const TALKER_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_3c2e_9a4d_4f0b_8e21_5d7c_0a93_e4f6);

/// Label used for interjections attributed to the floor at large
pub const GENERAL_INTERJECTION_LABEL: &str = "Honourable members";

/// Stable talker identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TalkerId(pub String);

impl TalkerId {
    /// Member codes published in the transcript are already stable identities
    pub fn from_member_code(code: &str) -> Self {
        Self(code.trim().to_uppercase())
    }

    /// Deterministic ID for a normalized label, independent of roster state
    pub fn from_normalized_label(label: &str) -> Self {
        Self(Uuid::new_v5(&TALKER_NAMESPACE, label.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TalkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Talker as written in the document, before resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTalker {
    /// Name text as printed (e.g. "Wilson, Tim MP")
    pub label: String,
    /// Parliamentary member code (`name.id`), when the document provides one
    pub member_code: Option<String>,
    pub electorate: Option<String>,
    pub party: Option<String>,
}

impl RawTalker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            member_code: None,
            electorate: None,
            party: None,
        }
    }

    pub fn with_code(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            member_code: Some(code.into()),
            ..Self::new(label)
        }
    }

    /// The floor at large ("Honourable members interjecting")
    pub fn general() -> Self {
        Self::new(GENERAL_INTERJECTION_LABEL)
    }

    /// Cheap same-speaker check used before resolution
    pub fn same_speaker(&self, other: &RawTalker) -> bool {
        match (&self.member_code, &other.member_code) {
            (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
            _ => {
                self.label.split_whitespace().map(str::to_lowercase).eq(other
                    .label
                    .split_whitespace()
                    .map(str::to_lowercase))
            }
        }
    }
}

/// Resolved speaker identity, shared across sittings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talker {
    pub id: TalkerId,
    /// Every display name observed for this talker
    pub display_names: BTreeSet<String>,
    /// Normalized labels mapped to this talker; only ever grows
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub member_code: Option<String>,
    #[serde(default)]
    pub electorate: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
}

impl Talker {
    pub fn new(id: TalkerId) -> Self {
        Self {
            id,
            display_names: BTreeSet::new(),
            labels: BTreeSet::new(),
            member_code: None,
            electorate: None,
            party: None,
        }
    }

    /// Fold an observation of this talker into the record.
    ///
    /// Electorate and party follow the latest observation that has them;
    /// names and labels accumulate.
    pub fn observe(&mut self, raw: &RawTalker, normalized_label: Option<&str>) {
        let name = raw.label.trim();
        if !name.is_empty() {
            self.display_names.insert(name.to_string());
        }
        if let Some(label) = normalized_label {
            self.labels.insert(label.to_string());
        }
        if self.member_code.is_none() {
            self.member_code = raw.member_code.as_ref().map(|c| c.trim().to_uppercase());
        }
        if raw.electorate.is_some() {
            self.electorate = raw.electorate.clone();
        }
        if raw.party.is_some() {
            self.party = raw.party.clone();
        }
    }

    /// Merge another snapshot of the same talker (append-only on sets)
    pub fn merge(&mut self, other: &Talker) {
        self.display_names.extend(other.display_names.iter().cloned());
        self.labels.extend(other.labels.iter().cloned());
        if self.member_code.is_none() {
            self.member_code = other.member_code.clone();
        }
        if other.electorate.is_some() {
            self.electorate = other.electorate.clone();
        }
        if other.party.is_some() {
            self.party = other.party.clone();
        }
    }

    /// Preferred display name: the longest observed form
    pub fn name(&self) -> &str {
        self.display_names
            .iter()
            .max_by_key(|n| n.len())
            .map(String::as_str)
            .unwrap_or(self.id.as_str())
    }
}

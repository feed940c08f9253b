use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Chamber, DebateCategory, SittingKey};

/// Natural key of a debate section within a sitting
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebateId(pub String);

impl DebateId {
    /// `{date}_{house}_{chamber}_{debate_seq}_{subdebate_1_seq|none}`
    pub fn new(
        sitting: &SittingKey,
        chamber: Chamber,
        debate_seq: u32,
        subdebate_seq: Option<u32>,
    ) -> Self {
        Self(format!(
            "{}_{}_{}_{}_{}",
            sitting.date.format("%Y-%m-%d"),
            sitting.house,
            chamber,
            debate_seq,
            seq_or_none(subdebate_seq)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DebateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn seq_or_none(seq: Option<u32>) -> String {
    seq.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string())
}

/// A titled debate section of one sitting (one `subdebate.1` in the markup)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debate {
    pub id: DebateId,
    pub sitting: SittingKey,
    pub chamber: Chamber,
    pub category: DebateCategory,
    pub title: String,
    pub info: Option<String>,
    /// Only ever set for `BILLS` debates
    pub bill_id: Option<String>,
    pub debate_seq: u32,
    pub subdebate_seq: Option<u32>,
    pub subdebates: Vec<Subdebate>,
}

/// Nested section of a debate; never nests further
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subdebate {
    pub seq: u32,
    pub title: String,
    pub info: Option<String>,
    /// "First Reading" subdebates carry no speeches but mark bill progress
    pub first_reading: bool,
}

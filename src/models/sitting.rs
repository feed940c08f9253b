use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// House of parliament a transcript belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum House {
    /// House of Representatives
    Hor,
    Senate,
}

impl House {
    pub fn as_str(&self) -> &'static str {
        match self {
            House::Hor => "hor",
            House::Senate => "senate",
        }
    }
}

impl fmt::Display for House {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chamber transcript within a sitting document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chamber {
    Main,
    Federation,
    Unknown,
}

impl Chamber {
    /// Map a transcript container element name to its chamber
    pub fn from_element(name: &str) -> Self {
        match name {
            "chamber.xscript" => Chamber::Main,
            "fedchamb.xscript" => Chamber::Federation,
            _ => Chamber::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chamber::Main => "main",
            Chamber::Federation => "federation",
            Chamber::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Chamber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sitting day of one house; the unit of ingestion and commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SittingKey {
    pub house: House,
    pub date: NaiveDate,
}

impl SittingKey {
    pub fn new(house: House, date: NaiveDate) -> Self {
        Self { house, date }
    }
}

impl fmt::Display for SittingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date.format("%Y-%m-%d"), self.house)
    }
}

/// Debate category heading.
///
/// The set is open: headings the transcript introduces over time are kept
/// verbatim in `Other` instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DebateCategory {
    Bills,
    StatementsByMembers,
    Other(String),
}

impl DebateCategory {
    /// Classify a literal heading, tolerating case and spacing differences
    pub fn from_heading(heading: &str) -> Self {
        let collapsed = heading.split_whitespace().collect::<Vec<_>>().join(" ");
        match collapsed.to_uppercase().as_str() {
            "BILLS" => DebateCategory::Bills,
            "STATEMENTS BY MEMBERS" => DebateCategory::StatementsByMembers,
            _ => DebateCategory::Other(collapsed),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DebateCategory::Bills => "BILLS",
            DebateCategory::StatementsByMembers => "STATEMENTS BY MEMBERS",
            DebateCategory::Other(heading) => heading,
        }
    }

    pub fn is_bills(&self) -> bool {
        matches!(self, DebateCategory::Bills)
    }
}

impl From<String> for DebateCategory {
    fn from(value: String) -> Self {
        DebateCategory::from_heading(&value)
    }
}

impl From<DebateCategory> for String {
    fn from(value: DebateCategory) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DebateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_heading() {
        assert_eq!(DebateCategory::from_heading("BILLS"), DebateCategory::Bills);
        assert_eq!(DebateCategory::from_heading(" bills "), DebateCategory::Bills);
        assert_eq!(
            DebateCategory::from_heading("STATEMENTS  BY\nMEMBERS"),
            DebateCategory::StatementsByMembers
        );
        assert_eq!(
            DebateCategory::from_heading("PETITIONS"),
            DebateCategory::Other("PETITIONS".to_string())
        );
    }

    #[test]
    fn test_category_serializes_as_heading() {
        let json = serde_json::to_string(&DebateCategory::StatementsByMembers).unwrap();
        assert_eq!(json, "\"STATEMENTS BY MEMBERS\"");

        let back: DebateCategory = serde_json::from_str("\"CONSTITUENCY STATEMENTS\"").unwrap();
        assert_eq!(back, DebateCategory::Other("CONSTITUENCY STATEMENTS".into()));
    }

    #[test]
    fn test_chamber_from_element() {
        assert_eq!(Chamber::from_element("chamber.xscript"), Chamber::Main);
        assert_eq!(Chamber::from_element("fedchamb.xscript"), Chamber::Federation);
        assert_eq!(Chamber::from_element("answers.to.questions"), Chamber::Unknown);
    }

    #[test]
    fn test_sitting_key_display() {
        let key = SittingKey::new(House::Senate, NaiveDate::from_ymd_opt(2024, 2, 6).unwrap());
        assert_eq!(key.to_string(), "2024-02-06_senate");
    }
}

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::debate::seq_or_none;
use super::{Chamber, DebateCategory, DebateId, SittingKey, TalkerId};

/// Natural key of a speech: its debate plus its position in document order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeechId(pub String);

impl SpeechId {
    /// `{debate_id}_{subdebate_2_seq|none}_{speech_seq}`
    pub fn new(debate_id: &DebateId, subdebate_seq: Option<u32>, speech_seq: u32) -> Self {
        Self(format!(
            "{}_{}_{}",
            debate_id,
            seq_or_none(subdebate_seq),
            speech_seq
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpeechId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Natural key of a speech part
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(pub String);

impl PartId {
    pub fn new(speech_id: &SpeechId, ordinal: u32) -> Self {
        Self(format!("{}_{}", speech_id, ordinal))
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the markup introduced a part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    /// Opening of a speech
    Speech,
    /// Marked interjection (member, office or the floor)
    Interjection,
    /// Main talker resuming after an interjection
    Continuation,
}

/// One contiguous block of text from one talker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechPart {
    pub id: PartId,
    pub speech_id: SpeechId,
    pub talker_id: TalkerId,
    pub text: String,
    /// Position within the parent speech, starting at 0
    pub ordinal: u32,
    pub kind: PartKind,
    /// Derived: `talker_id != speech.main_talker_id`
    pub is_interjection: bool,
}

/// Debate context shared by every speech of one section scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateContext {
    pub debate_id: DebateId,
    pub sitting: SittingKey,
    pub chamber: Chamber,
    pub category: DebateCategory,
    pub bill_id: Option<String>,
    pub debate_title: String,
    pub debate_info: Option<String>,
    pub subdebate_seq: Option<u32>,
    pub subdebate_title: Option<String>,
    pub subdebate_info: Option<String>,
}

/// Part content before IDs and flags are derived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartContent {
    pub talker_id: TalkerId,
    pub text: String,
    pub kind: PartKind,
}

/// A maximal run of dialogue opened by one main talker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speech {
    pub id: SpeechId,
    #[serde(flatten)]
    pub context: DebateContext,
    pub speech_seq: u32,
    pub main_talker_id: TalkerId,
    /// Sitting date plus the first part's printed time, when there is one
    pub spoken_at: Option<NaiveDateTime>,
    /// Split out into their own rows when persisted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<SpeechPart>,
}

impl Speech {
    /// Build a speech from its ordered parts.
    ///
    /// The main talker is the talker of the first part. Ordinals, part IDs and
    /// interjection flags are derived here and nowhere else. Returns `None`
    /// when there are no parts.
    pub fn assemble(
        context: DebateContext,
        speech_seq: u32,
        parts: Vec<PartContent>,
        spoken_at: Option<NaiveDateTime>,
    ) -> Option<Self> {
        let main_talker_id = parts.first()?.talker_id.clone();
        let id = SpeechId::new(&context.debate_id, context.subdebate_seq, speech_seq);

        let parts = parts
            .into_iter()
            .enumerate()
            .map(|(ordinal, content)| {
                let ordinal = ordinal as u32;
                SpeechPart {
                    id: PartId::new(&id, ordinal),
                    speech_id: id.clone(),
                    is_interjection: content.talker_id != main_talker_id,
                    talker_id: content.talker_id,
                    text: content.text,
                    ordinal,
                    kind: content.kind,
                }
            })
            .collect();

        Some(Self {
            id,
            context,
            speech_seq,
            main_talker_id,
            spoken_at,
            parts,
        })
    }

    pub fn interjection_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_interjection).count()
    }

    /// Check the part invariants against this speech's main talker
    pub fn check_parts<'a>(
        &self,
        parts: impl IntoIterator<Item = &'a SpeechPart>,
    ) -> Result<(), String> {
        let mut count = 0u32;
        for part in parts {
            if part.speech_id != self.id {
                return Err(format!("part {} does not belong to speech {}", part.id, self.id));
            }
            if part.ordinal != count {
                return Err(format!(
                    "speech {} has part ordinal {} where {} was expected",
                    self.id, part.ordinal, count
                ));
            }
            if part.is_interjection != (part.talker_id != self.main_talker_id) {
                return Err(format!("part {} has a stale interjection flag", part.id));
            }
            if count == 0 && part.is_interjection {
                return Err(format!("speech {} opens with an interjection", self.id));
            }
            count += 1;
        }
        if count == 0 {
            return Err(format!("speech {} has no parts", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::House;

    fn context() -> DebateContext {
        let sitting = SittingKey::new(House::Hor, NaiveDate::from_ymd_opt(2024, 2, 6).unwrap());
        DebateContext {
            debate_id: DebateId::new(&sitting, Chamber::Main, 0, Some(0)),
            sitting,
            chamber: Chamber::Main,
            category: DebateCategory::Bills,
            bill_id: Some("r7346".into()),
            debate_title: "Repeal Net Zero Bill 2025".into(),
            debate_info: None,
            subdebate_seq: Some(1),
            subdebate_title: Some("Second Reading".into()),
            subdebate_info: None,
        }
    }

    fn part(talker: &str, text: &str, kind: PartKind) -> PartContent {
        PartContent {
            talker_id: TalkerId(talker.into()),
            text: text.into(),
            kind,
        }
    }

    #[test]
    fn test_assemble_derives_flags() {
        let speech = Speech::assemble(
            context(),
            2,
            vec![
                part("A", "text1", PartKind::Speech),
                part("B", "interjection text", PartKind::Interjection),
                part("A", "text2", PartKind::Continuation),
            ],
            None,
        )
        .unwrap();

        assert_eq!(speech.id.as_str(), "2024-02-06_hor_main_0_0_1_2");
        assert_eq!(speech.main_talker_id, TalkerId("A".into()));
        let flags: Vec<bool> = speech.parts.iter().map(|p| p.is_interjection).collect();
        assert_eq!(flags, vec![false, true, false]);
        let ordinals: Vec<u32> = speech.parts.iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(speech.parts[1].id.0, "2024-02-06_hor_main_0_0_1_2_1");
        assert!(speech.check_parts(&speech.parts).is_ok());
    }

    #[test]
    fn test_assemble_empty() {
        assert!(Speech::assemble(context(), 0, vec![], None).is_none());
    }

    #[test]
    fn test_check_parts_rejects_gaps() {
        let mut speech = Speech::assemble(
            context(),
            0,
            vec![part("A", "a", PartKind::Speech), part("B", "b", PartKind::Interjection)],
            None,
        )
        .unwrap();
        speech.parts[1].ordinal = 5;
        assert!(speech.check_parts(&speech.parts).is_err());

        speech.parts[1].ordinal = 1;
        speech.parts[1].is_interjection = false;
        assert!(speech.check_parts(&speech.parts).is_err());
    }
}

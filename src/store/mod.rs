pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::models::{
    Debate, DebateId, PartId, SittingKey, Speech, SpeechId, SpeechPart, Talker, TalkerId,
};

/// Everything one sitting day writes, applied all-or-nothing
#[derive(Debug, Clone)]
pub struct SittingBatch {
    pub sitting: SittingKey,
    pub source_id: String,
    pub debates: BTreeMap<DebateId, Debate>,
    /// Speeches with their parts split out into `parts`
    pub speeches: BTreeMap<SpeechId, Speech>,
    pub parts: BTreeMap<PartId, SpeechPart>,
    pub talkers: BTreeMap<TalkerId, Talker>,
}

impl SittingBatch {
    pub fn new(sitting: SittingKey, source_id: impl Into<String>) -> Self {
        Self {
            sitting,
            source_id: source_id.into(),
            debates: BTreeMap::new(),
            speeches: BTreeMap::new(),
            parts: BTreeMap::new(),
            talkers: BTreeMap::new(),
        }
    }

    pub fn upsert_debate(&mut self, debate: Debate) {
        self.debates.insert(debate.id.clone(), debate);
    }

    /// Upsert a speech; its parts become separate rows
    pub fn upsert_speech(&mut self, mut speech: Speech) {
        for part in std::mem::take(&mut speech.parts) {
            self.upsert_speech_part(part);
        }
        self.speeches.insert(speech.id.clone(), speech);
    }

    pub fn upsert_speech_part(&mut self, part: SpeechPart) {
        self.parts.insert(part.id.clone(), part);
    }

    /// Talkers merge, never replace
    pub fn upsert_talker(&mut self, talker: Talker) {
        match self.talkers.get_mut(&talker.id) {
            Some(existing) => existing.merge(&talker),
            None => {
                self.talkers.insert(talker.id.clone(), talker);
            }
        }
    }

    /// Parts of one speech, in ordinal order
    pub fn parts_of(&self, speech_id: &SpeechId) -> Vec<&SpeechPart> {
        let mut parts: Vec<&SpeechPart> =
            self.parts.values().filter(|p| &p.speech_id == speech_id).collect();
        parts.sort_by_key(|p| p.ordinal);
        parts
    }

    /// Check every invariant the batch must hold before it is committed
    pub fn validate(&self) -> Result<(), PersistenceError> {
        let invalid = |reason: String| Err(PersistenceError::InvalidBatch(reason));

        for debate in self.debates.values() {
            if debate.sitting != self.sitting {
                return invalid(format!("debate {} belongs to {}", debate.id, debate.sitting));
            }
            if debate.bill_id.is_some() && !debate.category.is_bills() {
                return invalid(format!("debate {} has a bill outside BILLS", debate.id));
            }
        }

        let mut by_speech: BTreeMap<&SpeechId, Vec<&SpeechPart>> = BTreeMap::new();
        for part in self.parts.values() {
            if !self.speeches.contains_key(&part.speech_id) {
                return invalid(format!("part {} has no speech", part.id));
            }
            if !self.talkers.contains_key(&part.talker_id) {
                return invalid(format!("part {} refers to unknown talker {}", part.id, part.talker_id));
            }
            by_speech.entry(&part.speech_id).or_default().push(part);
        }

        for speech in self.speeches.values() {
            if speech.context.sitting != self.sitting {
                return invalid(format!("speech {} belongs to {}", speech.id, speech.context.sitting));
            }
            if !self.debates.contains_key(&speech.context.debate_id) {
                return invalid(format!("speech {} has no debate", speech.id));
            }
            if !self.talkers.contains_key(&speech.main_talker_id) {
                return invalid(format!("speech {} refers to unknown talker", speech.id));
            }
            let mut parts = by_speech.remove(&speech.id).unwrap_or_default();
            parts.sort_by_key(|p| p.ordinal);
            speech
                .check_parts(parts)
                .map_err(PersistenceError::InvalidBatch)?;
        }

        Ok(())
    }

    pub fn summary(&self) -> CommitSummary {
        CommitSummary {
            sitting: self.sitting,
            debates: self.debates.len(),
            speeches: self.speeches.len(),
            parts: self.parts.len(),
            talkers: self.talkers.len(),
            replaced: false,
        }
    }
}

/// What a commit wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub sitting: SittingKey,
    pub debates: usize,
    pub speeches: usize,
    pub parts: usize,
    pub talkers: usize,
    /// A previous entity set for the sitting was replaced
    pub replaced: bool,
}

/// Stored form of one sitting day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SittingRecord {
    pub sitting: SittingKey,
    pub source_id: String,
    pub debates: Vec<Debate>,
    pub speeches: Vec<Speech>,
    pub parts: Vec<SpeechPart>,
}

impl SittingRecord {
    /// Speeches keep document order (debate, subdebate, sequence)
    pub fn from_batch(batch: SittingBatch) -> (Self, Vec<Talker>) {
        let mut debates: Vec<Debate> = batch.debates.into_values().collect();
        debates.sort_by_key(|d| (d.debate_seq, d.subdebate_seq.map(i64::from).unwrap_or(-1)));

        let mut speeches: Vec<Speech> = batch.speeches.into_values().collect();
        {
            let debate_pos: BTreeMap<&DebateId, usize> =
                debates.iter().enumerate().map(|(i, d)| (&d.id, i)).collect();
            speeches.sort_by_key(|s| {
                (
                    debate_pos.get(&s.context.debate_id).copied(),
                    s.context.subdebate_seq.map(i64::from).unwrap_or(-1),
                    s.speech_seq,
                )
            });
        }

        let mut parts: Vec<SpeechPart> = batch.parts.into_values().collect();
        {
            let speech_pos: BTreeMap<&SpeechId, usize> =
                speeches.iter().enumerate().map(|(i, s)| (&s.id, i)).collect();
            parts.sort_by_key(|p| (speech_pos.get(&p.speech_id).copied(), p.ordinal));
        }

        let record = Self {
            sitting: batch.sitting,
            source_id: batch.source_id,
            debates,
            speeches,
            parts,
        };
        (record, batch.talkers.into_values().collect())
    }

    /// Speech with its parts attached
    pub fn speech_with_parts(&self, id: &SpeechId) -> Option<Speech> {
        let mut speech = self.speeches.iter().find(|s| &s.id == id)?.clone();
        speech.parts = self
            .parts
            .iter()
            .filter(|p| &p.speech_id == id)
            .cloned()
            .collect();
        Some(speech)
    }

    /// Every speech with its parts, in document order
    pub fn full_speeches(&self) -> Vec<Speech> {
        let mut by_speech: BTreeMap<&SpeechId, Vec<SpeechPart>> = BTreeMap::new();
        for part in &self.parts {
            by_speech.entry(&part.speech_id).or_default().push(part.clone());
        }
        self.speeches
            .iter()
            .map(|s| Speech {
                parts: by_speech.remove(&s.id).unwrap_or_default(),
                ..s.clone()
            })
            .collect()
    }
}

/// Durable store for finished sittings
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Apply one sitting's batch atomically, replacing any previous set for
    /// that sitting and merging talkers append-only
    async fn commit(&self, batch: SittingBatch) -> Result<CommitSummary, PersistenceError>;

    /// Every persisted talker, used to seed the roster
    async fn load_talkers(&self) -> Result<Vec<Talker>, PersistenceError>;
}

/// Bill with the debates that reference it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillSummary {
    pub bill_id: String,
    pub titles: BTreeSet<String>,
    pub sittings: BTreeSet<SittingKey>,
    pub speech_count: usize,
}

/// Read side over persisted sittings
pub trait SpeechQuery {
    fn list_talkers(&self) -> Vec<Talker>;

    /// Speeches opened by the talker
    fn speeches_by_talker(&self, talker: &TalkerId) -> Vec<Speech>;

    fn list_bills(&self) -> Vec<BillSummary>;

    fn speeches_by_bill(&self, bill_id: &str) -> Vec<Speech>;

    fn speech_with_parts(&self, id: &SpeechId) -> Option<Speech>;

    /// Every speech of a sitting with its parts, in document order
    fn sitting_speeches(&self, sitting: &SittingKey) -> Vec<Speech>;

    fn sitting_record(&self, sitting: &SittingKey) -> Option<SittingRecord>;
}

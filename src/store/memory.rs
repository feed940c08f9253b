use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{
    BillSummary, CommitSummary, PersistenceGateway, SittingBatch, SittingRecord, SpeechQuery,
};
use crate::error::PersistenceError;
use crate::models::{SittingKey, Speech, SpeechId, Talker, TalkerId};

#[derive(Debug, Default)]
struct StoreState {
    sittings: BTreeMap<SittingKey, SittingRecord>,
    talkers: BTreeMap<TalkerId, Talker>,
}

/// In-process store. A commit happens under a single write guard, so readers
/// see a sitting either entirely or not at all.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and apply a batch synchronously
    pub fn apply(&self, batch: SittingBatch) -> Result<CommitSummary, PersistenceError> {
        batch.validate()?;
        let mut summary = batch.summary();
        let (record, talkers) = SittingRecord::from_batch(batch);

        let mut state = self.state.write();
        summary.replaced = state.sittings.insert(record.sitting, record).is_some();
        for talker in talkers {
            merge_talker(&mut state.talkers, talker);
        }
        drop(state);

        debug!(
            "Committed {}: {} speeches, {} parts (replaced: {})",
            summary.sitting, summary.speeches, summary.parts, summary.replaced
        );
        Ok(summary)
    }

    /// Load an already validated record, e.g. from disk
    pub(crate) fn restore(&self, record: SittingRecord, talkers: Vec<Talker>) {
        let mut state = self.state.write();
        state.sittings.insert(record.sitting, record);
        for talker in talkers {
            merge_talker(&mut state.talkers, talker);
        }
    }

    pub(crate) fn restore_talkers(&self, talkers: Vec<Talker>) {
        let mut state = self.state.write();
        for talker in talkers {
            merge_talker(&mut state.talkers, talker);
        }
    }

    /// Every talker merged with the given ones, without storing the result
    pub(crate) fn merged_talkers(&self, incoming: &[Talker]) -> Vec<Talker> {
        let mut talkers = self.state.read().talkers.clone();
        for talker in incoming {
            merge_talker(&mut talkers, talker.clone());
        }
        talkers.into_values().collect()
    }

    pub fn sittings(&self) -> Vec<SittingKey> {
        self.state.read().sittings.keys().copied().collect()
    }

    pub fn speech_count(&self) -> usize {
        self.state.read().sittings.values().map(|r| r.speeches.len()).sum()
    }

    pub fn part_count(&self) -> usize {
        self.state.read().sittings.values().map(|r| r.parts.len()).sum()
    }

    fn collect_speeches(&self, pred: impl Fn(&Speech) -> bool) -> Vec<Speech> {
        let state = self.state.read();
        state
            .sittings
            .values()
            .flat_map(|record| {
                record
                    .speeches
                    .iter()
                    .filter(|s| pred(s))
                    .filter_map(|s| record.speech_with_parts(&s.id))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

fn merge_talker(talkers: &mut BTreeMap<TalkerId, Talker>, talker: Talker) {
    match talkers.get_mut(&talker.id) {
        Some(existing) => existing.merge(&talker),
        None => {
            talkers.insert(talker.id.clone(), talker);
        }
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn commit(&self, batch: SittingBatch) -> Result<CommitSummary, PersistenceError> {
        self.apply(batch)
    }

    async fn load_talkers(&self) -> Result<Vec<Talker>, PersistenceError> {
        Ok(self.list_talkers())
    }
}

impl SpeechQuery for MemoryStore {
    fn list_talkers(&self) -> Vec<Talker> {
        self.state.read().talkers.values().cloned().collect()
    }

    fn speeches_by_talker(&self, talker: &TalkerId) -> Vec<Speech> {
        self.collect_speeches(|s| &s.main_talker_id == talker)
    }

    fn list_bills(&self) -> Vec<BillSummary> {
        let state = self.state.read();
        let mut bills: BTreeMap<String, BillSummary> = BTreeMap::new();
        for record in state.sittings.values() {
            for debate in &record.debates {
                let Some(bill_id) = &debate.bill_id else {
                    continue;
                };
                let summary = bills.entry(bill_id.clone()).or_insert_with(|| BillSummary {
                    bill_id: bill_id.clone(),
                    titles: Default::default(),
                    sittings: Default::default(),
                    speech_count: 0,
                });
                summary.titles.insert(debate.title.clone());
                summary.sittings.insert(record.sitting);
                summary.speech_count += record
                    .speeches
                    .iter()
                    .filter(|s| s.context.debate_id == debate.id)
                    .count();
            }
        }
        bills.into_values().collect()
    }

    fn speeches_by_bill(&self, bill_id: &str) -> Vec<Speech> {
        self.collect_speeches(|s| s.context.bill_id.as_deref() == Some(bill_id))
    }

    fn speech_with_parts(&self, id: &SpeechId) -> Option<Speech> {
        let state = self.state.read();
        state
            .sittings
            .values()
            .find_map(|record| record.speech_with_parts(id))
    }

    fn sitting_speeches(&self, sitting: &SittingKey) -> Vec<Speech> {
        self.state
            .read()
            .sittings
            .get(sitting)
            .map(SittingRecord::full_speeches)
            .unwrap_or_default()
    }

    fn sitting_record(&self, sitting: &SittingKey) -> Option<SittingRecord> {
        self.state.read().sittings.get(sitting).cloned()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{
        Chamber, Debate, DebateCategory, DebateContext, DebateId, House, PartContent, PartKind,
    };

    fn sitting() -> SittingKey {
        SittingKey::new(House::Hor, NaiveDate::from_ymd_opt(2024, 2, 6).unwrap())
    }

    fn batch(texts: &[(&str, &str)]) -> SittingBatch {
        let sitting = sitting();
        let debate = Debate {
            id: DebateId::new(&sitting, Chamber::Main, 0, Some(0)),
            sitting,
            chamber: Chamber::Main,
            category: DebateCategory::Bills,
            title: "Repeal Net Zero Bill 2025".into(),
            info: None,
            bill_id: Some("r7346".into()),
            debate_seq: 0,
            subdebate_seq: Some(0),
            subdebates: vec![],
        };
        let context = DebateContext {
            debate_id: debate.id.clone(),
            sitting,
            chamber: Chamber::Main,
            category: DebateCategory::Bills,
            bill_id: Some("r7346".into()),
            debate_title: debate.title.clone(),
            debate_info: None,
            subdebate_seq: None,
            subdebate_title: None,
            subdebate_info: None,
        };
        let parts = texts
            .iter()
            .map(|(talker, text)| PartContent {
                talker_id: TalkerId((*talker).into()),
                text: (*text).into(),
                kind: PartKind::Continuation,
            })
            .collect();
        let speech = Speech::assemble(context, 0, parts, None).unwrap();

        let mut batch = SittingBatch::new(sitting, "test.xml");
        for talker in texts.iter().map(|(t, _)| *t) {
            batch.upsert_talker(Talker::new(TalkerId(talker.into())));
        }
        batch.upsert_debate(debate);
        batch.upsert_speech(speech);
        batch
    }

    #[tokio::test]
    async fn test_commit_and_query() {
        let store = MemoryStore::new();
        let summary = store
            .commit(batch(&[("IMW", "one"), ("DYW", "two"), ("IMW", "three")]))
            .await
            .unwrap();
        assert_eq!(summary.speeches, 1);
        assert_eq!(summary.parts, 3);
        assert!(!summary.replaced);

        let speeches = store.speeches_by_talker(&TalkerId("IMW".into()));
        assert_eq!(speeches.len(), 1);
        assert_eq!(speeches[0].interjection_count(), 1);
        assert!(store.speeches_by_talker(&TalkerId("DYW".into())).is_empty());

        let bills = store.list_bills();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].speech_count, 1);
        assert_eq!(store.speeches_by_bill("r7346").len(), 1);
        assert_eq!(store.list_talkers().len(), 2);
    }

    #[tokio::test]
    async fn test_recommit_replaces_sitting() {
        let store = MemoryStore::new();
        store.commit(batch(&[("IMW", "one"), ("DYW", "two")])).await.unwrap();
        let summary = store.commit(batch(&[("IMW", "one")])).await.unwrap();

        assert!(summary.replaced);
        assert_eq!(store.speech_count(), 1);
        assert_eq!(store.part_count(), 1);
        // Talkers are never removed
        assert_eq!(store.list_talkers().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_batch_writes_nothing() {
        let store = MemoryStore::new();
        let mut bad = batch(&[("IMW", "one"), ("DYW", "two")]);
        bad.talkers.remove(&TalkerId("DYW".into()));

        let err = store.commit(bad).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidBatch(_)));
        assert_eq!(store.speech_count(), 0);
        assert!(store.list_talkers().is_empty());
    }

    #[test]
    fn test_orphan_part_is_invalid() {
        let mut bad = batch(&[("IMW", "one")]);
        let mut part = bad.parts.values().next().unwrap().clone();
        part.speech_id = SpeechId("missing".into());
        part.id = crate::models::PartId("missing_0".into());
        bad.upsert_speech_part(part);
        assert!(bad.validate().is_err());
    }
}

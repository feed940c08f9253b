use tracing::info;

use crate::error::PersistenceError;
use crate::stages::Stage2Result;
use crate::store::{CommitSummary, PersistenceGateway, SittingBatch};

/// Collect a resolved sitting into one batch keyed by natural keys
pub fn build_batch(resolved: Stage2Result) -> SittingBatch {
    let mut batch = SittingBatch::new(resolved.sitting, resolved.source_id);
    for talker in resolved.talkers {
        batch.upsert_talker(talker);
    }
    for debate in resolved.debates {
        batch.upsert_debate(debate);
    }
    for speech in resolved.speeches {
        batch.upsert_speech(speech);
    }
    batch
}

/// Perform Stage 3: commit the batch as one unit
pub async fn execute_stage3(
    gateway: &dyn PersistenceGateway,
    batch: SittingBatch,
) -> Result<CommitSummary, PersistenceError> {
    let sitting = batch.sitting;
    let summary = gateway.commit(batch).await?;
    info!(
        "Stage 3: committed {} ({} debates, {} speeches, {} parts, {} talkers)",
        sitting, summary.debates, summary.speeches, summary.parts, summary.talkers
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::io::SourceDocument;
    use crate::models::{House, SittingKey};
    use crate::stages::{execute_stage1, execute_stage2, parse_document, TalkerRoster};
    use crate::store::{MemoryStore, SpeechQuery};

    const SITTING_XML: &str = include_str!("../../testdata/hansard-2024-02-06.xml");

    fn resolved(roster: &TalkerRoster) -> Stage2Result {
        let sitting = SittingKey::new(House::Hor, NaiveDate::from_ymd_opt(2024, 2, 6).unwrap());
        let doc = SourceDocument::new("fixture.xml", SITTING_XML.as_bytes().to_vec());
        let parsed = parse_document(sitting, &doc).unwrap();
        execute_stage2(roster, execute_stage1(&parsed)).unwrap()
    }

    #[test]
    fn test_batch_from_fixture_is_valid() {
        let roster = TalkerRoster::default();
        let batch = build_batch(resolved(&roster));
        batch.validate().unwrap();

        for speech in batch.speeches.values() {
            let parts = batch.parts_of(&speech.id);
            let ordinals: Vec<u32> = parts.iter().map(|p| p.ordinal).collect();
            assert_eq!(ordinals, (0..parts.len() as u32).collect::<Vec<_>>());
            assert!(!parts[0].is_interjection);
            for part in parts {
                assert_eq!(part.is_interjection, part.talker_id != speech.main_talker_id);
            }
        }
    }

    #[tokio::test]
    async fn test_commit_twice_keeps_counts() {
        let roster = TalkerRoster::default();
        let store = MemoryStore::new();

        let first = execute_stage3(&store, build_batch(resolved(&roster))).await.unwrap();
        let second = execute_stage3(&store, build_batch(resolved(&roster))).await.unwrap();

        assert_eq!(first.speeches, second.speeches);
        assert_eq!(first.parts, second.parts);
        assert_eq!(store.speech_count(), first.speeches);
        assert_eq!(store.list_talkers().len(), first.talkers);
    }
}

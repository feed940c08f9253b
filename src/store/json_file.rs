use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    BillSummary, CommitSummary, MemoryStore, PersistenceGateway, SittingBatch, SittingRecord,
    SpeechQuery,
};
use crate::error::PersistenceError;
use crate::models::{SittingKey, Speech, SpeechId, Talker, TalkerId};

const TALKERS_FILE: &str = "talkers.json";
const SITTINGS_DIR: &str = "sittings";

/// Store that keeps one JSON file per sitting plus a shared `talkers.json`.
///
/// Each sitting file carries the talkers it references, and renaming it into
/// place is the only commit point. `talkers.json` is a merged index rewritten
/// after that rename and rebuilt from the sitting files at open. Reads are
/// served from an in-memory copy.
pub struct JsonFileStore {
    root: PathBuf,
    cache: MemoryStore,
    write_lock: Mutex<()>,
    tmp_seq: AtomicU64,
}

/// On-disk form of one committed sitting
#[derive(Debug, Serialize, Deserialize)]
struct SittingFile {
    record: SittingRecord,
    talkers: Vec<Talker>,
}

impl JsonFileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        let sittings_dir = root.join(SITTINGS_DIR);
        std::fs::create_dir_all(&sittings_dir)?;
        remove_stale_tmp(&root)?;
        remove_stale_tmp(&sittings_dir)?;

        let cache = MemoryStore::new();

        let mut loaded = 0;
        for entry in std::fs::read_dir(&sittings_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let file: SittingFile = serde_json::from_slice(&std::fs::read(&path)?)?;
            cache.restore(file.record, file.talkers);
            loaded += 1;
        }

        let talkers_path = root.join(TALKERS_FILE);
        if talkers_path.exists() {
            let talkers: Vec<Talker> = serde_json::from_slice(&std::fs::read(&talkers_path)?)?;
            cache.restore_talkers(talkers);
        }

        info!(
            "Opened store {:?}: {} sittings, {} talkers",
            root,
            loaded,
            cache.list_talkers().len()
        );

        Ok(Self {
            root,
            cache,
            write_lock: Mutex::new(()),
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sitting_path(&self, sitting: &SittingKey) -> PathBuf {
        self.root.join(SITTINGS_DIR).join(format!("{}.json", sitting))
    }

    pub fn cache(&self) -> &MemoryStore {
        &self.cache
    }
}

/// Temporary files of one commit; whatever was not renamed into place is
/// removed on drop
struct Staged {
    sitting_tmp: PathBuf,
    talkers_tmp: PathBuf,
}

impl Drop for Staged {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.sitting_tmp);
        let _ = std::fs::remove_file(&self.talkers_tmp);
    }
}

fn tmp_path(path: &Path, seq: u64) -> PathBuf {
    path.with_extension(format!("json.{}.tmp", seq))
}

fn remove_stale_tmp(dir: &Path) -> Result<(), PersistenceError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
            debug!("Removing stale {:?}", path);
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Write both temporary files. Runs on the blocking pool.
fn stage(
    staged: Staged,
    file: SittingFile,
    merged: Vec<Talker>,
) -> Result<(Staged, SittingFile), PersistenceError> {
    write_json(&staged.sitting_tmp, &file)?;
    write_json(&staged.talkers_tmp, &merged)?;
    Ok((staged, file))
}

#[async_trait]
impl PersistenceGateway for JsonFileStore {
    async fn commit(&self, batch: SittingBatch) -> Result<CommitSummary, PersistenceError> {
        batch.validate()?;
        let _guard = self.write_lock.lock().await;

        let sitting = batch.sitting;
        let mut summary = batch.summary();
        let (record, talkers) = SittingRecord::from_batch(batch);
        let merged = self.cache.merged_talkers(&talkers);

        let path = self.sitting_path(&sitting);
        let talkers_path = self.root.join(TALKERS_FILE);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let staged = Staged {
            sitting_tmp: tmp_path(&path, seq),
            talkers_tmp: tmp_path(&talkers_path, seq),
        };
        let file = SittingFile { record, talkers };

        let (staged, file) = tokio::task::spawn_blocking(move || stage(staged, file, merged))
            .await
            .map_err(|e| PersistenceError::Io(std::io::Error::other(e.to_string())))??;

        // No await from here on: a dropped commit never reaches the renames
        summary.replaced = path.exists();
        std::fs::rename(&staged.sitting_tmp, &path)?;
        if let Err(err) = std::fs::rename(&staged.talkers_tmp, &talkers_path) {
            warn!("{} committed but {:?} not refreshed: {}", sitting, talkers_path, err);
        }
        drop(staged);

        self.cache.restore(file.record, file.talkers);
        debug!("Wrote {:?}", path);
        Ok(summary)
    }

    async fn load_talkers(&self) -> Result<Vec<Talker>, PersistenceError> {
        Ok(self.cache.list_talkers())
    }
}

impl SpeechQuery for JsonFileStore {
    fn list_talkers(&self) -> Vec<Talker> {
        self.cache.list_talkers()
    }

    fn speeches_by_talker(&self, talker: &TalkerId) -> Vec<Speech> {
        self.cache.speeches_by_talker(talker)
    }

    fn list_bills(&self) -> Vec<BillSummary> {
        self.cache.list_bills()
    }

    fn speeches_by_bill(&self, bill_id: &str) -> Vec<Speech> {
        self.cache.speeches_by_bill(bill_id)
    }

    fn speech_with_parts(&self, id: &SpeechId) -> Option<Speech> {
        self.cache.speech_with_parts(id)
    }

    fn sitting_speeches(&self, sitting: &SittingKey) -> Vec<Speech> {
        self.cache.sitting_speeches(sitting)
    }

    fn sitting_record(&self, sitting: &SittingKey) -> Option<SittingRecord> {
        self.cache.sitting_record(sitting)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::models::{
        Chamber, Debate, DebateCategory, DebateContext, DebateId, House, PartContent, PartKind,
    };

    fn batch() -> SittingBatch {
        batch_with_text("I present a petition.")
    }

    fn batch_with_text(text: &str) -> SittingBatch {
        let sitting = SittingKey::new(House::Senate, NaiveDate::from_ymd_opt(2024, 2, 6).unwrap());
        let debate = Debate {
            id: DebateId::new(&sitting, Chamber::Main, 0, None),
            sitting,
            chamber: Chamber::Main,
            category: DebateCategory::Other("PETITIONS".into()),
            title: "PETITIONS".into(),
            info: None,
            bill_id: None,
            debate_seq: 0,
            subdebate_seq: None,
            subdebates: vec![],
        };
        let context = DebateContext {
            debate_id: debate.id.clone(),
            sitting,
            chamber: Chamber::Main,
            category: debate.category.clone(),
            bill_id: None,
            debate_title: debate.title.clone(),
            debate_info: None,
            subdebate_seq: None,
            subdebate_title: None,
            subdebate_info: None,
        };
        let speech = Speech::assemble(
            context,
            0,
            vec![PartContent {
                talker_id: TalkerId("AWP".into()),
                text: text.into(),
                kind: PartKind::Speech,
            }],
            None,
        )
        .unwrap();

        let mut batch = SittingBatch::new(sitting, "senate.xml");
        batch.upsert_talker(Talker::new(TalkerId("AWP".into())));
        batch.upsert_debate(debate);
        batch.upsert_speech(speech);
        batch
    }

    #[tokio::test]
    async fn test_commit_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let summary = store.commit(batch()).await.unwrap();
        assert_eq!(summary.parts, 1);
        assert!(dir.path().join("sittings/2024-02-06_senate.json").exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("sittings"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_talkers().await.unwrap().len(), 1);
        let sitting = batch().sitting;
        let speeches = reopened.sitting_speeches(&sitting);
        assert_eq!(speeches.len(), 1);
        assert_eq!(speeches[0].parts[0].text, "I present a petition.");
    }

    #[tokio::test]
    async fn test_recommit_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store.commit(batch()).await.unwrap();
        let first = std::fs::read(dir.path().join("sittings/2024-02-06_senate.json")).unwrap();

        let summary = store.commit(batch()).await.unwrap();
        let second = std::fs::read(dir.path().join("sittings/2024-02-06_senate.json")).unwrap();
        assert!(summary.replaced);
        assert_eq!(first, second);
        assert_eq!(store.cache().speech_count(), 1);
    }

    #[tokio::test]
    async fn test_talkers_rebuilt_from_sitting_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store.commit(batch()).await.unwrap();
        std::fs::remove_file(dir.path().join(TALKERS_FILE)).unwrap();

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        let talkers = reopened.list_talkers();
        assert_eq!(talkers.len(), 1);
        assert_eq!(talkers[0].id, TalkerId("AWP".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timed_out_commit_leaves_nothing_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let text = "petition ".repeat(2_000_000);

        let commit = store.commit(batch_with_text(&text));
        assert!(tokio::time::timeout(Duration::ZERO, commit).await.is_err());

        // Give the abandoned blocking write time to finish
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!dir.path().join(TALKERS_FILE).exists());
        assert!(!dir.path().join("sittings/2024-02-06_senate.json").exists());
        assert!(store.list_talkers().is_empty());
        assert!(store.cache().sittings().is_empty());

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        assert!(reopened.list_talkers().is_empty());
        assert!(reopened.cache().sittings().is_empty());

        // The store stays usable after the abandoned commit
        store.commit(batch()).await.unwrap();
        assert_eq!(JsonFileStore::open(dir.path()).unwrap().list_talkers().len(), 1);
    }
}

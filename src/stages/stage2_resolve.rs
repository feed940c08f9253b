use std::collections::BTreeSet;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::RosterError;
use crate::heuristics::{normalize_label, LabelConfig};
use crate::models::{
    Debate, PartContent, PartKind, RawTalker, SittingKey, Speech, Talker, TalkerId,
};
use crate::stages::{SpeechDraft, Stage1Result};

/// Outcome of resolving one raw talker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub id: TalkerId,
    /// True when this call created the talker record
    pub created: bool,
}

/// Append-only roster of talker identities, shared by every ingestion.
///
/// Keys are normalized labels and `code:<CODE>` member codes. A key, once
/// mapped, is never remapped. Resolution of one key is serialized by the
/// map's entry lock, so concurrent first sightings of a label agree on a
/// single talker.
pub struct TalkerRoster {
    labels: DashMap<String, TalkerId>,
    talkers: DashMap<TalkerId, Talker>,
    config: LabelConfig,
}

fn code_key(code: &str) -> String {
    format!("code:{}", code.trim().to_uppercase())
}

impl TalkerRoster {
    pub fn new(config: LabelConfig) -> Self {
        Self {
            labels: DashMap::new(),
            talkers: DashMap::new(),
            config,
        }
    }

    /// Rebuild the roster from persisted talkers
    pub fn from_talkers(config: LabelConfig, talkers: impl IntoIterator<Item = Talker>) -> Self {
        let roster = Self::new(config);
        for talker in talkers {
            for label in &talker.labels {
                roster
                    .labels
                    .entry(label.clone())
                    .or_insert_with(|| talker.id.clone());
            }
            if let Some(code) = &talker.member_code {
                roster
                    .labels
                    .entry(code_key(code))
                    .or_insert_with(|| talker.id.clone());
            }
            roster
                .talkers
                .entry(talker.id.clone())
                .and_modify(|existing| existing.merge(&talker))
                .or_insert(talker);
        }
        roster
    }

    pub fn normalize(&self, label: &str) -> String {
        normalize_label(label, &self.config)
    }

    /// Resolve a printed label with no member code
    pub fn resolve_label(&self, label: &str) -> Result<TalkerId, RosterError> {
        self.resolve(&RawTalker::new(label)).map(|r| r.id)
    }

    /// Map a raw talker to its stable identity, creating it on first sight
    pub fn resolve(&self, raw: &RawTalker) -> Result<Resolution, RosterError> {
        let normalized = self.normalize(&raw.label);
        let code = raw
            .member_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let (id, label_maps_here) = match code {
            Some(code) => {
                let id = self
                    .labels
                    .entry(code_key(code))
                    .or_insert_with(|| TalkerId::from_member_code(code))
                    .value()
                    .clone();
                let mut maps_here = false;
                if !normalized.is_empty() {
                    let mapped = self
                        .labels
                        .entry(normalized.clone())
                        .or_insert_with(|| id.clone())
                        .value()
                        .clone();
                    maps_here = mapped == id;
                    if !maps_here {
                        warn!(
                            "Label '{}' already belongs to {}, not remapping to {}",
                            normalized, mapped, id
                        );
                    }
                }
                (id, maps_here)
            }
            None => {
                if normalized.is_empty() {
                    return Err(RosterError::EmptyLabel(raw.label.clone()));
                }
                let id = self
                    .labels
                    .entry(normalized.clone())
                    .or_insert_with(|| TalkerId::from_normalized_label(&normalized))
                    .value()
                    .clone();
                (id, true)
            }
        };

        let mut created = false;
        let mut record = self.talkers.entry(id.clone()).or_insert_with(|| {
            created = true;
            Talker::new(id.clone())
        });

        if let (Some(known), Some(code)) = (&record.member_code, code) {
            if !known.eq_ignore_ascii_case(code) {
                return Err(RosterError::Conflict {
                    label: raw.label.clone(),
                    existing: id,
                });
            }
        }

        record.observe(raw, label_maps_here.then_some(normalized.as_str()));
        drop(record);

        if created {
            debug!("New talker {} for '{}'", id, raw.label);
        }
        Ok(Resolution { id, created })
    }

    /// Current mapping for a label, without creating anything
    pub fn lookup(&self, label: &str) -> Option<TalkerId> {
        let normalized = self.normalize(label);
        self.labels.get(&normalized).map(|id| id.value().clone())
    }

    pub fn talker(&self, id: &TalkerId) -> Option<Talker> {
        self.talkers.get(id).map(|t| t.value().clone())
    }

    /// Snapshot of every talker, ordered by ID
    pub fn talkers(&self) -> Vec<Talker> {
        let mut talkers: Vec<Talker> = self.talkers.iter().map(|t| t.value().clone()).collect();
        talkers.sort_by(|a, b| a.id.cmp(&b.id));
        talkers
    }

    pub fn len(&self) -> usize {
        self.talkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.talkers.is_empty()
    }
}

impl Default for TalkerRoster {
    fn default() -> Self {
        Self::new(LabelConfig::default())
    }
}

/// Result of Stage 2 resolution
#[derive(Debug, Clone)]
pub struct Stage2Result {
    pub sitting: SittingKey,
    pub source_id: String,
    pub debates: Vec<Debate>,
    pub speeches: Vec<Speech>,
    /// Snapshots of every talker this sitting refers to
    pub talkers: Vec<Talker>,
    pub talkers_created: usize,
}

/// Perform Stage 2: resolve talkers and assemble final speeches
pub fn execute_stage2(
    roster: &TalkerRoster,
    segmented: Stage1Result,
) -> Result<Stage2Result, RosterError> {
    let mut speeches = Vec::with_capacity(segmented.speech_count());
    let mut touched = BTreeSet::new();
    let mut talkers_created = 0;

    for scope in segmented.scopes {
        let mut seq = 0u32;
        for draft in scope.speeches {
            let time = draft.time;
            let parts = resolve_parts(roster, draft, &mut talkers_created)?;
            let spoken_at = time.map(|t| segmented.sitting.date.and_time(t));
            if let Some(speech) = Speech::assemble(scope.context.clone(), seq, parts, spoken_at) {
                touched.extend(speech.parts.iter().map(|p| p.talker_id.clone()));
                speeches.push(speech);
                seq += 1;
            }
        }
    }

    let talkers: Vec<Talker> = touched.iter().filter_map(|id| roster.talker(id)).collect();

    info!(
        "Stage 2: {} speeches, {} talkers ({} new)",
        speeches.len(),
        talkers.len(),
        talkers_created
    );

    Ok(Stage2Result {
        sitting: segmented.sitting,
        source_id: segmented.source_id,
        debates: segmented.debates,
        speeches,
        talkers,
        talkers_created,
    })
}

/// Resolve a draft's talkers; adjacent parts that land on one talker merge
fn resolve_parts(
    roster: &TalkerRoster,
    draft: SpeechDraft,
    created: &mut usize,
) -> Result<Vec<PartContent>, RosterError> {
    let mut parts: Vec<PartContent> = Vec::with_capacity(draft.parts.len());
    for part in draft.parts {
        let resolution = roster.resolve(&part.talker)?;
        if resolution.created {
            *created += 1;
        }
        match parts.last_mut() {
            Some(last) if last.talker_id == resolution.id => {
                last.text.push_str("\n\n");
                last.text.push_str(&part.text);
            }
            _ => parts.push(PartContent {
                talker_id: resolution.id,
                text: part.text,
                kind: if parts.is_empty() {
                    PartKind::Speech
                } else {
                    part.kind
                },
            }),
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_variants_resolve_to_one_talker() {
        let roster = TalkerRoster::default();
        let a = roster.resolve_label("Wilson, Tim MP").unwrap();
        let b = roster.resolve_label("Mr Tim WILSON").unwrap();
        assert_eq!(a, b);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.talker(&a).unwrap().display_names.len(), 2);
    }

    #[test]
    fn test_member_code_is_identity() {
        let roster = TalkerRoster::default();
        let first = roster.resolve(&RawTalker::with_code("Wilson, Tim MP", "IMW")).unwrap();
        assert!(first.created);
        assert_eq!(first.id, TalkerId("IMW".into()));

        // The label seen alongside the code now aliases the member
        assert_eq!(roster.resolve_label("Tim Wilson").unwrap(), first.id);

        let again = roster.resolve(&RawTalker::with_code("Mr WILSON", "imw")).unwrap();
        assert_eq!(again.id, first.id);
        assert!(!again.created);
    }

    #[test]
    fn test_labels_are_never_remapped() {
        let roster = TalkerRoster::default();
        let by_label = roster.resolve_label("Tim Wilson").unwrap();
        let by_code = roster
            .resolve(&RawTalker::with_code("Wilson, Tim MP", "IMW"))
            .unwrap()
            .id;

        assert_ne!(by_label, by_code);
        assert_eq!(roster.lookup("Tim Wilson"), Some(by_label.clone()));
        assert_eq!(roster.resolve_label("Mr Tim Wilson").unwrap(), by_label);
    }

    #[test]
    fn test_empty_label_rejected() {
        let roster = TalkerRoster::default();
        assert!(matches!(
            roster.resolve_label("The Hon."),
            Err(RosterError::EmptyLabel(_))
        ));
        // A member code is enough on its own
        assert!(roster.resolve(&RawTalker::with_code("Mr", "10000")).is_ok());
    }

    #[test]
    fn test_rebuilt_roster_keeps_mappings() {
        let roster = TalkerRoster::default();
        let id = roster.resolve_label("Zali Steggall").unwrap();
        let coded = roster.resolve(&RawTalker::with_code("Burke, Tony MP", "DYW")).unwrap().id;

        let rebuilt = TalkerRoster::from_talkers(LabelConfig::default(), roster.talkers());
        assert_eq!(rebuilt.resolve_label("Ms Zali STEGGALL").unwrap(), id);
        assert_eq!(rebuilt.resolve(&RawTalker::with_code("Mr BURKE", "DYW")).unwrap().id, coded);
        assert_eq!(rebuilt.len(), 2);
    }

    #[test]
    fn test_concurrent_first_sighting_creates_one_talker() {
        let roster = Arc::new(TalkerRoster::default());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let roster = Arc::clone(&roster);
                std::thread::spawn(move || {
                    let label = if i % 2 == 0 { "Allegra Spender MP" } else { "Ms Allegra SPENDER" };
                    roster.resolve_label(label).unwrap()
                })
            })
            .collect();

        let ids: BTreeSet<TalkerId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(roster.len(), 1);
    }
}

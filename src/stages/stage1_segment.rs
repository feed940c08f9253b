use chrono::NaiveTime;
use tracing::{debug, info};

use crate::models::{Debate, DebateContext, DebateId, PartKind, RawTalker, SittingKey, Subdebate};
use crate::stages::{DebateSection, ParsedDocument, TalkerRun};

/// Part of a speech before its talker is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDraft {
    pub talker: RawTalker,
    pub text: String,
    pub kind: PartKind,
}

/// Speech before talker resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechDraft {
    pub parts: Vec<PartDraft>,
    /// Time of the opening run
    pub time: Option<NaiveTime>,
}

impl SpeechDraft {
    fn push(&mut self, run: &TalkerRun) {
        match self.parts.last_mut() {
            Some(last) if last.talker.same_speaker(&run.talker) => {
                last.text.push_str("\n\n");
                last.text.push_str(run.text.trim());
            }
            _ => {
                let kind = if self.parts.is_empty() {
                    PartKind::Speech
                } else {
                    run.kind
                };
                self.parts.push(PartDraft {
                    talker: run.talker.clone(),
                    text: run.text.trim().to_string(),
                    kind,
                });
            }
        }
    }
}

/// Speeches of one subdebate scope, with the context they are filed under
#[derive(Debug, Clone)]
pub struct SegmentedScope {
    pub context: DebateContext,
    pub speeches: Vec<SpeechDraft>,
}

/// Result of Stage 1 segmentation
#[derive(Debug, Clone)]
pub struct Stage1Result {
    pub sitting: SittingKey,
    pub source_id: String,
    pub debates: Vec<Debate>,
    pub scopes: Vec<SegmentedScope>,
}

impl Stage1Result {
    pub fn speech_count(&self) -> usize {
        self.scopes.iter().map(|s| s.speeches.len()).sum()
    }
}

/// Group ordered talker runs into speeches.
///
/// A speech opens on the first run and on every run carrying the new-speech
/// marker; any other run, whoever the talker, joins the open speech.
/// Empty runs contribute nothing but pass their marker on to the next run.
pub fn segment_runs(runs: &[TalkerRun]) -> Vec<SpeechDraft> {
    let mut drafts = Vec::new();
    let mut current: Option<SpeechDraft> = None;
    let mut pending_open = true;

    for run in runs {
        pending_open |= run.opens_speech;
        if run.text.trim().is_empty() {
            continue;
        }

        if pending_open {
            drafts.extend(current.take());
            pending_open = false;
        }
        current
            .get_or_insert_with(|| SpeechDraft {
                parts: Vec::new(),
                time: run.time,
            })
            .push(run);
    }

    drafts.extend(current);
    drafts
}

/// Perform Stage 1: segment every section of a parsed document
pub fn execute_stage1(parsed: &ParsedDocument) -> Stage1Result {
    let mut debates = Vec::with_capacity(parsed.sections.len());
    let mut scopes = Vec::new();

    for section in &parsed.sections {
        let debate = debate_record(&parsed.sitting, section);

        let base = DebateContext {
            debate_id: debate.id.clone(),
            sitting: parsed.sitting,
            chamber: section.chamber,
            category: section.category.clone(),
            bill_id: section.bill_id.clone(),
            debate_title: section.title.clone(),
            debate_info: section.info.clone(),
            subdebate_seq: None,
            subdebate_title: None,
            subdebate_info: None,
        };

        let direct = segment_runs(&section.runs);
        if !direct.is_empty() {
            scopes.push(SegmentedScope {
                context: base.clone(),
                speeches: direct,
            });
        }

        for subdebate in &section.subdebates {
            let speeches = segment_runs(&subdebate.runs);
            if speeches.is_empty() {
                continue;
            }
            scopes.push(SegmentedScope {
                context: DebateContext {
                    subdebate_seq: Some(subdebate.seq),
                    subdebate_title: Some(subdebate.title.clone()),
                    subdebate_info: subdebate.info.clone(),
                    ..base.clone()
                },
                speeches,
            });
        }

        debug!("Debate {} '{}' segmented", debate.id, debate.title);
        debates.push(debate);
    }

    let result = Stage1Result {
        sitting: parsed.sitting,
        source_id: parsed.source_id.clone(),
        debates,
        scopes,
    };

    info!(
        "Stage 1: {} speeches in {} debates",
        result.speech_count(),
        result.debates.len()
    );

    result
}

fn debate_record(sitting: &SittingKey, section: &DebateSection) -> Debate {
    Debate {
        id: DebateId::new(sitting, section.chamber, section.debate_seq, section.subdebate_seq),
        sitting: *sitting,
        chamber: section.chamber,
        category: section.category.clone(),
        title: section.title.clone(),
        info: section.info.clone(),
        bill_id: section.bill_id.clone(),
        debate_seq: section.debate_seq,
        subdebate_seq: section.subdebate_seq,
        subdebates: section
            .subdebates
            .iter()
            .map(|s| Subdebate {
                seq: s.seq,
                title: s.title.clone(),
                info: s.info.clone(),
                first_reading: s.first_reading,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(talker: &str, text: &str, kind: PartKind, opens_speech: bool) -> TalkerRun {
        TalkerRun {
            talker: RawTalker::new(talker),
            text: text.to_string(),
            kind,
            opens_speech,
            time: None,
        }
    }

    #[test]
    fn test_interjection_folded_into_speech() {
        let runs = vec![
            run("A", "text1", PartKind::Speech, true),
            run("B", "interjection text", PartKind::Interjection, false),
            run("A", "text2", PartKind::Continuation, false),
        ];

        let drafts = segment_runs(&runs);
        assert_eq!(drafts.len(), 1);
        let talkers: Vec<&str> = drafts[0].parts.iter().map(|p| p.talker.label.as_str()).collect();
        assert_eq!(talkers, vec!["A", "B", "A"]);
        assert_eq!(drafts[0].parts[1].kind, PartKind::Interjection);
    }

    #[test]
    fn test_marker_opens_new_speech() {
        let runs = vec![
            run("A", "one", PartKind::Speech, true),
            run("B", "two", PartKind::Speech, true),
            run("A", "three", PartKind::Interjection, false),
        ];

        let drafts = segment_runs(&runs);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].parts[0].talker.label, "B");
        assert_eq!(drafts[1].parts[0].kind, PartKind::Speech);
        assert_eq!(drafts[1].parts.len(), 2);
    }

    #[test]
    fn test_first_run_opens_without_marker() {
        let runs = vec![run("A", "one", PartKind::Continuation, false)];
        let drafts = segment_runs(&runs);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].parts[0].kind, PartKind::Speech);
    }

    #[test]
    fn test_empty_run_produces_nothing() {
        assert!(segment_runs(&[run("A", "", PartKind::Speech, true)]).is_empty());
        assert!(segment_runs(&[]).is_empty());
    }

    #[test]
    fn test_marker_on_empty_run_carries_forward() {
        let runs = vec![
            run("A", "one", PartKind::Speech, true),
            run("B", "  ", PartKind::Speech, true),
            run("B", "two", PartKind::Continuation, false),
        ];
        let drafts = segment_runs(&runs);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].parts[0].text, "two");
    }

    #[test]
    fn test_same_talker_runs_merge() {
        let runs = vec![
            run("A", "one", PartKind::Speech, true),
            run("B", "", PartKind::Interjection, false),
            run("A", "two", PartKind::Continuation, false),
        ];
        let drafts = segment_runs(&runs);
        assert_eq!(drafts[0].parts.len(), 1);
        assert_eq!(drafts[0].parts[0].text, "one\n\ntwo");
    }
}

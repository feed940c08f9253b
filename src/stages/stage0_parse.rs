use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, warn};

use crate::error::{MalformedDocument, UnresolvedReference};
use crate::heuristics::{parse_time_stamp, strip_speaker_prefix};
use crate::io::xml_tree::{parse_tree, Element};
use crate::io::SourceDocument;
use crate::models::{Chamber, DebateCategory, PartKind, RawTalker, SittingKey};

/// Block of text attributed to one talker, as it appears in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkerRun {
    pub talker: RawTalker,
    pub text: String,
    pub kind: PartKind,
    /// Set on the first run of every `<speech>`: the explicit new-speech marker
    pub opens_speech: bool,
    pub time: Option<NaiveTime>,
}

/// Subdebate scope of a section (`subdebate.2`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdebateSection {
    pub seq: u32,
    pub title: String,
    pub info: Option<String>,
    pub first_reading: bool,
    pub runs: Vec<TalkerRun>,
}

/// One debate section (`subdebate.1`, or speeches placed directly in a debate)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebateSection {
    pub chamber: Chamber,
    pub debate_seq: u32,
    pub subdebate_seq: Option<u32>,
    pub category: DebateCategory,
    pub title: String,
    pub info: Option<String>,
    pub bill_id: Option<String>,
    /// Runs that sit directly in the section, outside any subdebate
    pub runs: Vec<TalkerRun>,
    pub subdebates: Vec<SubdebateSection>,
}

impl DebateSection {
    pub fn run_count(&self) -> usize {
        self.runs.len() + self.subdebates.iter().map(|s| s.runs.len()).sum::<usize>()
    }
}

/// Section tree of one sitting document
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub sitting: SittingKey,
    pub source_id: String,
    pub format_version: Option<String>,
    pub sections: Vec<DebateSection>,
}

impl ParsedDocument {
    pub fn run_count(&self) -> usize {
        self.sections.iter().map(DebateSection::run_count).sum()
    }

    /// Every raw talker in document order
    pub fn talkers(&self) -> impl Iterator<Item = &RawTalker> {
        self.sections.iter().flat_map(|s| {
            s.runs
                .iter()
                .chain(s.subdebates.iter().flat_map(|d| d.runs.iter()))
                .map(|r| &r.talker)
        })
    }
}

/// Perform Stage 0: turn a raw transcript into an ordered section tree
///
/// Pure transform. Any structural failure rejects the whole document, since
/// partially attributed debates are worse than none.
pub fn parse_document(
    sitting: SittingKey,
    document: &SourceDocument,
) -> Result<ParsedDocument, MalformedDocument> {
    let root = parse_tree(&document.bytes)
        .map_err(|reason| MalformedDocument::new(&document.source_id, reason))?;

    let mut parser = SectionParser {
        source_id: &document.source_id,
        debate_seq: 0,
        sections: Vec::new(),
    };

    if root.name != "hansard" {
        return Err(parser.malformed(format!("unexpected document element <{}>", root.name)));
    }

    let format_version = document
        .format_version
        .clone()
        .or_else(|| root.attr("version").map(String::from));

    let date = header_date(&root, &document.source_id)?;
    if date != sitting.date {
        return Err(parser.malformed(format!(
            "document is for {} but {} was requested",
            date, sitting.date
        )));
    }

    let chambers: Vec<&Element> = root
        .elements()
        .filter(|e| Chamber::from_element(&e.name) != Chamber::Unknown)
        .collect();
    if chambers.is_empty() {
        warn!("{}: no chamber transcript found", document.source_id);
    }

    for chamber in chambers {
        parser.parse_chamber(chamber)?;
    }

    let parsed = ParsedDocument {
        sitting,
        source_id: document.source_id.clone(),
        format_version,
        sections: parser.sections,
    };

    info!(
        "Stage 0: parsed {} sections, {} talker runs from {}",
        parsed.sections.len(),
        parsed.run_count(),
        parsed.source_id
    );

    Ok(parsed)
}

/// Sitting date announced in a document's session header
pub fn sitting_date(document: &SourceDocument) -> Result<NaiveDate, MalformedDocument> {
    let root = parse_tree(&document.bytes)
        .map_err(|reason| MalformedDocument::new(&document.source_id, reason))?;
    header_date(&root, &document.source_id)
}

fn header_date(root: &Element, source_id: &str) -> Result<NaiveDate, MalformedDocument> {
    let date_text = root
        .child("session.header")
        .and_then(|h| h.child_text("date"))
        .ok_or_else(|| MalformedDocument::new(source_id, "missing session.header date"))?;
    NaiveDate::parse_from_str(date_text.trim(), "%Y-%m-%d").map_err(|e| {
        MalformedDocument::new(source_id, format!("bad sitting date '{}': {}", date_text, e))
    })
}

struct SectionParser<'a> {
    source_id: &'a str,
    debate_seq: u32,
    sections: Vec<DebateSection>,
}

/// Where a paragraph sits within a `<speech>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Main,
    Interjection(usize),
    Continue,
}

struct Paragraph<'a> {
    element: &'a Element,
    block: Block,
    first_in_block: bool,
}

impl<'a> SectionParser<'a> {
    fn malformed(&self, reason: impl Into<String>) -> MalformedDocument {
        MalformedDocument::new(self.source_id, reason)
    }

    fn parse_chamber(&mut self, chamber_el: &Element) -> Result<(), MalformedDocument> {
        let chamber = Chamber::from_element(&chamber_el.name);
        for debate in chamber_el.children_named("debate") {
            let debate_seq = self.debate_seq;
            self.debate_seq += 1;
            self.parse_debate(chamber, debate_seq, debate)?;
        }
        Ok(())
    }

    fn parse_debate(
        &mut self,
        chamber: Chamber,
        debate_seq: u32,
        debate: &Element,
    ) -> Result<(), MalformedDocument> {
        let Some(heading) = debate
            .child("debateinfo")
            .and_then(|info| info.child_text("title"))
        else {
            warn!("{}: debate {} has no title, skipping", self.source_id, debate_seq);
            return Ok(());
        };
        let category = DebateCategory::from_heading(&heading);

        let direct = self.speech_runs(debate.children_named("speech"))?;
        if !direct.is_empty() {
            self.sections.push(DebateSection {
                chamber,
                debate_seq,
                subdebate_seq: None,
                category: category.clone(),
                title: heading.clone(),
                info: text_block(debate.child("debate.text")),
                bill_id: None,
                runs: direct,
                subdebates: Vec::new(),
            });
        }

        for (seq, sub1) in debate.children_named("subdebate.1").enumerate() {
            let Some(title) = sub1
                .child("subdebateinfo")
                .and_then(|info| info.child_text("title"))
            else {
                warn!(
                    "{}: subdebate {} of debate {} has no title, skipping",
                    self.source_id, seq, debate_seq
                );
                continue;
            };

            let bill_id = self.bill_reference(&category, &title, sub1);
            let runs = self.speech_runs(sub1.children_named("speech"))?;

            let mut subdebates = Vec::new();
            for (sub_seq, sub2) in sub1.children_named("subdebate.2").enumerate() {
                let Some(sub_title) = sub2
                    .child("subdebateinfo")
                    .and_then(|info| info.child_text("title"))
                else {
                    warn!("{}: untitled subdebate under '{}', skipping", self.source_id, title);
                    continue;
                };
                // Deeper levels are flattened into this subdebate
                let sub_runs = self.speech_runs(sub2.find_all("speech"))?;
                subdebates.push(SubdebateSection {
                    seq: sub_seq as u32,
                    first_reading: sub_title.eq_ignore_ascii_case("first reading"),
                    title: sub_title,
                    info: text_block(sub2.child("subdebate.text")),
                    runs: sub_runs,
                });
            }

            debug!(
                "{}: section '{}' / '{}' with {} subdebates",
                self.source_id,
                category,
                title,
                subdebates.len()
            );

            self.sections.push(DebateSection {
                chamber,
                debate_seq,
                subdebate_seq: Some(seq as u32),
                category: category.clone(),
                title,
                info: text_block(sub1.child("subdebate.text")),
                bill_id,
                runs,
                subdebates,
            });
        }

        Ok(())
    }

    /// First bill reference of a section; only kept for `BILLS` debates
    fn bill_reference(
        &self,
        category: &DebateCategory,
        title: &str,
        section: &Element,
    ) -> Option<String> {
        let mut refs: Vec<String> = Vec::new();
        let id_no = section
            .child("subdebateinfo")
            .and_then(|info| info.child_text("id.no"));
        let links = section
            .find_all_by(&|e| e.name == "a" && e.attr("type") == Some("Bill"))
            .into_iter()
            .filter_map(|a| a.attr("href"))
            .map(|href| href.trim().to_string());
        for reference in id_no.into_iter().chain(links) {
            if !reference.is_empty() && !refs.contains(&reference) {
                refs.push(reference);
            }
        }

        let first = refs.first()?.clone();
        if !category.is_bills() {
            let unresolved = UnresolvedReference {
                reference: first,
                reason: format!("bill referenced from '{}' debate '{}'", category, title),
            };
            warn!("{}: {}; dropping", self.source_id, unresolved);
            return None;
        }
        if refs.len() > 1 {
            debug!(
                "{}: '{}' references {} bills, keeping {}",
                self.source_id,
                title,
                refs.len(),
                first
            );
        }
        Some(first)
    }

    fn speech_runs<'e>(
        &self,
        speeches: impl IntoIterator<Item = &'e Element>,
    ) -> Result<Vec<TalkerRun>, MalformedDocument> {
        let mut runs = Vec::new();
        for speech in speeches {
            let speech_runs = self.parse_speech(speech)?;
            if speech_runs.is_empty() {
                warn!("{}: speech with no text", self.source_id);
            }
            runs.extend(speech_runs);
        }
        Ok(runs)
    }

    fn parse_speech(&self, speech: &Element) -> Result<Vec<TalkerRun>, MalformedDocument> {
        let main_el = speech
            .child("talk.start")
            .and_then(|start| start.child("talker"))
            .ok_or_else(|| self.malformed("speech without a talk.start talker"))?;
        let main_talker = self.raw_talker(main_el)?;
        let main_time = main_el
            .child_text("time.stamp")
            .and_then(|t| parse_time_stamp(&t));

        let interjectors = speech
            .find_all("interjection")
            .into_iter()
            .map(|block| {
                block
                    .find("talker")
                    .ok_or_else(|| self.malformed("interjection without a talker"))
                    .and_then(|t| self.raw_talker(t))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut paragraphs = Vec::new();
        let mut counter = 0usize;
        let mut first = true;
        collect_paragraphs(speech, Block::Main, &mut first, &mut counter, &mut paragraphs);

        let general = RawTalker::general();
        let mut builder = RunBuilder::default();
        // Next interjection block not yet claimed by a paragraph
        let mut cursor = 0usize;

        for paragraph in paragraphs {
            let text = paragraph.element.text();
            if text.is_empty() {
                continue;
            }
            let is_general =
                paragraph.element.contains(&|e| has_class(e, "HPS-GeneralIInterjecting"));
            let interjection_marker =
                marker_text(paragraph.element, &["MemberInterjecting", "OfficeInterjecting"]);
            let continuation_marker = marker_text(paragraph.element, &["MemberContinuation"]);

            match paragraph.block {
                Block::Interjection(idx) => {
                    cursor = cursor.max(idx + 1);
                    match interjectors.get(idx) {
                        Some(talker) => builder.push(
                            talker,
                            PartKind::Interjection,
                            &text,
                            paragraph.first_in_block,
                            None,
                        ),
                        None => warn!("{}: interjection block {} has no talker", self.source_id, idx),
                    }
                }
                _ if is_general => builder.push(&general, PartKind::Interjection, &text, true, None),
                _ if interjection_marker.is_some() => match interjectors.get(cursor) {
                    Some(talker) => {
                        cursor += 1;
                        let text = strip_marker(&text, interjection_marker.as_deref());
                        builder.push(talker, PartKind::Interjection, &text, false, None);
                    }
                    None => warn!(
                        "{}: interjection marker {} has no matching talker, dropping paragraph",
                        self.source_id, cursor
                    ),
                },
                _ if continuation_marker.is_some() => {
                    let text = strip_marker(&text, continuation_marker.as_deref());
                    builder.push(&main_talker, PartKind::Continuation, &text, false, None);
                }
                Block::Continue => builder.push(
                    &main_talker,
                    PartKind::Continuation,
                    &text,
                    paragraph.first_in_block,
                    None,
                ),
                Block::Main => {
                    let opening = builder.is_empty();
                    builder.push(
                        &main_talker,
                        PartKind::Continuation,
                        &text,
                        opening,
                        if opening { main_time } else { None },
                    );
                }
            }
        }

        Ok(builder.runs)
    }

    fn raw_talker(&self, talker: &Element) -> Result<RawTalker, MalformedDocument> {
        let name = talker
            .children_named("name")
            .find(|n| n.attr("role") == Some("metadata"))
            .or_else(|| talker.child("name"))
            .map(Element::text)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| self.malformed("talker without a name"))?;

        Ok(RawTalker {
            label: name,
            member_code: talker.child_text("name.id"),
            electorate: talker.child_text("electorate"),
            party: talker.child_text("party"),
        })
    }
}

/// Accumulates the runs of one `<speech>`
#[derive(Default)]
struct RunBuilder {
    runs: Vec<TalkerRun>,
}

impl RunBuilder {
    fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Add a paragraph; consecutive paragraphs from one talker share a run.
    /// `opening` paragraphs carry the printed speaker prefix.
    fn push(
        &mut self,
        talker: &RawTalker,
        kind: PartKind,
        text: &str,
        opening: bool,
        time_hint: Option<NaiveTime>,
    ) {
        let (text, time) = if opening {
            let stripped = strip_speaker_prefix(text);
            (stripped.text, stripped.time.or(time_hint))
        } else {
            (text.trim().to_string(), None)
        };
        if text.is_empty() {
            return;
        }

        match self.runs.last_mut() {
            Some(last) if last.talker.same_speaker(talker) => {
                last.text.push_str("\n\n");
                last.text.push_str(&text);
                if last.time.is_none() {
                    last.time = time;
                }
            }
            _ => {
                let opens_speech = self.runs.is_empty();
                self.runs.push(TalkerRun {
                    talker: talker.clone(),
                    text,
                    kind: if opens_speech { PartKind::Speech } else { kind },
                    opens_speech,
                    time,
                });
            }
        }
    }
}

fn collect_paragraphs<'a>(
    element: &'a Element,
    block: Block,
    first: &mut bool,
    counter: &mut usize,
    out: &mut Vec<Paragraph<'a>>,
) {
    for child in element.elements() {
        match child.name.as_str() {
            "talker" => {}
            "p" | "para" => {
                out.push(Paragraph {
                    element: child,
                    block,
                    first_in_block: *first,
                });
                *first = false;
            }
            "interjection" => {
                let idx = *counter;
                *counter += 1;
                let mut block_first = true;
                collect_paragraphs(child, Block::Interjection(idx), &mut block_first, counter, out);
            }
            "continue" => {
                let mut block_first = true;
                collect_paragraphs(child, Block::Continue, &mut block_first, counter, out);
            }
            _ => collect_paragraphs(child, block, first, counter, out),
        }
    }
}

fn has_class(element: &Element, class: &str) -> bool {
    element
        .attr("class")
        .is_some_and(|c| c.split_whitespace().any(|x| x == class))
}

/// `<a type="MemberInterjecting">` or `<span class="HPS-MemberInterjecting">`
fn is_marker(element: &Element, marker: &str) -> bool {
    (element.name == "a" && element.attr("type") == Some(marker))
        || has_class(element, &format!("HPS-{}", marker))
}

/// Text of the first marker anchor in a paragraph, e.g. "Mr Wilson:"
fn marker_text(paragraph: &Element, markers: &[&str]) -> Option<String> {
    paragraph
        .find_all_by(&|e| markers.iter().any(|m| is_marker(e, m)))
        .first()
        .map(|marker| marker.text())
}

/// Drop the marker's own text (the printed speaker) from the paragraph
fn strip_marker(text: &str, marker: Option<&str>) -> String {
    match marker {
        Some(marker) if !marker.is_empty() && text.starts_with(marker) => text[marker.len()..]
            .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
            .to_string(),
        _ => text.to_string(),
    }
}

/// Paragraphs of an info block joined by blank lines
fn text_block(element: Option<&Element>) -> Option<String> {
    let element = element?;
    let paragraphs: Vec<String> = element
        .find_all_by(&|e| e.name == "p" || e.name == "para")
        .into_iter()
        .map(Element::text)
        .filter(|t| !t.is_empty())
        .collect();
    let text = if paragraphs.is_empty() {
        element.text()
    } else {
        paragraphs.join("\n\n")
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::House;

    const SITTING_XML: &str = include_str!("../../testdata/hansard-2024-02-06.xml");

    fn sitting() -> SittingKey {
        SittingKey::new(House::Hor, NaiveDate::from_ymd_opt(2024, 2, 6).unwrap())
    }

    fn parse(xml: &str) -> Result<ParsedDocument, MalformedDocument> {
        parse_document(sitting(), &SourceDocument::new("test.xml", xml.as_bytes().to_vec()))
    }

    #[test]
    fn test_parse_sections() {
        let doc = parse(SITTING_XML).unwrap();
        assert_eq!(doc.format_version.as_deref(), Some("2.2"));

        let titles: Vec<&str> = doc.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Repeal Net Zero Bill 2025",
                "Goldstein Electorate: Community Awards",
                "PETITIONS",
                "Sydney Electorate: Housing",
            ]
        );

        let bills = &doc.sections[0];
        assert_eq!(bills.category, DebateCategory::Bills);
        assert_eq!(bills.bill_id.as_deref(), Some("r7346"));
        assert_eq!(bills.chamber, Chamber::Main);
        assert_eq!(bills.subdebates.len(), 2);
        assert!(bills.subdebates[0].first_reading);
        assert!(bills.subdebates[0].runs.is_empty());
        assert_eq!(bills.subdebates[1].title, "Second Reading");

        let fed = &doc.sections[3];
        assert_eq!(fed.chamber, Chamber::Federation);
        assert_eq!(
            fed.category,
            DebateCategory::Other("CONSTITUENCY STATEMENTS".to_string())
        );
    }

    #[test]
    fn test_bill_reference_dropped_outside_bills() {
        let doc = parse(SITTING_XML).unwrap();
        let statements = &doc.sections[1];
        assert_eq!(statements.category, DebateCategory::StatementsByMembers);
        assert_eq!(statements.bill_id, None);
    }

    #[test]
    fn test_speech_with_interjection_blocks() {
        let doc = parse(SITTING_XML).unwrap();
        let runs = &doc.sections[0].subdebates[1].runs;

        // Speech 1: Wilson, Burke interjects, Wilson continues
        assert!(runs[0].opens_speech);
        assert_eq!(runs[0].talker.member_code.as_deref(), Some("IMW"));
        assert_eq!(runs[0].kind, PartKind::Speech);
        assert_eq!(
            runs[0].text,
            "I move that this bill be now read a second time.\n\nEnergy prices have risen for every household in this country."
        );
        assert_eq!(runs[0].time, NaiveTime::from_hms_opt(12, 1, 0));

        assert!(!runs[1].opens_speech);
        assert_eq!(runs[1].talker.member_code.as_deref(), Some("DYW"));
        assert_eq!(runs[1].kind, PartKind::Interjection);
        assert_eq!(runs[1].text, "That is simply not true.");

        assert_eq!(runs[2].talker.member_code.as_deref(), Some("IMW"));
        assert_eq!(runs[2].kind, PartKind::Continuation);
        assert_eq!(runs[2].text, "It is true, and the member knows it.");
    }

    #[test]
    fn test_speech_with_paragraph_markers() {
        let doc = parse(SITTING_XML).unwrap();
        let runs = &doc.sections[0].subdebates[1].runs[3..];

        assert!(runs[0].opens_speech);
        assert_eq!(runs[0].talker.member_code.as_deref(), Some("DYW"));
        assert_eq!(runs[0].text, "This bill would leave families worse off.");
        assert_eq!(runs[0].time, NaiveTime::from_hms_opt(12, 15, 0));

        assert_eq!(runs[1].talker.member_code.as_deref(), Some("IMW"));
        assert_eq!(runs[1].kind, PartKind::Interjection);
        assert_eq!(runs[1].text, "Rubbish!");

        assert_eq!(runs[2].talker, RawTalker::general());
        assert_eq!(runs[2].text, "Honourable members interjecting—");

        assert_eq!(runs[3].talker.member_code.as_deref(), Some("DYW"));
        assert_eq!(runs[3].kind, PartKind::Continuation);
        assert_eq!(runs[3].text, "As I was saying, the bill fails.");
        assert_eq!(runs.len(), 4);
    }

    #[test]
    fn test_missing_closing_marker_is_malformed() {
        let truncated = SITTING_XML.replacen("</debate>", "", 1);
        let err = parse(&truncated).unwrap_err();
        assert_eq!(err.source_id, "test.xml");
    }

    #[test]
    fn test_date_mismatch_is_malformed() {
        let other_day = SITTING_XML.replace("<date>2024-02-06</date>", "<date>2024-02-07</date>");
        assert!(parse(&other_day).is_err());
    }

    #[test]
    fn test_speech_without_talker_is_malformed() {
        let xml = r#"<hansard><session.header><date>2024-02-06</date></session.header>
            <chamber.xscript><debate><debateinfo><title>PETITIONS</title></debateinfo>
            <speech><para>Nobody said this.</para></speech>
            </debate></chamber.xscript></hansard>"#;
        assert!(parse(xml).is_err());
    }

    #[test]
    fn test_document_without_chambers_is_empty() {
        let xml = "<hansard><session.header><date>2024-02-06</date></session.header></hansard>";
        let doc = parse(xml).unwrap();
        assert!(doc.sections.is_empty());
    }
}

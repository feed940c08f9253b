use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{Debate, SittingKey, Speech, Talker, TalkerId};
use crate::store::SittingRecord;

/// Machine-readable export of one sitting
#[derive(Debug, Clone, Serialize)]
pub struct SittingExport {
    pub sitting: SittingKey,
    pub source_id: String,
    pub debates: Vec<Debate>,
    /// Speeches with their parts, in document order
    pub speeches: Vec<Speech>,
    /// Talkers referenced by the speeches
    pub talkers: Vec<Talker>,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub total_debates: usize,
    pub total_speeches: usize,
    pub total_parts: usize,
    pub total_interjections: usize,
    pub total_talkers: usize,
}

impl SittingExport {
    pub fn from_record(record: &SittingRecord, talkers: &[Talker]) -> Self {
        let speeches = record.full_speeches();
        let referenced: BTreeSet<&TalkerId> = speeches
            .iter()
            .flat_map(|s| s.parts.iter().map(|p| &p.talker_id))
            .collect();
        let talkers: Vec<Talker> = talkers
            .iter()
            .filter(|t| referenced.contains(&t.id))
            .cloned()
            .collect();

        let metadata = ExportMetadata {
            total_debates: record.debates.len(),
            total_speeches: speeches.len(),
            total_parts: speeches.iter().map(|s| s.parts.len()).sum(),
            total_interjections: speeches.iter().map(Speech::interjection_count).sum(),
            total_talkers: talkers.len(),
        };

        Self {
            sitting: record.sitting,
            source_id: record.source_id.clone(),
            debates: record.debates.clone(),
            speeches,
            talkers,
            metadata,
        }
    }

    /// Write to a JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write JSON")?;
        Ok(())
    }
}

/// Human-readable transcript of a sitting
pub struct HumanTranscript<'a> {
    speeches: &'a [Speech],
    talkers: HashMap<&'a TalkerId, &'a Talker>,
}

impl<'a> HumanTranscript<'a> {
    pub fn new(speeches: &'a [Speech], talkers: &'a [Talker]) -> Self {
        Self {
            speeches,
            talkers: talkers.iter().map(|t| (&t.id, t)).collect(),
        }
    }

    /// Format the transcript as human-readable text
    pub fn format(&self) -> String {
        let mut output = String::new();

        for speech in self.speeches {
            let context = &speech.context;
            let mut heading = format!("{}: {}", context.category, context.debate_title);
            if let Some(subdebate) = &context.subdebate_title {
                heading.push_str(" / ");
                heading.push_str(subdebate);
            }
            output.push_str(&format!(
                "[{}] {}\n",
                format_timestamp(speech.spoken_at),
                heading
            ));

            for part in &speech.parts {
                let label = self.speaker_label(&part.talker_id);
                let wrapped = wrap_text(&format!("{}: {}", label, part.text), 80);
                output.push_str(&wrapped);
                output.push('\n');
            }
            output.push('\n');
        }

        output
    }

    fn speaker_label(&self, id: &TalkerId) -> String {
        match self.talkers.get(id) {
            Some(talker) => match &talker.party {
                Some(party) => format!("{} ({})", talker.name(), party),
                None => talker.name().to_string(),
            },
            None => "UNKNOWN".to_string(),
        }
    }

    /// Write to a text file
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        write!(file, "{}", self.format())?;
        Ok(())
    }
}

/// Format a speech time as HH:MM, or `--:--` when the transcript gave none
fn format_timestamp(at: Option<NaiveDateTime>) -> String {
    match at {
        Some(at) => at.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

/// Wrap text at approximately the given width, keeping paragraph breaks
fn wrap_text(text: &str, width: usize) -> String {
    let mut result = String::new();

    for (i, paragraph) in text.split("\n\n").enumerate() {
        if i > 0 {
            result.push_str("\n\n");
        }
        let mut line_len = 0;
        for word in paragraph.split_whitespace() {
            if line_len + word.len() + 1 > width && line_len > 0 {
                result.push('\n');
                line_len = 0;
            }
            if line_len > 0 {
                result.push(' ');
                line_len += 1;
            }
            result.push_str(word);
            line_len += word.len();
        }
    }

    result
}

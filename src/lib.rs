pub mod error;
pub mod heuristics;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod store;

pub use error::{FetchError, IngestError, MalformedDocument, PersistenceError, RosterError};
pub use heuristics::{normalize_label, LabelConfig};
pub use io::{
    read_document_file, DirectoryFetcher, DocumentFetcher, HttpFetcher, HttpFetcherConfig,
    HumanTranscript, SittingExport, SourceDocument,
};
pub use models::{
    Chamber, Debate, DebateCategory, House, SittingKey, Speech, SpeechPart, Talker, TalkerId,
};
pub use pipeline::{DateOutcome, IngestConfig, IngestReport, IngestState, Ingestor};
pub use stages::{
    execute_stage1, execute_stage2, parse_document, ParsedDocument, TalkerRoster,
};
pub use store::{JsonFileStore, MemoryStore, PersistenceGateway, SittingBatch, SpeechQuery};

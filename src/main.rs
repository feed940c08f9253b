use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hansard::stages::sitting_date;
use hansard::{
    execute_stage1, execute_stage2, parse_document, read_document_file, DirectoryFetcher,
    DocumentFetcher, House, HttpFetcher, HttpFetcherConfig, HumanTranscript, IngestConfig,
    Ingestor, JsonFileStore, LabelConfig, PersistenceGateway, SittingExport, SittingKey,
    SpeechQuery, TalkerRoster,
};

#[derive(Parser)]
#[command(name = "hansard")]
#[command(author, version, about = "Parliamentary transcript ingestion pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, parse and persist sitting days
    Ingest {
        /// House the sittings belong to
        #[arg(long, value_enum)]
        house: House,

        /// Sitting date (YYYY-MM-DD); repeat for several dates
        #[arg(long = "date", required = true)]
        dates: Vec<NaiveDate>,

        /// Read transcripts from {dir}/{house}/hansard-{date}.xml
        #[arg(long, conflicts_with = "source_url")]
        data_dir: Option<PathBuf>,

        /// URL template with {house} and {date}; defaults to HANSARD_SOURCE_URL
        #[arg(long)]
        source_url: Option<String>,

        /// Store directory
        #[arg(long, default_value = "hansard-store")]
        store: PathBuf,

        /// Sitting dates ingested at once
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Fetch timeout in seconds
        #[arg(long, default_value = "60")]
        fetch_timeout_secs: u64,

        /// Persist timeout in seconds
        #[arg(long, default_value = "120")]
        persist_timeout_secs: u64,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Analyze a transcript file without persisting anything
    Parse {
        /// Input transcript file (Hansard XML)
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value = "hor")]
        house: House,

        /// Sitting date; read from the document header when omitted
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Render a persisted sitting
    Render {
        /// Store directory
        #[arg(long, default_value = "hansard-store")]
        store: PathBuf,

        #[arg(long, value_enum)]
        house: House,

        #[arg(long)]
        date: NaiveDate,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            house,
            dates,
            data_dir,
            source_url,
            store,
            concurrency,
            fetch_timeout_secs,
            persist_timeout_secs,
            verbose,
        } => {
            setup_logging(verbose);
            let config = IngestConfig {
                max_concurrent_dates: concurrency,
                fetch_timeout_secs,
                persist_timeout_secs,
            };
            ingest(house, dates, data_dir, source_url, store, config).await
        }
        Commands::Parse {
            input,
            house,
            date,
            verbose,
        } => {
            setup_logging(verbose);
            analyze_transcript(input, house, date)
        }
        Commands::Render {
            store,
            house,
            date,
            output,
            json,
        } => {
            setup_logging(false);
            render(store, SittingKey::new(house, date), output, json)
        }
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn ingest(
    house: House,
    dates: Vec<NaiveDate>,
    data_dir: Option<PathBuf>,
    source_url: Option<String>,
    store: PathBuf,
    config: IngestConfig,
) -> Result<()> {
    let fetcher: Arc<dyn DocumentFetcher> = match (data_dir, source_url) {
        (Some(dir), _) => {
            info!("Reading transcripts from {:?}", dir);
            Arc::new(DirectoryFetcher::new(dir))
        }
        (None, Some(url)) => Arc::new(HttpFetcher::new(HttpFetcherConfig::new(url))?),
        (None, None) => Arc::new(HttpFetcher::new(HttpFetcherConfig::from_env()?)?),
    };

    let store = Arc::new(
        JsonFileStore::open(&store).with_context(|| format!("Failed to open store {:?}", store))?,
    );
    let talkers = store.load_talkers().await?;
    info!("Loaded {} talkers into the roster", talkers.len());
    let roster = Arc::new(TalkerRoster::from_talkers(LabelConfig::default(), talkers));

    let ingestor = Ingestor::new(fetcher, store, roster, config);
    let report = ingestor.ingest_many(house, dates).await;

    for outcome in &report.outcomes {
        match &outcome.stats {
            Some(stats) => println!(
                "{}  {}  {} debates, {} speeches, {} parts, {} interjections, {} new talkers",
                outcome.sitting,
                outcome.state,
                stats.debates,
                stats.speeches,
                stats.parts,
                stats.interjections,
                stats.talkers_created
            ),
            None => println!(
                "{}  {}  [{}]",
                outcome.sitting,
                outcome.state,
                outcome.error_kind.unwrap_or("unknown")
            ),
        }
    }

    let failed = report.failed().count();
    if failed > 0 {
        anyhow::bail!("{} of {} dates failed", failed, report.outcomes.len());
    }
    Ok(())
}

fn analyze_transcript(input: PathBuf, house: House, date: Option<NaiveDate>) -> Result<()> {
    info!("Analyzing transcript from {:?}", input);
    let document = read_document_file(&input)?;
    let date = match date {
        Some(date) => date,
        None => sitting_date(&document)?,
    };
    let sitting = SittingKey::new(house, date);

    let parsed = parse_document(sitting, &document).context("Failed to parse transcript")?;
    let segmented = execute_stage1(&parsed);
    let roster = TalkerRoster::default();
    let resolved = execute_stage2(&roster, segmented)?;

    println!("Transcript Analysis");
    println!("===================");
    println!("Sitting: {}", sitting);
    println!(
        "Format version: {}",
        parsed.format_version.as_deref().unwrap_or("unknown")
    );
    println!("Debate sections: {}", parsed.sections.len());
    println!("Talker runs: {}", parsed.run_count());
    println!("Speeches: {}", resolved.speeches.len());
    println!(
        "Interjections: {}",
        resolved
            .speeches
            .iter()
            .map(|s| s.interjection_count())
            .sum::<usize>()
    );
    println!();

    println!("Sections");
    println!("--------");
    for section in &parsed.sections {
        println!(
            "[{}] {}: {}{} ({} runs, {} subdebates)",
            section.chamber,
            section.category,
            section.title,
            section
                .bill_id
                .as_ref()
                .map(|b| format!(" <{}>", b))
                .unwrap_or_default(),
            section.run_count(),
            section.subdebates.len()
        );
    }
    println!();

    println!("Talker Statistics");
    println!("-----------------");
    let mut opened: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for speech in &resolved.speeches {
        opened.entry(speech.main_talker_id.as_str()).or_default().0 += 1;
        for part in speech.parts.iter().filter(|p| p.is_interjection) {
            opened.entry(part.talker_id.as_str()).or_default().1 += 1;
        }
    }
    for talker in &resolved.talkers {
        let (speeches, interjections) = opened.get(talker.id.as_str()).copied().unwrap_or_default();
        println!(
            "{} [{}]: {} speeches, {} interjections",
            talker.name(),
            talker.id,
            speeches,
            interjections
        );
    }

    Ok(())
}

fn render(store: PathBuf, sitting: SittingKey, output: Option<PathBuf>, json: bool) -> Result<()> {
    let store =
        JsonFileStore::open(&store).with_context(|| format!("Failed to open store {:?}", store))?;
    let record = store
        .sitting_record(&sitting)
        .with_context(|| format!("No persisted sitting {}", sitting))?;
    let talkers = store.list_talkers();

    if json {
        let export = SittingExport::from_record(&record, &talkers);
        match output {
            Some(path) => export.write_json(&path)?,
            None => println!("{}", serde_json::to_string_pretty(&export)?),
        }
    } else {
        let speeches = record.full_speeches();
        let transcript = HumanTranscript::new(&speeches, &talkers);
        match output {
            Some(path) => transcript.write_file(&path)?,
            None => print!("{}", transcript.format()),
        }
    }

    Ok(())
}

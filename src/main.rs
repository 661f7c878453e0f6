use anyhow::Context;
use leadscraper::{
    display::LeadFormatter, session::LeadSession, status::ProgressSink, LeadConfig, LeadFetcher,
    Provider, RecordWriter,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::error;

/// The main entry point of the application.
///
/// This function initializes logging, loads the configuration, processes command line arguments,
/// fetches leads from the chosen source, appends them to the CSV file and prints them.
///
/// Usage: `leadscraper <query> [google|linkedin] [limit] [config-path]`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let Some(query) = std::env::args().nth(1) else {
        eprintln!("Usage: leadscraper <query> [google|linkedin] [limit] [config-path]");
        std::process::exit(2);
    };

    let provider: Provider = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "google".to_string())
        .parse()?;

    let config_path = std::env::args().nth(4).map(PathBuf::from);
    let config = LeadConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    let limit = match std::env::args().nth(3) {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid limit '{}'", raw))?,
        None => config.default_limit,
    };

    let start_time = Instant::now();

    let fetcher = LeadFetcher::new(&config, provider).context("failed to build HTTP client")?;
    let writer = RecordWriter::from_config(&config);
    let progress = ProgressSink::new();
    let mut session = LeadSession::new();

    let export = session
        .run(&fetcher, &writer, &query, limit, &progress)
        .await;
    progress.finish();

    println!("\n=== Status ===");
    for status in session.messages() {
        println!("{}", status);
    }

    if export.is_none() {
        error!("No leads were exported for: {}", query);
    }

    println!("\n=== Leads ===");
    println!("Source: {}", provider);
    println!("Query: {}", query);
    println!("Processing time: {:.2?}", start_time.elapsed());
    println!("\n{}", LeadFormatter::new(session.leads()).build());

    Ok(())
}

//! doc-retrieval CLI.
//!
//! ```bash
//! # Index a JSONL corpus (one passage object per line), then search it
//! doc-retrieval "what is the refund policy?" --corpus passages.jsonl
//!
//! # Force a strategy, return 3 results as JSON
//! doc-retrieval "refund policy for annual plans" --strategy advanced -n 3 --json
//! ```
//!
//! Settings come from `RETRIEVAL_*`, `LLM_*` and `RERANKER_*` environment
//! variables.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use doc_retrieval::config::Config;
use doc_retrieval::state::AppState;
use doc_retrieval::{Passage, RetrievalReport, RetrievalRequest, Strategy};

/// Retrieve passages for a question using hybrid search, HyDE,
/// multi-query expansion, rank fusion and reranking.
#[derive(Parser)]
#[command(name = "doc-retrieval", version, about)]
struct Cli {
    /// Question to retrieve passages for
    query: String,

    /// JSONL file of passages to ingest before searching
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Retrieval strategy: auto, simple, hybrid or advanced
    #[arg(long, default_value = "auto")]
    strategy: Strategy,

    /// Maximum number of passages to return
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Data directory for the local indexes (overrides RETRIEVAL_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let state = AppState::new(config)?;

    if let Some(path) = &cli.corpus {
        let passages = read_corpus(path)?;
        let added = state.store.ingest(passages).await?;
        tracing::info!("Indexed {added} passages from {}", path.display());
    }
    if state.store.is_empty() {
        tracing::warn!("The document store is empty; pass --corpus to index passages");
    }

    let mut request = RetrievalRequest::new(cli.query.trim()).strategy(cli.strategy);
    if let Some(limit) = cli.limit {
        request = request.top_k(limit);
    }

    let report = state.pipeline.retrieve_with_report(&request).await;

    if cli.json {
        println!("{}", format_json(&request.query, &report)?);
    } else {
        println!("{}", format_human(&request.query, &report));
    }
    Ok(())
}

/// One passage JSON object per non-blank line.
fn read_corpus(path: &Path) -> Result<Vec<Passage>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus {}", path.display()))?;

    data.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid passage", path.display(), i + 1))
        })
        .collect()
}

fn format_json(query: &str, report: &RetrievalReport) -> Result<String> {
    let failures: Vec<String> = report.failures.iter().map(|f| f.to_string()).collect();
    let value = serde_json::json!({
        "query": query,
        "strategy": report.strategy,
        "fallbackUsed": report.fallback_used,
        "failures": failures,
        "passages": report.passages,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

fn format_human(query: &str, report: &RetrievalReport) -> String {
    let mut out = format!(
        "{} passages for {query:?} (strategy: {}{})\n",
        report.passages.len(),
        report.strategy,
        if report.fallback_used { ", fallback" } else { "" }
    );

    for (i, passage) in report.passages.iter().enumerate() {
        let source = passage
            .metadata
            .filename
            .as_deref()
            .or(passage.id.as_deref())
            .unwrap_or("-");
        let score = passage
            .relevance_score()
            .or(passage.metadata.fusion_score)
            .map(|s| format!("{s:.3}"))
            .unwrap_or_else(|| "n/a".to_string());
        let snippet: String = passage.content.chars().take(160).collect();
        out.push_str(&format!(
            "\n{}. {source} [{score}]\n   {}\n",
            i + 1,
            snippet.replace('\n', " ")
        ));
    }

    for failure in &report.failures {
        out.push_str(&format!("\nwarning: {failure}"));
    }
    out
}

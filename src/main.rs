//! # corpus-qa CLI (`cqa`)
//!
//! The `cqa` binary is the orchestrator boundary around the engine: it
//! supplies questions, top-k, and filters, owns ingestion invocation and
//! index persistence, and renders retrieved chunks plus the answer.
//!
//! ## Usage
//!
//! ```bash
//! cqa --config ./config/cqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cqa ingest` | Build or extend the index from the documents folder |
//! | `cqa ask "<question>"` | Answer one question |
//! | `cqa chat` | Interactive loop with conversation memory |
//! | `cqa eval <benchmark.json>` | Score retrieval quality against a benchmark |
//! | `cqa bench "<question>"` | Time one full retrieve+generate cycle |
//! | `cqa log` | Show recent audit log entries |
//! | `cqa stats` | Summarize what is indexed |

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use corpus_qa::audit::AuditLogger;
use corpus_qa::config::{self, Config};
use corpus_qa::embedding::create_embedder;
use corpus_qa::eval;
use corpus_qa::models::{DocumentChunk, QueryFilter, SourceType};
use corpus_qa::pipeline::{collect_ingestible, Pipeline};
use corpus_qa::retriever::{Retriever, CHUNKS_FILE, VECTORS_FILE};

/// corpus-qa — retrieval-augmented question answering over local documents.
#[derive(Parser)]
#[command(
    name = "cqa",
    about = "Retrieval-augmented question answering over local documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or extend the vector index.
    ///
    /// With no paths, scans the configured documents folder. Ingestion is
    /// additive; pass `--rebuild` to drop the existing index first. The
    /// index pair is saved after every run.
    Ingest {
        /// Specific files to ingest instead of scanning the documents folder.
        paths: Vec<PathBuf>,

        /// Drop everything indexed so far and start over.
        #[arg(long)]
        rebuild: bool,
    },

    /// Answer a single question.
    Ask {
        question: String,

        /// Number of chunks to retrieve before filtering.
        #[arg(long)]
        top_k: Option<usize>,

        /// Keep only chunks from this source type (txt, md, pdf, csv).
        #[arg(long)]
        source_type: Option<String>,

        /// Keep only chunks dated after this ISO date (YYYY-MM-DD).
        #[arg(long)]
        date_after: Option<String>,

        /// Also print the retrieved chunks and their scores.
        #[arg(long)]
        show_context: bool,
    },

    /// Interactive question loop; prior turns feed into each prompt.
    Chat {
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Score retrieval quality against a labeled benchmark file.
    ///
    /// The benchmark is a JSON array of `{"question", "gold_ids"}` cases.
    Eval {
        benchmark: PathBuf,

        /// Retrieval depth to score at.
        #[arg(short, long, default_value_t = 5)]
        k: usize,
    },

    /// Time one full retrieve+generate cycle.
    Bench { question: String },

    /// Show recent audit log entries.
    Log {
        /// Number of entries to show, newest last.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Summarize what is indexed.
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config(&cli.config)?;

    // Worker threading is explicit startup configuration, not ambient state.
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(n) = config.runtime.worker_threads {
        builder.worker_threads(n);
    }
    let runtime = builder.build()?;

    runtime.block_on(dispatch(cli.command, config))
}

async fn dispatch(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Ingest { paths, rebuild } => run_ingest(&config, paths, rebuild).await,
        Commands::Ask {
            question,
            top_k,
            source_type,
            date_after,
            show_context,
        } => run_ask(&config, &question, top_k, source_type, date_after, show_context).await,
        Commands::Chat { top_k } => run_chat(&config, top_k).await,
        Commands::Eval { benchmark, k } => run_eval(&config, &benchmark, k).await,
        Commands::Bench { question } => run_bench(&config, &question).await,
        Commands::Log { limit } => run_log(&config, limit),
        Commands::Stats => run_stats(&config),
    }
}

async fn run_ingest(config: &Config, paths: Vec<PathBuf>, rebuild: bool) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;

    let index_dir = &config.index.dir;
    let persisted = index_dir.join(VECTORS_FILE).exists() || index_dir.join(CHUNKS_FILE).exists();

    let retriever = if persisted && !rebuild {
        Retriever::load(embedder, config, index_dir)?
    } else {
        Retriever::new(embedder, config)
    };

    let paths = if paths.is_empty() {
        collect_ingestible(&config.docs.root)?
    } else {
        paths
    };

    let stats = retriever.add_documents(&paths).await?;
    retriever.save(index_dir)?;

    let summary = retriever.summary()?;
    println!("ingest{}", if rebuild { " (rebuild)" } else { "" });
    println!("  files indexed: {}", stats.files_indexed);
    println!("  files skipped: {}", stats.files_skipped);
    println!("  chunks added: {}", stats.chunks_added);
    println!("  total chunks: {}", summary.chunks);
    println!("  saved to: {}", index_dir.display());
    println!("ok");
    Ok(())
}

fn parse_filter(
    source_type: Option<String>,
    date_after: Option<String>,
) -> Result<Option<QueryFilter>> {
    let source_type = source_type
        .map(|s| s.parse::<SourceType>().map_err(|e| anyhow::anyhow!(e)))
        .transpose()?;

    let filter = QueryFilter {
        source_type,
        date_after,
    };
    Ok(if filter.is_empty() { None } else { Some(filter) })
}

async fn run_ask(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    source_type: Option<String>,
    date_after: Option<String>,
    show_context: bool,
) -> Result<()> {
    let filter = parse_filter(source_type, date_after)?;
    let mut pipeline = Pipeline::init(config).await?;

    let result = pipeline.run(question, top_k, filter.as_ref()).await?;

    println!("{}", result.answer);

    if show_context {
        println!();
        print_context(&result.retrieved);
    }

    Ok(())
}

async fn run_chat(config: &Config, top_k: Option<usize>) -> Result<()> {
    let mut pipeline = Pipeline::init(config).await?;

    println!("corpus-qa chat — empty line or 'exit' to quit");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() || question == "exit" || question == "quit" {
            break;
        }

        match pipeline.run(question, top_k, None).await {
            Ok(result) => println!("{}\n", result.answer),
            Err(e) => eprintln!("error: {}\n", e),
        }
    }

    Ok(())
}

async fn run_eval(config: &Config, benchmark_path: &std::path::Path, k: usize) -> Result<()> {
    let benchmark = eval::load_benchmark(benchmark_path)?;

    let embedder = create_embedder(&config.embedding)?;
    let retriever = Retriever::load(embedder, config, &config.index.dir)
        .map_err(|e| anyhow::anyhow!("{} (run `cqa ingest` first)", e))?;

    let recall = eval::recall_at_k(&retriever, &benchmark, k).await?;
    let metrics = eval::precision_recall_f1_at_k(&retriever, &benchmark, k).await?;

    println!("eval @ k={} over {} cases", k, benchmark.len());
    println!("  recall@k (any-hit): {:.4}", recall);
    println!("  precision: {:.4}", metrics.precision);
    println!("  recall:    {:.4}", metrics.recall);
    println!("  f1:        {:.4}", metrics.f1);
    Ok(())
}

async fn run_bench(config: &Config, question: &str) -> Result<()> {
    let mut pipeline = Pipeline::init(config).await?;
    let (seconds, answer) = pipeline.bench(question).await?;
    println!("latency: {:.2}s", seconds);
    println!("{}", answer);
    Ok(())
}

fn run_log(config: &Config, limit: usize) -> Result<()> {
    let logger = AuditLogger::new(&config.logging.dir, &config.logging.group_id)?;
    let entries = logger.entries()?;

    if entries.is_empty() {
        println!("no audit entries");
        return Ok(());
    }

    let start = entries.len().saturating_sub(limit);
    for entry in &entries[start..] {
        println!("[{}] {}", entry.timestamp, entry.question);
        println!("  retrieved: {}", entry.retrieved_ids.join(", "));
        println!("  answer: {}", entry.generated_answer);
    }
    Ok(())
}

fn run_stats(config: &Config) -> Result<()> {
    let chunks_path = config.index.dir.join(CHUNKS_FILE);
    if !chunks_path.exists() {
        println!("no index at {} (run `cqa ingest`)", config.index.dir.display());
        return Ok(());
    }

    let raw = std::fs::read_to_string(&chunks_path)?;
    let chunks: Vec<DocumentChunk> = serde_json::from_str(&raw)?;

    let mut files: Vec<&str> = chunks.iter().map(|c| c.source_path.as_str()).collect();
    files.sort_unstable();
    files.dedup();

    let vectors_size = std::fs::metadata(config.index.dir.join(VECTORS_FILE))
        .map(|m| m.len())
        .unwrap_or(0);

    println!("corpus-qa — index stats");
    println!("  index dir: {}", config.index.dir.display());
    println!("  files:     {}", files.len());
    println!("  chunks:    {}", chunks.len());
    println!("  vectors:   {} bytes", vectors_size);
    Ok(())
}

fn print_context(retrieved: &[(DocumentChunk, f32)]) {
    println!("retrieved context:");
    for (i, (chunk, score)) in retrieved.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (source: {}, date: {})",
            i + 1,
            score,
            chunk.id,
            chunk.source_type,
            chunk.date
        );
        let excerpt: String = chunk.text.chars().take(240).collect();
        println!("   {}", excerpt.replace('\n', " "));
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ragline_core::config::{Config, LoggingConfig, StorageMode};
use ragline_core::rag::{RagEngine, Retrieval, RetrieveOptions};
use ragline_core::Server;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragline")]
#[command(about = "Knowledge-base ingestion and retrieval for a voice agent", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show current configuration")]
    Show {
        #[arg(long, help = "Print the effective configuration as YAML")]
        yaml: bool,
    },

    #[command(about = "Replace the collection with the chunks of a markdown document")]
    Ingest {
        #[arg(help = "Knowledge-base document (markdown)")]
        file: PathBuf,

        #[arg(short, long, help = "Source name stored with each chunk (default: file stem)")]
        source: Option<String>,
    },

    #[command(about = "Retrieve context for a query")]
    Query {
        #[arg(help = "Query text")]
        text: String,

        #[arg(short = 'k', long, help = "Number of results (default from config)")]
        top_k: Option<usize>,

        #[arg(long, help = "List the sources behind the context")]
        sources: bool,
    },

    #[command(about = "Show collection statistics")]
    Stats,

    #[command(about = "Serve requests on the configured Unix socket")]
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Show { yaml } => show_config(&config, yaml),
        Commands::Ingest { file, source } => ingest(&config, &file, source).await,
        Commands::Query { text, top_k, sources } => query(&config, &text, top_k, sources).await,
        Commands::Stats => stats(&config).await,
        Commands::Serve => serve(&config).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::default()
    };
    config.apply_env();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn engine(config: &Config) -> Result<RagEngine> {
    RagEngine::new(config).context("Failed to initialize RAG engine")
}

fn show_config(config: &Config, yaml: bool) -> Result<()> {
    if yaml {
        let rendered = serde_yaml::to_string(config).context("Failed to serialize config")?;
        print!("{rendered}");
        return Ok(());
    }

    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "RAG:".bold());
    println!("  Chunk Size:      {}", config.rag.chunk_size);
    println!("  Chunk Overlap:   {}", config.rag.chunk_overlap);
    println!("  Min Chunk Size:  {}", config.rag.min_chunk_size);
    println!("  Top K:           {}", config.rag.top_k);
    println!("  Score Threshold: {}", config.rag.score_threshold);
    println!();
    println!("{}", "Embedding:".bold());
    println!("  Provider:        {:?}", config.embedding.provider);
    println!("  Model:           {}", config.embedding.model.cyan());
    println!("  Dimension:       {}", config.embedding.dimension);
    println!(
        "  API Key:         {}",
        if config.embedding.api_key.is_some() { "set" } else { "not set" }
    );
    println!();
    println!("{}", "Storage:".bold());
    match &config.storage.storage_mode {
        StorageMode::Memory => println!("  Mode:            memory"),
        StorageMode::Grpc { url, .. } => println!("  Mode:            grpc ({url})"),
    }
    println!("  Collection:      {}", config.storage.vector_db.collection_name.cyan());

    Ok(())
}

async fn ingest(config: &Config, file: &Path, source: Option<String>) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let source = source
        .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "knowledge_base".to_string());

    let engine = engine(config)?;
    println!(
        "{} Ingesting {} into {}...",
        "→".blue(),
        file.display(),
        engine.index().collection_name().cyan()
    );

    match engine.ingestor().ingest_bytes(&bytes, &source).await {
        Ok(summary) => {
            println!("{} Ingestion complete", "✓".green().bold());
            println!("  Chunks created:   {}", summary.chunks_created);
            println!("  Vectors embedded: {}", summary.vectors_embedded);
            println!("  Vectors indexed:  {}", summary.vectors_indexed);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} Ingestion failed at the {} stage", "✗".red().bold(), e.stage);
            eprintln!("  Chunks created:   {}", e.progress.chunks_created);
            eprintln!("  Vectors embedded: {}", e.progress.vectors_embedded);
            eprintln!("  Vectors indexed:  {}", e.progress.vectors_indexed);
            Err(e).context("Ingestion aborted")
        }
    }
}

async fn query(config: &Config, text: &str, top_k: Option<usize>, sources: bool) -> Result<()> {
    let engine = engine(config)?;
    let options = RetrieveOptions { top_k, ..RetrieveOptions::default() };
    let retrieval = engine.retriever().retrieve(text, &options).await;

    match &retrieval {
        Retrieval::Context { context, .. } => println!("{context}"),
        Retrieval::NoMatch => println!("{}", "No relevant context found.".yellow()),
        Retrieval::Unavailable { reason } => bail!("Knowledge base unavailable: {reason}"),
    }

    if sources {
        println!();
        println!("{}", "Sources:".bold());
        for (rank, source) in retrieval.sources().iter().enumerate() {
            println!(
                "  {}. [{:.3}] {} ({}, {})",
                rank + 1,
                source.score,
                source.header.cyan(),
                source.source,
                source.chunk_id
            );
        }
    }

    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let engine = engine(config)?;
    let stats = engine
        .index()
        .stats()
        .await
        .context("Failed to get collection stats")?;

    println!("{}", "Collection:".bold());
    println!("  Name:      {}", stats.collection.cyan());
    println!("  Exists:    {}", stats.exists);
    println!("  Points:    {}", stats.points_count);
    println!("  Status:    {}", stats.status);
    println!("  Dimension: {}", stats.dimension);
    Ok(())
}

async fn serve(config: &Config) -> Result<()> {
    let server = Server::new(engine(config)?);
    server.start().await.context("Server failed")?;
    Ok(())
}

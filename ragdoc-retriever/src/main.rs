use anyhow::Context;
use clap::{Parser, Subcommand};
use ragdoc_embed::{EmbeddingProvider, FastEmbedProvider, HttpEmbeddingProvider};
use ragdoc_retriever::{
    config::{EmbeddingBackend, RagConfig},
    generation::HttpCompletionProvider,
    retrieval::{EngineStats, IngestOutcome, QueryEngine},
    storage::{DocumentStore, SqliteStore, sqlite_store::DATABASE_FILE},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Ask questions about a local document collection.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base directory containing the .ragdoc.db database file
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    /// TOML configuration file. Defaults to <base-dir>/ragdoc.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the document database
    Init,
    /// Embed and store a document
    Add {
        /// Document text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,
        /// Read the document text from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Free-form metadata stored with the document
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Answer a question from the stored documents
    Query {
        question: String,
        /// Number of passages to retrieve, overriding the configuration
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Show a stored document
    Get {
        id: i64,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Rebuild the similarity index from the database and report its size
    Rebuild,
    /// Show database, index and cache statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct StatsOutput {
    database: PathBuf,
    stored_documents: usize,
    #[serde(flatten)]
    engine: EngineStats,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn load_config(args: &Args) -> anyhow::Result<RagConfig> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| args.base_dir.join("ragdoc.toml"));
    Ok(RagConfig::load(&path)?)
}

async fn embedding_provider(config: &RagConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let embed_config = config.embed_config();
    let provider: Arc<dyn EmbeddingProvider> = match config.embedding_backend {
        EmbeddingBackend::Http => Arc::new(HttpEmbeddingProvider::new(embed_config)?),
        EmbeddingBackend::Fastembed => Arc::new(FastEmbedProvider::create(embed_config).await?),
    };
    Ok(provider)
}

async fn open_engine(config: &RagConfig, store: Arc<SqliteStore>) -> anyhow::Result<QueryEngine> {
    let embedder = embedding_provider(config).await?;
    let completer = Arc::new(HttpCompletionProvider::new(config.completion_config())?);
    let engine = QueryEngine::start(store, embedder, completer, config.engine_settings())
        .await
        .context("Failed to load the document index")?;
    Ok(engine)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(&args)?;

    match args.command {
        Commands::Init => {
            let _store = SqliteStore::open(&args.base_dir).await?;
            println!("Initialized document database at {}", args.base_dir.display());
            println!(
                "Database location: {}",
                args.base_dir.join(DATABASE_FILE).display()
            );
            Ok(())
        }
        Commands::Add {
            content,
            file,
            metadata,
        } => {
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("Either --content or --file is required"),
            };

            let store = Arc::new(SqliteStore::open(&args.base_dir).await?);
            let embedder = embedding_provider(&config).await?;
            let ingestor = ragdoc_retriever::retrieval::Ingestor::new(store, embedder);

            match ingestor.ingest(&content, metadata).await? {
                IngestOutcome::Created { id } => println!("Added document {id}"),
                IngestOutcome::Duplicate { content_hash } => {
                    println!("Document already stored (hash {content_hash})")
                }
            }
            Ok(())
        }
        Commands::Query { question, top_k } => {
            if let Some(top_k) = top_k {
                config.top_k = top_k;
                config.validate()?;
            }
            let store = Arc::new(SqliteStore::open(&args.base_dir).await?);
            let engine = open_engine(&config, store).await?;
            println!("{}", engine.query(&question).await?);
            Ok(())
        }
        Commands::Get { id, format } => {
            let store = SqliteStore::open(&args.base_dir).await?;
            let Some(document) = store.get_document(id).await? else {
                println!("Document with ID {id} not found");
                return Ok(());
            };

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&document)?);
                }
                OutputFormat::Summary => {
                    println!("Document ID: {}", document.id);
                    println!("Content hash: {}", document.content_hash);
                    println!("Created: {}", document.created_at.to_rfc3339());
                    if let Some(metadata) = &document.metadata {
                        println!("Metadata: {metadata}");
                    }
                    println!("Embedding dimension: {}", document.embedding.len());
                    println!(
                        "Content preview: {}",
                        document.content.chars().take(100).collect::<String>()
                    );
                }
            }
            Ok(())
        }
        Commands::Rebuild => {
            let store = Arc::new(SqliteStore::open(&args.base_dir).await?);
            let engine = open_engine(&config, store).await?;
            let count = engine.rebuild_index().await?;
            println!(
                "Indexed {} documents ({} strategy, dimension {})",
                count,
                engine.index().strategy(),
                engine
                    .index()
                    .dimension()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "n/a".to_string())
            );
            Ok(())
        }
        Commands::Stats { format } => {
            let store = Arc::new(SqliteStore::open(&args.base_dir).await?);
            let stored_documents = store.document_count().await?;
            let engine = open_engine(&config, store).await?;
            let output = StatsOutput {
                database: args.base_dir.join(DATABASE_FILE),
                stored_documents,
                engine: engine.stats(),
            };

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    println!("Database: {}", output.database.display());
                    println!("  Stored documents: {}", output.stored_documents);
                    println!("  Indexed documents: {}", output.engine.indexed_documents);
                    println!(
                        "  Dimension: {}",
                        output
                            .engine
                            .dimension
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "n/a".to_string())
                    );
                    println!("  Index strategy: {}", output.engine.strategy);
                    println!("  Index refresh: {}", output.engine.refresh);
                    println!("  Embedding model: {}", config.embedding_model);
                    println!("  Language model: {}", config.llm_model);
                }
            }
            Ok(())
        }
    }
}

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ltm_config::LtmConfig;
use ltm_memory::{DataSourceRegistry, Ltm, LtmError, VectorStoreRegistry};
use ltm_types::{Document, DocumentId};

#[derive(Parser)]
#[command(name = "ltm", about = "Long-term memory store for conversational agents")]
struct Cli {
    /// Config file (defaults to ~/.ltm/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the configured backends and pin their resolved descriptors in the config file
    Init,
    /// Embed and store a document
    Store {
        /// Document content
        #[arg(short = 'C', long)]
        content: String,

        /// Metadata entry as key=value (value parsed as JSON when possible)
        #[arg(short, long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, serde_json::Value)>,
    },
    /// Retrieve the documents most similar to some content
    Retrieve {
        /// Query content
        #[arg(short = 'C', long)]
        content: String,

        /// Number of documents (0 uses the configured default)
        #[arg(short = 'k', long, default_value_t = 0)]
        top_k: usize,
    },
    /// Fetch a stored document by id
    Get {
        /// Document id
        id: DocumentId,
    },
    /// Print the descriptors of the configured backends
    Describe,
}

fn parse_meta(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn load(path: Option<&PathBuf>) -> anyhow::Result<(LtmConfig, PathBuf)> {
    let path = match path {
        Some(p) => p.clone(),
        None => ltm_config::config_file_path()?,
    };
    // Load .env if present
    let _ = dotenvy::dotenv();
    let config = ltm_config::load_config_from(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    Ok((config, path))
}

fn build(config: &LtmConfig) -> anyhow::Result<Ltm> {
    Ok(Ltm::from_config(
        config,
        &VectorStoreRegistry::with_defaults(),
        &DataSourceRegistry::with_defaults(),
    )?)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (mut config, path) = load(cli.config.as_ref())?;
    let ltm = build(&config)?;

    let result = match cli.command {
        Commands::Init => {
            let descriptors = ltm.descriptors();
            config.vector_store = descriptors.vector_store;
            config.datasource = descriptors.datasource;
            ltm_config::save_config_to(&config, &path)?;
            tracing::info!("Config written to {}", path.display());
            println!("{}", path.display());
            Ok(())
        }
        Commands::Store { content, meta } => {
            let mut doc = Document::new(content);
            doc.metadata.extend(meta);
            let stored = ltm.store_document(doc).await?;
            println!("{}", stored.id);
            Ok(())
        }
        Commands::Retrieve { content, top_k } => {
            let docs = ltm
                .retrieve_similar_documents(&Document::new(content), top_k)
                .await?;
            println!("{}", serde_json::to_string_pretty(&docs)?);
            Ok(())
        }
        Commands::Get { id } => {
            let doc = ltm.get_document(id).await?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        Commands::Describe => {
            println!("{}", serde_json::to_string_pretty(&ltm.descriptors())?);
            Ok(())
        }
    };

    let closed = ltm.close().await;
    settle(result, closed)
}

/// The command's own error wins over a failure to close.
fn settle(result: anyhow::Result<()>, closed: Result<(), LtmError>) -> anyhow::Result<()> {
    result?;
    closed?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))
}

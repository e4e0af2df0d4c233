use anyhow::Result;
use clap::Parser as _;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use docrag_core::config::Config;
use docrag_embed::get_default_embedder;
use docrag_engine::{document_summary, RetrievalEngine};

mod cli;
mod ingest;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load_from(&cli.base_dir).map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.rag_settings()?;
    let embedder = get_default_embedder(&settings, config.base_dir())?;
    let mut engine = RetrievalEngine::open(&settings, config.base_dir(), embedder).await?;

    match cli.command {
        Commands::Ingest { path, info } => {
            let info = ingest::parse_info(info.as_deref())?;
            let ids = ingest::ingest_path(&mut engine, &path, &info).await?;
            println!("✅ Ingested {} document(s)", ids.len());
        }
        Commands::Search { query, k } => {
            let results = engine.search(&query, k.unwrap_or(engine.search_top_k())).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (rank, r) in results.iter().enumerate() {
                println!("{}. [{:.4}] {} (doc {}, chunk {})", rank + 1, r.score, r.filename, r.document_id, r.chunk_id);
                println!("   {}", r.chunk_text.replace('\n', " "));
            }
        }
        Commands::Context { query, max_len } => {
            let context = engine.get_context_for_query(&query, max_len.unwrap_or(engine.max_context_length())).await?;
            println!("{context}");
        }
        Commands::List => {
            for doc in engine.get_all_documents().await? {
                println!("{}\t{}\t{}", doc.id, doc.created_at.format("%Y-%m-%d %H:%M:%S"), doc.filename);
            }
        }
        Commands::Count => println!("{}", engine.get_document_count().await?),
        Commands::Delete { id } => {
            if engine.delete_document(id).await {
                info!(document_id = id, "delete command succeeded");
                println!("✅ Deleted document {id}");
            } else {
                warn!(document_id = id, "delete command failed");
                eprintln!("Document {id} was not deleted (see log)");
                std::process::exit(1);
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                eprintln!("Refusing to delete every document without --yes");
                std::process::exit(1);
            }
            engine.clear_all().await?;
            println!("✅ All documents removed");
        }
        Commands::Repair => {
            let entries = engine.repair_index().await?;
            println!("✅ Index rebuilt with {entries} chunk(s)");
        }
        Commands::Summary => {
            let summary = document_summary(&engine).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

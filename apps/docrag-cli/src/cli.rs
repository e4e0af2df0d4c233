use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(about = "Local document retrieval: ingest text, search it, build answer contexts", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, default_value = ".", help = "Directory holding config.toml; relative paths resolve against it")]
    pub base_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Ingest a text file or every .txt/.md file under a directory")]
    Ingest {
        #[arg(help = "File or directory to ingest")]
        path: PathBuf,

        #[arg(long, help = "Extracted info stored with every document, as a JSON object")]
        info: Option<String>,
    },

    #[command(about = "Show the chunks most similar to a query")]
    Search {
        #[arg(help = "Query text")]
        query: String,

        #[arg(short, long, help = "Number of results (defaults to rag.search_top_k)")]
        k: Option<usize>,
    },

    #[command(about = "Print the context window assembled for a query")]
    Context {
        #[arg(help = "Query text")]
        query: String,

        #[arg(long, help = "Character budget (defaults to rag.max_context_length)")]
        max_len: Option<usize>,
    },

    #[command(about = "List stored documents, newest first")]
    List,

    #[command(about = "Print the number of stored documents")]
    Count,

    #[command(about = "Delete one document and rebuild the index")]
    Delete {
        #[arg(help = "Document id")]
        id: i64,
    },

    #[command(about = "Delete every document")]
    Clear {
        #[arg(long, help = "Skip the confirmation guard")]
        yes: bool,
    },

    #[command(about = "Rebuild the vector index from stored chunk embeddings")]
    Repair,

    #[command(about = "Summarize extracted info across documents")]
    Summary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_with_k() {
        let cli = Cli::try_parse_from(["docrag", "search", "who owns lot 7", "-k", "3"]).unwrap();
        match cli.command {
            Commands::Search { query, k } => {
                assert_eq!(query, "who owns lot 7");
                assert_eq!(k, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.base_dir, PathBuf::from("."));
    }

    #[test]
    fn parses_ingest_with_info_and_base_dir() {
        let cli = Cli::try_parse_from(["docrag", "--base-dir", "/srv/rag", "ingest", "docs", "--info", "{\"a\":1}"]).unwrap();
        assert_eq!(cli.base_dir, PathBuf::from("/srv/rag"));
        assert!(matches!(cli.command, Commands::Ingest { ref path, info: Some(_) } if path == &PathBuf::from("docs")));
    }

    #[test]
    fn delete_requires_numeric_id() {
        assert!(Cli::try_parse_from(["docrag", "delete", "abc"]).is_err());
        assert!(matches!(Cli::try_parse_from(["docrag", "delete", "12"]).unwrap().command, Commands::Delete { id: 12 }));
    }
}

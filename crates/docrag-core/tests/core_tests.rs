use std::fs;
use std::path::Path;
use tempfile::TempDir;

use docrag_core::chunker::{chunk_text, ChunkingConfig};
use docrag_core::config::{resolve_with_base, Config, RagSettings};
use docrag_core::types::ConfidencePolicy;

#[test]
fn rag_settings_default_when_section_missing() {
    let tmp = TempDir::new().unwrap();
    let config = Config::load_from(tmp.path()).expect("load");
    let settings = config.rag_settings().expect("settings");
    assert_eq!(settings, RagSettings::default());
    assert_eq!(settings.dimension, 384);
    assert_eq!(settings.chunking(), ChunkingConfig::default());
}

#[test]
fn rag_settings_read_from_config_file() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[rag]\nchunk_size = 800\nchunk_overlap = 120\nconfidence = \"max\"\nindex_path = \"idx/index.bin\"\n",
    )
    .unwrap();

    let config = Config::load_from(tmp.path()).expect("load");
    let settings = config.rag_settings().expect("settings");
    assert_eq!(settings.chunk_size, 800);
    assert_eq!(settings.chunk_overlap, 120);
    assert_eq!(settings.confidence, ConfidencePolicy::Max);
    // untouched keys keep their defaults
    assert_eq!(settings.max_context_length, 2000);
    assert_eq!(settings.index_path_in(config.base_dir()), tmp.path().join("idx/index.bin"));
}

#[test]
fn invalid_chunking_is_rejected() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.toml"), "[rag]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
    let config = Config::load_from(tmp.path()).expect("load");
    assert!(config.rag_settings().is_err());
}

#[test]
fn absolute_paths_are_kept() {
    let base = Path::new("/srv/docrag");
    assert_eq!(resolve_with_base(base, "/var/lib/index.bin"), Path::new("/var/lib/index.bin"));
    assert_eq!(resolve_with_base(base, "index.bin"), base.join("index.bin"));
}

#[test]
fn default_chunking_of_long_document() {
    let text = "Owner data is listed here.\n".repeat(60);
    let chunks = chunk_text(&text, &ChunkingConfig::default());
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| !c.is_empty() && c.chars().count() <= 500));
    // every cut lands on a sentence end
    assert!(chunks.iter().all(|c| c.ends_with('.')));
}

use anyhow::{Context as _, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use docrag_core::types::Meta;
use docrag_engine::RetrievalEngine;

const EXTENSIONS: [&str; 2] = ["txt", "md"];

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// `path` itself when it is a file, otherwise every text file below it, sorted.
pub fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file() && is_text_file(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

pub fn parse_info(raw: Option<&str>) -> Result<Meta> {
    match raw {
        None => Ok(Meta::new()),
        Some(json) => serde_json::from_str(json).context("--info must be a JSON object"),
    }
}

pub async fn ingest_path(engine: &mut RetrievalEngine, path: &Path, info: &Meta) -> Result<Vec<i64>> {
    let files = collect_files(path);
    if files.is_empty() {
        println!("No text files found under {}", path.display());
        return Ok(Vec::new());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let mut ids = Vec::with_capacity(files.len());
    for file in &files {
        let filename = file.file_name().map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
        pb.set_message(filename.clone());
        let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let id = engine.add_document(&filename, &content, info.clone()).await?;
        info!(file = %file.display(), document_id = id, "file ingested");
        ids.push(id);
        pb.inc(1);
    }
    pb.finish_with_message("done");
    info!(files = files.len(), path = %path.display(), "ingest finished");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_only_text_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("nested/a.MD"), "a").unwrap();
        std::fs::write(tmp.path().join("image.png"), [0u8; 4]).unwrap();

        let files = collect_files(tmp.path());
        assert_eq!(files, vec![tmp.path().join("b.txt"), tmp.path().join("nested/a.MD")]);
        assert_eq!(collect_files(&tmp.path().join("b.txt")), vec![tmp.path().join("b.txt")]);
    }

    #[test]
    fn info_must_be_an_object() {
        assert!(parse_info(None).unwrap().is_empty());
        assert_eq!(parse_info(Some(r#"{"registration_number":"9"}"#)).unwrap().len(), 1);
        assert!(parse_info(Some("[1,2]")).is_err());
    }
}

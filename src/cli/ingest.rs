//! CLI command: `densex ingest`
//!
//! Parses each document, splits it into passages, embeds them in batches
//! and upserts them into the configured index.

use anyhow::Context;
use densex_docs::{chunk_text, parse_document};
use densex_llm::Embedder;
use densex_search::{VectorRecord, VectorStore};
use std::path::{Path, PathBuf};
use tracing::info;

/// Passage size used when `--max-chars` is not given
pub const DEFAULT_MAX_CHARS: usize = 1_000;

/// Passages per embedding request
const EMBED_BATCH: usize = 32;

/// Run the ingest subcommand.
pub async fn run(paths: &[PathBuf], max_chars: usize) -> anyhow::Result<()> {
    let (_, components) = crate::server::init().await?;

    let mut total = 0;
    for path in paths {
        let count = ingest_file(&components.embedder, components.store.as_ref(), path, max_chars)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        println!("  {:<48} {:>6} passages", path.display(), count);
        total += count;
    }

    components
        .store
        .persist()
        .await
        .context("Failed to save index")?;
    println!("  Indexed {} passages from {} files", total, paths.len());
    Ok(())
}

/// Index one document; returns the number of passages written
pub async fn ingest_file(
    embedder: &Embedder,
    store: &dyn VectorStore,
    path: &Path,
    max_chars: usize,
) -> anyhow::Result<usize> {
    let text = parse_document(path).await?;
    let passages = chunk_text(&text, max_chars);
    if passages.is_empty() {
        info!(path = %path.display(), "document has no text");
        return Ok(0);
    }

    let source = source_name(path);
    let mut written = 0;
    for (batch_no, batch) in passages.chunks(EMBED_BATCH).enumerate() {
        let vectors = embedder.embed(batch).await?;
        let records: Vec<VectorRecord> = batch
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (passage, vector))| {
                VectorRecord::new(format!("{}#{}", source, batch_no * EMBED_BATCH + i), vector)
                    .with_text(passage.clone())
                    .with_metadata("source", source.clone())
            })
            .collect();
        written += store.upsert(&records).await?;
    }

    info!(path = %path.display(), passages = written, "document indexed");
    Ok(written)
}

/// File name used in record ids, falling back to the full path
fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use densex_llm::EmbeddingProvider;
    use densex_search::{IndexConfig, LocalIndex};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// One-hot vectors keyed on the first letter of the text
    struct LetterEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for LetterEmbeddings {
        async fn embed_batch(&self, texts: &[String]) -> densex_llm::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 4];
                    let slot = t.bytes().next().map(|b| (b % 4) as usize).unwrap_or(0);
                    v[slot] = 1.0;
                    v
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn model(&self) -> &str {
            "letters"
        }
    }

    #[tokio::test]
    async fn test_ingest_writes_passages_with_text() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("notes.md");
        tokio::fs::write(&doc, "alpha paragraph\n\nbeta paragraph\n\n").await.unwrap();

        let embedder = Embedder::new(Arc::new(LetterEmbeddings));
        let index = LocalIndex::new(IndexConfig::new(4)).unwrap();

        let written = ingest_file(&embedder, &index, &doc, 100).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(index.len(), 2);

        let query = embedder.embed_one("alpha?").await.unwrap();
        let matches = index.query(&query, 1).await.unwrap();
        assert_eq!(matches[0].id, "notes.md#0");

        let query = embedder.embed_one("beta?").await.unwrap();
        let matches = index.query(&query, 1).await.unwrap();
        assert_eq!(matches[0].id, "notes.md#1");
        assert_eq!(matches[0].text(), Some("beta paragraph"));
        assert_eq!(matches[0].metadata["source"], "notes.md");
    }

    #[tokio::test]
    async fn test_reingest_replaces_passages() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.txt");
        tokio::fs::write(&doc, "one\n\ntwo").await.unwrap();

        let embedder = Embedder::new(Arc::new(LetterEmbeddings));
        let index = LocalIndex::new(IndexConfig::new(4)).unwrap();

        ingest_file(&embedder, &index, &doc, 100).await.unwrap();
        ingest_file(&embedder, &index, &doc, 100).await.unwrap();
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_document_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("blank.txt");
        tokio::fs::write(&doc, "\n \n").await.unwrap();

        let embedder = Embedder::new(Arc::new(LetterEmbeddings));
        let index = LocalIndex::new(IndexConfig::new(4)).unwrap();
        assert_eq!(ingest_file(&embedder, &index, &doc, 100).await.unwrap(), 0);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_file_fails() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("table.csv");
        tokio::fs::write(&doc, "a,b").await.unwrap();

        let embedder = Embedder::new(Arc::new(LetterEmbeddings));
        let index = LocalIndex::new(IndexConfig::new(4)).unwrap();
        let err = ingest_file(&embedder, &index, &doc, 100).await.unwrap_err();
        assert_eq!(err.to_string(), "unsupported file type");
    }

    #[test]
    fn test_source_name() {
        assert_eq!(source_name(Path::new("/docs/guide.pdf")), "guide.pdf");
    }
}

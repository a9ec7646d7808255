//! Documentation vector store: Markdown ingestion and similarity search.
//!
//! Embeddings are hashed bag-of-words vectors (feature hashing with a sign
//! bit, L2-normalised), so ingestion needs no model download and the same
//! text always maps to the same vector.

use std::path::Path;

use anyhow::{Context, Result};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::common::{make_relative, optional_str, optional_u64, required_str, secure_join, ToolContext};
use crate::storage::VectorDocument;

pub const EMBEDDING_DIM: usize = 256;
const DEFAULT_N_RESULTS: u64 = 5;

/// One heading-delimited slice of a Markdown document.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub content: String,
}

/// Split Markdown into sections at every heading. Text before the first
/// heading is titled `fallback_title`. Sections with no body text are dropped.
pub fn split_sections(markdown: &str, fallback_title: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title = fallback_title.to_string();
    let mut content = String::new();
    let mut heading: Option<String> = None;

    let flush = |title: &str, content: &mut String, sections: &mut Vec<Section>| {
        let body = content.trim();
        if !body.is_empty() {
            sections.push(Section {
                title: title.to_string(),
                content: body.to_string(),
            });
        }
        content.clear();
    };

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                flush(&title, &mut content, &mut sections);
                heading = Some(String::new());
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(text) = heading.take() {
                    title = text.trim().to_string();
                }
            }
            Event::Text(text) | Event::Code(text) => match heading.as_mut() {
                Some(h) => h.push_str(&text),
                None => content.push_str(&text),
            },
            Event::SoftBreak | Event::HardBreak => match heading.as_mut() {
                Some(h) => h.push(' '),
                None => content.push('\n'),
            },
            Event::End(TagEnd::Paragraph | TagEnd::CodeBlock | TagEnd::Item) => {
                content.push('\n');
            }
            _ => {}
        }
    }
    flush(&title, &mut content, &mut sections);

    sections
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}

/// Hashed bag-of-words embedding. All-zero when `text` has no tokens.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];

    for token in tokens(text) {
        let hash = blake3::hash(token.as_bytes());
        let bytes = hash.as_bytes();
        let h = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);
        let index = (h % EMBEDDING_DIM as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn document_id(source_path: &str, index: usize) -> String {
    let hash = blake3::hash(format!("{}#{}", source_path, index).as_bytes());
    hash.to_hex()[..32].to_string()
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md" | "markdown" | "mdx")
    )
}

/// Ingest Markdown files under the docs directory (or a sub-directory of it).
pub async fn tool_ingest_docs(args: Value, ctx: ToolContext) -> Result<Value> {
    let docs_root = ctx.docs_dir.as_path();
    let source_dir = match optional_str(&args, "source_dir") {
        Some(dir) => secure_join(docs_root, dir)?,
        None => docs_root.to_path_buf(),
    };

    if !source_dir.is_dir() {
        anyhow::bail!(
            "Failed to ingest docs: directory not found: {}",
            source_dir.display()
        );
    }

    let files: Vec<_> = WalkDir::new(&source_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_markdown(e.path()))
        .map(|e| e.into_path())
        .collect();

    let mut files_processed = 0usize;
    let mut chunks_created = 0usize;

    for path in &files {
        let markdown = match tokio::fs::read_to_string(path).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };

        let source_path = make_relative(docs_root, path);
        let fallback_title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| source_path.clone());

        for (index, section) in split_sections(&markdown, &fallback_title).into_iter().enumerate() {
            let embedding = embed(&format!("{}\n{}", section.title, section.content));
            let doc = VectorDocument {
                document_id: document_id(&source_path, index),
                source_path: source_path.clone(),
                title: section.title,
                content: section.content,
                embedding,
            };
            ctx.sqlite
                .upsert_vector_document(&doc)
                .await
                .context("Failed to ingest docs")?;
            chunks_created += 1;
        }
        files_processed += 1;
    }

    let total_documents = ctx
        .sqlite
        .count_vector_documents()
        .await
        .context("Failed to ingest docs")?;

    tracing::info!(
        "Ingested {} files ({} chunks) from {:?}, {} documents stored",
        files_processed,
        chunks_created,
        source_dir,
        total_documents
    );

    let shown_dir = source_dir.display().to_string();
    Ok(json!({
        "success": true,
        "message": format!("Documentation ingested from {}", shown_dir),
        "details": {
            "source_dir": shown_dir,
            "files_processed": files_processed,
            "chunks_created": chunks_created,
            "total_documents": total_documents,
        }
    }))
}

/// Rank stored sections against `query`, best first.
pub async fn tool_vector_search(args: Value, ctx: ToolContext) -> Result<Value> {
    let query = required_str(&args, "query")?;
    let n_results = optional_u64(&args, "n_results").unwrap_or(DEFAULT_N_RESULTS) as usize;

    let query_vector = embed(query);
    let documents = ctx
        .sqlite
        .all_vector_documents()
        .await
        .context("Failed to perform vector search")?;

    let mut scored: Vec<(f32, VectorDocument)> = documents
        .into_iter()
        .map(|doc| (cosine_similarity(&query_vector, &doc.embedding), doc))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(n_results);

    let results: Vec<Value> = scored
        .into_iter()
        .map(|(score, doc)| {
            json!({
                "id": doc.document_id,
                "content": doc.content,
                "score": score,
                "metadata": {
                    "source": doc.source_path,
                    "title": doc.title,
                }
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "query": query,
        "results": results,
    }))
}

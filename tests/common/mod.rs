//! Shared fakes and fixtures for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use pdf_chat::generation::Generator;
use pdf_chat::pipeline::{Pipeline, PipelineSettings};
use pdf_chat_core::chunk::{ChunkUnit, Chunker};
use pdf_chat_core::embedding::EmbeddingProvider;
use pdf_chat_core::{RagError, RagResult};

pub const LETTER_DIMS: usize = 26;

/// Bag-of-letters vector: one count per ASCII letter, case-insensitive.
pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; LETTER_DIMS];
    for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    v
}

/// Deterministic embedder with a switch for simulating outages.
#[derive(Default)]
pub struct LetterEmbedder {
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
}

impl LetterEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        LETTER_DIMS
    }
    async fn embed_texts(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::transient("embedding", "simulated outage"));
        }
        Ok(texts.iter().map(|t| letter_vector(t)).collect())
    }
}

/// Embedder of a fixed, different dimensionality.
pub struct TinyEmbedder;

#[async_trait]
impl EmbeddingProvider for TinyEmbedder {
    fn model_name(&self) -> &str {
        "tiny"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed_texts(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

/// Records every prompt and answers with a fixed prefix.
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording"
    }
    async fn generate(&self, prompt: &str) -> RagResult<String> {
        self.prompts.lock().push(prompt.to_string());
        Ok(format!("answer #{}", self.prompts.lock().len()))
    }
}

/// One word per chunk, no overlap.
pub fn word_settings(index_path: &Path) -> PipelineSettings {
    PipelineSettings {
        chunker: Chunker::new(1, 0, ChunkUnit::Words).unwrap(),
        top_k: 3,
        index_path: index_path.to_path_buf(),
    }
}

pub fn pipeline(
    index_path: &Path,
    embedder: Arc<LetterEmbedder>,
    generator: Arc<RecordingGenerator>,
) -> Pipeline {
    Pipeline::new(word_settings(index_path), embedder, generator)
}

/// wiremock responder for Ollama `/api/embed` that embeds whatever it receives.
pub struct OllamaEmbedResponder;

impl wiremock::Respond for OllamaEmbedResponder {
    fn respond(&self, request: &wiremock::Request) -> wiremock::ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| letter_vector(t.as_str().unwrap()))
            .collect();
        wiremock::ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "model": body["model"], "embeddings": embeddings }))
    }
}

/// wiremock responder for OpenAI `/v1/embeddings`; returns items in reverse
/// order to exercise index-based reordering.
pub struct OpenAIEmbedResponder;

impl wiremock::Respond for OpenAIEmbedResponder {
    fn respond(&self, request: &wiremock::Request) -> wiremock::ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let mut data: Vec<serde_json::Value> = body["input"]
            .as_array()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, t)| {
                serde_json::json!({
                    "object": "embedding",
                    "index": i,
                    "embedding": letter_vector(t.as_str().unwrap()),
                })
            })
            .collect();
        data.reverse();
        wiremock::ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "object": "list", "data": data }))
    }
}

/// Minimal single-page PDF showing `phrase` in Helvetica.
///
/// Object offsets in the xref table are computed as the body is written so
/// that pdf-extract can parse it.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

/// Minimal DOCX whose body is one paragraph per entry in `paragraphs`.
pub fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

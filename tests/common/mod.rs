//! Shared fixtures for integration tests: a deterministic stub embedder,
//! a prompt-recording stub generator, and a config builder over a temp dir.
#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use corpus_qa::config::{Config, DocsConfig, IndexConfig};
use corpus_qa::embedding::Embedder;
use corpus_qa::generate::{GenerationParams, Generator};

pub const STUB_DIMS: usize = 256;

/// Deterministic bag-of-words embedder: each word lights up two hash
/// buckets. Same text, same vector — across calls and processes.
pub struct StubEmbedder;

fn embed_one(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; STUB_DIMS];
    for word in text.to_lowercase().split_whitespace() {
        let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if word.is_empty() {
            continue;
        }
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        let h = hasher.finish();
        v[(h % STUB_DIMS as u64) as usize] += 1.0;
        v[((h >> 32) % STUB_DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-bag-of-words"
    }

    fn dims(&self) -> usize {
        STUB_DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_one(t)).collect())
    }
}

/// Deterministic generator that records every prompt it sees.
pub struct StubGenerator {
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl StubGenerator {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                prompts: prompts.clone(),
            },
            prompts,
        )
    }
}

#[async_trait]
impl Generator for StubGenerator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(format!("stub answer over {} prompt bytes", prompt.len()))
    }
}

/// Config rooted under a temp dir, with chunking wide enough that the
/// small fixture files stay in one chunk each.
pub fn test_config(root: &Path) -> Config {
    Config {
        docs: DocsConfig {
            root: root.join("data"),
        },
        index: IndexConfig {
            dir: root.join("index"),
        },
        chunking: Default::default(),
        retrieval: Default::default(),
        embedding: Default::default(),
        generation: Default::default(),
        logging: corpus_qa::config::LoggingConfig {
            dir: root.join("logs"),
            group_id: "integration-tests".to_string(),
        },
        runtime: Default::default(),
    }
}

pub fn write_doc(root: &Path, name: &str, body: &str) {
    let data = root.join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join(name), body).unwrap();
}

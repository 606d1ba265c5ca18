use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use opnote_core::{OpnoteError, Result};

#[derive(Debug, Clone, Copy)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 64,
            seed: 9973,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions.max(1)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        for token in text.split_whitespace() {
            let bucket = self.bucket_for(token);
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.config.seed);
        token.to_lowercase().hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions()
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    Ollama(OllamaEmbeddingClient),
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    pub fn from_env() -> Result<Self> {
        match env::var("EMBEDDING_PROVIDER")
            .unwrap_or_else(|_| "hash".to_string())
            .to_lowercase()
            .as_str()
        {
            "ollama" => {
                let model = env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "nomic-embed-text".to_string());
                let base_url = env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string());
                let timeout = env::var("EMBEDDING_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Ok(Self {
                    backend: EmbeddingBackend::Ollama(OllamaEmbeddingClient::new(
                        &base_url,
                        &model,
                        Duration::from_secs(timeout),
                    )?),
                })
            }
            _ => {
                let dims = env::var("HASH_EMBED_DIMENSIONS")
                    .ok()
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(64);
                Ok(Self {
                    backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig {
                        dimensions: dims,
                        ..Default::default()
                    })),
                })
            }
        }
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig::default())),
        }
    }

    pub fn ollama(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            backend: EmbeddingBackend::Ollama(OllamaEmbeddingClient::new(
                base_url, model, timeout,
            )?),
        })
    }

    pub fn provider(&self) -> &'static str {
        match &self.backend {
            EmbeddingBackend::Hash(_) => "hash",
            EmbeddingBackend::Ollama(_) => "ollama",
        }
    }

    pub fn model(&self) -> String {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => format!("hash-{}", embedder.dimensions()),
            EmbeddingBackend::Ollama(client) => client.model.clone(),
        }
    }

    pub fn fixed_dimensions(&self) -> Option<usize> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => Some(embedder.dimensions()),
            EmbeddingBackend::Ollama(_) => None,
        }
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => Ok(embedder.embed_text(text)),
            EmbeddingBackend::Ollama(client) => client.embed(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    pub model: String,
}

impl OllamaEmbeddingClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| OpnoteError::Index(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|err| OpnoteError::Index(format!("embedding request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(OpnoteError::Index(format!(
                "embedding request returned status {}",
                response.status()
            )));
        }
        let parsed: OllamaEmbeddingResponse = response
            .json()
            .map_err(|err| OpnoteError::Index(format!("invalid embedding response: {err}")))?;
        if parsed.embedding.is_empty() {
            return Err(OpnoteError::Index("embedding response was empty".to_string()));
        }
        Ok(parsed.embedding)
    }
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

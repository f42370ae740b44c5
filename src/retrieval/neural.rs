//! Neural sentence embeddings through fastembed (ONNX runtime).
//!
//! Model files are downloaded on first use and cached by fastembed.
//! Inference is synchronous; build the index off the async executor.

use fastembed::{TextEmbedding, TextInitOptions};
use std::sync::Mutex;
use tracing::{info, warn};

use super::dense::{normalize, Embedder};
use crate::error::{AppError, AppResult};

/// [`Embedder`] backed by a fastembed text model.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    model_code: String,
    dimensions: usize,
}

impl FastEmbedder {
    /// Load a model by its code, e.g. `BAAI/bge-small-en-v1.5`.
    ///
    /// # Errors
    ///
    /// [`AppError::Config`] when the code is not a supported model or the
    /// model cannot be downloaded or initialized.
    pub fn new(model_code: &str) -> AppResult<Self> {
        let info = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|m| m.model_code.eq_ignore_ascii_case(model_code))
            .ok_or_else(|| AppError::Config {
                message: format!("Unknown embedding model: {}", model_code),
            })?;

        let model = TextEmbedding::try_new(
            TextInitOptions::new(info.model.clone()).with_show_download_progress(false),
        )
        .map_err(|e| AppError::Config {
            message: format!("Failed to load embedding model {}: {}", info.model_code, e),
        })?;

        info!(model = %info.model_code, dimensions = info.dim, "Embedding model loaded");

        Ok(Self {
            model: Mutex::new(model),
            model_code: info.model_code,
            dimensions: info.dim,
        })
    }
}

impl Embedder for FastEmbedder {
    fn name(&self) -> &str {
        &self.model_code
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_batch(&[text.to_string()])
            .pop()
            .unwrap_or_else(|| vec![0.0; self.dimensions])
    }

    /// A failed inference yields zero vectors, which the dense ranker skips.
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }

        let mut model = self
            .model
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match model.embed(texts.to_vec(), None) {
            Ok(mut vectors) => {
                vectors.iter_mut().for_each(|v| normalize(v));
                vectors
            }
            Err(e) => {
                warn!(model = %self.model_code, error = %e, "Embedding failed, dense ranking skipped");
                vec![vec![0.0; self.dimensions]; texts.len()]
            }
        }
    }
}

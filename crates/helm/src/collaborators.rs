//! Opaque collaborator interfaces consumed by the execution layer.
//!
//! The lesson store and file-context provider live outside this engine;
//! these traits are the seam through which callers wire real
//! implementations. The no-op defaults let the engine compose without them.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lesson learned from a past execution, stored with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonRecord {
    pub id: String,
    pub text: String,
    pub error_type: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// Opaque embedding-backed lesson store.
#[async_trait]
pub trait LessonStore: Send + Sync {
    async fn add_lesson(&self, record: LessonRecord) -> anyhow::Result<()>;
    async fn search_similar(&self, embedding: &[f32], k: usize) -> anyhow::Result<Vec<LessonRecord>>;
}

/// Opaque provider of files related to a prompt, used to enrich context.
#[async_trait]
pub trait FileContextProvider: Send + Sync {
    async fn related_files(&self, prompt: &str, k: usize) -> anyhow::Result<Vec<PathBuf>>;
}

/// Store that remembers nothing and finds nothing.
pub struct NoopLessonStore;

#[async_trait]
impl LessonStore for NoopLessonStore {
    async fn add_lesson(&self, _record: LessonRecord) -> anyhow::Result<()> {
        Ok(())
    }

    async fn search_similar(
        &self,
        _embedding: &[f32],
        _k: usize,
    ) -> anyhow::Result<Vec<LessonRecord>> {
        Ok(Vec::new())
    }
}

/// Provider that never suggests related files.
pub struct NoopFileContext;

#[async_trait]
impl FileContextProvider for NoopFileContext {
    async fn related_files(&self, _prompt: &str, _k: usize) -> anyhow::Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

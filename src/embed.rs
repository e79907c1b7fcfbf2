// Embedding-provider boundary. A concrete HTTP-backed provider is out of
// scope for this crate (see the purpose-and-scope notes); only the trait
// and a deterministic fixture provider for tests/doctests live here.

use async_trait::async_trait;

/// External collaborator that turns text into a dense embedding. No
/// concrete network-backed implementation ships in this crate; callers
/// supply their own at `create_collection`/`get_collection` time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// The dimension this provider produces, if fixed and known up front.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// A deterministic, hash-based provider for tests and doctests. Two calls
/// with the same text produce the same vector; it carries no model and
/// makes no network call.
#[derive(Debug, Clone)]
pub struct FixtureEmbeddingProvider {
    dimension: usize,
}

impl FixtureEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for FixtureEmbeddingProvider {
    fn default() -> Self {
        Self::new(8)
    }
}

#[async_trait]
impl EmbeddingProvider for FixtureEmbeddingProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut embedding = vec![0.0f32; self.dimension];
        for (i, slot) in embedding.iter_mut().enumerate() {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let bits = hasher.finish();
            *slot = ((bits % 2000) as f32 / 1000.0) - 1.0;
        }
        Ok(embedding)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

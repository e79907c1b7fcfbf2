// Document entity - an immutable-after-ingest record.
//
// A pure value object: construction validates shape, ingest fills in the
// embedding and normalizes it. Nothing here acquires locks or does I/O.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// A single document: id, metadata, embedding, and content.
///
/// Once stored in a collection the embedding is guaranteed unit-L2-norm
/// within the tolerance of [`crate::vector::is_normalized`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub id: String,
    pub metadata: HashMap<String, String>,
    pub embedding: Vec<f32>,
    pub content: String,
}

impl Document {
    /// Construct a document, validating that `id` is non-empty and that
    /// either `embedding` or `content` carries data. An empty embedding is
    /// filled in by the ingest path via the collection's embed function.
    pub fn new(
        id: impl Into<String>,
        metadata: HashMap<String, String>,
        embedding: Vec<f32>,
        content: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        let content = content.into();

        if id.is_empty() {
            return Err(Error::invalid_argument("document id must not be empty"));
        }
        if embedding.is_empty() && content.is_empty() {
            return Err(Error::invalid_argument(
                "document must have a non-empty embedding or non-empty content",
            ));
        }

        Ok(Self {
            id,
            metadata,
            embedding,
            content,
        })
    }

    /// A deep copy with embedding and metadata cleared, used by
    /// `list_documents_short`.
    pub fn into_short(mut self) -> Self {
        self.embedding = Vec::new();
        self.metadata = HashMap::new();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_id() {
        let err = Document::new("", HashMap::new(), vec![1.0], "hi").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_empty_embedding_and_content() {
        let err = Document::new("1", HashMap::new(), vec![], "").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn accepts_content_only_document() {
        let doc = Document::new("1", HashMap::new(), vec![], "hello").unwrap();
        assert!(doc.embedding.is_empty());
        assert_eq!(doc.content, "hello");
    }

    #[test]
    fn short_form_clears_embedding_and_metadata() {
        let mut meta = HashMap::new();
        meta.insert("foo".to_string(), "bar".to_string());
        let doc = Document::new("1", meta, vec![1.0, 2.0], "hello").unwrap();
        let short = doc.into_short();
        assert!(short.embedding.is_empty());
        assert!(short.metadata.is_empty());
        assert_eq!(short.id, "1");
    }
}

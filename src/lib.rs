//! An embeddable vector database for text documents and their dense
//! embeddings. A [`db::Db`] owns zero or more [`collection::Collection`]s;
//! a collection owns a keyed set of [`document::Document`]s with attached
//! metadata and a fixed-dimensionality embedding, retrieved by exhaustive
//! k-nearest-neighbor cosine similarity, optionally constrained by
//! metadata/content predicates and shaped by a negative query.

pub mod collection;
pub mod db;
pub mod document;
pub mod embed;
pub mod error;
pub mod filter;
pub mod observability;
pub mod persistence;
pub mod ranking;
pub mod validation;
pub mod vector;

pub use collection::{Collection, Negative, NegativeMode, QueryOptions, QueryResult};
pub use db::Db;
pub use document::Document;
pub use embed::{EmbeddingProvider, FixtureEmbeddingProvider};
pub use error::{Error, Result};
pub use filter::WhereDocument;
pub use observability::{init_logging, init_logging_with_level, OperationContext};
pub use ranking::Scored;
pub use validation::{CollectionName, Concurrency, DocumentId, EncryptionKey, ResultCount};

// Validated newtypes at the public API boundary. Plain strings are
// accepted at the edge (`Db::create_collection`, `Collection::get_by_id`,
// ...) and converted through these constructors so that an empty name or
// id is rejected in one place rather than re-checked ad hoc downstream.

use crate::error::{Error, Result};

/// A non-empty collection name, unique within its `Db`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("collection name must not be empty"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-empty document id, unique within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::invalid_argument("document id must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated ingest concurrency level (`add_documents`' `concurrency`
/// parameter): must be at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concurrency(usize);

impl Concurrency {
    pub fn parse(value: usize) -> Result<Self> {
        if value < 1 {
            return Err(Error::invalid_argument("concurrency must be >= 1"));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

/// A validated `k` (`n_results`) for a query: must be positive, and no
/// larger than the number of candidate documents it will be drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultCount(usize);

impl ResultCount {
    pub fn parse(k: usize, available: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::invalid_argument("nResults must be > 0"));
        }
        if k > available {
            return Err(Error::invalid_argument(
                "nResults must be <= the number of documents in the collection",
            ));
        }
        Ok(Self(k))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

/// A validated AES-256-GCM key: empty means "no encryption"; any other
/// length but 32 is rejected.
#[derive(Debug, Clone)]
pub struct EncryptionKey(Option<[u8; 32]>);

impl EncryptionKey {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self(None));
        }
        if bytes.len() != 32 {
            return Err(Error::invalid_argument(format!(
                "encryption key must be exactly 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(bytes);
        Ok(Self(Some(key)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn as_bytes(&self) -> Option<&[u8; 32]> {
        self.0.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_rejects_empty() {
        assert!(CollectionName::parse("").is_err());
        assert!(CollectionName::parse("docs").is_ok());
    }

    #[test]
    fn document_id_rejects_empty() {
        assert!(DocumentId::parse("").is_err());
        assert!(DocumentId::parse("1").is_ok());
    }

    #[test]
    fn concurrency_requires_at_least_one() {
        assert!(Concurrency::parse(0).is_err());
        assert_eq!(Concurrency::parse(4).unwrap().get(), 4);
    }

    #[test]
    fn result_count_rejects_zero_and_overflow() {
        let zero = ResultCount::parse(0, 10).unwrap_err();
        assert_eq!(zero.to_string(), "nResults must be > 0");

        let too_large = ResultCount::parse(5, 2).unwrap_err();
        assert!(too_large
            .to_string()
            .contains("nResults must be <= the number of documents in the collection"));

        assert_eq!(ResultCount::parse(2, 2).unwrap().get(), 2);
    }

    #[test]
    fn encryption_key_requires_exact_length() {
        assert!(EncryptionKey::parse(&[]).unwrap().as_bytes().is_none());
        assert!(EncryptionKey::parse(&[1u8; 16]).is_err());
        assert!(EncryptionKey::parse(&[1u8; 32]).unwrap().is_enabled());
    }
}

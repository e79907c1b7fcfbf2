// On-disk persistence: canonical binary encoding, optional gzip, optional
// AES-256-GCM, and the file-name derivation that turns a collection name
// or document id into a path component.
//
// Encoding chain (encode): object -> bincode -> [flate2 gzip] -> [aes-gcm
// seal]. Decoding reverses it. Every step is independently toggled by
// whether compression/encryption is configured on the owning collection.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use flate2::read::GzDecoder;
use flate2::Compression;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;

use crate::document::Document;
use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;

/// Reserved file stem for a collection's metadata file.
pub const COLLECTION_METADATA_STEM: &str = "00000000";

/// First 4 bytes (8 hex chars) of SHA-256 over `name`, used as a path
/// component for both collection directories and document files.
pub fn file_stem(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    hex::encode(&digest[..4])
}

/// Builds the on-disk file name for a given stem, honoring the
/// compress/encrypt suffixes in effect for the owning collection.
pub fn file_name(stem: &str, compress: bool, encrypted: bool) -> String {
    let mut name = format!("{stem}.bin");
    if compress {
        name.push_str(".gz");
    }
    if encrypted {
        name.push_str(".enc");
    }
    name
}

/// On-disk form of a collection's metadata file (`{name, metadata}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetaFile {
    pub name: String,
    pub metadata: HashMap<String, String>,
}

/// One collection's worth of documents inside a whole-DB snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCollection {
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub documents: Vec<Document>,
}

/// The top-level snapshot envelope written by `Db::export_to_writer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub collections: Vec<SnapshotCollection>,
}

fn gzip_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| Error::PersistFailed(e.into()))?;
    encoder.finish().map_err(|e| Error::PersistFailed(e.into()))
}

fn gzip_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| Error::CorruptStorage("gzip stream is truncated or invalid".to_string()))?;
    Ok(out)
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| Error::PersistFailed(e.into()))?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::PersistFailed(anyhow::anyhow!("encryption failed: {e}")))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn unseal(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(Error::CorruptStorage(
            "encrypted stream is shorter than one nonce".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| Error::PersistFailed(e.into()))?;
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::CorruptStorage("decryption failed: bad key or corrupt data".to_string()))
}

/// Encodes `value` through bincode, then optionally gzip, then optionally
/// AES-256-GCM, in that order.
pub fn encode<T: Serialize>(value: &T, compress: bool, key: Option<&[u8; 32]>) -> Result<Vec<u8>> {
    let mut bytes = bincode::serialize(value).map_err(|e| Error::PersistFailed(e.into()))?;
    if compress {
        bytes = gzip_compress(&bytes)?;
    }
    if let Some(key) = key {
        bytes = seal(key, &bytes)?;
    }
    Ok(bytes)
}

/// Reverses [`encode`]: optionally unseal, then optionally gunzip, then
/// bincode-decode into `T`.
pub fn decode<T: for<'de> Deserialize<'de>>(
    mut bytes: Vec<u8>,
    compressed: bool,
    key: Option<&[u8; 32]>,
) -> Result<T> {
    if let Some(key) = key {
        bytes = unseal(key, &bytes)?;
    }
    if compressed {
        bytes = gzip_decompress(&bytes)?;
    }
    bincode::deserialize(&bytes)
        .map_err(|e| Error::CorruptStorage(format!("failed to decode stored object: {e}")))
}

/// True iff `file_name` ends in `.gz` (possibly before `.enc`).
pub fn is_compressed(file_name: &str) -> bool {
    let stripped = file_name.strip_suffix(".enc").unwrap_or(file_name);
    stripped.ends_with(".gz")
}

/// True iff `file_name` ends in `.enc`.
pub fn is_encrypted(file_name: &str) -> bool {
    file_name.ends_with(".enc")
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decodes a standalone stream (the snapshot envelope) that carries no
/// file-name suffix to read compression from: optionally unseal with
/// `key`, then sniff the gzip magic bytes to decide whether to gunzip,
/// then bincode-decode. Used by `Db::import_from_reader`, whose signature
/// takes no explicit `compress` flag.
pub fn decode_sniffed<T: for<'de> Deserialize<'de>>(mut bytes: Vec<u8>, key: Option<&[u8; 32]>) -> Result<T> {
    if let Some(key) = key {
        bytes = unseal(key, &bytes)?;
    }
    if bytes.starts_with(&GZIP_MAGIC) {
        bytes = gzip_decompress(&bytes)?;
    }
    bincode::deserialize(&bytes)
        .map_err(|e| Error::CorruptStorage(format!("failed to decode stored object: {e}")))
}

// Filter engine - metadata exact-match plus a recursive document-content
// predicate tree, fanned out across a rayon pool for large candidate sets.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::document::Document;
use crate::error::{Error, Result};

/// Recursive content predicate. `And([])` is true, `Or([])` is false; an
/// empty tree (`WhereDocument::And(vec![])` built via [`WhereDocument::all`])
/// matches everything.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum WhereDocument {
    Contains(String),
    NotContains(String),
    And(Vec<WhereDocument>),
    Or(Vec<WhereDocument>),
}

impl Default for WhereDocument {
    fn default() -> Self {
        WhereDocument::all()
    }
}

impl WhereDocument {
    /// The empty predicate: matches every document.
    pub fn all() -> Self {
        WhereDocument::And(Vec::new())
    }

    /// Parses the legacy flat form `{"$contains": "x"}` /
    /// `{"$not_contains": "x"}`. Any other key fails `UnsupportedOperator`
    /// before any document is scanned.
    pub fn from_legacy_map(map: &HashMap<String, String>) -> Result<Self> {
        if map.is_empty() {
            return Ok(Self::all());
        }
        let mut nodes = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "$contains" => nodes.push(WhereDocument::Contains(value.clone())),
                "$not_contains" => nodes.push(WhereDocument::NotContains(value.clone())),
                other => return Err(Error::UnsupportedOperator(other.to_string())),
            }
        }
        Ok(if nodes.len() == 1 {
            nodes.into_iter().next().unwrap()
        } else {
            WhereDocument::And(nodes)
        })
    }

    /// Validates that every operator in the tree is recognized. The tree
    /// type already guarantees this at construction for the typed form;
    /// this exists so the legacy flat form can be validated up front,
    /// before scanning any document, matching §4.C.
    pub fn validate(&self) -> Result<()> {
        match self {
            WhereDocument::Contains(_) | WhereDocument::NotContains(_) => Ok(()),
            WhereDocument::And(children) | WhereDocument::Or(children) => {
                children.iter().try_for_each(WhereDocument::validate)
            }
        }
    }

    fn eval(&self, content: &str) -> bool {
        match self {
            WhereDocument::Contains(needle) => content.contains(needle.as_str()),
            WhereDocument::NotContains(needle) => !content.contains(needle.as_str()),
            WhereDocument::And(children) => children.iter().all(|c| c.eval(content)),
            WhereDocument::Or(children) => children.iter().any(|c| c.eval(content)),
        }
    }
}

fn matches_where(doc: &Document, where_clause: &HashMap<String, String>) -> bool {
    where_clause
        .iter()
        .all(|(k, v)| doc.metadata.get(k).is_some_and(|dv| dv == v))
}

/// Returns references into `docs` for every document matching both
/// `where_clause` (exact metadata match) and `where_document` (content
/// predicate tree). Fans out across rayon when the candidate set is large
/// enough to be worth it; pure over its inputs.
pub fn filter<'a>(
    docs: &'a [Document],
    where_clause: &HashMap<String, String>,
    where_document: &WhereDocument,
) -> Result<Vec<&'a Document>> {
    where_document.validate()?;

    let matches: Vec<&Document> = docs
        .par_iter()
        .filter(|doc| matches_where(doc, where_clause) && where_document.eval(&doc.content))
        .collect();

    Ok(matches)
}

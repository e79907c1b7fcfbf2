// Property tests for the universal invariants: unit-norm embeddings,
// descending/bounded similarity, result-count bounds, filter/predicate
// identities, round-trip persistence, idempotent add, and deep-copy
// isolation.

use std::collections::HashMap;

use proptest::prelude::*;
use tempfile::tempdir;

use vectordb::db::Db;
use vectordb::document::Document;
use vectordb::filter::WhereDocument;
use vectordb::vector;

fn arb_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0f32..10.0f32, dim).filter(|v| v.iter().any(|x| *x != 0.0))
}

proptest! {
    #[test]
    fn stored_embeddings_are_unit_norm(raw in arb_vector(5)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let db = Db::in_memory();
            let collection = db.create_collection("docs", HashMap::new(), None).await.unwrap();
            collection
                .add_document(Document::new("1", HashMap::new(), raw, "ignored").unwrap())
                .await
                .unwrap();
            let stored = collection.get_by_id("1").unwrap();
            prop_assert!(vector::is_normalized(&stored.embedding));
            Ok(())
        })?;
    }

    #[test]
    fn query_results_are_descending_and_bounded(
        vectors in prop::collection::vec(arb_vector(4), 1..8),
        raw_query in arb_vector(4),
        k in 1usize..8,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let db = Db::in_memory();
            let collection = db.create_collection("docs", HashMap::new(), None).await.unwrap();
            for (i, v) in vectors.iter().enumerate() {
                collection
                    .add_document(Document::new(format!("{i}"), HashMap::new(), v.clone(), "x").unwrap())
                    .await
                    .unwrap();
            }
            let n = collection.count();
            let effective_k = k.min(n);
            let results = collection
                .query_embedding(&raw_query, effective_k, &HashMap::new(), &WhereDocument::all())
                .unwrap();

            prop_assert_eq!(results.len(), effective_k.min(n));
            for window in results.windows(2) {
                prop_assert!(window[0].score >= window[1].score - 1e-5);
            }
            for r in &results {
                prop_assert!(r.score >= -1.0 - 1e-4 && r.score <= 1.0 + 1e-4);
            }
            Ok(())
        })?;
    }

    #[test]
    fn empty_predicates_match_every_document(contents in prop::collection::vec("[a-z ]{1,20}", 1..6)) {
        let docs: Vec<Document> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| Document::new(format!("{i}"), HashMap::new(), vec![1.0], c.clone()).unwrap())
            .collect();
        let result = vectordb::filter::filter(&docs, &HashMap::new(), &WhereDocument::all()).unwrap();
        prop_assert_eq!(result.len(), docs.len());
    }

    #[test]
    fn and_of_empty_is_true_or_of_empty_is_false(content in "[a-z ]{1,20}") {
        let docs = vec![Document::new("1", HashMap::new(), vec![1.0], content).unwrap()];
        let and_result = vectordb::filter::filter(&docs, &HashMap::new(), &WhereDocument::And(vec![])).unwrap();
        let or_result = vectordb::filter::filter(&docs, &HashMap::new(), &WhereDocument::Or(vec![])).unwrap();
        prop_assert_eq!(and_result.len(), 1);
        prop_assert_eq!(or_result.len(), 0);
    }

    #[test]
    fn add_document_is_idempotent(raw in arb_vector(4), content in "[a-z ]{1,20}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let db = Db::in_memory();
            let collection = db.create_collection("docs", HashMap::new(), None).await.unwrap();
            let doc = Document::new("1", HashMap::new(), raw.clone(), content.clone()).unwrap();
            collection.add_document(doc.clone()).await.unwrap();
            collection.add_document(doc).await.unwrap();
            prop_assert_eq!(collection.count(), 1);
            let stored = collection.get_by_id("1").unwrap();
            prop_assert_eq!(stored.content, content);
            Ok(())
        })?;
    }

    #[test]
    fn returned_documents_are_deep_copies(raw in arb_vector(4)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let db = Db::in_memory();
            let collection = db.create_collection("docs", HashMap::new(), None).await.unwrap();
            collection
                .add_document(Document::new("1", HashMap::new(), raw, "original").unwrap())
                .await
                .unwrap();

            let mut fetched = collection.get_by_id("1").unwrap();
            fetched.content = "mutated".to_string();
            fetched.embedding.clear();

            let refetched = collection.get_by_id("1").unwrap();
            prop_assert_eq!(refetched.content, "original");
            prop_assert!(!refetched.embedding.is_empty());
            Ok(())
        })?;
    }

    #[test]
    fn export_import_round_trips_arbitrary_documents(
        vectors in prop::collection::vec(arb_vector(4), 1..6),
        compress in prop::bool::ANY,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let source = Db::in_memory();
            let collection = source.create_collection("docs", HashMap::new(), None).await.unwrap();
            for (i, v) in vectors.iter().enumerate() {
                collection
                    .add_document(Document::new(format!("{i}"), HashMap::new(), v.clone(), "x").unwrap())
                    .await
                    .unwrap();
            }

            let mut buffer = Vec::new();
            source.export_to_writer(&mut buffer, compress, &[], None).unwrap();

            let target = Db::in_memory();
            let mut reader = std::io::Cursor::new(buffer);
            target.import_from_reader(&mut reader, &[]).await.unwrap();

            let imported = target.get_collection("docs", None).unwrap();
            let mut original: Vec<Document> = collection.list_documents();
            let mut reimported: Vec<Document> = imported.list_documents();
            original.sort_by(|a, b| a.id.cmp(&b.id));
            reimported.sort_by(|a, b| a.id.cmp(&b.id));
            prop_assert_eq!(original, reimported);
            Ok(())
        })?;
    }
}

#[test]
fn persistence_round_trip_uses_isolated_tempdir() {
    let dir = tempdir().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let db = Db::open(dir.path(), true, &[3u8; 32]).await.unwrap();
        let collection = db.create_collection("docs", HashMap::new(), None).await.unwrap();
        collection
            .add_document(Document::new("1", HashMap::new(), vec![1.0, 2.0, 3.0], "hello").unwrap())
            .await
            .unwrap();
        drop(db);

        let reopened = Db::open(dir.path(), true, &[3u8; 32]).await.unwrap();
        let collection = reopened.get_collection("docs", None).unwrap();
        assert_eq!(collection.count(), 1);
    });
}

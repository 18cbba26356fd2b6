//! Property tests for vector index retrieval.

use std::collections::HashSet;

use proptest::prelude::*;
use steve_rag::{Chunk, EmbeddedChunk, VectorIndex};

const DIM: usize = 16;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-6 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Embedded chunks with distinct identities and distinct texts.
fn arb_entries(max: usize) -> impl Strategy<Value = Vec<EmbeddedChunk>> {
    proptest::collection::vec(("[a-c]", arb_normalized_embedding(DIM)), 1..max).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (source, embedding))| EmbeddedChunk {
                    chunk: Chunk {
                        text: format!("chunk {i}"),
                        source: format!("{source}.md"),
                        sequence_index: i,
                        offset: 0,
                    },
                    embedding,
                })
                .collect()
        },
    )
}

/// Diversified retrieval: bounded size, no repeated chunk, deterministic.
mod prop_query {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn bounded_unique_and_deterministic(
            entries in arb_entries(24),
            query in arb_normalized_embedding(DIM),
            k in 0usize..30,
            diversity in 0.0f32..=1.0f32,
        ) {
            let count = entries.len();
            let index = VectorIndex::build(entries).unwrap();
            prop_assert_eq!(index.len(), count);

            let results = index.query(&query, k, diversity).unwrap();
            prop_assert!(results.len() <= k);
            prop_assert!(results.len() <= index.len());
            prop_assert_eq!(results.len(), k.min(index.len()));

            let texts: HashSet<&str> = results.iter().map(|r| r.text.as_str()).collect();
            prop_assert_eq!(texts.len(), results.len());

            let again = index.query(&query, k, diversity).unwrap();
            prop_assert_eq!(results, again);
        }

        #[test]
        fn first_pick_is_most_relevant(
            entries in arb_entries(24),
            query in arb_normalized_embedding(DIM),
            diversity in 0.0f32..=1.0f32,
        ) {
            let index = VectorIndex::build(entries).unwrap();
            let results = index.query(&query, 3, diversity).unwrap();
            let best = index.search(&query, 1).unwrap();
            prop_assert_eq!(&results[0].text, &best[0].text);
        }

        #[test]
        fn full_relevance_matches_plain_search(
            entries in arb_entries(24),
            query in arb_normalized_embedding(DIM),
            k in 1usize..10,
        ) {
            let index = VectorIndex::build(entries).unwrap();
            let mmr: Vec<String> =
                index.query(&query, k, 1.0).unwrap().into_iter().map(|r| r.text).collect();
            let plain: Vec<String> =
                index.search(&query, k).unwrap().into_iter().map(|r| r.text).collect();
            prop_assert_eq!(mmr, plain);
        }
    }
}

/// Plain search results come back in descending relevance.
mod prop_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_k(
            entries in arb_entries(20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let index = VectorIndex::build(entries).unwrap();
            let results = index.search(&query, k).unwrap();

            prop_assert!(results.len() <= k);
            prop_assert!(results.len() <= index.len());
            for window in results.windows(2) {
                prop_assert!(
                    window[0].relevance >= window[1].relevance,
                    "results not in descending order: {} < {}",
                    window[0].relevance,
                    window[1].relevance,
                );
            }
        }
    }
}

#[test]
fn empty_index_returns_nothing_for_any_query() {
    let index = VectorIndex::empty();
    assert!(index.query(&[1.0, 0.0], 6, 0.25).unwrap().is_empty());
    assert!(index.search(&[0.3; 7], 6).unwrap().is_empty());
}

#[test]
fn wrong_query_dimension_is_rejected() {
    let entry = EmbeddedChunk {
        chunk: Chunk { text: "x".into(), source: "a.md".into(), sequence_index: 0, offset: 0 },
        embedding: vec![1.0, 0.0, 0.0],
    };
    let index = VectorIndex::build(vec![entry]).unwrap();
    assert!(index.query(&[1.0, 0.0], 1, 0.5).is_err());
}

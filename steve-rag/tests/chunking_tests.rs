//! Property tests for recursive chunking.

use proptest::prelude::*;
use steve_rag::{Chunker, Document, RecursiveChunker};

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Markdown-ish text: words, line breaks, paragraph breaks and some multibyte characters.
fn arb_text() -> impl Strategy<Value = String> {
    "[a-zé ]{0,12}(\n{0,2}[a-zé ]{0,40}){0,12}"
}

/// Chunk size and an overlap strictly smaller than it.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|size| (Just(size), 0..size))
}

mod prop_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_cover_the_document_without_dropping_characters(
            text in arb_text(),
            (size, overlap) in arb_sizes(),
        ) {
            let doc = Document::new("docs/adr.md", text.clone());
            let chunks = RecursiveChunker::new(size, overlap).chunk(&doc);

            if text.is_empty() {
                prop_assert!(chunks.is_empty());
                return Ok(());
            }

            let total: usize = chunks.iter().map(|c| char_len(&c.text)).sum();
            prop_assert!(total >= char_len(&text));

            prop_assert_eq!(chunks[0].offset, 0);
            let last = &chunks[chunks.len() - 1];
            prop_assert_eq!(last.offset + last.text.len(), text.len());

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(&text[chunk.offset..chunk.offset + chunk.text.len()], chunk.text.as_str());
                prop_assert_eq!(chunk.sequence_index, i);
                prop_assert_eq!(chunk.source.as_str(), "docs/adr.md");
            }
        }

        #[test]
        fn chunks_respect_size_and_overlap(
            text in arb_text(),
            (size, overlap) in arb_sizes(),
        ) {
            let doc = Document::new("a.md", text.clone());
            let chunks = RecursiveChunker::new(size, overlap).chunk(&doc);

            for chunk in &chunks {
                prop_assert!(char_len(&chunk.text) <= size, "chunk longer than {}: {:?}", size, chunk.text);
            }

            for pair in chunks.windows(2) {
                let prev_end = pair[0].offset + pair[0].text.len();
                let next_start = pair[1].offset;
                prop_assert!(next_start > pair[0].offset, "chunks must advance");
                prop_assert!(next_start <= prev_end, "gap between consecutive chunks");
                let shared = char_len(&text[next_start..prev_end]);
                prop_assert!(shared <= overlap, "overlap {} exceeds {}", shared, overlap);
            }
        }
    }
}

#[test]
fn default_operating_point_chunks_a_long_adr() {
    let paragraph = "We decided to store events in PostgreSQL because the team already operates it. ";
    let text = (0..60).map(|i| format!("{paragraph}{i}\n\n")).collect::<String>();
    let chunks = RecursiveChunker::new(1000, 200).chunk(&Document::new("adr/0001.md", text.clone()));

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| char_len(&c.text) <= 1000));
    assert!(chunks.iter().map(|c| char_len(&c.text)).sum::<usize>() >= char_len(&text));
}

#[test]
fn split_keeps_document_then_chunk_order() {
    let docs = vec![
        Document::new("a.md", "alpha beta gamma delta"),
        Document::new("b.md", "epsilon zeta"),
    ];
    let chunks = RecursiveChunker::new(12, 0).split(&docs);
    let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    let first_b = sources.iter().position(|s| *s == "b.md").unwrap();
    assert!(sources[..first_b].iter().all(|s| *s == "a.md"));
    assert!(sources[first_b..].iter().all(|s| *s == "b.md"));
}

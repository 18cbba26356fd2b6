//! Data types for documents, chunks, retrieval results, and reports.

use serde::{Deserialize, Serialize};

/// A source document loaded from the documentation directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Identifier of the original file, relative to the docs directory.
    pub source: String,
    /// The text content of the document.
    pub text: String,
}

impl Document {
    /// Create a document from a source identifier and its text.
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source: source.into(), text: text.into() }
    }
}

/// A contiguous segment of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// The `source` of the parent [`Document`].
    pub source: String,
    /// Position of this chunk among the chunks of its document.
    pub sequence_index: usize,
    /// Byte offset of the chunk's first character in the parent document.
    pub offset: usize,
}

impl Chunk {
    /// Identifier unique within one index: `{source}#{sequence_index}`.
    pub fn id(&self) -> String {
        format!("{}#{}", self.source, self.sequence_index)
    }
}

/// A [`Chunk`] paired with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    /// The embedded chunk.
    pub chunk: Chunk,
    /// The vector embedding for the chunk's text.
    pub embedding: Vec<f32>,
}

/// One item returned by a [`VectorIndex`](crate::VectorIndex) query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The retrieved chunk text.
    pub text: String,
    /// The `source` of the document the chunk came from.
    pub source: String,
    /// Cosine similarity between the chunk and the query vector.
    pub relevance: f32,
}

/// The final output of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    /// The generated recommendation.
    pub answer: String,
    /// Distinct sources used as context, in first-retrieved order.
    pub sources: Vec<String>,
}

impl Report {
    /// Render the sources section printed after the streamed answer.
    pub fn render_sources(&self) -> String {
        let mut out = String::from("\n## Existing Related Documentation:");
        for source in &self.sources {
            out.push_str(&format!("\n- **{source}**"));
        }
        out
    }

    /// Render the full textual report.
    pub fn render(&self) -> String {
        format!("# Steve:\n{}{}", self.answer, self.render_sources())
    }
}

/// Distinct source identifiers in first-occurrence order.
pub fn distinct_sources<'a>(results: impl IntoIterator<Item = &'a RetrievalResult>) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for result in results {
        if !sources.iter().any(|s| s == &result.source) {
            sources.push(result.source.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: &str) -> RetrievalResult {
        RetrievalResult { text: String::new(), source: source.to_string(), relevance: 0.0 }
    }

    #[test]
    fn distinct_sources_keeps_first_occurrence_order() {
        let results = vec![result("b.md"), result("a.md"), result("b.md"), result("c.md")];
        assert_eq!(distinct_sources(&results), vec!["b.md", "a.md", "c.md"]);
    }

    #[test]
    fn render_lists_sources_as_bullets() {
        let report = Report { answer: "Update ADR-3.".into(), sources: vec!["adr/0003.md".into()] };
        assert_eq!(
            report.render(),
            "# Steve:\nUpdate ADR-3.\n## Existing Related Documentation:\n- **adr/0003.md**"
        );
    }
}

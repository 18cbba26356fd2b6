//! Documentation coverage audit of the decisions made in a diff.
//!
//! The audit asks the model for the "why" questions a diff raises, then checks
//! each question against the indexed documentation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::distinct_sources;
use crate::error::Result;
use crate::generation::{
    CallPolicy, GenerationRequest, TextGenerator, collect_text, generate_with_policy,
};
use crate::index::VectorIndex;
use crate::prompts::{COVERAGE_INSTRUCTION, EXTRACT_QUESTIONS_INSTRUCTION};
use crate::retriever::{Retriever, format_context};

/// How well the documentation answers one decision question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coverage {
    /// The documentation states the answer.
    Explicit,
    /// The answer can be inferred from the documentation.
    Implicit,
    /// Nothing in the documentation answers the question.
    Missing,
}

impl Coverage {
    /// Classify a model reply. Anything unrecognised counts as [`Coverage::Missing`].
    pub fn parse(reply: &str) -> Self {
        Self::from_tag(reply).unwrap_or(Self::Missing)
    }

    /// Read the word after the first `Answers:` tag, ignoring case.
    ///
    /// Returns `None` when the reply carries no tag or an unknown one. Words
    /// elsewhere in the reply are not considered.
    pub fn from_tag(reply: &str) -> Option<Self> {
        let reply = reply.to_ascii_lowercase();
        let (_, rest) = reply.split_once("answers:")?;
        let word: String =
            rest.trim_start().chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        match word.as_str() {
            "explicitly" => Some(Self::Explicit),
            "implicitly" => Some(Self::Implicit),
            "nothing" => Some(Self::Missing),
            _ => None,
        }
    }

    /// Contribution to the audit score.
    pub fn score(self) -> u32 {
        match self {
            Self::Explicit => 100,
            Self::Implicit => 50,
            Self::Missing => 0,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Explicit => "documented",
            Self::Implicit => "partially documented",
            Self::Missing => "undocumented",
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Split a model reply into its `Q:`-prefixed questions.
///
/// Text before the first `Q:` is ignored. A reply without any `Q:` yields no
/// questions.
pub fn parse_questions(reply: &str) -> Vec<String> {
    reply
        .split("Q:")
        .skip(1)
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|q| !q.is_empty())
        .collect()
}

/// The coverage verdict for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// The decision question.
    pub question: String,
    /// Coverage by the documentation.
    pub coverage: Coverage,
    /// Sources consulted, first-retrieved first.
    pub sources: Vec<String>,
}

/// Result of an audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// One finding per extracted question, in extraction order.
    pub findings: Vec<Finding>,
}

impl AuditReport {
    /// Average coverage score in `[0, 100]`. An audit without questions scores 100.
    pub fn score(&self) -> u32 {
        if self.findings.is_empty() {
            return 100;
        }
        let total: u32 = self.findings.iter().map(|f| f.coverage.score()).sum();
        total / self.findings.len() as u32
    }

    /// Render the report as markdown.
    pub fn render(&self) -> String {
        let mut out = String::from("# Steve audit:\n");
        if self.findings.is_empty() {
            out.push_str("No architectural decisions found in the diff.\n");
        }
        for finding in &self.findings {
            out.push_str(&format!("- {} ({})\n", finding.question, finding.coverage));
            for source in &finding.sources {
                out.push_str(&format!("  - **{source}**\n"));
            }
        }
        out.push_str(&format!("## Coverage score: {}\n", self.score()));
        out
    }
}

/// Runs the decision-question audit.
pub struct Auditor {
    generator: Arc<dyn TextGenerator>,
    retriever: Retriever,
    temperature: f32,
    policy: CallPolicy,
}

impl Auditor {
    /// Create an auditor. `retriever` should sit at the research operating point.
    pub fn new(generator: Arc<dyn TextGenerator>, retriever: Retriever) -> Self {
        Self { generator, retriever, temperature: 0.2, policy: CallPolicy::default() }
    }

    /// Set the sampling temperature of both audit steps.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the timeout/retry policy.
    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn ask(&self, request: GenerationRequest) -> Result<String> {
        let request = request.with_temperature(self.temperature);
        let fragments =
            generate_with_policy(self.generator.as_ref(), request, false, self.policy).await?;
        collect_text(fragments).await
    }

    /// Extract the decision questions raised by `diff`.
    ///
    /// # Errors
    ///
    /// Propagates generation failures.
    pub async fn questions(&self, diff: &str) -> Result<Vec<String>> {
        if diff.trim().is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .ask(GenerationRequest::new(EXTRACT_QUESTIONS_INSTRUCTION).with_variable("diff", diff))
            .await?;
        let questions = parse_questions(&reply);
        if questions.is_empty() {
            info!("no decision questions extracted");
        }
        Ok(questions)
    }

    /// Check one question against the documentation.
    ///
    /// # Errors
    ///
    /// Propagates retrieval and generation failures.
    pub async fn assess(&self, index: &VectorIndex, question: &str) -> Result<Finding> {
        let context = self.retriever.retrieve(index, question).await?;
        let reply = self
            .ask(
                GenerationRequest::new(COVERAGE_INSTRUCTION)
                    .with_variable("question", question)
                    .with_variable("context", format_context(&context)),
            )
            .await?;

        let coverage = Coverage::from_tag(&reply).unwrap_or_else(|| {
            warn!(reply = %reply.trim(), "unrecognised coverage reply");
            Coverage::Missing
        });
        Ok(Finding { question: question.to_string(), coverage, sources: distinct_sources(&context) })
    }

    /// Extract questions from `diff` and assess each in order.
    ///
    /// # Errors
    ///
    /// Fails on the first retrieval or generation failure.
    pub async fn audit(&self, index: &VectorIndex, diff: &str) -> Result<AuditReport> {
        let questions = self.questions(diff).await?;
        let mut findings = Vec::with_capacity(questions.len());
        for question in &questions {
            findings.push(self.assess(index, question).await?);
        }
        let report = AuditReport { findings };
        info!(question_count = questions.len(), score = report.score(), "audit completed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn questions_ignore_preamble_and_whitespace() {
        let reply = "Here are the questions:\nQ: Why PostgreSQL\n over MySQL?\nQ:   \nQ: Why Kafka?";
        assert_eq!(parse_questions(reply), vec!["Why PostgreSQL over MySQL?", "Why Kafka?"]);
        assert!(parse_questions("The change is trivial.").is_empty());
    }

    #[test]
    fn coverage_reply_classification() {
        assert_eq!(Coverage::parse("Answers:Explicitly"), Coverage::Explicit);
        assert_eq!(Coverage::parse(" answers:implicitly."), Coverage::Implicit);
        assert_eq!(Coverage::parse("Answers:Nothing"), Coverage::Missing);
        assert_eq!(Coverage::parse("maybe?"), Coverage::Missing);
        assert_eq!(Coverage::parse("Answers: Explicitly, see ADR-7"), Coverage::Explicit);
    }

    #[test]
    fn coverage_reads_only_the_tag() {
        let reply = "Answers:Nothing - the context does not explicitly answer this question.";
        assert_eq!(Coverage::parse(reply), Coverage::Missing);
        assert_eq!(Coverage::from_tag(reply), Some(Coverage::Missing));
        assert_eq!(
            Coverage::parse("Answers:Implicitly, nothing states it explicitly"),
            Coverage::Implicit
        );
        assert_eq!(Coverage::from_tag("It is explicitly documented."), None);
        assert_eq!(Coverage::parse("It is explicitly documented."), Coverage::Missing);
    }

    #[test]
    fn score_averages_findings() {
        let finding = |coverage| Finding { question: "q".into(), coverage, sources: vec![] };
        assert_eq!(AuditReport::default().score(), 100);
        let report = AuditReport {
            findings: vec![finding(Coverage::Explicit), finding(Coverage::Implicit)],
        };
        assert_eq!(report.score(), 75);
        assert!(report.render().ends_with("## Coverage score: 75\n"));
    }
}

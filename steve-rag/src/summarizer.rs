//! Stage 1: condense a diff into a short description of its decisions.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::Result;
use crate::generation::{
    CallPolicy, GenerationRequest, TextGenerator, collect_text, generate_with_policy,
};
use crate::prompts::{NO_CHANGES_SUMMARY, SUMMARIZE_INSTRUCTION};

/// Extracts architectural-decision signals from a diff with one generation call.
///
/// No retrieved context is involved. Output varies between runs unless the
/// backend is deterministic at the configured temperature.
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    instruction: String,
    temperature: f32,
    policy: CallPolicy,
}

impl Summarizer {
    /// Create a summarizer with the default instruction and temperature 0.2.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            instruction: SUMMARIZE_INSTRUCTION.to_string(),
            temperature: 0.2,
            policy: CallPolicy::default(),
        }
    }

    /// Replace the default instruction. It should contain a `{diff}` placeholder.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the timeout/retry policy.
    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Summarize `diff` with the configured instruction.
    ///
    /// # Errors
    ///
    /// Propagates generation failures and timeouts.
    pub async fn summarize(&self, diff: &str) -> Result<String> {
        self.summarize_with(diff, &self.instruction).await
    }

    /// Summarize `diff` with an explicit instruction.
    ///
    /// A blank diff is answered without calling the generator.
    ///
    /// # Errors
    ///
    /// Propagates generation failures and timeouts.
    pub async fn summarize_with(&self, diff: &str, instruction: &str) -> Result<String> {
        if diff.trim().is_empty() {
            info!("diff is blank, no decisions to summarize");
            return Ok(NO_CHANGES_SUMMARY.to_string());
        }

        let request = GenerationRequest::new(instruction)
            .with_variable("diff", diff)
            .with_temperature(self.temperature);

        let fragments =
            generate_with_policy(self.generator.as_ref(), request, false, self.policy).await?;
        let summary = collect_text(fragments)
            .await
            .inspect_err(|e| error!(error = %e, "summary generation failed"))?;

        let summary = summary.trim().to_string();
        info!(diff_len = diff.len(), summary_len = summary.len(), "summarized diff");
        Ok(summary)
    }
}

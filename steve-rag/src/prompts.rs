//! Default instructions for each generation step.
//!
//! Placeholders in braces are filled by [`GenerationRequest::render`](crate::GenerationRequest::render).

/// Stage 1: extract decision signals from a diff. Placeholder: `{diff}`.
pub const SUMMARIZE_INSTRUCTION: &str = "We document architectural decisions using ADRs. \
Your job is to extract architectural decisions from the result of a git diff. \
List accurately the areas in which the engineer has made a decision that may have trade-offs. \
Keep the response very concise. \
Suggest semantically similar topics to search for in documentation.

User: {diff}

Assistant:";

/// Stage 2: decide whether an ADR is warranted. Placeholders: `{question}`, `{context}`.
pub const RECOMMEND_INSTRUCTION: &str = "You have been provided the description of a change, \
and the git diff an engineer has requested to be merged. Do we have existing documentation for this? \
We create ADRs for technical decisions; is one required for this change?
Consider the time efficiency when suggesting to write an ADR. Only suggest writing an ADR if the change \
is significant and spending time documenting is worth it. If an existing ADR can just be updated suggest that instead. \
If the diff already contains an ADR, review it for gaps instead of proposing a new one.
If it is worth creating an ADR suggest some positive and negative consequences of the decision and trade-offs.
Keep it concise so it is a quick read.
Change: {question}

Context: {context}

Answer:";

/// Librarian explanation for `steve search`. Placeholders: `{question}`, `{context}`.
pub const SEARCH_INSTRUCTION: &str = "You are an architectural decision records librarian. \
You have been given the context of the related documentation. \
Explain it to the user concisely and clearly, and make it relevant to the question asked. \
Feel free to add examples or additional context, but do not stray from the source of truth provided.
Question: {question}

Context: {context}

Answer:";

/// Audit step 1: decision questions from a diff. Placeholder: `{diff}`.
pub const EXTRACT_QUESTIONS_INSTRUCTION: &str = "Extract high-level, not code-specific, \
architectural questions from the given git diff. Your only job is to generate a list of questions, \
prefixing each with 'Q:', asking why these decisions were made. If the change is trivial ignore it; \
it is ok to return no questions. For example: Q: Why was library X chosen to solve this problem over library Y?

{diff}";

/// Audit step 2: documentation coverage of one question. Placeholders: `{question}`, `{context}`.
pub const COVERAGE_INSTRUCTION: &str = "Does the attached context answer the provided question? \
Respond with exactly one of the following options only: \
'Answers:Explicitly', 'Answers:Implicitly' or 'Answers:Nothing'.
Question: {question}

Context: {context}";

/// Description used when the diff contains no changes.
pub const NO_CHANGES_SUMMARY: &str =
    "No architectural decision detected: the diff contains no code changes.";

/// Recommendation used when the diff contains no changes.
pub const NO_CHANGES_ANSWER: &str =
    "The diff contains no code changes, so there is no decision to record and no ADR is needed.";

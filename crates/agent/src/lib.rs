//! Message orchestration for Cleaners.
//!
//! - [`MessageOrchestrator`] — session memory, retrieval, model call, and
//!   recommendation for one user message
//! - [`RecommendationEvaluator`] — keyword policy and shop lookup
//! - [`PromptBuilder`] — persona and context assembly

pub mod orchestrator;
pub mod prompt;
pub mod recommend;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use orchestrator::{ChatOutcome, ChatRequest, MessageOrchestrator, RecommendationResult, RequestState};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, PromptBuilder};
pub use recommend::{KeywordRules, RecommendationEvaluator, RecommendationReason};

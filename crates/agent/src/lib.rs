//! Report Pipeline - LLM-driven gathering, drafting, and validation
//!
//! This crate provides the "brain" of the routewatch system - the stages that
//! turn a stored company profile into a validated compliance report:
//! - Plans search queries and gathers web evidence (`gatherer`)
//! - Composes report drafts from profile + evidence (`drafter`)
//! - Reviews drafts and produces verdicts (`validator`)
//! - Drives the generate/validate loop and the commit phase (`pipeline`)
//! - Answers follow-up questions about a finished report (`chat`)
//!
//! # Architecture
//!
//! The pipeline follows a bounded loop:
//! 1. **Gathering** (`gatherer`) - Plan queries, fan out searches, dedup
//! 2. **Generating** (`drafter`) - Compose a draft, threading prior feedback
//! 3. **Validating** (`validator`) - Score the draft; reject buys a redo
//! 4. **Commit** (`pipeline`) - Persist, index, render the outcome
//!
//! # Key Types
//!
//! - `PipelineController` - Main orchestrator (see `pipeline` module)
//! - `LlmClient` - Pluggable completion trait; `AnthropicClient` for live
//!   runs, `ScriptedLlm` for deterministic ones
//! - `EvidenceSource` - Gathering seam the controller runs against
//!
//! # Degradation Principle
//!
//! The LLM is treated as an unreliable collaborator. Malformed output never
//! aborts a run: drafts fall back to a skeleton, verdicts fall back to a
//! pass, and only transport-level failures in gathering or drafting can
//! fail a run outright.

pub mod anthropic;
pub mod chat;
pub mod drafter;
pub mod gatherer;
pub mod llm;
pub mod pipeline;
pub mod validator;

pub use anthropic::AnthropicClient;
pub use chat::{ChatError, ChatService, CHAT_FALLBACK_ANSWER};
pub use drafter::ReportDrafter;
pub use gatherer::{EvidenceGatherer, EvidenceSource, GatherOutcome, GathererSettings};
pub use llm::{LlmClient, LlmRequest, ScriptedLlm};
pub use pipeline::{ArtifactRenderer, PipelineController};
pub use validator::ReportValidator;

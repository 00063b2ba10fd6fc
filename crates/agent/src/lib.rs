//! The orchestration kernel of Outreach.
//!
//! For each user request two pipelines run side by side:
//!
//! 1. **Reasoning** (`mcp`): a bounded REASON → ACT loop in which the model
//!    may call external business-data tools before writing its draft. A
//!    collector turns the loop's progress into an intermediate-step log and
//!    extracts contacts, subject and body from the final answer.
//! 2. **Single-shot** (`standard`): one model call with no tools, used as
//!    a baseline draft.
//!
//! The [`Dispatcher`] starts both for every inbound message and keeps them
//! independent; all events go out through an [`OutboundSink`].
//!
//! [`OutboundSink`]: outreach_core::OutboundSink

pub mod collector;
pub mod dispatcher;
pub mod extract;
pub mod prompts;
pub mod reasoning;
pub mod single_shot;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use collector::{StepCollector, run_reasoning};
pub use dispatcher::{Dispatch, Dispatcher, Pipelines};
pub use extract::{extract, sourced_facts};
pub use reasoning::{Phase, ReasoningLoop, RunOutcome};
pub use single_shot::SingleShotPipeline;

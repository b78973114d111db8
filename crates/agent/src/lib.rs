//! Agent runtime - intent classification and per-turn orchestration
//!
//! This crate is the "brain" of the concierge system:
//! - Classifies raw user text into a closed intent set (`classifier`)
//! - Answers knowledge questions from the static corpus (`resolver`)
//! - Runs account/subscription/reservation operations (`ops`)
//! - Hands conversations to humans when automation runs out (`escalation`)
//! - Drives the received → classified → dispatched → responded → persisted
//!   turn workflow (`runtime`)
//!
//! # Failure policy
//!
//! The LLM is never trusted to be available or well-formed. A failed or
//! unparseable classification falls back to the unknown intent; a failed
//! answer composition falls back to the retrieved article body; a failed
//! action selection falls back to intent-derived defaults. Handler failures
//! are converted into escalations, and an unreachable ticket store degrades
//! to a fixed apology. No turn ever surfaces an error to the user.

pub mod classifier;
pub mod escalation;
pub mod llm;
pub mod ops;
pub mod resolver;
pub mod runtime;

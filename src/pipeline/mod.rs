//! Email processing stages.
//!
//! Each inbound email flows through:
//! 1. `enrich_sender()` — directory lookup, default context on miss
//! 2. `Classifier::classify()` — rules fast path, then LLM verdict
//! 3. `SchedulingResolver::resolve()` — meeting requests only
//! 4. `Drafter::draft()` — LLM reply with resolved slots attached
//! 5. Approval gate — human decision, deadline-bounded
//! 6. `Dispatcher::dispatch()` — single send attempt
//!
//! **Nothing is sent without an explicit approval.** Sequencing lives in
//! [`crate::workflow`].

pub mod approval;
pub mod classifier;
pub mod dispatch;
pub mod drafter;
pub mod enrich;
pub mod rules;
pub mod scheduling;
pub mod types;

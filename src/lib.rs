//! Inbox Agent — email triage and reply workflow with a human approval gate.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod services;
pub mod workflow;

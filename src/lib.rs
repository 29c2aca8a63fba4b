//! Purpose: Library crate behind the `aerostep` CLI and embedding orchestrators.
//! Exports: `api` (stable surface) and `core` (record model, connections, backends).
//! Role: Lets a workflow orchestrator read, write and poll cluster records as steps.
//! Invariants: Each step invocation owns one connection and releases it before returning.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;

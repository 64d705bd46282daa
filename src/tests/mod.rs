//! Consolidated test modules.
//!
//! End-to-end engine tests against a mock forge API, a stub repository
//! source and in-memory object storage.

mod engine_e2e;

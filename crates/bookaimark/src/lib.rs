//! # BookAIMark Data Layer
//!
//! BookAIMark is a bookmark manager. This crate is its **HTTP-agnostic data
//! layer**: everything the web routes need to persist and protect data, with
//! no knowledge of requests, responses or status codes. The `bookaimark-server`
//! crate puts axum on top of it.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs)                                         │
//! │  - Thin facade over commands and the settings store         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/*.rs)                              │
//! │  - Validation and business rules per entity                 │
//! │  - Typed errors: Validation, NotFound, Conflict             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │  Storage (store/)            │  Settings (settings/)        │
//! │  - FileStorage<T> arrays     │  - Tri-store: remote table,  │
//! │  - FsBackend / MemBackend    │    content repo, local file, │
//! │                              │    in-process mirror         │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Beside the layers sit two request guards the server holds in its state:
//! [`ratelimit::RateLimiter`] and [`cache::ResponseCache`].
//!
//! ## Key Principle: No HTTP in Core
//!
//! Code in this crate:
//! - Takes and returns plain Rust types
//! - **Never** builds HTTP responses or picks status codes
//! - **Never** prints or exits the process
//! - Logs through `tracing` and leaves subscriber setup to the binary
//!
//! ## Testing Strategy
//!
//! 1. **Commands**: thorough unit tests against `MemBackend`.
//! 2. **Storage**: filesystem behavior against temp directories.
//! 3. **Settings**: fan-out and fallback with test-double backends; the HTTP
//!    backends against local mock servers (`tests/`).
//!
//! ## Module Overview
//!
//! - [`api`]: the facade, entry point for all data operations
//! - [`commands`]: business logic per entity
//! - [`store`]: document backends and the typed array store
//! - [`settings`]: multi-backend settings persistence
//! - [`ratelimit`]: per-key request limiting
//! - [`cache`]: response cache with tag invalidation
//! - [`model`]: records and their file names
//! - [`config`]: layered configuration
//! - [`error`]: error types

pub mod api;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod ratelimit;
pub mod settings;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

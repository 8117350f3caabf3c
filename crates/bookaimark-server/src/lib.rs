//! # BookAIMark HTTP Server
//!
//! The HTTP front end over the `bookaimark` library. Everything that knows about
//! requests, headers, status codes and JSON envelopes lives here; the library
//! underneath only deals in records, reports and `BookmarkError`s.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Router (routes/)                                             │
//! │  TraceLayer → CatchPanicLayer → rate_limit → cache → handler  │
//! └───────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Per-request helpers                                          │
//! │  - auth.rs: bearer session or dev fallback → user id          │
//! │  - response.rs: success/error envelopes, error mapping        │
//! └───────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  AppState (state.rs)                                          │
//! │  BookmarkApi, sessions, read/write limiters, response cache   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! `/api/health` sits outside the rate limiter and the cache.
//!
//! ## Testing
//!
//! `tests/api_integration.rs` builds an [`AppState`](state::AppState) over a
//! temporary data directory and drives [`create_router`] with
//! `tower::ServiceExt::oneshot`, so no socket is opened.

pub mod auth;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;

pub use routes::create_router;

//! spacechat is a space-scoped chat client for multiple LLM providers that
//! talks to a local inference backend.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the spaces store, provider settings, and the chat
//!   dispatcher that streams replies and uploads files.
//! - [`api`] defines the backend wire payloads and the [`api::Backend`] seam
//!   with its HTTP implementation.
//! - [`cli`] parses arguments and runs the line-oriented chat session.
//! - [`utils`] holds small shared helpers (logging setup, URL handling,
//!   incremental UTF-8 decoding).
//!
//! The binary in `src/main.rs` routes through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;

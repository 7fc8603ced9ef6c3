//! Arcdesk is a local-first chat client that streams replies from locally
//! hosted language-model servers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversation state, the streaming pipeline (decoder,
//!   throttle, relay), the provider backends with their mock fallback, and
//!   configuration.
//! - [`api`] defines the request and response payloads of each backend.
//! - [`cli`] parses arguments and runs the line-oriented chat, `say` and
//!   `agents` commands.
//! - [`utils`] holds URL construction and the transcript log.
//!
//! The binary (`src/main.rs`) routes straight into [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;

//! Vox: an agent sidecar speaking newline-delimited JSON.
//!
//! A host process writes commands (`send`, `respond_permission`,
//! `set_permission_mode`, `interrupt`) to the sidecar's stdin and reads
//! events back from its stdout. The sidecar runs one agent turn at a time,
//! parks tool calls on the host's approval, and reports every turn with
//! exactly one terminal event. [`timeline`] is the host-side reconciler that
//! folds those events into a conversation.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::io::BufReader;
//! use vox::engine::EchoEngine;
//! use vox::sidecar::{serve, SidecarOptions};
//!
//! # async fn example() {
//! let stdin = BufReader::new(tokio::io::stdin());
//! serve(stdin, tokio::io::stdout(), SidecarOptions::default(), Arc::new(EchoEngine))
//!     .await
//!     .unwrap();
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod sdk;
pub mod sidecar;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod timeline;
pub mod transport;

//! Forgelink tool server: framed request dispatch for forge tools over a
//! single bidirectional byte stream.
//!
//! Data flow: bytes -> [`transport::FrameReader`] -> [`dispatch::Dispatcher`]
//! (envelope parse, registry lookup, admission) -> handler (which reaches
//! the repo-context resolver, auth validator, and remote API through its
//! [`context::ExecutionContext`]) -> one correlated response ->
//! [`transport::FrameWriter`] -> bytes.

pub mod client;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod registry;
pub mod tools;
pub mod transport;

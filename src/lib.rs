//! Quillpost: a blogging backend with account-scoped editing.
//!
//! The server half (`api`, `credentials`, `crypto`, `db`) issues and checks
//! stateless bearer tokens; the `client` half keeps a persisted session and
//! attaches it to outgoing requests. [`authz::can_mutate`] is shared by both.

pub mod api;
pub mod authz;
pub mod client;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod error;

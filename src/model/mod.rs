//! Data types, split by where they live.
//!
//! - [`api`]: what crosses the HTTP boundary.
//! - [`common`]: shared enums and value types.
//! - [`db`]: documents as stored.
//! - [`mongodb`]: collection plumbing.

pub mod api;
pub mod common;
pub mod db;
pub mod mongodb;

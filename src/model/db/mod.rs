//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//!
//! Each record comes in two flavours: a `*Core` without an ID (aliased as
//! `New*` for insertion), and a wrapper carrying the `_id` the database assigned.

pub mod admin;
pub mod alumnus;
pub mod ballot;
pub mod candidate;
pub mod election;
pub mod otp;

//! Digest utilities: hex encoding, SHA-1 object identity, and fan-out tables.
//!
//! This crate provides the core [`ObjectId`] type, incremental hashing via
//! [`hasher::Hasher`], hex encoding/decoding, and the fan-out table used by
//! pack index bisection.

mod error;
pub mod hex;
mod oid;
pub mod hasher;
pub mod collections;
pub mod fanout;

pub use error::HashError;
pub use oid::{parse_partial_hex, ObjectId};

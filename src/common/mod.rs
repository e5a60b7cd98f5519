//! Shared low-level helpers.

pub mod binary;

//! Public API for guardheap.
//!
//! This module contains all user-facing types and functions.
//! Most users should only interact with types from this module.

pub mod config;
pub mod heap;
pub mod stats;

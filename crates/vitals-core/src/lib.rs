//! Core types and trait definitions for the vitals time-series store.
//!
//! This crate is free of parser and database dependencies. All other crates
//! depend on it.

// Native `async fn` in traits; the returned futures carry explicit `Send`
// bounds in the trait signatures.
#![allow(async_fn_in_trait)]

pub mod canonical;
pub mod error;
pub mod normalize;
pub mod record;
pub mod sleep;
pub mod store;

pub use error::{Error, Result};

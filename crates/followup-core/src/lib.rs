//! Core types, reconciliation rules and trait definitions for the person
//! follow-up status aggregate.
//!
//! This crate is free of HTTP and database dependencies. Storage backends
//! implement [`store::AggregateStore`]; the worker binary wires event sources
//! and lookups to the ingestion pipeline in [`ingest`].

pub mod error;
pub mod ident;
pub mod identity;
pub mod ingest;
pub mod rules;
pub mod source;
pub mod status;
pub mod store;

pub use error::{Error, Result};

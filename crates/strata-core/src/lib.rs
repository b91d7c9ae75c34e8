//! Strata core: event-sourced aggregate abstractions.
//!
//! This crate defines events, aggregates and their replay engine, the
//! event codec, the storage traits and the repository façade that
//! application services use. It contains no infrastructure code; storage
//! engines live in `strata-event-store`.

pub mod aggregate;
pub mod aggregate_repository;
pub mod clock;
pub mod codec;
pub mod command;
pub mod error;
pub mod event;
pub mod publisher;
pub mod repository;
pub mod snapshot;

//! Strata reference domain: people.
//!
//! A person is created with a name, may be renamed any number of times,
//! may undo the latest rename, and is eventually finalized, after which
//! the name is frozen. Exercises every part of the core: codec
//! registration, raise/apply, replay, snapshots, and the repository.

pub mod application;
pub mod domain;

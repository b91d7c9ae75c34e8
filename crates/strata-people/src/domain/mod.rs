//! Domain model for people: events, state, behaviours, commands.

pub mod aggregates;
pub mod commands;
pub mod events;

//! Domain events emitted by the stockroom aggregates.

pub mod event;

pub use event::Event;

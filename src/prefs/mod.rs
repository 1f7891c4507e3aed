//! Preference model and the sans-IO synchronization state machines.

pub mod binding;
pub mod controller;
pub mod draft;
pub mod gate;
pub mod hydration;
pub mod merge;
pub mod types;

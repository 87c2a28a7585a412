//! Per-queue scheduler -- admission loop and queue surgery.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, limits and introspection
//! - `execution`: admission loop, attempt launch and settlement routing
//! - `control`: enqueue, pause, resume, cancel, abort and re-prioritization

mod control;
mod core;
mod execution;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;

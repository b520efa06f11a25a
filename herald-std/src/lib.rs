//! # herald-std
//!
//! Standard implementations for the Herald in-process mediator.
//!
//! This crate provides:
//! - **Handler registry**: [`registry::Registry`], a runtime-modifiable
//!   [`HandlerRegistry`](herald_core::HandlerRegistry) with shared and
//!   per-scope handlers
//! - **Standard behaviors**: Logging, Timeout
//! - **Testing utilities**: recording and failing test doubles

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use herald_core;

// Modules
pub mod behaviors;
pub mod registry;
pub mod testing;

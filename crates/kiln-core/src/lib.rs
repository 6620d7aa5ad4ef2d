//! # kiln-core
//!
//! Foundation types for the kiln plugin container.
//!
//! This crate knows nothing about plugins.  It provides:
//! - [`Token`]: typed identity keys for services
//! - [`DependencyGraph`]: cycle detection and teardown ordering over
//!   `(dependent, provider)` edges
//! - [`CommandRegistry`]: named actions routed by the host application

pub mod command;
pub mod error;
pub mod graph;
pub mod token;

pub use command::{CommandHandler, CommandRegistry, FnHandler, handler_fn};
pub use error::{BoxError, CommandError, CommandResult, SharedError, share_error};
pub use graph::{CycleError, DependencyGraph};
pub use token::{AnyToken, ServiceArc, Token, TokenId};

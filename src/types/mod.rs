//! Core data types.

pub mod action;
pub mod execution;
pub mod message;
pub mod question;
pub mod task;
pub mod usage;

pub use action::*;
pub use execution::*;
pub use message::*;
pub use question::*;
pub use task::*;
pub use usage::*;

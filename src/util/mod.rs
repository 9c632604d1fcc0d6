//! Utility modules: timeouts and output clipping.

pub mod text;
pub mod timeout;

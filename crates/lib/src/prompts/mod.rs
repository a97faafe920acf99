//! # Prompt Templates
//!
//! Instructions sent to recognition backends, grouped by purpose.

pub mod vision;

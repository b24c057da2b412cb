//! # desterra-core
//!
//! Core types, traits, configuration, and error handling for the Desterra bot.

pub mod config;
pub mod error;
pub mod media;
pub mod message;
pub mod traits;
pub mod worker;

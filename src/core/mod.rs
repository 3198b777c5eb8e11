//! Core domain models for Pipeline
//!
//! This module defines the fundamental data structures that represent
//! pipelines, steps, triggers, toolchains and their run state.

pub mod config;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod toolchain;
pub mod trigger;

pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use toolchain::{ToolchainSelection, ToolchainState, TOOLCHAIN_ENV};
pub use trigger::{TriggerConfig, TriggerEvent};

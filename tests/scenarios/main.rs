//! Scenario-based tests for ci-runner

mod helpers;

mod failure_handling;
mod services;
mod success_chain;
mod toolchain_switching;
mod triggers;

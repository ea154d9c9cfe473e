//! Dailycast library - daily weather and prediction deliveries
//!
//! This module exports internal components for integration testing.

pub mod cli;
pub mod commands;
pub mod config;
pub mod pipeline;
pub mod predict;
pub mod registry;
pub mod scheduler;
pub mod timezone;
pub mod transport;
pub mod weather;

//! Dashframe - Dashcam recording inspection tool
//!
//! This library crate exposes the configuration and report layers for
//! integration testing.

pub mod config;
pub mod report;

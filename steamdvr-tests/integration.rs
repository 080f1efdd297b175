//! Integration tests for SteamDVR
//!
//! These tests exercise the full pipeline from clip discovery through the
//! export scheduler, with the FFmpeg subprocess replaced by its simulation
//! so the tests stay deterministic and hermetic.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/export_pipeline.rs"]
mod export_pipeline;

#[path = "integration/scheduler_control.rs"]
mod scheduler_control;

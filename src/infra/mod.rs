//! Infrastructure scaffolding: telemetry installation.

pub mod telemetry;

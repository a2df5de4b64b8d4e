//! Headless runner for the softrig simulation core: built-in scenarios,
//! vehicle files, replay recording and JSON run reports.

pub mod error;
pub mod platform;
pub mod recorder;
pub mod report;
pub mod runner;
pub mod scenarios;

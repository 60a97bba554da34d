//! pixelgrade-core — Scoring engine, queue worker, and data model.
//!
//! This crate grades an HTML/CSS/JS submission against a reference solution
//! with three stages (structural content, semantic roles, visual diff) and
//! drives queued submissions through them with a bounded worker.

pub mod content;
pub mod diff;
pub mod dom;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod results;
pub mod semantic;
pub mod similarity;
pub mod traits;
pub mod worker;

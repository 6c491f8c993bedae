// THEORY:
// This file is the main entry point for the `filatrack` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the
// public API that will be exposed to external consumers (like the CLI binary).
//
// The primary goal is to export the `EnrichmentPipeline` and its associated
// data structures (`EnrichmentConfig`, `EnrichmentOutput`, etc.) as the clean,
// high-level interface for the whole quantification engine. The internal
// modules (`core_modules`) hold the individual analysis layers: geometry,
// intensity sampling, region tracking, track aggregation and report building.

pub mod core_modules;
pub mod pipeline;

pub mod aggregator;
pub mod config;
pub mod error;
pub mod geometry;
pub mod intensity;
pub mod region;
pub mod report;
pub mod stack;
pub mod tracker;

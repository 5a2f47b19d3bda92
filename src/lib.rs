//! Card financial-health scoring and recommendations.
//!
//! Scores are computed from a handful of card signals, cached with a
//! staleness window, aggregated across a user's cards, and paired with
//! merged rule-based and advisory recommendations.

pub mod advisory;
pub mod cards;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod monitoring;
pub mod queries;
pub mod recommend;
pub mod scoring;

pub mod engine;
pub mod merge;
pub mod models;
pub mod rules;

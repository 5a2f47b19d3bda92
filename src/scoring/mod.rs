pub mod aggregate;
pub mod calculator;
pub mod models;
pub mod service;
pub mod signals;
pub mod staleness;

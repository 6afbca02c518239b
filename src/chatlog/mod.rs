pub mod audit;
pub mod cache;
pub mod config;
pub mod dedupe;
pub mod engine;
pub mod fingerprint;
pub mod message;
pub mod paths;
pub mod sanitize;
pub mod state;
pub mod util;

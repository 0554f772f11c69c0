pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod sources;
pub mod store;
pub mod throttle;

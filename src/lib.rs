pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod eutils;
pub mod output;
pub mod progress;
pub mod resolver;
pub mod store;
pub mod summarize;

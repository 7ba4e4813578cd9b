pub mod bot;
pub mod browser;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feed;
pub mod suno;

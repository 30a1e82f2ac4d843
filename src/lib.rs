pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod global;
pub mod mail;
pub mod normalizer;
pub mod store;
pub mod summary;
pub mod transcode;
pub mod transcription;

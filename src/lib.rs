pub mod backend;
pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod server;
pub mod ui;

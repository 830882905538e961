pub mod aggregate;
pub mod auth;
pub mod collector;
pub mod config;
pub mod formatter;
pub mod models;
pub mod process;
pub mod providers;
pub mod state;
pub mod upload;

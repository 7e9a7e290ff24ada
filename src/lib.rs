pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod provider;
pub mod queue;
pub mod server;
pub mod worker;

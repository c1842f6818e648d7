pub mod config;
pub mod poller;
pub mod tracker;

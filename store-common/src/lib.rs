pub mod api;
pub mod event;
pub mod metrics;
pub mod models;
pub mod sink;
pub mod warehouse;

pub mod chart;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod generator;
pub mod handler;
pub mod logging;
pub mod model;
pub mod notify;
pub mod price;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod tail;
pub mod testkit;
pub mod tick;

pub mod assemble;
pub mod cache;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod domain;
pub mod error;
pub mod invoke;
pub mod output;
pub mod planner;
pub mod table;
pub mod transport;

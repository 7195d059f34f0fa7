pub mod analytics;
pub mod chain;
pub mod clients;
pub mod config;
pub mod contracts;
pub mod db;
pub mod error;
pub mod escrow;
pub mod eth;
pub mod export;
pub mod model;
pub mod runtime;
pub mod search;
pub mod server;
pub mod service;
pub mod setup;
pub mod totals;
pub mod transaction;
pub mod utils;
pub mod validation;
pub mod wallet;

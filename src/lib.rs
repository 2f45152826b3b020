/// Quartermaster - service-account inventory server
///
/// Stocks `identifier:secret` credentials in named categories and hands
/// them out through chat commands and a web dashboard API, with atomic
/// claims, per-requester cooldowns and an append-only activity log.

pub mod accounts;
pub mod activity;
pub mod allocation;
pub mod api;
pub mod auth;
pub mod bot;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod inventory;
pub mod jobs;
pub mod metrics;
pub mod rate_limit;
pub mod server;

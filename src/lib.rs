pub mod ai;
pub mod bots;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod github;
pub mod keys;
pub mod outcome;
pub mod output;
pub mod telemetry;
pub mod trust;

pub mod bot;
pub mod catalog;
pub mod config;
pub mod metadata;
pub mod payments;
pub mod store;
pub mod telegram_log;

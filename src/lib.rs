pub mod config;
pub mod scheduling;
pub mod telegram_log;

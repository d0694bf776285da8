//! Slot booking for one teacher and many students over Telegram.

pub mod booking;
pub mod callback;
pub mod command;
pub mod database;
pub mod error;
pub mod model;
pub mod notifier;
pub mod reminders;
pub mod router;
pub mod session;
pub mod shutdown;
pub mod transport;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;

pub use booking::BookingEngine;
pub use callback::Callback;
pub use command::Command;
pub use database::SlotStore;
pub use error::{Error, Result};
pub use notifier::{NotificationPoller, PollIntervals};
pub use router::CommandRouter;
pub use session::SessionNavigator;
pub use transport::{TelegramTransport, Transport};

//! Error taxonomy shared by the store, engine, navigator and router.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("a slot with this start time already exists")]
    Conflict,

    #[error("slot is already booked")]
    AlreadyBooked,

    #[error("slot start time has already passed")]
    PastDeadline,

    #[error("action not allowed for this user")]
    Forbidden,

    #[error("malformed callback payload: {0:?}")]
    MalformedCallback(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("store failure: {0}")]
    Store(#[from] rusqlite::Error),
}

impl Error {
    /// Business outcomes are shown to the user as-is; everything else is an
    /// infrastructure failure that only gets a generic message.
    pub fn is_business(&self) -> bool {
        !matches!(self, Error::Transport(_) | Error::Store(_))
    }

    /// Fixed user-facing text for this outcome.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::NotFound => "Ошибка: слот не найден.",
            Error::Conflict => "Слот на это время уже существует.",
            Error::AlreadyBooked => "Этот слот уже занят.",
            Error::PastDeadline => "Нельзя записаться на прошедшее время.",
            Error::Forbidden => "❌ Это действие вам недоступно.",
            Error::MalformedCallback(_) => "Ошибка: неверный запрос.",
            Error::Transport(_) | Error::Store(_) => "Произошла ошибка. Попробуйте позже.",
        }
    }
}

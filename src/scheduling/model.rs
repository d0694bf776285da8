//! Records held by the slot store and the events the scanners derive from them.

use chrono::{DateTime, SecondsFormat, Utc};

/// User role, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "teacher" => Role::Teacher,
            _ => Role::Student,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    /// Telegram chat id; also the identity slots refer to.
    pub external_id: i64,
    pub role: Role,
    pub username: Option<String>,
    pub contact: Option<String>,
}

impl User {
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }
}

/// Name shown for a user in notices: the username, or `ID<chat>` when unknown.
pub fn display_name(external_id: i64, username: Option<&str>) -> String {
    match username {
        Some(u) if !u.is_empty() => u.to_string(),
        _ => format!("ID{}", external_id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Free,
    Booked,
}

impl SlotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotStatus::Free => "free",
            SlotStatus::Booked => "booked",
        }
    }

    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "booked" => SlotStatus::Booked,
            _ => SlotStatus::Free,
        }
    }
}

/// A bookable interval owned by a teacher.
///
/// `student_id` is set iff `status` is `Booked`; the schema enforces this.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: i64,
    pub teacher_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
    pub student_id: Option<i64>,
    pub direction: Option<String>,
    /// The current booking has been announced to teacher and student.
    pub booking_announced: bool,
}

impl Slot {
    pub fn is_booked(&self) -> bool {
        self.status == SlotStatus::Booked
    }
}

/// Persisted inbox entry for a teacher.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: i64,
    pub teacher_id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A booked slot joined with the student's name.
#[derive(Debug, Clone)]
pub struct BookingEvent {
    pub slot_id: i64,
    pub teacher_id: i64,
    pub student_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub direction: String,
    pub student_name: String,
}

/// A cancelled announced booking whose notices are still owed.
#[derive(Debug, Clone)]
pub struct CancellationEvent {
    /// Queue entry id, used to claim the event.
    pub id: i64,
    pub slot_id: i64,
    pub teacher_id: i64,
    pub student_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub student_name: String,
}

/// RFC-3339 in UTC with a `Z` suffix and whole seconds. Strings in this form
/// sort lexicographically in chronological order, which the store relies on.
pub fn to_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

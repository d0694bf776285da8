//! Callback payloads carried by inline keyboard buttons.
//!
//! Every payload the bot emits is a [`Callback`] rendered with `Display`, and
//! every payload it receives goes through `FromStr`. Anything that does not
//! parse back into a variant is `Error::MalformedCallback`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::scheduling::error::Error;

static ADD_SLOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})_(\d{2}):(\d{2})$").expect("valid add_slot pattern")
});

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Month {
    first_day: NaiveDate,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self { first_day: date.with_day(1).unwrap_or(date) }
    }

    pub fn first_day(self) -> NaiveDate {
        self.first_day
    }

    pub fn year(self) -> i32 {
        self.first_day.year()
    }

    pub fn month(self) -> u32 {
        self.first_day.month()
    }

    pub fn num_days(self) -> u32 {
        self.next().first_day.pred_opt().map(|d| d.day()).unwrap_or(28)
    }

    pub fn next(self) -> Self {
        Self { first_day: self.first_day + Months::new(1) }
    }

    pub fn prev(self) -> Self {
        Self { first_day: self.first_day - Months::new(1) }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for Month {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        let (year, month) = s.split_once('-').ok_or(())?;
        if year.len() != 4 || month.len() != 2 {
            return Err(());
        }
        let year = year.parse().map_err(|_| ())?;
        let month = month.parse().map_err(|_| ())?;
        Month::new(year, month).ok_or(())
    }
}

/// One inline button action. Month navigation carries the target month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Calendar(NaiveDate),
    CalendarPrev(Month),
    CalendarNext(Month),
    StudentCalendar(NaiveDate),
    StudentCalendarPrev(Month),
    StudentCalendarNext(Month),
    AddSlot(NaiveDateTime),
    Book(i64),
    Cancel(i64),
    SelectDelete(i64),
    DeleteSlot(i64),
    MarkRead(i64),
    ClearNotifications,
    ConfirmReminder(i64),
    BackToMenu,
    BackToCalendar,
    Notifications,
    Ignore,
    TeacherSchedule,
    TeacherStudents,
    /// Entry point of the add-slot flow (the teacher calendar).
    OpenAddSlot,
    StudentBook,
    StudentBookings,
    StudentCancel,
    DeleteSchedule,
}

impl Callback {
    /// Actions reserved for the teacher.
    pub fn is_teacher_only(&self) -> bool {
        matches!(
            self,
            Callback::Calendar(_)
                | Callback::CalendarPrev(_)
                | Callback::CalendarNext(_)
                | Callback::AddSlot(_)
                | Callback::SelectDelete(_)
                | Callback::DeleteSlot(_)
                | Callback::MarkRead(_)
                | Callback::ClearNotifications
                | Callback::BackToCalendar
                | Callback::Notifications
                | Callback::TeacherSchedule
                | Callback::TeacherStudents
                | Callback::OpenAddSlot
                | Callback::DeleteSchedule
        )
    }

    /// For a teacher, every callback except these deletes the originating
    /// message before the action renders.
    pub fn keeps_origin_message(&self) -> bool {
        matches!(
            self,
            Callback::Notifications
                | Callback::DeleteSchedule
                | Callback::MarkRead(_)
                | Callback::ClearNotifications
        )
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Calendar(d) => write!(f, "calendar_{}", d.format("%Y-%m-%d")),
            Callback::CalendarPrev(m) => write!(f, "calendar_prev_{m}"),
            Callback::CalendarNext(m) => write!(f, "calendar_next_{m}"),
            Callback::StudentCalendar(d) => write!(f, "student_calendar_{}", d.format("%Y-%m-%d")),
            Callback::StudentCalendarPrev(m) => write!(f, "student_calendar_prev_{m}"),
            Callback::StudentCalendarNext(m) => write!(f, "student_calendar_next_{m}"),
            Callback::AddSlot(at) => write!(f, "add_slot_{}", at.format("%Y-%m-%d_%H:%M")),
            Callback::Book(id) => write!(f, "book_{id}"),
            Callback::Cancel(id) => write!(f, "cancel_{id}"),
            Callback::SelectDelete(id) => write!(f, "select_delete_{id}"),
            Callback::DeleteSlot(id) => write!(f, "delete_slot_{id}"),
            Callback::MarkRead(id) => write!(f, "mark_read_{id}"),
            Callback::ClearNotifications => f.write_str("clear_notifications"),
            Callback::ConfirmReminder(id) => write!(f, "confirm_reminder_{id}"),
            Callback::BackToMenu => f.write_str("back_to_menu"),
            Callback::BackToCalendar => f.write_str("back_to_calendar"),
            Callback::Notifications => f.write_str("notifications"),
            Callback::Ignore => f.write_str("ignore"),
            Callback::TeacherSchedule => f.write_str("teacher_schedule"),
            Callback::TeacherStudents => f.write_str("teacher_students"),
            Callback::OpenAddSlot => f.write_str("add_slot"),
            Callback::StudentBook => f.write_str("student_book"),
            Callback::StudentBookings => f.write_str("student_bookings"),
            Callback::StudentCancel => f.write_str("student_cancel"),
            Callback::DeleteSchedule => f.write_str("delete_schedule"),
        }
    }
}

impl FromStr for Callback {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let malformed = || Error::MalformedCallback(s.to_string());

        let fixed = match s {
            "clear_notifications" => Some(Callback::ClearNotifications),
            "back_to_menu" => Some(Callback::BackToMenu),
            "back_to_calendar" => Some(Callback::BackToCalendar),
            "notifications" => Some(Callback::Notifications),
            "ignore" => Some(Callback::Ignore),
            "teacher_schedule" => Some(Callback::TeacherSchedule),
            "teacher_students" => Some(Callback::TeacherStudents),
            "add_slot" => Some(Callback::OpenAddSlot),
            "student_book" => Some(Callback::StudentBook),
            "student_bookings" => Some(Callback::StudentBookings),
            "student_cancel" => Some(Callback::StudentCancel),
            "delete_schedule" => Some(Callback::DeleteSchedule),
            _ => None,
        };
        if let Some(callback) = fixed {
            return Ok(callback);
        }

        let date = |rest: &str| NaiveDate::parse_from_str(rest, "%Y-%m-%d").map_err(|_| malformed());
        let month = |rest: &str| rest.parse::<Month>().map_err(|_| malformed());
        let id = |rest: &str| {
            if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            rest.parse::<i64>().map_err(|_| malformed())
        };

        // Longer prefixes first: `calendar_prev_` must win over `calendar_`.
        if let Some(rest) = s.strip_prefix("student_calendar_prev_") {
            return Ok(Callback::StudentCalendarPrev(month(rest)?));
        }
        if let Some(rest) = s.strip_prefix("student_calendar_next_") {
            return Ok(Callback::StudentCalendarNext(month(rest)?));
        }
        if let Some(rest) = s.strip_prefix("student_calendar_") {
            return Ok(Callback::StudentCalendar(date(rest)?));
        }
        if let Some(rest) = s.strip_prefix("calendar_prev_") {
            return Ok(Callback::CalendarPrev(month(rest)?));
        }
        if let Some(rest) = s.strip_prefix("calendar_next_") {
            return Ok(Callback::CalendarNext(month(rest)?));
        }
        if let Some(rest) = s.strip_prefix("calendar_") {
            return Ok(Callback::Calendar(date(rest)?));
        }
        if let Some(rest) = s.strip_prefix("add_slot_") {
            let caps = ADD_SLOT_RE.captures(rest).ok_or_else(malformed)?;
            let day = date(&caps[1])?;
            let hour: u32 = caps[2].parse().map_err(|_| malformed())?;
            let minute: u32 = caps[3].parse().map_err(|_| malformed())?;
            let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(malformed)?;
            return Ok(Callback::AddSlot(day.and_time(time)));
        }
        if let Some(rest) = s.strip_prefix("book_") {
            return Ok(Callback::Book(id(rest)?));
        }
        if let Some(rest) = s.strip_prefix("cancel_") {
            return Ok(Callback::Cancel(id(rest)?));
        }
        if let Some(rest) = s.strip_prefix("select_delete_") {
            return Ok(Callback::SelectDelete(id(rest)?));
        }
        if let Some(rest) = s.strip_prefix("delete_slot_") {
            return Ok(Callback::DeleteSlot(id(rest)?));
        }
        if let Some(rest) = s.strip_prefix("mark_read_") {
            return Ok(Callback::MarkRead(id(rest)?));
        }
        if let Some(rest) = s.strip_prefix("confirm_reminder_") {
            return Ok(Callback::ConfirmReminder(id(rest)?));
        }

        Err(malformed())
    }
}

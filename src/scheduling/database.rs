//! Persistent SQLite store for users, slots and the teacher inbox.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::scheduling::error::{Error, Result};
use crate::scheduling::model::{
    BookingEvent, CancellationEvent, Notification, Role, Slot, SlotStatus, User, display_name,
    parse_timestamp, to_timestamp,
};

const SLOT_COLUMNS: &str =
    "id, teacher_id, start_time, end_time, status, student_id, direction, booking_announced";

/// Slot, user and inbox records behind a single connection.
pub struct SlotStore {
    conn: Mutex<Connection>,
}

impl SlotStore {
    /// Create a new in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        store.init_schema()?;
        Ok(store)
    }

    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self { conn: Mutex::new(Connection::open(path)?) };
        store.init_schema()?;

        let (users, slots) = store.counts()?;
        info!("Opened slot store {:?} ({} users, {} slots)", path, users, slots);
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied statement behind.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id INTEGER NOT NULL UNIQUE,
                role TEXT NOT NULL CHECK(role IN ('teacher', 'student')),
                username TEXT,
                contact TEXT
            );

            CREATE TABLE IF NOT EXISTS schedules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                teacher_id INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'free' CHECK(status IN ('free', 'booked')),
                student_id INTEGER,
                direction TEXT,
                booking_announced INTEGER NOT NULL DEFAULT 0,
                UNIQUE(teacher_id, start_time),
                CHECK(start_time < end_time),
                CHECK((status = 'booked') = (student_id IS NOT NULL))
            );

            CREATE TABLE IF NOT EXISTS cancellations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slot_id INTEGER NOT NULL,
                teacher_id INTEGER NOT NULL,
                student_id INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                teacher_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_schedules_start ON schedules(start_time);
            CREATE INDEX IF NOT EXISTS idx_schedules_student ON schedules(student_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_teacher ON notifications(teacher_id);
        "#)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    fn counts(&self) -> Result<(usize, usize)> {
        let conn = self.conn();
        let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let slots: i64 = conn.query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))?;
        Ok((users as usize, slots as usize))
    }

    // ==================== USER METHODS ====================

    /// Register a user on first contact. The role of an existing user is never
    /// changed; a known username is refreshed.
    pub fn ensure_user(&self, external_id: i64, role: Role, username: Option<&str>) -> Result<User> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO users (external_id, role, username) VALUES (?1, ?2, ?3)
             ON CONFLICT(external_id) DO UPDATE SET username = COALESCE(?3, username)",
            params![external_id, role.as_str(), username],
        )?;
        debug!("ensure_user {} ({} row(s) touched)", external_id, inserted);

        conn.query_row(
            "SELECT id, external_id, role, username, contact FROM users WHERE external_id = ?1",
            params![external_id],
            user_from_row,
        )
        .map_err(Error::from)
    }

    pub fn get_user(&self, external_id: i64) -> Result<Option<User>> {
        self.conn()
            .query_row(
                "SELECT id, external_id, role, username, contact FROM users WHERE external_id = ?1",
                params![external_id],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn teachers(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, external_id, role, username, contact FROM users WHERE role = 'teacher'",
        )?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Display name for a chat id, `ID<chat>` when the user is unknown.
    pub fn display_name(&self, external_id: i64) -> Result<String> {
        let username: Option<String> = self
            .conn()
            .query_row(
                "SELECT username FROM users WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(display_name(external_id, username.as_deref()))
    }

    // ==================== SLOT METHODS ====================

    /// Insert a free slot. `(teacher_id, start)` is unique; a duplicate is a `Conflict`.
    pub fn insert_slot(&self, teacher_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO schedules (teacher_id, start_time, end_time, status) VALUES (?1, ?2, ?3, 'free')",
            params![teacher_id, to_timestamp(start), to_timestamp(end)],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(Error::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_slot(&self, slot_id: i64) -> Result<Option<Slot>> {
        self.conn()
            .query_row(
                &format!("SELECT {SLOT_COLUMNS} FROM schedules WHERE id = ?1"),
                params![slot_id],
                slot_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    pub fn find_slot(&self, teacher_id: i64, start: DateTime<Utc>) -> Result<Option<Slot>> {
        self.conn()
            .query_row(
                &format!("SELECT {SLOT_COLUMNS} FROM schedules WHERE teacher_id = ?1 AND start_time = ?2"),
                params![teacher_id, to_timestamp(start)],
                slot_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Free -> Booked as one conditional update, returning the booked row.
    /// `None` when the slot is missing, already booked, or starts before `not_before`.
    pub fn try_book(
        &self,
        slot_id: i64,
        student_id: i64,
        direction: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<Slot>> {
        self.conn()
            .query_row(
                &format!(
                    "UPDATE schedules
                     SET status = 'booked', student_id = ?2, direction = ?3, booking_announced = 0
                     WHERE id = ?1 AND status = 'free' AND start_time >= ?4
                     RETURNING {SLOT_COLUMNS}"
                ),
                params![slot_id, student_id, direction, to_timestamp(not_before)],
                slot_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Booked -> Free for the booking student only.
    ///
    /// If the booking had been announced, a cancellation notice is queued for
    /// that student in `cancellations`. An unannounced booking is released
    /// silently. Each cancellation gets its own row, so notices owed from
    /// earlier bookings of the same slot are never overwritten.
    pub fn try_cancel(&self, slot_id: i64, student_id: i64) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let announced: Option<bool> = tx
            .query_row(
                "SELECT booking_announced FROM schedules
                 WHERE id = ?1 AND status = 'booked' AND student_id = ?2",
                params![slot_id, student_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(announced) = announced else {
            return Ok(false);
        };

        if announced {
            tx.execute(
                "INSERT INTO cancellations (slot_id, teacher_id, student_id, start_time, end_time)
                 SELECT id, teacher_id, student_id, start_time, end_time FROM schedules WHERE id = ?1",
                params![slot_id],
            )?;
        }
        tx.execute(
            "UPDATE schedules
             SET status = 'free', student_id = NULL, direction = NULL, booking_announced = 0
             WHERE id = ?1",
            params![slot_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn delete_slot(&self, slot_id: i64) -> Result<bool> {
        let changed = self.conn().execute("DELETE FROM schedules WHERE id = ?1", params![slot_id])?;
        Ok(changed == 1)
    }

    pub fn teacher_slots(&self, teacher_id: i64) -> Result<Vec<Slot>> {
        self.query_slots(
            &format!("SELECT {SLOT_COLUMNS} FROM schedules WHERE teacher_id = ?1 ORDER BY start_time"),
            params![teacher_id],
        )
    }

    /// A teacher's slots starting on the given UTC day.
    pub fn teacher_slots_on(&self, teacher_id: i64, day: NaiveDate) -> Result<Vec<Slot>> {
        let (from, to) = day_bounds(day);
        self.query_slots(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM schedules
                 WHERE teacher_id = ?1 AND start_time BETWEEN ?2 AND ?3 ORDER BY start_time"
            ),
            params![teacher_id, from, to],
        )
    }

    /// Free slots on the given UTC day that start no earlier than `not_before`.
    pub fn free_slots_on(&self, day: NaiveDate, not_before: DateTime<Utc>) -> Result<Vec<Slot>> {
        let (from, to) = day_bounds(day);
        let from = from.max(to_timestamp(not_before));
        self.query_slots(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM schedules
                 WHERE status = 'free' AND start_time BETWEEN ?1 AND ?2 ORDER BY start_time"
            ),
            params![from, to],
        )
    }

    /// Slots starting in `[from, to)`.
    pub fn slots_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Slot>> {
        self.query_slots(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM schedules
                 WHERE start_time >= ?1 AND start_time < ?2 ORDER BY start_time"
            ),
            params![to_timestamp(from), to_timestamp(to)],
        )
    }

    pub fn student_bookings(&self, student_id: i64) -> Result<Vec<Slot>> {
        self.query_slots(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM schedules
                 WHERE student_id = ?1 AND status = 'booked' ORDER BY start_time"
            ),
            params![student_id],
        )
    }

    fn query_slots(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Slot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, slot_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Booked slots of a teacher with the student's name.
    pub fn teacher_students(&self, teacher_id: i64) -> Result<Vec<BookingEvent>> {
        self.query_bookings(
            "WHERE s.teacher_id = ?1 AND s.status = 'booked' ORDER BY s.start_time",
            params![teacher_id],
        )
    }

    /// Booked slots starting after `after`, for the lesson-reminder pass.
    pub fn booked_after(&self, after: DateTime<Utc>) -> Result<Vec<BookingEvent>> {
        self.query_bookings(
            "WHERE s.status = 'booked' AND s.start_time > ?1 ORDER BY s.start_time",
            params![to_timestamp(after)],
        )
    }

    // ==================== ANNOUNCEMENT METHODS ====================

    /// Bookings not yet announced.
    pub fn pending_booking_announcements(&self) -> Result<Vec<BookingEvent>> {
        self.query_bookings(
            "WHERE s.status = 'booked' AND s.booking_announced = 0 ORDER BY s.id",
            params![],
        )
    }

    /// Set `booking_announced` for this exact booking. Only one caller can win.
    pub fn claim_booking_announcement(&self, slot_id: i64, student_id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE schedules SET booking_announced = 1
             WHERE id = ?1 AND status = 'booked' AND student_id = ?2 AND booking_announced = 0",
            params![slot_id, student_id],
        )?;
        Ok(changed == 1)
    }

    /// Cancellations of announced bookings whose notices are still owed, oldest first.
    pub fn pending_cancellations(&self) -> Result<Vec<CancellationEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.slot_id, c.teacher_id, c.student_id, c.start_time, c.end_time, u.username
             FROM cancellations c
             LEFT JOIN users u ON u.external_id = c.student_id
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map([], |row| {
            let student_id: i64 = row.get(3)?;
            let username: Option<String> = row.get(6)?;
            Ok(CancellationEvent {
                id: row.get(0)?,
                slot_id: row.get(1)?,
                teacher_id: row.get(2)?,
                student_id,
                start_time: timestamp_column(row, 4)?,
                end_time: timestamp_column(row, 5)?,
                student_name: display_name(student_id, username.as_deref()),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Take an owed cancellation off the queue. Only one caller can win.
    pub fn claim_cancellation(&self, cancellation_id: i64) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM cancellations WHERE id = ?1", params![cancellation_id])?;
        Ok(changed == 1)
    }

    fn query_bookings(&self, filter: &str, params: impl rusqlite::Params) -> Result<Vec<BookingEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT s.id, s.teacher_id, s.student_id, s.start_time, s.end_time, s.direction, u.username
             FROM schedules s
             LEFT JOIN users u ON u.external_id = s.student_id
             {filter}"
        ))?;
        let rows = stmt.query_map(params, |row| {
            let student_id: i64 = row.get(2)?;
            let username: Option<String> = row.get(6)?;
            Ok(BookingEvent {
                slot_id: row.get(0)?,
                teacher_id: row.get(1)?,
                student_id,
                start_time: timestamp_column(row, 3)?,
                end_time: timestamp_column(row, 4)?,
                direction: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                student_name: display_name(student_id, username.as_deref()),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ==================== INBOX METHODS ====================

    pub fn add_notification(&self, teacher_id: i64, message: &str, at: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO notifications (teacher_id, message, created_at) VALUES (?1, ?2, ?3)",
            params![teacher_id, message, to_timestamp(at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Inbox of a teacher, newest first.
    pub fn notifications(&self, teacher_id: i64) -> Result<Vec<Notification>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, teacher_id, message, created_at, is_read FROM notifications
             WHERE teacher_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![teacher_id], |row| {
            Ok(Notification {
                id: row.get(0)?,
                teacher_id: row.get(1)?,
                message: row.get(2)?,
                created_at: timestamp_column(row, 3)?,
                is_read: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn unread_count(&self, teacher_id: i64) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE teacher_id = ?1 AND is_read = 0",
            params![teacher_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Mark one inbox item read. Scoped to its owner.
    pub fn mark_read(&self, notification_id: i64, teacher_id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND teacher_id = ?2",
            params![notification_id, teacher_id],
        )?;
        Ok(changed == 1)
    }

    pub fn clear_notifications(&self, teacher_id: i64) -> Result<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM notifications WHERE teacher_id = ?1", params![teacher_id])?;
        Ok(removed)
    }
}

fn day_bounds(day: NaiveDate) -> (String, String) {
    let from = day.and_time(NaiveTime::MIN).and_utc();
    let to = from + chrono::Duration::seconds(24 * 60 * 60 - 1);
    (to_timestamp(from), to_timestamp(to))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        role: Role::from_db(&row.get::<_, String>(2)?),
        username: row.get(3)?,
        contact: row.get(4)?,
    })
}

fn slot_from_row(row: &Row) -> rusqlite::Result<Slot> {
    Ok(Slot {
        id: row.get(0)?,
        teacher_id: row.get(1)?,
        start_time: timestamp_column(row, 2)?,
        end_time: timestamp_column(row, 3)?,
        status: SlotStatus::from_db(&row.get::<_, String>(4)?),
        student_id: row.get(5)?,
        direction: row.get(6)?,
        booking_announced: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const TEACHER: i64 = 100;
    const ALICE: i64 = 201;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 10, h, 0, 0).unwrap()
    }

    fn early() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_duplicate_start_is_conflict() {
        let store = SlotStore::open_in_memory().unwrap();
        store.insert_slot(TEACHER, at(9), at(10)).unwrap();

        assert!(matches!(store.insert_slot(TEACHER, at(9), at(10)), Err(Error::Conflict)));
        // Same start for another teacher is fine.
        assert!(store.insert_slot(TEACHER + 1, at(9), at(10)).is_ok());
    }

    #[test]
    fn test_schema_rejects_booked_without_student() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();

        let result = store
            .conn()
            .execute("UPDATE schedules SET status = 'booked' WHERE id = ?1", params![id]);
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_rejects_inverted_interval() {
        let store = SlotStore::open_in_memory().unwrap();
        assert!(store.insert_slot(TEACHER, at(10), at(9)).is_err());
    }

    #[test]
    fn test_try_book_is_compare_and_set() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();

        let booked = store.try_book(id, ALICE, "ОГЭ", early()).unwrap().unwrap();
        assert_eq!(booked.student_id, Some(ALICE));
        assert!(store.try_book(id, ALICE + 1, "ЕГЭ", early()).unwrap().is_none());

        let slot = store.get_slot(id).unwrap().unwrap();
        assert_eq!(slot.student_id, Some(ALICE));
        assert_eq!(slot.direction.as_deref(), Some("ОГЭ"));
    }

    #[test]
    fn test_try_book_refuses_started_slot() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        assert!(store.try_book(id, ALICE, "ОГЭ", at(9) + Duration::minutes(1)).unwrap().is_none());
        assert!(!store.get_slot(id).unwrap().unwrap().is_booked());
    }

    #[test]
    fn test_cancel_of_unannounced_booking_owes_nothing() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        store.try_book(id, ALICE, "ОГЭ", early()).unwrap();

        assert!(store.try_cancel(id, ALICE).unwrap());
        assert!(store.pending_cancellations().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_of_announced_booking_queues_notice() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        store.try_book(id, ALICE, "ОГЭ", early()).unwrap();
        assert!(store.claim_booking_announcement(id, ALICE).unwrap());

        assert!(store.try_cancel(id, ALICE).unwrap());
        let slot = store.get_slot(id).unwrap().unwrap();
        assert!(!slot.booking_announced);
        assert_eq!(slot.student_id, None);
        assert_eq!(slot.direction, None);

        let owed = store.pending_cancellations().unwrap();
        assert_eq!(owed.len(), 1);
        assert_eq!(owed[0].slot_id, id);
        assert_eq!(owed[0].student_id, ALICE);
        assert_eq!(owed[0].start_time, at(9));
    }

    #[test]
    fn test_cancel_requires_booking_student() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        store.try_book(id, ALICE, "ОГЭ", early()).unwrap();

        assert!(!store.try_cancel(id, ALICE + 1).unwrap());
        assert!(store.get_slot(id).unwrap().unwrap().is_booked());
    }

    #[test]
    fn test_claims_succeed_once() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        store.try_book(id, ALICE, "ОГЭ", early()).unwrap();

        assert!(store.claim_booking_announcement(id, ALICE).unwrap());
        assert!(!store.claim_booking_announcement(id, ALICE).unwrap());

        store.try_cancel(id, ALICE).unwrap();
        let owed = store.pending_cancellations().unwrap();
        assert!(store.claim_cancellation(owed[0].id).unwrap());
        assert!(!store.claim_cancellation(owed[0].id).unwrap());
    }

    #[test]
    fn test_rebook_keeps_owed_cancellation() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        store.try_book(id, ALICE, "ОГЭ", early()).unwrap();
        store.claim_booking_announcement(id, ALICE).unwrap();
        store.try_cancel(id, ALICE).unwrap();

        // Re-booked before the cancellation pass ran.
        store.try_book(id, ALICE + 1, "ЕГЭ", early()).unwrap();

        let owed = store.pending_cancellations().unwrap();
        assert_eq!(owed.len(), 1);
        assert_eq!(owed[0].student_id, ALICE);
        assert_eq!(store.pending_booking_announcements().unwrap().len(), 1);
    }

    #[test]
    fn test_every_announced_cancellation_is_queued() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();

        for student in [ALICE, ALICE + 1, ALICE + 2] {
            store.try_book(id, student, "ОГЭ", early()).unwrap();
            store.claim_booking_announcement(id, student).unwrap();
            store.try_cancel(id, student).unwrap();
        }

        let owed: Vec<i64> = store
            .pending_cancellations()
            .unwrap()
            .iter()
            .map(|c| c.student_id)
            .collect();
        assert_eq!(owed, vec![ALICE, ALICE + 1, ALICE + 2]);
    }

    #[test]
    fn test_owed_cancellation_outlives_slot() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        store.try_book(id, ALICE, "ОГЭ", early()).unwrap();
        store.claim_booking_announcement(id, ALICE).unwrap();
        store.try_cancel(id, ALICE).unwrap();

        assert!(store.delete_slot(id).unwrap());
        let owed = store.pending_cancellations().unwrap();
        assert_eq!(owed.len(), 1);
        assert_eq!(owed[0].end_time, at(10));
    }

    #[test]
    fn test_day_queries() {
        let store = SlotStore::open_in_memory().unwrap();
        store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        store.insert_slot(TEACHER, at(12), at(13)).unwrap();
        let booked = store.insert_slot(TEACHER, at(15), at(16)).unwrap();
        store
            .insert_slot(TEACHER, at(9) + Duration::days(1), at(10) + Duration::days(1))
            .unwrap();
        store.try_book(booked, ALICE, "ОГЭ", early()).unwrap();

        let day = at(0).date_naive();
        assert_eq!(store.teacher_slots_on(TEACHER, day).unwrap().len(), 3);
        assert_eq!(store.free_slots_on(day, early()).unwrap().len(), 2);
        // Slots already started are not offered.
        assert_eq!(store.free_slots_on(day, at(10)).unwrap().len(), 1);
    }

    #[test]
    fn test_ensure_user_keeps_role() {
        let store = SlotStore::open_in_memory().unwrap();
        let user = store.ensure_user(ALICE, Role::Student, Some("alice")).unwrap();
        assert_eq!(user.role, Role::Student);

        let again = store.ensure_user(ALICE, Role::Teacher, None).unwrap();
        assert_eq!(again.role, Role::Student);
        assert_eq!(again.username.as_deref(), Some("alice"));
        assert_eq!(again.id, user.id);
    }

    #[test]
    fn test_booking_events_fall_back_to_id() {
        let store = SlotStore::open_in_memory().unwrap();
        let id = store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        store.try_book(id, ALICE, "ОГЭ", early()).unwrap();

        let events = store.pending_booking_announcements().unwrap();
        assert_eq!(events[0].student_name, format!("ID{}", ALICE));

        store.ensure_user(ALICE, Role::Student, Some("alice")).unwrap();
        let events = store.teacher_students(TEACHER).unwrap();
        assert_eq!(events[0].student_name, "alice");
        assert_eq!(events[0].direction, "ОГЭ");
    }

    #[test]
    fn test_inbox_is_scoped_and_ordered() {
        let store = SlotStore::open_in_memory().unwrap();
        let first = store.add_notification(TEACHER, "first", at(9)).unwrap();
        store.add_notification(TEACHER, "second", at(10)).unwrap();
        store.add_notification(TEACHER + 1, "other", at(10)).unwrap();

        let inbox = store.notifications(TEACHER).unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].message, "second");
        assert_eq!(store.unread_count(TEACHER).unwrap(), 2);

        assert!(!store.mark_read(first, TEACHER + 1).unwrap());
        assert!(store.mark_read(first, TEACHER).unwrap());
        assert_eq!(store.unread_count(TEACHER).unwrap(), 1);

        assert_eq!(store.clear_notifications(TEACHER).unwrap(), 2);
        assert_eq!(store.unread_count(TEACHER + 1).unwrap(), 1);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.db");
        {
            let store = SlotStore::open(&path).unwrap();
            store.insert_slot(TEACHER, at(9), at(10)).unwrap();
        }
        let store = SlotStore::open(&path).unwrap();
        assert_eq!(store.teacher_slots(TEACHER).unwrap().len(), 1);
    }
}

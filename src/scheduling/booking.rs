//! Slot lifecycle: create, book, cancel, delete.
//!
//! `Free --book--> Booked --cancel--> Free`; `delete` removes a slot in either
//! state. Transitions are single conditional updates in the store, so two
//! students racing for one slot cannot both win.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::scheduling::database::SlotStore;
use crate::scheduling::error::{Error, Result};
use crate::scheduling::model::Slot;
use crate::scheduling::views;

pub struct BookingEngine {
    store: Arc<SlotStore>,
}

impl BookingEngine {
    pub fn new(store: Arc<SlotStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SlotStore> {
        &self.store
    }

    /// Insert a free slot. Fails with `Conflict` if the teacher already has a
    /// slot starting at `start`.
    pub fn create_slot(&self, teacher_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let id = self.store.insert_slot(teacher_id, start, end)?;
        info!("Slot {} created for teacher {} at {}", id, teacher_id, start);
        Ok(id)
    }

    pub fn book(&self, slot_id: i64, student_id: i64, direction: &str) -> Result<Slot> {
        self.book_at(slot_id, student_id, direction, Utc::now())
    }

    /// Book a free slot that has not started by `now`.
    ///
    /// On success the teacher gets an inbox entry; the live notices are left to
    /// the booking scanner.
    pub fn book_at(&self, slot_id: i64, student_id: i64, direction: &str, now: DateTime<Utc>) -> Result<Slot> {
        let Some(slot) = self.store.try_book(slot_id, student_id, direction, now)? else {
            let slot = self.store.get_slot(slot_id)?.ok_or(Error::NotFound)?;
            return Err(if slot.is_booked() {
                Error::AlreadyBooked
            } else if slot.start_time < now {
                Error::PastDeadline
            } else {
                // Lost to a cancel/book pair that finished in between.
                Error::AlreadyBooked
            });
        };

        // The row comes from the booking update itself; a delete racing in
        // after it cannot turn a successful booking into NotFound.
        let student = self.store.display_name(student_id)?;
        let notice = views::booking_notice(slot.start_time, slot.end_time, &student, direction);
        self.store.add_notification(slot.teacher_id, &notice, now)?;

        info!("Slot {} booked by {} ({})", slot_id, student_id, direction);
        Ok(slot)
    }

    /// Release a booking. Only the student holding it may cancel. Returns the
    /// slot as it was before the cancellation.
    pub fn cancel(&self, slot_id: i64, requester_id: i64) -> Result<Slot> {
        let slot = self.store.get_slot(slot_id)?.ok_or(Error::NotFound)?;
        if slot.student_id != Some(requester_id) {
            return Err(Error::Forbidden);
        }

        if !self.store.try_cancel(slot_id, requester_id)? {
            return match self.store.get_slot(slot_id)? {
                None => Err(Error::NotFound),
                Some(_) => Err(Error::Forbidden),
            };
        }

        let student = self.store.display_name(requester_id)?;
        let notice = views::cancel_notice(slot.start_time, slot.end_time, &student);
        self.store.add_notification(slot.teacher_id, &notice, Utc::now())?;

        info!("Slot {} cancelled by {}", slot_id, requester_id);
        Ok(slot)
    }

    /// Remove a slot regardless of its status. The requester must own it.
    /// A booked student is not notified.
    pub fn delete(&self, slot_id: i64, requester_id: i64) -> Result<Slot> {
        let slot = self.store.get_slot(slot_id)?.ok_or(Error::NotFound)?;
        if slot.teacher_id != requester_id {
            return Err(Error::Forbidden);
        }

        if !self.store.delete_slot(slot_id)? {
            return Err(Error::NotFound);
        }
        info!("Slot {} deleted by {} (was {})", slot_id, requester_id, slot.status.as_str());
        Ok(slot)
    }
}

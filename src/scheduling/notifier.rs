//! Background scanners that turn store state into notifications.
//!
//! Each pass is an async method returning how many events it delivered, so it
//! can be driven by a timer loop or called directly in tests. Booking and
//! cancellation events are claimed in the store before they are delivered:
//! a claimed event is never delivered twice, even by overlapping passes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::scheduling::database::SlotStore;
use crate::scheduling::error::Result;
use crate::scheduling::reminders::{ReminderWindow, WeeklySchedule, reminder_window};
use crate::scheduling::session::SessionNavigator;
use crate::scheduling::shutdown::{Shutdown, spawn_loop};
use crate::scheduling::views::{self, Screen};

/// Scan intervals.
#[derive(Debug, Clone)]
pub struct PollIntervals {
    pub events: Duration,
    pub reminders: Duration,
}

pub struct NotificationPoller {
    store: Arc<SlotStore>,
    navigator: Arc<SessionNavigator>,
    broadcast_chat_id: Option<i64>,
}

impl NotificationPoller {
    pub fn new(store: Arc<SlotStore>, navigator: Arc<SessionNavigator>, broadcast_chat_id: Option<i64>) -> Self {
        Self { store, navigator, broadcast_chat_id }
    }

    /// Announce new bookings to teacher and student.
    pub async fn booking_pass(&self) -> Result<usize> {
        let mut delivered = 0;
        for event in self.store.pending_booking_announcements()? {
            if !self.store.claim_booking_announcement(event.slot_id, event.student_id)? {
                continue;
            }

            let notice = views::booking_notice(event.start_time, event.end_time, &event.student_name, &event.direction);
            if let Err(e) = self.navigator.flash(event.teacher_id, &Screen::plain(&notice)).await {
                warn!("Booking notice for slot {} not delivered to teacher: {}", event.slot_id, e);
            }
            if let Err(e) = self
                .navigator
                .present(event.student_id, &views::booking_confirmation(&event))
                .await
            {
                warn!("Booking confirmation for slot {} not delivered to {}: {}", event.slot_id, event.student_id, e);
            }

            info!("Announced booking of slot {} by {}", event.slot_id, event.student_id);
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Tell teacher and student about cancelled announced bookings.
    pub async fn cancellation_pass(&self) -> Result<usize> {
        let mut delivered = 0;
        for event in self.store.pending_cancellations()? {
            if !self.store.claim_cancellation(event.id)? {
                continue;
            }

            let notice = views::cancellation_teacher_notice(&event);
            if let Err(e) = self.navigator.flash(event.teacher_id, &Screen::plain(&notice)).await {
                warn!("Cancellation notice for slot {} not delivered to teacher: {}", event.slot_id, e);
            }
            if let Err(e) = self
                .navigator
                .present(event.student_id, &views::cancellation_student_notice(&event))
                .await
            {
                warn!("Cancellation notice for slot {} not delivered to {}: {}", event.slot_id, event.student_id, e);
            }

            info!("Announced cancellation of slot {} by {}", event.slot_id, event.student_id);
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Remind about lessons starting in 10 (teacher, channel) or 30 (student) minutes.
    pub async fn lesson_reminder_pass(&self, now: chrono::DateTime<Utc>) -> Result<usize> {
        let mut delivered = 0;
        for event in self.store.booked_after(now)? {
            match reminder_window(event.start_time - now) {
                Some(ReminderWindow::Teacher) => {
                    let text = views::teacher_reminder(&event);
                    if let Err(e) = self.store.add_notification(event.teacher_id, &text, now) {
                        warn!("Lesson reminder for slot {} not saved to inbox: {}", event.slot_id, e);
                    }
                    if let Err(e) = self.navigator.flash(event.teacher_id, &Screen::plain(&text)).await {
                        warn!("Lesson reminder for slot {} not delivered to teacher: {}", event.slot_id, e);
                    }
                    if let Some(channel) = self.broadcast_chat_id {
                        let text = views::channel_reminder(&event);
                        if let Err(e) = self.navigator.post(channel, &Screen::plain(&text)).await {
                            warn!("Lesson reminder for slot {} not posted to {}: {}", event.slot_id, channel, e);
                        }
                    }
                    delivered += 1;
                }
                Some(ReminderWindow::Student) => {
                    if let Err(e) = self
                        .navigator
                        .present(event.student_id, &views::student_reminder(&event))
                        .await
                    {
                        warn!("Lesson reminder for slot {} not delivered to {}: {}", event.slot_id, event.student_id, e);
                    }
                    delivered += 1;
                }
                None => {}
            }
        }
        Ok(delivered)
    }

    /// Prompt every teacher to fill in next week's schedule.
    pub async fn weekly_pass(&self) -> Result<usize> {
        let now = Utc::now();
        let teachers = self.store.teachers()?;
        for teacher in &teachers {
            if let Err(e) = self.store.add_notification(teacher.external_id, views::WEEKLY_REMINDER, now) {
                warn!("Weekly reminder not saved to inbox of {}: {}", teacher.external_id, e);
            }
            if let Err(e) = self
                .navigator
                .present(teacher.external_id, &Screen::with_back(views::WEEKLY_REMINDER))
                .await
            {
                warn!("Weekly reminder not delivered to {}: {}", teacher.external_id, e);
            }
        }
        info!("Weekly reminder sent to {} teacher(s)", teachers.len());
        Ok(teachers.len())
    }

    /// Start all four scanners. They stop when `shutdown` fires.
    pub fn spawn(
        self: &Arc<Self>,
        intervals: PollIntervals,
        weekly: WeeklySchedule,
        shutdown: Shutdown,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(4);

        let poller = self.clone();
        handles.push(spawn_loop("booking-event", intervals.events, shutdown.clone(), move || {
            let poller = poller.clone();
            async move {
                match poller.booking_pass().await {
                    Ok(0) => {}
                    Ok(n) => debug!("booking pass delivered {}", n),
                    Err(e) => warn!("booking pass failed: {}", e),
                }
            }
        }));

        let poller = self.clone();
        handles.push(spawn_loop("cancellation-event", intervals.events, shutdown.clone(), move || {
            let poller = poller.clone();
            async move {
                match poller.cancellation_pass().await {
                    Ok(0) => {}
                    Ok(n) => debug!("cancellation pass delivered {}", n),
                    Err(e) => warn!("cancellation pass failed: {}", e),
                }
            }
        }));

        let poller = self.clone();
        handles.push(spawn_loop("lesson-reminder", intervals.reminders, shutdown.clone(), move || {
            let poller = poller.clone();
            async move {
                match poller.lesson_reminder_pass(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => debug!("reminder pass delivered {}", n),
                    Err(e) => warn!("reminder pass failed: {}", e),
                }
            }
        }));

        let poller = self.clone();
        let mut shutdown = shutdown;
        handles.push(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = weekly.next_after(now) else {
                    warn!("Weekly reminder schedule has no future occurrence");
                    break;
                };
                info!("Next weekly reminder at {}", next);

                let wait = (next - now).to_std().unwrap_or_default();
                if !shutdown.sleep(wait).await {
                    break;
                }
                if let Err(e) = poller.weekly_pass().await {
                    warn!("weekly pass failed: {}", e);
                }
            }
            debug!("weekly-reminder loop stopped");
        }));

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::booking::BookingEngine;
    use crate::scheduling::model::Role;
    use crate::scheduling::testing::RecordingTransport;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone};

    const TEACHER: i64 = 100;
    const ALICE: i64 = 201;
    const CHANNEL: i64 = -500;

    struct Fixture {
        transport: Arc<RecordingTransport>,
        engine: BookingEngine,
        poller: NotificationPoller,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SlotStore::open_in_memory().unwrap());
        let transport = Arc::new(RecordingTransport::new());
        let navigator = Arc::new(SessionNavigator::new(transport.clone(), Duration::from_secs(60)));
        Fixture {
            transport,
            engine: BookingEngine::new(store.clone()),
            poller: NotificationPoller::new(store, navigator, Some(CHANNEL)),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 10, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_reminder_pass_windows() {
        let f = fixture();
        let id = f.engine.create_slot(TEACHER, start(), start() + ChronoDuration::hours(1)).unwrap();
        f.engine.book_at(id, ALICE, "ОГЭ", start() - ChronoDuration::days(1)).unwrap();

        let far = start() - ChronoDuration::minutes(45);
        assert_eq!(f.poller.lesson_reminder_pass(far).await.unwrap(), 0);

        let student_time = start() - ChronoDuration::minutes(30);
        assert_eq!(f.poller.lesson_reminder_pass(student_time).await.unwrap(), 1);
        let student_msgs = f.transport.visible_messages(ALICE);
        assert_eq!(student_msgs.len(), 1);
        assert!(student_msgs[0].text.starts_with("Напоминание: занятие через 30 минут!"));
        let payloads: Vec<&str> = student_msgs[0].keyboard.as_ref().unwrap().payloads().collect();
        let expected = format!("confirm_reminder_{id}");
        assert_eq!(payloads, vec![expected.as_str()]);

        let teacher_time = start() - ChronoDuration::minutes(10);
        assert_eq!(f.poller.lesson_reminder_pass(teacher_time).await.unwrap(), 1);
        assert_eq!(f.transport.sent_to(TEACHER).len(), 1);
        assert_eq!(f.transport.sent_to(CHANNEL).len(), 1);
        assert!(
            f.transport.sent_to(CHANNEL)[0]
                .text
                .starts_with("Напоминание: урок начнется через 10 минут!")
        );

        // Booking entry plus the reminder.
        assert_eq!(f.engine.store().notifications(TEACHER).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reminder_pass_ignores_free_slots() {
        let f = fixture();
        f.engine.create_slot(TEACHER, start(), start() + ChronoDuration::hours(1)).unwrap();
        let at = start() - ChronoDuration::minutes(10);
        assert_eq!(f.poller.lesson_reminder_pass(at).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_weekly_pass_reaches_teachers() {
        let f = fixture();
        f.engine.store().ensure_user(TEACHER, Role::Teacher, Some("teacher")).unwrap();
        f.engine.store().ensure_user(ALICE, Role::Student, Some("alice")).unwrap();

        assert_eq!(f.poller.weekly_pass().await.unwrap(), 1);
        assert_eq!(f.transport.visible(TEACHER).len(), 1);
        assert!(f.transport.visible(ALICE).is_empty());
        assert_eq!(f.engine.store().unread_count(TEACHER).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inbox_failure_does_not_stop_reminders() {
        let f = fixture();
        for h in [0, 1] {
            let at = start() + ChronoDuration::seconds(h * 30);
            let id = f.engine.create_slot(TEACHER, at, at + ChronoDuration::hours(1)).unwrap();
            f.engine.book_at(id, ALICE + h, "ОГЭ", start() - ChronoDuration::days(1)).unwrap();
        }
        f.engine.store().execute_batch("DROP TABLE notifications").unwrap();

        let now = start() - ChronoDuration::minutes(10) + ChronoDuration::seconds(40);
        assert_eq!(f.poller.lesson_reminder_pass(now).await.unwrap(), 2);
        assert_eq!(f.transport.sent_to(TEACHER).len(), 2);
        assert_eq!(f.transport.sent_to(CHANNEL).len(), 2);
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_redeliver() {
        let f = fixture();
        let id = f.engine.create_slot(TEACHER, start(), start() + ChronoDuration::hours(1)).unwrap();
        f.engine.book_at(id, ALICE, "ОГЭ", start() - ChronoDuration::days(1)).unwrap();

        f.transport.fail_sends(true);
        assert_eq!(f.poller.booking_pass().await.unwrap(), 1);
        f.transport.fail_sends(false);
        assert_eq!(f.poller.booking_pass().await.unwrap(), 0);
        assert!(f.transport.sent_to(ALICE).is_empty());
    }
}

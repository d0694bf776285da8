//! Inbound updates: slash commands and button callbacks.
//!
//! Every handler registers the sender, runs the action and converts any error
//! into a screen at this boundary. Nothing here propagates to the dispatcher.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::{info, warn};

use crate::scheduling::booking::BookingEngine;
use crate::scheduling::callback::{Callback, Month};
use crate::scheduling::command::{Command, Input, parse_input};
use crate::scheduling::database::SlotStore;
use crate::scheduling::error::{Error, Result};
use crate::scheduling::model::{Role, Slot, User};
use crate::scheduling::session::SessionNavigator;
use crate::scheduling::views::{self, Screen};

/// Length of a slot created from the hour grid.
const SLOT_LENGTH_HOURS: i64 = 1;

pub struct CommandRouter {
    engine: BookingEngine,
    navigator: Arc<SessionNavigator>,
    teacher_id: i64,
    default_direction: String,
}

impl CommandRouter {
    pub fn new(
        engine: BookingEngine,
        navigator: Arc<SessionNavigator>,
        teacher_id: i64,
        default_direction: impl Into<String>,
    ) -> Self {
        Self { engine, navigator, teacher_id, default_direction: default_direction.into() }
    }

    fn store(&self) -> &SlotStore {
        self.engine.store()
    }

    fn register(&self, chat_id: i64, username: Option<&str>) -> Result<User> {
        let role = if chat_id == self.teacher_id { Role::Teacher } else { Role::Student };
        self.store().ensure_user(chat_id, role, username)
    }

    /// Handle a text message. The message itself is deleted afterwards.
    pub async fn handle_message(&self, chat_id: i64, username: Option<&str>, message_id: i64, text: &str, bot_name: &str) {
        let result = match self.register(chat_id, username) {
            Ok(user) => match parse_input(text, bot_name) {
                Input::Command(command) => self.run_command(&user, command).await,
                Input::UnknownCommand => self.show_menu(&user).await,
                Input::Text => Ok(()),
            },
            Err(e) => Err(e),
        };
        self.report(chat_id, result).await;

        self.navigator.discard(chat_id, message_id).await;
    }

    /// Handle a button press. `origin` is the message the button was on.
    pub async fn handle_callback(&self, chat_id: i64, username: Option<&str>, origin: Option<i64>, data: &str) {
        let result = match self.register(chat_id, username) {
            Ok(user) => self.run_callback(&user, origin, data).await,
            Err(e) => Err(e),
        };
        self.report(chat_id, result).await;
    }

    async fn report(&self, chat_id: i64, result: Result<()>) {
        let Err(e) = result else {
            return;
        };
        if e.is_business() {
            info!("Chat {}: {}", chat_id, e);
        } else {
            warn!("Chat {}: {}", chat_id, e);
        }
        if let Err(send_err) = self.navigator.present(chat_id, &Screen::with_back(e.user_message())).await {
            warn!("Could not show error to {}: {}", chat_id, send_err);
        }
    }

    // ==================== COMMANDS ====================

    async fn run_command(&self, user: &User, command: Command) -> Result<()> {
        let chat = user.external_id;
        if command.is_teacher_only() && !user.is_teacher() {
            self.navigator.present(chat, &views::teacher_only()).await?;
            return Ok(());
        }

        match command {
            Command::Start => self.show_menu(user).await,
            Command::Schedule => self.show_schedule(chat).await,
            Command::Students => self.show_students(chat).await,
            Command::Book => self.show_student_calendar(chat, Month::of(today())).await,
            Command::MyBookings => self.show_bookings(chat).await,
            Command::Cancel => self.show_cancel_list(chat).await,
        }
    }

    // ==================== CALLBACKS ====================

    async fn run_callback(&self, user: &User, origin: Option<i64>, data: &str) -> Result<()> {
        let chat = user.external_id;
        let parsed = data.parse::<Callback>();

        // Runs before anything else, so `ignore` and malformed payloads also
        // remove the teacher's message.
        let keeps_origin = matches!(&parsed, Ok(callback) if callback.keeps_origin_message());
        if user.is_teacher()
            && !keeps_origin
            && let Some(origin) = origin
        {
            self.navigator.discard(chat, origin).await;
        }

        let callback = parsed?;
        if callback == Callback::Ignore {
            return Ok(());
        }
        if callback.is_teacher_only() && !user.is_teacher() {
            return Err(Error::Forbidden);
        }

        match callback {
            Callback::Ignore => Ok(()),
            Callback::BackToMenu | Callback::ConfirmReminder(_) => self.show_menu(user).await,

            Callback::TeacherSchedule => self.show_schedule(chat).await,
            Callback::TeacherStudents => self.show_students(chat).await,
            Callback::OpenAddSlot | Callback::BackToCalendar => {
                self.show_teacher_calendar(chat, Month::of(today())).await
            }
            Callback::CalendarPrev(month) | Callback::CalendarNext(month) => {
                self.show_teacher_calendar(chat, month).await
            }
            Callback::Calendar(date) => {
                if date < today() {
                    return Ok(());
                }
                let now = Utc::now();
                let slots = self.store().teacher_slots_on(chat, date)?;
                self.navigator.present(chat, &views::teacher_day(date, &slots, now)).await?;
                Ok(())
            }
            Callback::AddSlot(at) => self.add_slot(chat, at.and_utc()).await,
            Callback::DeleteSchedule => {
                let slots = self.store().teacher_slots(chat)?;
                self.navigator.mutate(chat, &views::delete_list(&slots)).await?;
                Ok(())
            }
            Callback::SelectDelete(slot_id) => {
                let slot = self.store().get_slot(slot_id)?.ok_or(Error::NotFound)?;
                if slot.teacher_id != chat {
                    return Err(Error::Forbidden);
                }
                self.navigator.present(chat, &views::delete_confirm(&slot)).await?;
                Ok(())
            }
            Callback::DeleteSlot(slot_id) => {
                self.engine.delete(slot_id, chat)?;
                self.navigator.present(chat, &views::slot_deleted()).await?;
                Ok(())
            }

            Callback::Notifications => {
                let items = self.store().notifications(chat)?;
                self.navigator.present(chat, &views::inbox(&items)).await?;
                Ok(())
            }
            Callback::MarkRead(id) => {
                if !self.store().mark_read(id, chat)? {
                    return Err(Error::NotFound);
                }
                let items = self.store().notifications(chat)?;
                self.navigator.mutate(chat, &views::inbox(&items)).await?;
                Ok(())
            }
            Callback::ClearNotifications => {
                let removed = self.store().clear_notifications(chat)?;
                info!("Teacher {} cleared {} notification(s)", chat, removed);
                self.navigator.mutate(chat, &views::inbox_cleared()).await?;
                Ok(())
            }

            Callback::StudentBook => self.show_student_calendar(chat, Month::of(today())).await,
            Callback::StudentCalendarPrev(month) | Callback::StudentCalendarNext(month) => {
                self.show_student_calendar(chat, month).await
            }
            Callback::StudentCalendar(date) => {
                if date < today() {
                    return Ok(());
                }
                let slots = self.store().free_slots_on(date, Utc::now())?;
                self.navigator.present(chat, &views::student_day(date, &slots)).await?;
                Ok(())
            }
            Callback::StudentBookings => self.show_bookings(chat).await,
            Callback::StudentCancel => self.show_cancel_list(chat).await,
            Callback::Book(slot_id) => {
                let slot = self.engine.book(slot_id, chat, &self.default_direction)?;
                self.navigator.present(chat, &views::booked(&slot)).await?;
                self.refresh_teacher_menu(&slot, chat).await;
                Ok(())
            }
            Callback::Cancel(slot_id) => {
                let slot = self.engine.cancel(slot_id, chat)?;
                self.navigator.present(chat, &views::cancelled(&slot)).await?;
                self.refresh_teacher_menu(&slot, chat).await;
                Ok(())
            }
        }
    }

    async fn add_slot(&self, chat: i64, start: chrono::DateTime<Utc>) -> Result<()> {
        if start < Utc::now() {
            self.navigator.present(chat, &views::slot_in_past()).await?;
            return Ok(());
        }

        let end = start + Duration::hours(SLOT_LENGTH_HOURS);
        let screen = match self.engine.create_slot(chat, start, end) {
            Ok(_) => views::slot_added(start, end),
            Err(Error::Conflict) => {
                let existing = self.store().find_slot(chat, start)?.ok_or(Error::Conflict)?;
                views::slot_exists(&existing)
            }
            Err(e) => return Err(e),
        };
        self.navigator.present(chat, &screen).await?;
        Ok(())
    }

    /// Re-show the owning teacher's menu so the unread count is current.
    async fn refresh_teacher_menu(&self, slot: &Slot, actor: i64) {
        if slot.teacher_id == actor {
            return;
        }
        let unread = match self.store().unread_count(slot.teacher_id) {
            Ok(n) => n,
            Err(e) => {
                warn!("Could not count notifications for {}: {}", slot.teacher_id, e);
                return;
            }
        };
        if let Err(e) = self
            .navigator
            .present(slot.teacher_id, &views::teacher_menu(unread))
            .await
        {
            warn!("Could not refresh menu of teacher {}: {}", slot.teacher_id, e);
        }
    }

    // ==================== SCREENS ====================

    async fn show_menu(&self, user: &User) -> Result<()> {
        let screen = if user.is_teacher() {
            views::teacher_menu(self.store().unread_count(user.external_id)?)
        } else {
            views::student_menu()
        };
        self.navigator.present(user.external_id, &screen).await?;
        Ok(())
    }

    async fn show_schedule(&self, chat: i64) -> Result<()> {
        let slots = self.store().teacher_slots(chat)?;
        self.navigator.present(chat, &views::schedule(&slots)).await?;
        Ok(())
    }

    async fn show_students(&self, chat: i64) -> Result<()> {
        let students = self.store().teacher_students(chat)?;
        self.navigator.present(chat, &views::students(&students)).await?;
        Ok(())
    }

    async fn show_teacher_calendar(&self, chat: i64, month: Month) -> Result<()> {
        let (from, to) = views::month_bounds(month);
        let slots: Vec<Slot> = self
            .store()
            .slots_between(from, to)?
            .into_iter()
            .filter(|s| s.teacher_id == chat)
            .collect();
        self.navigator
            .present(chat, &views::teacher_calendar(month, &slots, today()))
            .await?;
        Ok(())
    }

    async fn show_student_calendar(&self, chat: i64, month: Month) -> Result<()> {
        let now = Utc::now();
        let (from, to) = views::month_bounds(month);
        let free: Vec<Slot> = self
            .store()
            .slots_between(from.max(now), to)?
            .into_iter()
            .filter(|s| !s.is_booked())
            .collect();
        self.navigator
            .present(chat, &views::student_calendar(month, &free, today()))
            .await?;
        Ok(())
    }

    async fn show_bookings(&self, chat: i64) -> Result<()> {
        let slots = self.store().student_bookings(chat)?;
        self.navigator.present(chat, &views::bookings(&slots)).await?;
        Ok(())
    }

    async fn show_cancel_list(&self, chat: i64) -> Result<()> {
        let slots = self.store().student_bookings(chat)?;
        self.navigator.present(chat, &views::cancel_list(&slots)).await?;
        Ok(())
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

//! Screens and notice texts.
//!
//! Everything here is a pure function of its arguments. Screen text is HTML;
//! notice texts are plain and get escaped when they are put on a screen.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::scheduling::callback::{Callback, Month};
use crate::scheduling::model::{BookingEvent, CancellationEvent, Notification, Slot};
use crate::scheduling::transport::{Button, Keyboard};

/// First and last hour offered on the teacher's hour grid.
const FIRST_HOUR: u32 = 9;
const LAST_HOUR: u32 = 21;

const MONTHS: [&str; 12] = [
    "Январь", "Февраль", "Март", "Апрель", "Май", "Июнь", "Июль", "Август", "Сентябрь", "Октябрь",
    "Ноябрь", "Декабрь",
];
const WEEKDAYS: [&str; 7] = ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"];

/// A rendered message: HTML text plus an optional inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Screen {
    pub fn new(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self { text: text.into(), keyboard: Some(keyboard) }
    }

    /// Plain text, escaped, without a keyboard.
    pub fn plain(text: &str) -> Self {
        Self { text: escape(text), keyboard: None }
    }

    /// Plain text, escaped, with a single "back to menu" button.
    pub fn with_back(text: &str) -> Self {
        Self::new(escape(text), back_to_menu())
    }
}

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// `DD.MM HH:MM` in UTC.
pub fn slot_time(t: DateTime<Utc>) -> String {
    t.format("%d.%m %H:%M").to_string()
}

fn hour_minute(t: DateTime<Utc>) -> String {
    t.format("%H:%M").to_string()
}

fn back_to_menu() -> Keyboard {
    Keyboard::new().row(vec![Button::new("↩️ Назад к меню", Callback::BackToMenu)])
}

fn back_to_calendar_or_menu() -> Keyboard {
    Keyboard::new().row(vec![
        Button::new("📅 Вернуться к календарю", Callback::BackToCalendar),
        Button::new("↩️ Вернуться в меню", Callback::BackToMenu),
    ])
}

// ==================== MENUS ====================

pub fn teacher_menu(unread: usize) -> Screen {
    let text = format!("👨‍🏫 <b>Меню учителя</b>\nВыберите действие:\n📬 Уведомления: {unread}");
    let keyboard = Keyboard::new()
        .row(vec![Button::new("📅 Управление расписанием", Callback::TeacherSchedule)])
        .row(vec![Button::new("👥 Просмотр учеников", Callback::TeacherStudents)])
        .row(vec![Button::new("➕ Добавить слот", Callback::OpenAddSlot)])
        .row(vec![Button::new(format!("📬 Уведомления ({unread})"), Callback::Notifications)]);
    Screen::new(text, keyboard)
}

pub fn student_menu() -> Screen {
    let keyboard = Keyboard::new()
        .row(vec![Button::new("📅 Записаться на занятие", Callback::StudentBook)])
        .row(vec![Button::new("🗓 Мои записи", Callback::StudentBookings)])
        .row(vec![Button::new("❌ Отменить запись", Callback::StudentCancel)]);
    Screen::new("👨‍🎓 <b>Меню ученика</b>\nВыберите действие:", keyboard)
}

// ==================== CALENDARS ====================

#[derive(Default, Clone, Copy)]
struct DayLoad {
    total: usize,
    free: usize,
}

fn day_loads<'a>(slots: impl IntoIterator<Item = &'a Slot>) -> HashMap<NaiveDate, DayLoad> {
    let mut loads: HashMap<NaiveDate, DayLoad> = HashMap::new();
    for slot in slots {
        let load = loads.entry(slot.start_time.date_naive()).or_default();
        load.total += 1;
        if !slot.is_booked() {
            load.free += 1;
        }
    }
    loads
}

/// Monday-first month grid. Days before `today` are inert.
fn month_grid(
    month: Month,
    today: NaiveDate,
    mark: impl Fn(NaiveDate) -> &'static str,
    select: impl Fn(NaiveDate) -> Callback,
) -> Keyboard {
    let mut keyboard = Keyboard::new().row(
        WEEKDAYS.iter().map(|d| Button::new(*d, Callback::Ignore)).collect(),
    );

    let lead = month.first_day().weekday().num_days_from_monday() as usize;
    let mut cells: Vec<Button> = (0..lead).map(|_| Button::new(" ", Callback::Ignore)).collect();

    for day in 1..=month.num_days() {
        let Some(date) = NaiveDate::from_ymd_opt(month.year(), month.month(), day) else {
            continue;
        };
        if date < today {
            cells.push(Button::new(format!("⬜ {day}"), Callback::Ignore));
        } else {
            cells.push(Button::new(format!("{} {day}", mark(date)), select(date)));
        }
    }
    while cells.len() % 7 != 0 {
        cells.push(Button::new(" ", Callback::Ignore));
    }

    for row in Keyboard::grid(cells, 7).rows {
        keyboard.push_row(row);
    }
    keyboard
}

fn month_title(month: Month) -> String {
    format!("{} {}", MONTHS[(month.month() - 1) as usize], month.year())
}

/// Calendar for the add-slot flow.
pub fn teacher_calendar(month: Month, month_slots: &[Slot], today: NaiveDate) -> Screen {
    let loads = day_loads(month_slots);
    let mut keyboard = month_grid(
        month,
        today,
        |date| match loads.get(&date) {
            Some(load) if load.free == 0 && load.total > 0 => "🟥",
            Some(_) => "🟩",
            None if date == today => "🟩",
            None => "⬜",
        },
        Callback::Calendar,
    );

    let mut nav = Vec::new();
    if month > Month::of(today) {
        nav.push(Button::new("⬅️ Предыдущий месяц", Callback::CalendarPrev(month.prev())));
    }
    nav.push(Button::new("➡️ Следующий месяц", Callback::CalendarNext(month.next())));
    keyboard.push_row(nav);
    keyboard.push_row(vec![Button::new("↩️ Назад к меню", Callback::BackToMenu)]);

    Screen::new(format!("Календарь {} для добавления слота:", month_title(month)), keyboard)
}

/// Calendar for the booking flow. `free_slots` are the bookable slots of the month.
pub fn student_calendar(month: Month, free_slots: &[Slot], today: NaiveDate) -> Screen {
    let loads = day_loads(free_slots);
    let mut keyboard = month_grid(
        month,
        today,
        |date| if loads.get(&date).is_some_and(|l| l.free > 0) { "🟩" } else { "🟥" },
        Callback::StudentCalendar,
    );

    let mut nav = Vec::new();
    if month > Month::of(today) {
        nav.push(Button::new("⬅️ Предыдущий месяц", Callback::StudentCalendarPrev(month.prev())));
    }
    nav.push(Button::new("➡️ Следующий месяц", Callback::StudentCalendarNext(month.next())));
    keyboard.push_row(nav);
    keyboard.push_row(vec![Button::new("↩️ Назад к меню", Callback::BackToMenu)]);

    Screen::new(format!("Календарь {} для записи на занятие:", month_title(month)), keyboard)
}

/// Hour grid of one day: 🟩 free hour, 🟥 slot exists, ⬜ already past.
pub fn teacher_day(date: NaiveDate, day_slots: &[Slot], now: DateTime<Utc>) -> Screen {
    let mut buttons = Vec::new();
    for hour in FIRST_HOUR..=LAST_HOUR {
        let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) else {
            continue;
        };
        let start = date.and_time(time);
        let start_utc = start.and_utc();
        let color = if start_utc < now {
            "⬜"
        } else if day_slots.iter().any(|s| s.start_time == start_utc) {
            "🟥"
        } else {
            "🟩"
        };
        buttons.push(Button::new(format!("{hour:02}:00\n{color}"), Callback::AddSlot(start)));
    }

    let mut keyboard = Keyboard::grid(buttons, 4);
    keyboard.push_row(vec![
        Button::new("↩️ Назад к календарю", Callback::OpenAddSlot),
        Button::new("↩️ Назад к меню", Callback::BackToMenu),
    ]);

    let text = format!(
        "🕒 <b>Доступные часы на {}:</b>\n\n🟩 - Свободно\n🟥 - Занято",
        date.format("%d.%m.%Y")
    );
    Screen::new(text, keyboard)
}

/// Free slots of one day for a student, three to a row.
pub fn student_day(date: NaiveDate, free_slots: &[Slot]) -> Screen {
    let buttons = free_slots
        .iter()
        .map(|s| Button::new(format!("{}\n🟩", hour_minute(s.start_time)), Callback::Book(s.id)))
        .collect();
    let mut keyboard = Keyboard::grid(buttons, 3);
    keyboard.push_row(vec![
        Button::new("↩️ К календарю", Callback::StudentBook),
        Button::new("↩️ Назад к меню", Callback::BackToMenu),
    ]);

    let day = date.format("%d.%m.%Y");
    let text = if free_slots.is_empty() {
        format!("На {day} свободных слотов нет.")
    } else {
        format!("✅ <b>Свободные слоты на {day}:</b>\n\nВыберите удобное время:")
    };
    Screen::new(text, keyboard)
}

// ==================== SLOT MANAGEMENT ====================

pub fn slot_added(start: DateTime<Utc>, end: DateTime<Utc>) -> Screen {
    Screen::new(
        format!("Слот успешно добавлен: {} - {}", hour_minute(start), hour_minute(end)),
        back_to_calendar_or_menu(),
    )
}

/// Offered when the chosen hour already has a slot.
pub fn slot_exists(existing: &Slot) -> Screen {
    let mut keyboard = Keyboard::new().row(vec![Button::new("🗑️ Удалить слот", Callback::DeleteSlot(existing.id))]);
    keyboard.rows.extend(back_to_calendar_or_menu().rows);
    Screen::new(
        format!(
            "Слот {} - {} уже занят. Что делать?",
            hour_minute(existing.start_time),
            hour_minute(existing.end_time)
        ),
        keyboard,
    )
}

pub fn slot_in_past() -> Screen {
    Screen::new("Нельзя добавить слот на прошедшее время.", back_to_calendar_or_menu())
}

pub fn schedule(slots: &[Slot]) -> Screen {
    if slots.is_empty() {
        return Screen::new("📭 Расписание пусто", back_to_menu());
    }

    let mut text = String::from("📅 <b>Ваше расписание:</b>\n\n");
    for slot in slots {
        let status = if slot.is_booked() { "✅ Занят" } else { "🆓 Свободен" };
        text.push_str(&format!(
            "⏰ {} - {}\n🔄 Статус: {}\n",
            slot_time(slot.start_time),
            slot_time(slot.end_time),
            status
        ));
    }

    let keyboard = Keyboard::new()
        .row(vec![Button::new("🗑️ Удалить", Callback::DeleteSchedule)])
        .row(vec![Button::new("↩️ Назад к меню", Callback::BackToMenu)]);
    Screen::new(text, keyboard)
}

pub fn delete_list(slots: &[Slot]) -> Screen {
    if slots.is_empty() {
        return Screen::new("📭 Расписание пусто", back_to_menu());
    }

    let mut keyboard = Keyboard::new();
    for slot in slots {
        let mark = if slot.is_booked() { "🟥" } else { "🟩" };
        keyboard.push_row(vec![Button::new(
            format!("{mark} {} - {}", slot_time(slot.start_time), hour_minute(slot.end_time)),
            Callback::SelectDelete(slot.id),
        )]);
    }
    keyboard.push_row(vec![Button::new("↩️ Назад к меню", Callback::BackToMenu)]);
    Screen::new("Выберите слот для удаления:", keyboard)
}

pub fn delete_confirm(slot: &Slot) -> Screen {
    let mut text = format!("Удалить слот {} - {}?", slot_time(slot.start_time), hour_minute(slot.end_time));
    if slot.is_booked() {
        text.push_str("\n⚠️ На этот слот есть запись.");
    }
    let keyboard = Keyboard::new()
        .row(vec![Button::new("🗑️ Удалить", Callback::DeleteSlot(slot.id))])
        .row(vec![
            Button::new("↩️ К списку", Callback::DeleteSchedule),
            Button::new("↩️ Назад к меню", Callback::BackToMenu),
        ]);
    Screen::new(text, keyboard)
}

pub fn slot_deleted() -> Screen {
    Screen::new("✅ Слот успешно удален", back_to_calendar_or_menu())
}

pub fn students(bookings: &[BookingEvent]) -> Screen {
    if bookings.is_empty() {
        return Screen::new("У вас пока нет учеников.", back_to_menu());
    }

    let mut text = String::from("👥 <b>Ваши ученики:</b>\n");
    for b in bookings {
        text.push_str(&format!(
            "👤 @{} - {} ({})\n",
            escape(&b.student_name),
            slot_time(b.start_time),
            escape(&b.direction)
        ));
    }
    Screen::new(text, back_to_menu())
}

// ==================== STUDENT BOOKINGS ====================

pub fn bookings(slots: &[Slot]) -> Screen {
    if slots.is_empty() {
        return Screen::new("У вас нет активных записей.", back_to_menu());
    }

    let mut text = String::from("🗓 <b>Ваши записи:</b>\n");
    for slot in slots {
        text.push_str(&format!(
            "🕒 {} - {} ({})\n",
            slot_time(slot.start_time),
            slot_time(slot.end_time),
            escape(slot.direction.as_deref().unwrap_or_default())
        ));
    }
    Screen::new(text, back_to_menu())
}

pub fn cancel_list(slots: &[Slot]) -> Screen {
    if slots.is_empty() {
        return Screen::new("У вас нет активных записей.", back_to_menu());
    }

    let mut keyboard = Keyboard::new();
    for slot in slots {
        keyboard.push_row(vec![Button::new(format!("🕒 {}", slot_time(slot.start_time)), Callback::Cancel(slot.id))]);
    }
    keyboard.push_row(vec![Button::new("↩️ Назад в меню", Callback::BackToMenu)]);
    Screen::new("Выберите запись для отмены:", keyboard)
}

pub fn booked(slot: &Slot) -> Screen {
    Screen::new(
        format!("Вы успешно записаны на занятие: {}", slot_time(slot.start_time)),
        back_to_menu(),
    )
}

pub fn cancelled(slot: &Slot) -> Screen {
    Screen::new(
        format!("Запись на {} успешно отменена.", slot_time(slot.start_time)),
        back_to_menu(),
    )
}

// ==================== INBOX ====================

pub fn inbox(notifications: &[Notification]) -> Screen {
    if notifications.is_empty() {
        return Screen::new("📬 У вас нет уведомлений.", back_to_menu());
    }

    let mut text = String::from("📬 <b>Ваши уведомления:</b>\n");
    let mut keyboard = Keyboard::new();
    for n in notifications {
        let status = if n.is_read { "✅" } else { "🔔" };
        text.push_str(&format!("\n{status} {}\n{}\n", slot_time(n.created_at), escape(&n.message)));
        if !n.is_read {
            keyboard.push_row(vec![Button::new(
                format!("Отметить прочитанным: {}", slot_time(n.created_at)),
                Callback::MarkRead(n.id),
            )]);
        }
    }
    keyboard.push_row(vec![
        Button::new("🗑️ Очистить все", Callback::ClearNotifications),
        Button::new("↩️ Назад в меню", Callback::BackToMenu),
    ]);
    Screen::new(text, keyboard)
}

pub fn inbox_cleared() -> Screen {
    Screen::new("📬 Уведомления очищены.", back_to_menu())
}

// ==================== NOTICES ====================

pub fn teacher_only() -> Screen {
    Screen::with_back("❌ Эта команда доступна только учителям")
}

fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("{} - {}", slot_time(start), slot_time(end))
}

/// Teacher notice for a new booking.
pub fn booking_notice(start: DateTime<Utc>, end: DateTime<Utc>, student: &str, direction: &str) -> String {
    format!("Новая запись:\n{}\nУченик: @{student}\nНаправление: {direction}", range(start, end))
}

/// Inbox entry written when a student cancels.
pub fn cancel_notice(start: DateTime<Utc>, end: DateTime<Utc>, student: &str) -> String {
    format!("Ученик отменил занятие:\n{}\nУченик: @{student}", range(start, end))
}

pub fn booking_confirmation(event: &BookingEvent) -> Screen {
    Screen::new(
        escape(&format!(
            "Вы записаны на занятие:\n{}\nНаправление: {}",
            range(event.start_time, event.end_time),
            event.direction
        )),
        back_to_menu(),
    )
}

pub fn cancellation_teacher_notice(event: &CancellationEvent) -> String {
    format!("Запись отменена:\n{}\nУченик: @{}", range(event.start_time, event.end_time), event.student_name)
}

pub fn cancellation_student_notice(event: &CancellationEvent) -> Screen {
    Screen::new(
        escape(&format!("Ваша запись отменена:\n{}", range(event.start_time, event.end_time))),
        back_to_menu(),
    )
}

pub fn teacher_reminder(event: &BookingEvent) -> String {
    format!(
        "Напоминание: урок через 10 минут!\n{}\nУченик: @{}\nНаправление: {}",
        range(event.start_time, event.end_time),
        event.student_name,
        event.direction
    )
}

pub fn channel_reminder(event: &BookingEvent) -> String {
    format!(
        "Напоминание: урок начнется через 10 минут!\n{}\nУченик: @{}\nНаправление: {}",
        range(event.start_time, event.end_time),
        event.student_name,
        event.direction
    )
}

pub fn student_reminder(event: &BookingEvent) -> Screen {
    let keyboard = Keyboard::new().row(vec![Button::new(
        "Хорошо, я уведомлен",
        Callback::ConfirmReminder(event.slot_id),
    )]);
    Screen::new(
        escape(&format!(
            "Напоминание: занятие через 30 минут!\n{}\nНаправление: {}",
            range(event.start_time, event.end_time),
            event.direction
        )),
        keyboard,
    )
}

pub const WEEKLY_REMINDER: &str = "Пора заполнить расписание на следующую неделю!";

/// Half-open UTC range covering a whole month.
pub fn month_bounds(month: Month) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = month.first_day().and_time(NaiveTime::MIN).and_utc();
    let to = from + Duration::days(month.num_days() as i64);
    (from, to)
}

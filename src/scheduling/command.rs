//! Slash commands.

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "главное меню")]
    Start,
    #[command(description = "расписание (для учителя)")]
    Schedule,
    #[command(description = "ученики (для учителя)")]
    Students,
    #[command(description = "записаться на занятие")]
    Book,
    #[command(description = "мои записи")]
    MyBookings,
    #[command(description = "отменить запись")]
    Cancel,
}

impl Command {
    pub fn is_teacher_only(&self) -> bool {
        matches!(self, Command::Schedule | Command::Students)
    }
}

/// What a text message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    /// Starts with `/` but is not one of ours.
    UnknownCommand,
    /// Plain text; ignored.
    Text,
}

pub fn parse_input(text: &str, bot_name: &str) -> Input {
    if !text.trim_start().starts_with('/') {
        return Input::Text;
    }
    match Command::parse(text.trim(), bot_name) {
        Ok(command) => Input::Command(command),
        Err(_) => Input::UnknownCommand,
    }
}

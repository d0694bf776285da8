use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use tutorbot::config::Config;
use tutorbot::scheduling::reminders::WeeklySchedule;
use tutorbot::scheduling::{
    BookingEngine, Command, CommandRouter, NotificationPoller, PollIntervals, SessionNavigator, SlotStore,
    TelegramTransport, Transport, shutdown,
};
use tutorbot::telegram_log::ChatLogLayer;

struct BotState {
    router: CommandRouter,
    bot_name: String,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tutorbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tutorbot.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        registry.with(ChatLogLayer::new(transport.clone(), log_chat_id)).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting tutorbot...");
    info!("Loaded config from {config_path}");
    info!("Teacher ID: {}", config.teacher_id);

    let store = match SlotStore::open(&config.database_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open database {:?}: {}", config.database_path(), e);
            std::process::exit(1);
        }
    };
    let weekly = match WeeklySchedule::new(&config.weekly_reminder_cron, config.timezone) {
        Ok(weekly) => weekly,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let bot_name = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            me.username().to_string()
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}");
            String::new()
        }
    };
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register commands: {e}");
    }

    let navigator = Arc::new(SessionNavigator::new(transport, config.transient_ttl));
    let poller = Arc::new(NotificationPoller::new(
        store.clone(),
        navigator.clone(),
        config.broadcast_chat_id,
    ));
    let (trigger, shutdown) = shutdown::channel();
    let handles = poller.spawn(
        PollIntervals { events: config.event_poll, reminders: config.reminder_poll },
        weekly,
        shutdown,
    );

    let state = Arc::new(BotState {
        router: CommandRouter::new(
            BookingEngine::new(store),
            navigator,
            config.teacher_id,
            config.default_direction.clone(),
        ),
        bot_name,
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Dispatcher stopped, waiting for background loops");
    trigger.trigger();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Background loop ended abnormally: {e}");
        }
    }
    info!("Bye");
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let username = msg.from.as_ref().and_then(|u| u.username.clone());

    state
        .router
        .handle_message(msg.chat.id.0, username.as_deref(), msg.id.0 as i64, text, &state.bot_name)
        .await;
    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let (chat_id, origin) = match q.message.as_ref() {
        Some(m) => (m.chat().id.0, Some(m.id().0 as i64)),
        None => (q.from.id.0 as i64, None),
    };

    if let Some(data) = q.data.as_deref() {
        state
            .router
            .handle_callback(chat_id, q.from.username.as_deref(), origin, data)
            .await;
    }

    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback: {e}");
    }
    Ok(())
}

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use citabot_agent::{
    BookingCoordinator, CalendarTarget, ConfirmationGenerator, DialogEngine, DialogSettings,
    DialogTurn, GridTarget, Templates, TextGenerator, UserMessage,
};
use citabot_core::config::{AppConfig, LoadOptions};
use citabot_core::{Clock, ProfileSource, SystemClock};
use citabot_store::{
    CalendarEvent, CellRef, InMemoryCalendarStore, InMemoryGridStore, InMemorySessionStore,
};

use super::CommandResult;

/// Offline dialog session: keyword intent detection, templated replies and
/// in-memory appointment backends.
pub struct LocalChat {
    engine: DialogEngine,
    grid: Arc<InMemoryGridStore>,
    calendar: Arc<InMemoryCalendarStore>,
    sheet_name: String,
    identity: String,
    display_name: String,
    sent: u64,
}

impl LocalChat {
    pub fn new(
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<Self> {
        let templates = Arc::new(Templates::new().context("prompt templates failed to compile")?);
        let grid = Arc::new(InMemoryGridStore::default());
        let calendar = Arc::new(InMemoryCalendarStore::default());

        let booking = BookingCoordinator::new(
            Some(GridTarget { store: grid.clone(), sheet_name: config.sheets.sheet_name.clone() }),
            Some(CalendarTarget { store: calendar.clone(), timezone: config.calendar.timezone.clone() }),
            Duration::from_secs(config.dialog.collaborator_timeout_secs),
            config.dialog.confirmation_policy,
            ConfirmationGenerator::new(TextGenerator::disabled(), templates.clone()),
        );
        let engine = DialogEngine::new(
            Arc::new(InMemorySessionStore::default()),
            Arc::new(ProfileSource::new(config.business.clone())),
            clock,
            TextGenerator::disabled(),
            templates,
            booking,
            DialogSettings::from(&config.dialog),
        );

        Ok(Self {
            engine,
            grid,
            calendar,
            sheet_name: config.sheets.sheet_name.clone(),
            identity: identity.to_owned(),
            display_name: display_name.unwrap_or(identity).to_owned(),
            sent: 0,
        })
    }

    pub async fn send(&mut self, text: &str) -> Result<DialogTurn> {
        self.sent += 1;
        let message = UserMessage {
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            text: text.to_owned(),
            correlation_id: format!("local-{}", self.sent),
        };
        self.engine.handle(&message).await.context("dialog turn failed")
    }

    pub async fn calendar_events(&self) -> Vec<CalendarEvent> {
        self.calendar.events().await
    }

    /// Reads one grid cell, e.g. `grid_cell('B', 3)` for the Monday 10:00 AM slot.
    pub async fn grid_cell(&self, column: char, row: u32) -> Option<String> {
        self.grid.cell(&CellRef::new(self.sheet_name.as_str(), column, row).a1()).await
    }
}

pub fn run(identity: &str, display_name: Option<&str>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2)
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                5,
            )
        }
    };

    let clock = match config.calendar.tz() {
        Ok(timezone) => Arc::new(SystemClock::new(timezone)),
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2)
        }
    };

    let mut chat = match LocalChat::new(&config, clock, identity, display_name) {
        Ok(chat) => chat,
        Err(error) => return CommandResult::failure("chat", "bootstrap", format!("{error:#}"), 5),
    };

    match runtime.block_on(repl(&mut chat, &config.business.name)) {
        Ok(messages) => {
            let booked = runtime.block_on(chat.calendar_events()).len();
            CommandResult::success(
                "chat",
                format!("{messages} messages exchanged, {booked} appointments recorded in memory"),
            )
        }
        Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), 5),
    }
}

async fn repl(chat: &mut LocalChat, business: &str) -> Result<u64> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    writeln!(stdout, "chatting with {business}; send an empty line or EOF to quit")?;

    let mut messages = 0;
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let text = line.trim();
        if text.is_empty() {
            break;
        }

        messages += 1;
        let turn = chat.send(text).await?;
        match turn.reply {
            Some(reply) => writeln!(stdout, "{business}> {reply}")?,
            None => writeln!(stdout, "({business} stays silent)")?,
        }
        stdout.flush()?;
    }

    Ok(messages)
}

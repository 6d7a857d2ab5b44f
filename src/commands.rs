//! Built-in commands: instant responses, no provider call.

use belt_core::{intent::ActionKind, traits::SessionStore};
use std::time::Instant;
use tracing::warn;

/// Grouped context for command execution.
pub struct CommandContext<'a> {
    pub sessions: &'a dyn SessionStore,
    pub user_id: &'a str,
    pub provider_name: &'a str,
    pub active_calls: usize,
    pub uptime: &'a Instant,
}

/// Known commands, other than the wizard entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    Cancel,
}

/// First word of a command, without a `@botname` suffix.
fn command_word(text: &str) -> Option<String> {
    let word = text.split_whitespace().next()?;
    let word = word.split('@').next().unwrap_or(word);
    Some(word.to_lowercase())
}

impl Command {
    /// Parse a command from message text. Returns `None` for unknown `/` prefixes.
    pub fn parse(text: &str) -> Option<Self> {
        match command_word(text)?.as_str() {
            "/start" => Some(Self::Start),
            "/help" | "/hulp" => Some(Self::Help),
            "/status" => Some(Self::Status),
            "/cancel" | "/annuleer" | "/stop" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// The action whose wizard a menu command starts.
pub fn wizard_kind(text: &str) -> Option<ActionKind> {
    match command_word(text)?.as_str() {
        "/bel" | "/call" => Some(ActionKind::Call),
        "/sms" => Some(ActionKind::Sms),
        "/mail" | "/email" => Some(ActionKind::Email),
        "/agenda" | "/calendar" => Some(ActionKind::Calendar),
        _ => None,
    }
}

/// Handle a command and return the response text.
pub async fn handle(cmd: Command, ctx: &CommandContext<'_>) -> String {
    match cmd {
        Command::Start => format!("👋 Hoi! Ik ben Belt, je assistent.\n\n{}", help_text()),
        Command::Help => help_text(),
        Command::Status => handle_status(ctx).await,
        Command::Cancel => handle_cancel(ctx.sessions, ctx.user_id).await,
    }
}

fn help_text() -> String {
    "Vertel gewoon wat je wilt, bijvoorbeeld:\n\
     • bel De Kas +31204624562 om te vragen of er vrijdag plek is\n\
     • sms Jan dat ik tien minuten later ben\n\
     • zet morgen om 14:00 tandarts in mijn agenda\n\n\
     Of kies een actie en ik vraag wat ik nodig heb:\n\
     /bel - iemand bellen\n\
     /sms - een sms sturen\n\
     /mail - een e-mail sturen\n\
     /agenda - een afspraak inplannen\n\n\
     /status - status van de assistent\n\
     /cancel - lopende flow of bevestiging annuleren\n\
     /help - dit overzicht"
        .to_string()
}

async fn handle_status(ctx: &CommandContext<'_>) -> String {
    let elapsed = ctx.uptime.elapsed();
    let hours = elapsed.as_secs() / 3600;
    let minutes = (elapsed.as_secs() % 3600) / 60;
    let secs = elapsed.as_secs() % 60;

    let wizard = match ctx.sessions.get_wizard(ctx.user_id).await {
        Ok(Some(state)) => state.action_type.to_string(),
        Ok(None) => "geen".to_string(),
        Err(e) => {
            warn!("status: failed to load wizard: {e}");
            "onbekend".to_string()
        }
    };
    let pending = match ctx.sessions.peek_confirmation(ctx.user_id).await {
        Ok(Some(_)) => "ja",
        Ok(None) => "nee",
        Err(e) => {
            warn!("status: failed to load pending confirmation: {e}");
            "onbekend"
        }
    };

    format!(
        "⚙️ Belt status\n\
         Uptime: {hours}h {minutes}m {secs}s\n\
         Provider: {}\n\
         Lopende gesprekken: {}\n\
         Actieve flow: {wizard}\n\
         Wacht op bevestiging: {pending}",
        ctx.provider_name, ctx.active_calls,
    )
}

async fn handle_cancel(sessions: &dyn SessionStore, user_id: &str) -> String {
    let wizard = sessions.get_wizard(user_id).await.ok().flatten();
    if wizard.is_some() {
        if let Err(e) = sessions.remove_wizard(user_id).await {
            warn!("cancel: failed to remove wizard for {user_id}: {e}");
        }
    }
    let pending = match sessions.take_confirmation(user_id).await {
        Ok(pending) => pending,
        Err(e) => {
            warn!("cancel: failed to clear pending confirmation for {user_id}: {e}");
            None
        }
    };

    match (wizard, pending) {
        (None, None) => "Er was niets om te annuleren.".to_string(),
        _ => "Geannuleerd. Er is niets uitgevoerd.".to_string(),
    }
}

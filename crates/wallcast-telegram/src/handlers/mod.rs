//! Telegram update handlers.
//!
//! Only slash commands are acted on. Everything else a chat sends is ignored, so
//! the bot can sit in busy groups and channels.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod commands;

/// Messages in groups and private chats.
pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let is_admin = match msg.from() {
        Some(user) => state.cfg.is_admin(user.id.0 as i64),
        None => false,
    };
    commands::handle_command(bot, &msg, text, is_admin, state).await
}

/// Posts in channels the bot administers. Only channel admins can post there,
/// so every channel post counts as an admin command.
pub async fn handle_channel_post(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }
    commands::handle_command(bot, &msg, text, true, state).await
}

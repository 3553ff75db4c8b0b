use std::sync::Arc;

use teloxide::{prelude::*, types::BotCommand};

use wallcast_core::{
    commands::{enable_error_announcements, parse_source_ref, track_source, tracked_by, TrackOutcome},
    domain::{ChatId, SourceId},
    errors::Error,
    formatting::escape_html,
    messaging::port::MessagingPort,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// The command menu registered by `/sync`.
pub fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("track", "Forward posts from a VK wall to this chat"),
        BotCommand::new("list", "Show walls this chat follows"),
        BotCommand::new("errors", "Send feed failure alerts to this chat"),
        BotCommand::new("sync", "Re-register the command menu"),
        BotCommand::new("help", "Show help"),
    ]
}

fn help_text() -> String {
    "📰 <b>Wall forwarder</b>\n\n\
New posts from tracked VK walls are forwarded to subscribed chats.\n\n\
<b>📋 Commands:</b>\n\
/track &lt;wall&gt; - Follow a wall (<code>public123</code>, <code>id123</code>, <code>-123</code> or a vk.com link)\n\
/list - Walls this chat follows\n\
/errors - Receive feed failure alerts here (admin)\n\
/sync - Re-register the command menu (admin)\n\
/help - Show this message"
        .to_string()
}

fn source_url(source: SourceId) -> String {
    if source.is_community() {
        format!("https://vk.com/public{}", source.bare())
    } else {
        format!("https://vk.com/id{}", source.bare())
    }
}

fn source_link(source: SourceId) -> String {
    format!("<a href=\"{}\">{}</a>", source_url(source), source)
}

fn track_reply(outcome: TrackOutcome, source: SourceId) -> String {
    let link = source_link(source);
    match outcome {
        TrackOutcome::Created => format!("✅ Tracking {link}. New posts will appear here."),
        TrackOutcome::AlreadyTracked => format!("ℹ️ This chat already follows {link}."),
        TrackOutcome::NotFound => format!("❌ Wall {link} does not exist or is not readable."),
    }
}

fn track_error_reply(err: &Error) -> String {
    match err {
        Error::FeedUnavailable(_) => {
            "⚠️ VK is unavailable right now, try again in a minute.".to_string()
        }
        other => format!(
            "❌ Could not save the subscription: <code>{}</code>",
            escape_html(&other.to_string())
        ),
    }
}

fn list_reply(sources: &[SourceId]) -> String {
    if sources.is_empty() {
        return "This chat follows no walls yet. Use /track to add one.".to_string();
    }
    let mut lines = vec![format!("📋 <b>Followed walls ({})</b>\n", sources.len())];
    lines.extend(sources.iter().map(|s| format!("• {}", source_link(*s))));
    lines.join("\n")
}

async fn reply(state: &AppState, chat_id: ChatId, html: &str) {
    if let Err(e) = state.messenger.send_html(chat_id, html).await {
        tracing::warn!(chat = chat_id.0, error = %e, "reply failed");
    }
}

pub async fn handle_command(
    bot: Bot,
    msg: &Message,
    text: &str,
    is_admin: bool,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, arg) = parse_command(text);
    tracing::debug!(chat = chat_id.0, cmd = %cmd, "command");

    match cmd.as_str() {
        "start" | "help" => {
            reply(&state, chat_id, &help_text()).await;
        }

        "track" => {
            if arg.is_empty() {
                reply(&state, chat_id, "Usage: /track &lt;wall&gt;").await;
                return Ok(());
            }
            let Some(source) = parse_source_ref(&arg) else {
                let html = format!(
                    "❌ Cannot read <code>{}</code> as a wall. Try <code>public123</code>, <code>id123</code> or <code>-123</code>.",
                    escape_html(&arg)
                );
                reply(&state, chat_id, &html).await;
                return Ok(());
            };

            let html = match track_source(&state.registry, state.feed.as_ref(), source, chat_id).await {
                Ok(outcome) => track_reply(outcome, source),
                Err(e) => {
                    tracing::warn!(chat = chat_id.0, source = %source, error = %e, "track failed");
                    track_error_reply(&e)
                }
            };
            reply(&state, chat_id, &html).await;
        }

        "list" => {
            let sources = tracked_by(&state.registry, chat_id).await;
            reply(&state, chat_id, &list_reply(&sources)).await;
        }

        "errors" => {
            if !is_admin {
                reply(&state, chat_id, "⛔ Only bot admins can do that.").await;
                return Ok(());
            }
            let html = match enable_error_announcements(&state.registry, chat_id).await {
                Ok(true) => "🔔 Feed failure alerts will be sent to this chat.".to_string(),
                Ok(false) => "ℹ️ This chat already receives feed failure alerts.".to_string(),
                Err(e) => {
                    tracing::warn!(chat = chat_id.0, error = %e, "enabling error alerts failed");
                    format!("❌ Could not save: <code>{}</code>", escape_html(&e.to_string()))
                }
            };
            reply(&state, chat_id, &html).await;
        }

        "sync" => {
            if !is_admin {
                reply(&state, chat_id, "⛔ Only bot admins can do that.").await;
                return Ok(());
            }
            let html = match bot.set_my_commands(bot_commands()).await {
                Ok(_) => "✅ Command menu updated.".to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "set_my_commands failed");
                    format!("❌ Telegram refused: <code>{}</code>", escape_html(&e.to_string()))
                }
            };
            reply(&state, chat_id, &html).await;
        }

        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/Track@wallcast_bot  public100 "),
            ("track".to_string(), "public100".to_string())
        );
        assert_eq!(parse_command("/list"), ("list".to_string(), String::new()));
    }

    #[test]
    fn track_replies_name_the_wall() {
        let created = track_reply(TrackOutcome::Created, SourceId(-100));
        assert!(created.contains("https://vk.com/public100"));
        let user = track_reply(TrackOutcome::AlreadyTracked, SourceId(7));
        assert!(user.contains("https://vk.com/id7"));
        assert!(track_reply(TrackOutcome::NotFound, SourceId(-5)).starts_with("❌"));
    }

    #[test]
    fn feed_outage_has_its_own_reply() {
        let html = track_error_reply(&Error::FeedUnavailable("timeout".to_string()));
        assert!(html.contains("unavailable"));
        let html = track_error_reply(&Error::Config("<bad>".to_string()));
        assert!(html.contains("&lt;bad&gt;"));
    }

    #[test]
    fn list_reply_counts_sources() {
        assert!(list_reply(&[]).contains("/track"));
        let html = list_reply(&[SourceId(-1), SourceId(2)]);
        assert!(html.contains("(2)"));
        assert_eq!(html.matches("• ").count(), 2);
    }

    #[test]
    fn menu_matches_help() {
        let help = help_text();
        for c in bot_commands() {
            assert!(help.contains(&format!("/{}", c.command)), "{}", c.command);
        }
    }
}

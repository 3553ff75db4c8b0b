//! Telegram adapter (teloxide).
//!
//! This crate implements the `wallcast-core` MessagingPort over Telegram Bot API
//! and hosts the command router.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use wallcast_core::{
    dispatch::OutboundPost,
    domain::ChatId,
    errors::Error,
    formatting::{escape_html, post_html},
    messaging::port::MessagingPort,
    Result,
};

/// Telegram caps photo captions at 1024 characters.
const CAPTION_LIMIT: usize = 1024;
const MESSAGE_LIMIT: usize = 4096;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::SendFailed(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::debug!(wait_secs = d.as_secs(), "telegram flood wait");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    async fn send_photo_post(&self, chat_id: ChatId, url: reqwest::Url, post: &OutboundPost) -> Result<()> {
        let caption = post_html(post, CAPTION_LIMIT);
        self.with_retry(|| {
            self.bot
                .send_photo(Self::tg_chat(chat_id), InputFile::url(url.clone()))
                .caption(caption.clone())
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn send_text_post(&self, chat_id: ChatId, post: &OutboundPost) -> Result<()> {
        let html = text_post_html(post);
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(chat_id), html.clone())
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }
}

/// Text rendering of a post without an image. The author avatar rides along as an
/// invisible leading link so Telegram shows it as the preview.
fn text_post_html(post: &OutboundPost) -> String {
    match post.thumbnail_url.as_deref().filter(|u| !u.is_empty()) {
        Some(avatar) => {
            let anchor = format!("<a href=\"{}\">&#8203;</a>", escape_html(avatar));
            let room = MESSAGE_LIMIT.saturating_sub(anchor.chars().count());
            format!("{anchor}{}", post_html(post, room))
        }
        None => post_html(post, MESSAGE_LIMIT),
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(chat_id), html.to_string())
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true)
        })
        .await?;
        Ok(())
    }

    async fn send_post(&self, chat_id: ChatId, post: &OutboundPost) -> Result<()> {
        let image = post
            .image_url
            .as_deref()
            .and_then(|u| reqwest::Url::parse(u).ok());

        let Some(url) = image else {
            return self.send_text_post(chat_id, post).await;
        };

        // Telegram fetches the photo itself and sometimes cannot; the post still
        // goes out as text.
        match self.send_photo_post(chat_id, url, post).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(chat = chat_id.0, error = %e, "photo send failed, falling back to text");
                self.send_text_post(chat_id, post).await
            }
        }
    }
}

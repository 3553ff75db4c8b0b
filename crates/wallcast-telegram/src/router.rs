use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;

use wallcast_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use wallcast_core::{
    config::Config, feed::FeedClient, messaging::port::MessagingPort, poller::Poller,
    registry::SharedRegistry, seen::SeenStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub registry: SharedRegistry,
    pub feed: Arc<dyn FeedClient>,
    pub messenger: Arc<dyn MessagingPort>,
}

/// Run the bot and the poll loop until Ctrl-C or until the poller aborts.
///
/// Shutdown order: the poller is cancelled first and allowed to finish its cycle
/// and persist, then the update dispatcher is stopped.
pub async fn run_polling(
    cfg: Arc<Config>,
    registry: SharedRegistry,
    feed: Arc<dyn FeedClient>,
    seen: SeenStore,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), "telegram connected"),
        Err(e) => tracing::warn!(error = %e, "get_me failed, continuing"),
    }

    // Every outbound call, forwarded posts and command replies alike, goes through the
    // throttling decorator. The adapter still retries a 429 once.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let poller = Poller::new(
        cfg.poller(),
        feed.clone(),
        messenger.clone(),
        registry.clone(),
        seen,
    );

    let state = Arc::new(AppState {
        cfg,
        registry,
        feed,
        messenger,
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_channel_post));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();
    let shutdown = dispatcher.shutdown_token();

    let phases = poller.phases();
    let cancel = CancellationToken::new();
    let mut poller_task = tokio::spawn(poller.run(cancel.clone()));

    let supervisor = tokio::spawn(async move {
        let outcome = tokio::select! {
            res = &mut poller_task => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                cancel.cancel();
                poller_task.await
            }
        };
        let final_phase = *phases.borrow();
        tracing::info!(phase = ?final_phase, "poller finished");

        // The dispatcher may not be running yet if the poller died right away.
        for _ in 0..50 {
            match shutdown.shutdown() {
                Ok(done) => {
                    done.await;
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        outcome
    });

    dispatcher.dispatch().await;

    let poller_result = supervisor
        .await
        .map_err(|e| anyhow::anyhow!("supervisor task failed: {e}"))?
        .map_err(|e| anyhow::anyhow!("poller task failed: {e}"))?;
    poller_result?;

    tracing::info!("shut down cleanly");
    Ok(())
}

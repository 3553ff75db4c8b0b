use std::{process::ExitCode, sync::Arc};

use wallcast_core::{
    config::Config, feed::FeedClient, registry::SubscriptionRegistry, seen::SeenStore, Error,
};
use wallcast_vk::VkClient;

#[tokio::main]
async fn main() -> ExitCode {
    // Held until exit so buffered file log lines are flushed.
    let _log_guard = match wallcast_core::logging::init("wallcast") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<Error>()
                .map(Error::exit_code)
                .unwrap_or(4);
            tracing::error!(error = %e, code, "fatal");
            ExitCode::from(code)
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = Arc::new(Config::load()?);
    let vk_token = cfg.require_vk_token()?;

    let registry = SubscriptionRegistry::load(&cfg.registry_file)?.into_shared();
    let seen = SeenStore::load(&cfg.seen_file)?;

    let feed: Arc<dyn FeedClient> = Arc::new(VkClient::new(
        vk_token,
        cfg.vk_api_version.clone(),
        cfg.vk_request_timeout,
    )?);

    tracing::info!(
        registry = %cfg.registry_file.display(),
        seen = %cfg.seen_file.display(),
        interval_secs = cfg.poll_interval.as_secs(),
        "starting"
    );

    wallcast_telegram::router::run_polling(cfg.clone(), registry, feed, seen).await
}

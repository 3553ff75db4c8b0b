//! The poll loop: refresh authors, fetch walls, drop seen posts, fan out the rest.
//!
//! One task drives everything sequentially. The poller owns the seen-set and the
//! author cache; the subscription registry is shared with command handlers and is
//! only locked for short reads, never across a network call.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    dispatch,
    domain::{AuthorProfile, CanonicalPost, SourceId},
    feed::FeedClient,
    formatting::{escape_html, truncate_text},
    messaging::port::MessagingPort,
    normalize::normalize_batch,
    registry::SharedRegistry,
    seen::SeenStore,
    Result,
};

const ANNOUNCE_MAX_CHARS: usize = 3500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub refresh_every_cycles: u32,
    pub posts_per_fetch: u32,
    /// Pause between author lookups during a refresh.
    pub refresh_delay: Duration,
    /// Pause between consecutive outbound messages.
    pub send_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            refresh_every_cycles: 60,
            posts_per_fetch: 4,
            refresh_delay: Duration::from_millis(350),
            send_delay: Duration::from_secs(2),
        }
    }
}

/// Where the loop currently is. Published on a watch channel, see [`Poller::phases`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
    Polling,
    Dispatching,
    Sleeping,
    Aborted,
}

/// Outcome of one cycle, logged by [`Poller::run`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub refreshed: bool,
    pub new_posts: usize,
    pub delivered: usize,
    pub failed_sends: usize,
    pub feed_errors: Vec<String>,
    pub announced: usize,
}

#[derive(Clone, Debug)]
struct SourceSnapshot {
    source: SourceId,
    author: AuthorProfile,
}

pub struct Poller {
    cfg: PollerConfig,
    feed: Arc<dyn FeedClient>,
    messenger: Arc<dyn MessagingPort>,
    registry: SharedRegistry,
    seen: SeenStore,

    snapshots: Vec<SourceSnapshot>,
    tracked_at_refresh: Option<Vec<SourceId>>,
    cycles_since_refresh: u32,
    refresh_incomplete: bool,
    phase: watch::Sender<Phase>,
}

impl Poller {
    pub fn new(
        cfg: PollerConfig,
        feed: Arc<dyn FeedClient>,
        messenger: Arc<dyn MessagingPort>,
        registry: SharedRegistry,
        seen: SeenStore,
    ) -> Self {
        Self {
            cfg,
            feed,
            messenger,
            registry,
            seen,
            snapshots: Vec::new(),
            tracked_at_refresh: None,
            cycles_since_refresh: 0,
            refresh_incomplete: false,
            phase: watch::Sender::new(Phase::Idle),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Follow phase changes, including the final one after [`Poller::run`]
    /// has consumed the poller.
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }

    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }

    /// Run cycles until `cancel` fires.
    ///
    /// Cancellation is observed between cycles and during the sleep, so an
    /// in-flight dispatch always completes. Returns an error only when the
    /// seen-set can no longer be persisted.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            interval_secs = self.cfg.poll_interval.as_secs(),
            "poller started"
        );

        while !cancel.is_cancelled() {
            match self.run_cycle().await {
                Ok(report) => log_report(&report),
                Err(e) => {
                    self.enter(Phase::Aborted);
                    tracing::error!(error = %e, "poller aborted");
                    return Err(e);
                }
            }

            self.enter(Phase::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.cfg.poll_interval) => {}
            }
        }

        if let Err(e) = self.seen.persist_if_dirty() {
            self.enter(Phase::Aborted);
            tracing::error!(error = %e, "final persist failed");
            return Err(e);
        }
        self.enter(Phase::Idle);
        tracing::info!("poller stopped");
        Ok(())
    }

    /// One refresh → poll → dispatch → announce pass. Does not sleep afterwards.
    ///
    /// Ends in [`Phase::Idle`] on success. On error the phase is left where the
    /// cycle stopped and [`Poller::run`] moves it to [`Phase::Aborted`].
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let tracked = { self.registry.lock().await.state().tracked_ids() };
        if self.needs_refresh(&tracked) {
            self.enter(Phase::Refreshing);
            self.refresh(&tracked, &mut report).await;
            report.refreshed = true;
        }
        self.cycles_since_refresh = self.cycles_since_refresh.saturating_add(1);

        self.enter(Phase::Polling);
        let mut batches = Vec::new();
        for idx in 0..self.snapshots.len() {
            let source = self.snapshots[idx].source;
            let raw = match self
                .feed
                .fetch_recent_posts(source, self.cfg.posts_per_fetch)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "wall fetch failed");
                    report.feed_errors.push(format!("{source}: {e}"));
                    continue;
                }
            };

            let posts = normalize_batch(&mut self.seen, source, &raw)?;
            if !posts.is_empty() {
                report.new_posts += posts.len();
                batches.push((idx, posts));
            }
        }

        self.enter(Phase::Dispatching);
        for (idx, posts) in batches {
            let snapshot = self.snapshots[idx].clone();
            self.dispatch(&snapshot, &posts, &mut report).await;
        }

        if !report.feed_errors.is_empty() {
            report.announced = self.announce(&report.feed_errors).await;
        }

        self.enter(Phase::Idle);
        Ok(report)
    }

    fn needs_refresh(&self, tracked: &[SourceId]) -> bool {
        self.snapshots.is_empty()
            || self.refresh_incomplete
            || self.tracked_at_refresh.as_deref() != Some(tracked)
            || self.cycles_since_refresh >= self.cfg.refresh_every_cycles
    }

    /// Re-fetch every author profile. A failed lookup keeps the previous snapshot
    /// for that source (if any) and schedules another refresh for the next cycle.
    async fn refresh(&mut self, tracked: &[SourceId], report: &mut CycleReport) {
        let mut fresh = Vec::with_capacity(tracked.len());
        let mut complete = true;

        for (i, source) in tracked.iter().copied().enumerate() {
            if i > 0 && !self.cfg.refresh_delay.is_zero() {
                sleep(self.cfg.refresh_delay).await;
            }

            match self.feed.fetch_author_profile(source).await {
                Ok(author) => fresh.push(SourceSnapshot { source, author }),
                Err(e) => {
                    complete = false;
                    tracing::warn!(source = %source, error = %e, "author refresh failed");
                    report.feed_errors.push(format!("{source}: {e}"));
                    if let Some(old) = self.snapshots.iter().find(|s| s.source == source) {
                        fresh.push(old.clone());
                    }
                }
            }
        }

        tracing::debug!(sources = fresh.len(), complete, "author cache refreshed");
        self.snapshots = fresh;
        self.tracked_at_refresh = Some(tracked.to_vec());
        self.cycles_since_refresh = 0;
        self.refresh_incomplete = !complete;
    }

    async fn dispatch(
        &self,
        snapshot: &SourceSnapshot,
        posts: &[CanonicalPost],
        report: &mut CycleReport,
    ) {
        let destinations = {
            self.registry
                .lock()
                .await
                .state()
                .subscribers_of(snapshot.source)
        };
        if destinations.is_empty() {
            tracing::debug!(source = %snapshot.source, "no subscribers, dropping new posts");
            return;
        }

        for msg in dispatch::fan_out(posts, &snapshot.author, &destinations) {
            let attempted = report.delivered + report.failed_sends;
            if attempted > 0 && !self.cfg.send_delay.is_zero() {
                sleep(self.cfg.send_delay).await;
            }

            match self.messenger.send_post(msg.destination, &msg.post).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed_sends += 1;
                    tracing::warn!(
                        source = %snapshot.source,
                        chat = msg.destination.0,
                        error = %e,
                        "delivery failed"
                    );
                }
            }
        }
    }

    /// One message per announcement chat, covering every feed error of the cycle.
    async fn announce(&self, errors: &[String]) -> usize {
        tracing::error!(errors = errors.len(), "feed unavailable this cycle");

        let targets = {
            self.registry
                .lock()
                .await
                .state()
                .error_announcement_channels
                .clone()
        };

        let details = truncate_text(&errors.join("\n"), ANNOUNCE_MAX_CHARS);
        let html = format!("⚠️ <b>Feed unavailable</b>\n\n{}", escape_html(&details));

        let mut sent = 0;
        for chat in targets {
            match self.messenger.send_html(chat, &html).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(chat = chat.0, error = %e, "error announcement failed")
                }
            }
        }
        sent
    }
}

fn log_report(report: &CycleReport) {
    if report.new_posts == 0 && report.feed_errors.is_empty() {
        tracing::debug!(refreshed = report.refreshed, "cycle idle");
        return;
    }
    tracing::info!(
        refreshed = report.refreshed,
        new_posts = report.new_posts,
        delivered = report.delivered,
        failed_sends = report.failed_sends,
        feed_errors = report.feed_errors.len(),
        announced = report.announced,
        "cycle finished"
    );
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex as StdMutex,
    };

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        dispatch::OutboundPost,
        domain::{ChatId, PostId},
        feed::RawPost,
        registry::SubscriptionRegistry,
        Error,
    };

    /// Phase the poller was in whenever a fake was called.
    #[derive(Default)]
    struct PhaseLog {
        rx: StdMutex<Option<watch::Receiver<Phase>>>,
        calls: StdMutex<Vec<(&'static str, Phase)>>,
    }

    impl PhaseLog {
        fn record(&self, call: &'static str) {
            if let Some(rx) = self.rx.lock().unwrap().as_ref() {
                let phase = *rx.borrow();
                self.calls.lock().unwrap().push((call, phase));
            }
        }

        fn calls(&self) -> Vec<(&'static str, Phase)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct FakeFeed {
        posts: StdMutex<HashMap<SourceId, Vec<RawPost>>>,
        down: StdMutex<bool>,
        failing_profiles: StdMutex<HashSet<SourceId>>,
        profile_calls: StdMutex<usize>,
        post_calls: StdMutex<Vec<SourceId>>,
        log: Arc<PhaseLog>,
    }

    impl FakeFeed {
        fn set_profile_failing(&self, source: SourceId, failing: bool) {
            let mut set = self.failing_profiles.lock().unwrap();
            if failing {
                set.insert(source);
            } else {
                set.remove(&source);
            }
        }

        fn polled(&self, source: SourceId) -> bool {
            self.post_calls.lock().unwrap().contains(&source)
        }

        fn forget_polls(&self) {
            self.post_calls.lock().unwrap().clear();
        }

        fn set_posts(&self, source: SourceId, posts: Vec<RawPost>) {
            self.posts.lock().unwrap().insert(source, posts);
        }

        fn set_down(&self, down: bool) {
            *self.down.lock().unwrap() = down;
        }

        fn profile_calls(&self) -> usize {
            *self.profile_calls.lock().unwrap()
        }

        fn check_up(&self) -> Result<()> {
            if *self.down.lock().unwrap() {
                return Err(Error::FeedUnavailable("rate limited".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl FeedClient for FakeFeed {
        async fn fetch_recent_posts(&self, source: SourceId, _count: u32) -> Result<Vec<RawPost>> {
            self.log.record("posts");
            self.post_calls.lock().unwrap().push(source);
            self.check_up()?;
            Ok(self
                .posts
                .lock()
                .unwrap()
                .get(&source)
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_author_profile(&self, source: SourceId) -> Result<AuthorProfile> {
            self.log.record("profile");
            *self.profile_calls.lock().unwrap() += 1;
            self.check_up()?;
            if self.failing_profiles.lock().unwrap().contains(&source) {
                return Err(Error::FeedUnavailable(format!("no profile for {source}")));
            }
            Ok(AuthorProfile {
                id: source.bare(),
                display_name: format!("Public {}", source.bare()),
                avatar_url: "https://img/a.jpg".to_string(),
                profile_url: format!("https://vk.com/public{}", source.bare()),
            })
        }

        async fn probe_exists(&self, _source: SourceId) -> Result<bool> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct FakeMessenger {
        posts: StdMutex<Vec<(ChatId, OutboundPost)>>,
        html: StdMutex<Vec<(ChatId, String)>>,
        broken: StdMutex<HashSet<ChatId>>,
        log: Arc<PhaseLog>,
    }

    impl FakeMessenger {
        fn posts_to(&self, chat: ChatId) -> Vec<OutboundPost> {
            self.posts
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == chat)
                .map(|(_, p)| p.clone())
                .collect()
        }

        fn html_to(&self, chat: ChatId) -> Vec<String> {
            self.html
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == chat)
                .map(|(_, h)| h.clone())
                .collect()
        }

        fn check(&self, chat: ChatId) -> Result<()> {
            if self.broken.lock().unwrap().contains(&chat) {
                return Err(Error::SendFailed("chat not found".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
            self.log.record("html");
            self.check(chat_id)?;
            self.html.lock().unwrap().push((chat_id, html.to_string()));
            Ok(())
        }

        async fn send_post(&self, chat_id: ChatId, post: &OutboundPost) -> Result<()> {
            self.log.record("post");
            self.check(chat_id)?;
            self.posts.lock().unwrap().push((chat_id, post.clone()));
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        feed: Arc<FakeFeed>,
        messenger: Arc<FakeMessenger>,
        registry: SharedRegistry,
        log: Arc<PhaseLog>,
        poller: Poller,
    }

    fn test_cfg() -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_secs(3600),
            refresh_every_cycles: 60,
            posts_per_fetch: 4,
            refresh_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
        }
    }

    fn harness(cfg: PollerConfig) -> Harness {
        harness_with_seen_at(cfg, "seen.json")
    }

    fn harness_with_seen_at(cfg: PollerConfig, seen_rel: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let registry = SubscriptionRegistry::load(dir.path().join("config.json"))
            .unwrap()
            .into_shared();
        let seen = SeenStore::load(dir.path().join(seen_rel)).unwrap();
        let log = Arc::new(PhaseLog::default());
        let feed = Arc::new(FakeFeed {
            log: log.clone(),
            ..FakeFeed::default()
        });
        let messenger = Arc::new(FakeMessenger {
            log: log.clone(),
            ..FakeMessenger::default()
        });
        let poller = Poller::new(cfg, feed.clone(), messenger.clone(), registry.clone(), seen);
        *log.rx.lock().unwrap() = Some(poller.phases());
        Harness {
            _dir: dir,
            feed,
            messenger,
            registry,
            log,
            poller,
        }
    }

    async fn subscribe(h: &Harness, source: i64, chat: i64) {
        h.registry
            .lock()
            .await
            .add_subscription(SourceId(source), ChatId(chat));
    }

    fn raw(id: i64, from_id: i64, text: &str, date: i64) -> RawPost {
        serde_json::from_value(json!({
            "id": id, "from_id": from_id, "text": text, "attachments": [], "date": date
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn example_post_is_delivered_once() {
        let mut h = harness(test_cfg());
        subscribe(&h, -100, 555).await;
        h.feed.set_posts(
            SourceId(-100),
            vec![raw(42, -100, "Goal!\nDetails here", 1700000000)],
        );

        let first = h.poller.run_cycle().await.unwrap();
        assert_eq!(first.new_posts, 1);
        assert_eq!(first.delivered, 1);

        let sent = h.messenger.posts_to(ChatId(555));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title.as_deref(), Some("Goal!"));
        assert_eq!(sent[0].body.as_deref(), Some("Details here"));
        assert_eq!(sent[0].title_url, "https://vk.com/wall-100_42");
        assert_eq!(sent[0].author_name, "Public 100");

        let second = h.poller.run_cycle().await.unwrap();
        assert_eq!(second.new_posts, 0);
        assert_eq!(second.delivered, 0);
        assert_eq!(h.messenger.posts_to(ChatId(555)).len(), 1);
        assert!(h.poller.seen().is_seen(SourceId(-100), PostId(42)));
    }

    #[tokio::test]
    async fn feed_outage_announces_once_and_next_cycle_runs() {
        let mut h = harness(test_cfg());
        subscribe(&h, -100, 555).await;
        subscribe(&h, -200, 555).await;
        {
            let mut reg = h.registry.lock().await;
            reg.add_error_announcement_target(ChatId(1));
            reg.add_error_announcement_target(ChatId(2));
        }
        h.feed.set_posts(SourceId(-100), vec![raw(1, -100, "a", 10)]);

        // Warm the author cache, then take the feed down.
        h.poller.run_cycle().await.unwrap();
        h.feed.set_down(true);
        h.feed.set_posts(SourceId(-100), vec![raw(2, -100, "b", 20)]);

        let down = h.poller.run_cycle().await.unwrap();
        assert_eq!(down.feed_errors.len(), 2);
        assert_eq!(down.announced, 2);
        assert_eq!(h.messenger.html_to(ChatId(1)).len(), 1);
        assert_eq!(h.messenger.html_to(ChatId(2)).len(), 1);
        assert!(h.messenger.html_to(ChatId(1))[0].contains("rate limited"));

        h.feed.set_down(false);
        let up = h.poller.run_cycle().await.unwrap();
        assert!(up.feed_errors.is_empty());
        assert_eq!(up.delivered, 1);
        assert_eq!(h.messenger.html_to(ChatId(1)).len(), 1);
    }

    #[tokio::test]
    async fn one_broken_destination_does_not_block_the_rest() {
        let mut h = harness(test_cfg());
        subscribe(&h, -100, 1).await;
        subscribe(&h, -100, 2).await;
        h.messenger.broken.lock().unwrap().insert(ChatId(1));
        h.feed.set_posts(
            SourceId(-100),
            vec![raw(2, -100, "second", 20), raw(1, -100, "first", 10)],
        );

        let report = h.poller.run_cycle().await.unwrap();
        assert_eq!(report.failed_sends, 2);
        assert_eq!(report.delivered, 2);

        let titles: Vec<_> = h
            .messenger
            .posts_to(ChatId(2))
            .into_iter()
            .filter_map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn refresh_happens_on_new_source_and_on_schedule() {
        let mut cfg = test_cfg();
        cfg.refresh_every_cycles = 3;
        let mut h = harness(cfg);
        subscribe(&h, -100, 555).await;

        assert!(h.poller.run_cycle().await.unwrap().refreshed);
        assert_eq!(h.feed.profile_calls(), 1);
        assert!(!h.poller.run_cycle().await.unwrap().refreshed);

        subscribe(&h, -200, 555).await;
        assert!(h.poller.run_cycle().await.unwrap().refreshed);
        assert_eq!(h.feed.profile_calls(), 3);

        assert!(!h.poller.run_cycle().await.unwrap().refreshed);
        assert!(!h.poller.run_cycle().await.unwrap().refreshed);
        assert!(h.poller.run_cycle().await.unwrap().refreshed);
    }

    #[tokio::test]
    async fn subscriber_added_mid_run_gets_later_posts() {
        let mut h = harness(test_cfg());
        subscribe(&h, -100, 1).await;
        h.poller.run_cycle().await.unwrap();

        subscribe(&h, -100, 2).await;
        h.feed.set_posts(SourceId(-100), vec![raw(5, -100, "hi", 50)]);
        h.poller.run_cycle().await.unwrap();

        assert_eq!(h.messenger.posts_to(ChatId(1)).len(), 1);
        assert_eq!(h.messenger.posts_to(ChatId(2)).len(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancel_and_persists() {
        let h = harness(test_cfg());
        subscribe(&h, -100, 555).await;
        h.feed.set_posts(SourceId(-100), vec![raw(42, -100, "x", 1)]);

        let seen_path = h.poller.seen().path().to_path_buf();
        let mut phases = h.poller.phases();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.poller.run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p == Phase::Sleeping))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.messenger.posts_to(ChatId(555)).len(), 1);
        cancel.cancel();

        let res = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(res.is_ok());
        assert_eq!(*phases.borrow(), Phase::Idle);
        assert_eq!(h.messenger.posts_to(ChatId(555)).len(), 1);

        let reloaded = SeenStore::load(&seen_path).unwrap();
        assert!(reloaded.is_seen(SourceId(-100), PostId(42)));
    }

    #[tokio::test]
    async fn cycle_walks_through_phases_and_ends_idle() {
        let mut h = harness(test_cfg());
        subscribe(&h, -100, 555).await;
        h.registry
            .lock()
            .await
            .add_error_announcement_target(ChatId(9));
        h.feed.set_posts(SourceId(-100), vec![raw(1, -100, "a", 10)]);
        assert_eq!(h.poller.phase(), Phase::Idle);

        h.poller.run_cycle().await.unwrap();
        assert_eq!(
            h.log.calls(),
            vec![
                ("profile", Phase::Refreshing),
                ("posts", Phase::Polling),
                ("post", Phase::Dispatching),
            ]
        );
        assert_eq!(h.poller.phase(), Phase::Idle);

        h.feed.set_down(true);
        h.poller.run_cycle().await.unwrap();
        let calls = h.log.calls();
        assert_eq!(calls[3..], [("posts", Phase::Polling), ("html", Phase::Dispatching)]);
        assert_eq!(h.poller.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn failed_author_lookup_keeps_old_snapshot_and_retries() {
        let mut h = harness(test_cfg());
        subscribe(&h, -100, 555).await;
        assert!(h.poller.run_cycle().await.unwrap().refreshed);

        // Force a refresh with a new source while both lookups fail.
        h.feed.set_profile_failing(SourceId(-100), true);
        h.feed.set_profile_failing(SourceId(-200), true);
        subscribe(&h, -200, 555).await;
        h.feed.set_posts(SourceId(-100), vec![raw(1, -100, "old author", 10)]);
        h.feed.set_posts(SourceId(-200), vec![raw(7, -200, "new wall", 70)]);
        h.feed.forget_polls();

        let partial = h.poller.run_cycle().await.unwrap();
        assert!(partial.refreshed);
        assert_eq!(partial.feed_errors.len(), 2);
        assert_eq!(partial.delivered, 1);
        assert!(h.feed.polled(SourceId(-100)));
        assert!(!h.feed.polled(SourceId(-200)));
        let sent = h.messenger.posts_to(ChatId(555));
        assert_eq!(sent[0].author_name, "Public 100");

        // Still incomplete: refresh again, the new wall stays unpolled.
        h.feed.set_profile_failing(SourceId(-100), false);
        h.feed.forget_polls();
        let retry = h.poller.run_cycle().await.unwrap();
        assert!(retry.refreshed);
        assert_eq!(retry.feed_errors.len(), 1);
        assert!(!h.feed.polled(SourceId(-200)));

        h.feed.set_profile_failing(SourceId(-200), false);
        let healed = h.poller.run_cycle().await.unwrap();
        assert!(healed.refreshed);
        assert!(healed.feed_errors.is_empty());
        assert_eq!(healed.delivered, 1);
        assert!(h.feed.polled(SourceId(-200)));
        assert_eq!(h.messenger.posts_to(ChatId(555)).len(), 2);

        assert!(!h.poller.run_cycle().await.unwrap().refreshed);
    }

    #[tokio::test]
    async fn run_aborts_when_seen_set_cannot_be_saved() {
        let h = harness_with_seen_at(test_cfg(), "state/seen.json");
        subscribe(&h, -100, 555).await;
        h.feed.set_posts(SourceId(-100), vec![raw(42, -100, "x", 1)]);

        // Turn the state directory into a plain file so the next write fails.
        let state_dir = h.poller.seen().path().parent().unwrap().to_path_buf();
        std::fs::remove_dir_all(&state_dir).unwrap();
        std::fs::write(&state_dir, b"not a directory").unwrap();

        let mut phases = h.poller.phases();
        let res = tokio::time::timeout(Duration::from_secs(5), h.poller.run(CancellationToken::new()))
            .await
            .unwrap();
        assert!(matches!(res, Err(Error::Io(_))), "{res:?}");
        assert_eq!(*phases.borrow_and_update(), Phase::Aborted);
        assert!(h.messenger.posts_to(ChatId(555)).is_empty());
    }
}

//! Service state: the tracker behind a single-flight guard, its
//! collaborators, and the background stats/schedule tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;

use posbill_billing::{
    render_batch, BatchStats, BatchTracker, DatasetSummary, DispatchReport, InvoiceRenderer,
    Mailer,
};
use posbill_core::{BillingError, BillingPeriod, BillingResult, Month};

/// Day of month on which the scheduled run fires.
const AUTO_RUN_DAY: u32 = 5;
/// Earliest hour (UTC) of the scheduled run on that day.
const AUTO_RUN_HOUR: u32 = 9;
/// How often the scheduler re-checks the clock.
const SCHEDULE_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Runtime knobs, read from the environment with logged fallbacks.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Deadline for a generation run.
    pub generate_timeout: Duration,
    /// Deadline for one email dispatch.
    pub dispatch_timeout: Duration,
    /// Interval of the background stats refresh.
    pub stats_interval: Duration,
    /// Whether the monthly auto-generation scheduler runs.
    pub auto_generate: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generate_timeout: Duration::from_secs(60),
            dispatch_timeout: Duration::from_secs(30),
            stats_interval: Duration::from_secs(30),
            auto_generate: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            generate_timeout: env_secs("GENERATE_TIMEOUT_SECS", defaults.generate_timeout),
            dispatch_timeout: env_secs("DISPATCH_TIMEOUT_SECS", defaults.dispatch_timeout),
            stats_interval: env_secs("STATS_INTERVAL_SECS", defaults.stats_interval),
            auto_generate: env_flag("AUTO_GENERATE", defaults.auto_generate),
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!(key, raw, "unparsable duration override; using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.trim(), "1" | "true" | "TRUE" | "True"),
        Err(_) => default,
    }
}

/// Shared application services.
///
/// The tracker sits behind a `tokio::sync::Mutex`; every operator-triggered
/// operation takes it with `try_lock`, so a second in-flight request fails
/// fast with `Busy` instead of queueing or interleaving.
pub struct AppServices {
    tracker: Mutex<BatchTracker>,
    renderer: Arc<dyn InvoiceRenderer>,
    mailer: Arc<dyn Mailer>,
    config: AppConfig,
    /// Last published stats snapshot. Updated with `send_replace`, which
    /// stores the value whether or not a receiver exists.
    stats_tx: watch::Sender<BatchStats>,
}

impl AppServices {
    pub fn new(
        config: AppConfig,
        renderer: Arc<dyn InvoiceRenderer>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let tracker = BatchTracker::new();
        let stats_tx = watch::Sender::new(tracker.stats());
        Self {
            tracker: Mutex::new(tracker),
            renderer,
            mailer,
            config,
            stats_tx,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> BillingResult<DatasetSummary> {
        let mut tracker = self.tracker.try_lock().map_err(|_| BillingError::Busy)?;
        tracker.ingest(filename, bytes, chrono::Utc::now())
    }

    /// Generate a batch for `period` under the configured deadline.
    ///
    /// The tracker stays locked for the whole run (single-flight), but the
    /// rendering itself happens on the blocking pool so the deadline can
    /// actually interrupt the wait. On expiry the orphaned render finishes in
    /// the background and its output is dropped; the prior batch stays
    /// current.
    pub async fn generate(&self, period: BillingPeriod, confirmed: bool) -> BillingResult<usize> {
        let mut tracker = self.tracker.try_lock().map_err(|_| BillingError::Busy)?;
        let plan = tracker.generation_plan(confirmed)?;
        let planned: Vec<String> = plan.iter().map(|(name, _)| name.clone()).collect();

        let renderer = Arc::clone(&self.renderer);
        let now = chrono::Utc::now();
        let render =
            tokio::task::spawn_blocking(move || render_batch(renderer.as_ref(), &plan, period, now));

        let batch = match timeout(self.config.generate_timeout, render).await {
            Ok(Ok(rendered)) => rendered?,
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "render task aborted");
                return Err(BillingError::PartialGeneration {
                    succeeded: Vec::new(),
                    failed: planned
                        .into_iter()
                        .map(|name| (name, "render task aborted".to_string()))
                        .collect(),
                });
            }
            Err(_) => return Err(BillingError::Timeout),
        };

        let count = batch.len();
        tracker.install_batch(batch);
        Ok(count)
    }

    pub async fn email(
        &self,
        recipient: &str,
        filenames: &[String],
    ) -> BillingResult<DispatchReport> {
        // The lock is held across the send so the selection cannot change
        // under a dispatch in flight.
        let mut tracker = self.tracker.try_lock().map_err(|_| BillingError::Busy)?;
        let message = tracker.prepare_email(recipient, filenames)?;
        let recipient = message.recipient.clone();
        let sent = message.attachments.len();

        match timeout(self.config.dispatch_timeout, self.mailer.send(message)).await {
            Ok(Ok(())) => {
                tracker.confirm_dispatch();
                Ok(DispatchReport { recipient, sent })
            }
            Ok(Err(e)) => Err(BillingError::dispatch(e.0)),
            Err(_) => Err(BillingError::Timeout),
        }
    }

    /// ZIP archive of the current batch, plus its download filename.
    pub async fn download_all(&self) -> BillingResult<(String, Vec<u8>)> {
        let tracker = self.tracker.try_lock().map_err(|_| BillingError::Busy)?;
        let bytes = tracker.download_all()?;
        Ok((posbill_billing::dispatch::archive_filename(chrono::Utc::now()), bytes))
    }

    /// One artifact's filename + bytes, for preview or single download.
    pub async fn artifact(&self, filename: &str) -> BillingResult<(String, Vec<u8>)> {
        let tracker = self.tracker.try_lock().map_err(|_| BillingError::Busy)?;
        let artifact = tracker.artifact(filename)?;
        Ok((artifact.filename().to_string(), artifact.bytes().to_vec()))
    }

    /// Live stats when the tracker is free; last snapshot when it is busy.
    pub async fn latest_stats(&self) -> BatchStats {
        match self.tracker.try_lock() {
            Ok(tracker) => {
                let stats = tracker.stats();
                self.stats_tx.send_replace(stats.clone());
                stats
            }
            Err(_) => self.stats_tx.borrow().clone(),
        }
    }

    fn refresh_stats(&self) -> Result<(), &'static str> {
        let tracker = self.tracker.try_lock().map_err(|_| "tracker busy")?;
        self.stats_tx.send_replace(tracker.stats());
        Ok(())
    }
}

/// Periodic status refresh, decoupled from the main workflow: its failures
/// are logged, never surfaced to the operator.
pub fn spawn_stats_poller(services: Arc<AppServices>) {
    let period = services.config.stats_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(reason) = services.refresh_stats() {
                tracing::warn!(reason, "stats refresh skipped");
            }
        }
    });
}

/// The scheduled run due at `now`, if any: on the 5th of each month from
/// 09:00 UTC, the preceding month's batch — once per cycle.
fn due_auto_period(
    now: DateTime<Utc>,
    last_run: Option<BillingPeriod>,
) -> Option<BillingPeriod> {
    if now.day() != AUTO_RUN_DAY || now.hour() < AUTO_RUN_HOUR {
        return None;
    }
    let (month, year) = match now.month() {
        1 => (Month::December, now.year() - 1),
        m => (Month::from_number(m - 1)?, now.year()),
    };
    let period = BillingPeriod::new(month, u16::try_from(year).ok()?).ok()?;
    if last_run == Some(period) {
        return None;
    }
    Some(period)
}

/// Monthly auto-generation: a clock check on an hourly tick, with the
/// schedule itself standing in for operator confirmation.
///
/// A busy tracker defers to the next tick; any other failure is logged and
/// not retried until the next cycle.
pub fn spawn_generation_scheduler(services: Arc<AppServices>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SCHEDULE_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_run: Option<BillingPeriod> = None;
        loop {
            ticker.tick().await;
            let Some(period) = due_auto_period(chrono::Utc::now(), last_run) else {
                continue;
            };
            match services.generate(period, true).await {
                Ok(count) => {
                    tracing::info!(period = %period, count, "scheduled generation complete");
                    last_run = Some(period);
                }
                Err(BillingError::Busy) => {
                    tracing::info!(period = %period, "scheduled generation deferred: tracker busy");
                }
                Err(e) => {
                    tracing::warn!(period = %period, error = %e, "scheduled generation failed");
                    last_run = Some(period);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use posbill_billing::{BatchState, BillingRecord, MinimalPdfRenderer, RecordingMailer, RenderError};

    const CSV: &str = "Integration Name,vendor_code,Branch Name,Entity ID\n\
                       Grubtech,GT-1,Marina,E-1\n\
                       Limetray,LT-1,Downtown,E-2\n";

    fn october() -> BillingPeriod {
        BillingPeriod::new(Month::October, 2025).unwrap()
    }

    fn services_with(config: AppConfig, renderer: Arc<dyn InvoiceRenderer>) -> AppServices {
        AppServices::new(config, renderer, Arc::new(RecordingMailer::new()))
    }

    /// Renderer that sleeps before delegating to the real one.
    struct SlowRenderer(Duration);

    impl InvoiceRenderer for SlowRenderer {
        fn render(
            &self,
            integrator: &str,
            records: &[&BillingRecord],
            period: BillingPeriod,
        ) -> Result<Vec<u8>, RenderError> {
            std::thread::sleep(self.0);
            MinimalPdfRenderer.render(integrator, records, period)
        }
    }

    #[tokio::test]
    async fn refreshed_stats_are_served_while_tracker_is_busy() {
        let services = services_with(AppConfig::default(), Arc::new(MinimalPdfRenderer));
        services.upload("billing_oct.csv", CSV.as_bytes()).await.unwrap();
        services.generate(october(), true).await.unwrap();

        // Publishing must succeed with no receiver subscribed.
        services.refresh_stats().unwrap();

        // With the tracker held, the endpoint serves the last snapshot, not
        // the initial empty one.
        let _guard = services.tracker.lock().await;
        let stats = services.latest_stats().await;
        assert_eq!(stats.state, BatchState::Generated);
        assert_eq!(stats.total_invoices, 2);
    }

    #[tokio::test]
    async fn refresh_is_skipped_while_tracker_is_held() {
        let services = services_with(AppConfig::default(), Arc::new(MinimalPdfRenderer));
        let _guard = services.tracker.lock().await;
        assert_eq!(services.refresh_stats(), Err("tracker busy"));
    }

    #[tokio::test]
    async fn generate_times_out_on_slow_renderer() {
        let config = AppConfig {
            generate_timeout: Duration::from_millis(20),
            ..AppConfig::default()
        };
        let slow = SlowRenderer(Duration::from_millis(300));
        let services = services_with(config, Arc::new(slow));
        services.upload("billing_oct.csv", CSV.as_bytes()).await.unwrap();

        let started = std::time::Instant::now();
        let err = services.generate(october(), true).await.unwrap_err();
        assert_eq!(err, BillingError::Timeout);
        // Two integrators at 300 ms each; the deadline must cut the wait.
        assert!(started.elapsed() < Duration::from_millis(250));

        // The run was abandoned; no batch was installed.
        let stats = services.latest_stats().await;
        assert_eq!(stats.state, BatchState::Loaded);
    }

    #[tokio::test]
    async fn artifact_lookup_fails_busy_while_tracker_is_held() {
        let services = services_with(AppConfig::default(), Arc::new(MinimalPdfRenderer));
        services.upload("billing_oct.csv", CSV.as_bytes()).await.unwrap();
        services.generate(october(), true).await.unwrap();

        let _guard = services.tracker.lock().await;
        let err = services.artifact("Grubtech_2025_October.pdf").await.unwrap_err();
        assert_eq!(err, BillingError::Busy);
    }

    #[test]
    fn auto_run_fires_on_the_fifth_for_the_preceding_month() {
        let now = Utc.with_ymd_and_hms(2025, 11, 5, 9, 0, 0).unwrap();
        let period = due_auto_period(now, None).unwrap();
        assert_eq!(period, october());

        // Deduplicated within the cycle.
        assert_eq!(due_auto_period(now, Some(period)), None);

        // January rolls back a year.
        let jan = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        assert_eq!(
            due_auto_period(jan, None),
            Some(BillingPeriod::new(Month::December, 2025).unwrap())
        );
    }

    #[test]
    fn auto_run_skips_other_days_and_early_hours() {
        let fourth = Utc.with_ymd_and_hms(2025, 11, 4, 12, 0, 0).unwrap();
        assert_eq!(due_auto_period(fourth, None), None);

        let early = Utc.with_ymd_and_hms(2025, 11, 5, 8, 59, 0).unwrap();
        assert_eq!(due_auto_period(early, None), None);
    }
}

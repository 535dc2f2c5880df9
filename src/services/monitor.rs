use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;

use crate::config::{MonitorSettings, MonitoredUserConfig, NotificationSettings};
use crate::db::SnapshotStore;
use crate::polymarket::PositionSource;
use crate::services::change_detector::{detect_changes, DetectOptions};
use crate::services::notifier::{send_events, EventNotifier};
use crate::services::resolver::WalletResolver;

/// What happened to one user in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    /// First sighting with notifications suppressed: snapshot stored, no diff.
    Baseline { positions: usize },
    /// Diffed against the stored snapshot.
    Reconciled { events: usize, sent: usize },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub users_processed: usize,
    pub users_failed: usize,
    pub baselines: usize,
    pub events_detected: usize,
    pub notifications_sent: usize,
}

fn detect_options(toggles: &NotificationSettings) -> DetectOptions {
    DetectOptions {
        detect_increases: toggles.on_position_increase,
        detect_closures: toggles.on_position_closed,
    }
}

/// Runs the resolve → fetch → reconcile → notify → persist pipeline for each
/// monitored user.
pub struct Monitor {
    resolver: Arc<dyn WalletResolver>,
    source: Arc<dyn PositionSource>,
    store: Arc<dyn SnapshotStore>,
    notifier: Arc<dyn EventNotifier>,
}

impl Monitor {
    pub fn new(
        resolver: Arc<dyn WalletResolver>,
        source: Arc<dyn PositionSource>,
        store: Arc<dyn SnapshotStore>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            resolver,
            source,
            store,
            notifier,
        }
    }

    /// One pass over every configured user, in configuration order. A failing
    /// user is logged and skipped; it never affects the others.
    pub async fn run_cycle(&self, settings: &MonitorSettings) -> CycleReport {
        let mut report = CycleReport::default();
        let users = &settings.monitored_users;

        metrics::counter!("poll_cycles_total").increment(1);
        metrics::gauge!("monitored_users").set(users.len() as f64);

        if users.is_empty() {
            tracing::warn!("No monitored users configured, nothing to do");
            return report;
        }

        tracing::info!(
            users = users.len(),
            started_at = %Utc::now().to_rfc3339(),
            "Cycle start"
        );

        for cfg in users {
            match self.process_user(cfg, settings).await {
                Ok(UserOutcome::Baseline { .. }) => {
                    report.users_processed += 1;
                    report.baselines += 1;
                }
                Ok(UserOutcome::Reconciled { events, sent }) => {
                    report.users_processed += 1;
                    report.events_detected += events;
                    report.notifications_sent += sent;
                }
                Err(e) => {
                    metrics::counter!("user_cycle_failures_total").increment(1);
                    tracing::error!(
                        user = %cfg.username,
                        error = %format!("{e:#}"),
                        "Error during cycle"
                    );
                    report.users_failed += 1;
                }
            }
        }

        tracing::info!(
            processed = report.users_processed,
            failed = report.users_failed,
            events = report.events_detected,
            sent = report.notifications_sent,
            "Cycle complete"
        );
        report
    }

    /// The per-user pipeline. Any error aborts this user only, before the
    /// snapshot is replaced.
    pub async fn process_user(
        &self,
        cfg: &MonitoredUserConfig,
        settings: &MonitorSettings,
    ) -> anyhow::Result<UserOutcome> {
        let address = if cfg.wallet_address.is_empty() {
            self.resolver.resolve(&cfg.username).await?
        } else {
            tracing::debug!(
                user = %cfg.username,
                address = %cfg.wallet_address,
                "Using configured wallet address"
            );
            cfg.wallet_address.clone()
        };
        let user = cfg.to_user().with_wallet(&address);

        tracing::debug!(user = %user.username, wallet = %user.wallet_short(), "Fetching positions");
        let current = self.source.fetch_positions(&address).await?;
        let captured_at = Utc::now();

        let previous = match self.store.get(&address)? {
            Some(previous) => previous,
            None if settings.first_run_suppress_notifications => {
                tracing::info!(
                    user = %user.username,
                    positions = current.len(),
                    "First run, storing positions as baseline (no notifications)"
                );
                self.store.put(&address, &current)?;
                return Ok(UserOutcome::Baseline {
                    positions: current.len(),
                });
            }
            None => {
                tracing::info!(
                    user = %user.username,
                    positions = current.len(),
                    "First run, reporting every position as new"
                );
                Vec::new()
            }
        };

        let events = detect_changes(
            &user,
            &current,
            &previous,
            detect_options(&settings.notifications),
            captured_at,
        );

        let sent = if events.is_empty() {
            tracing::info!(user = %user.username, "No changes detected");
            0
        } else {
            for event in &events {
                metrics::counter!("change_events_total", "event_type" => event.event_type.as_str())
                    .increment(1);
            }
            tracing::info!(
                user = %user.username,
                events = events.len(),
                "Change events detected"
            );
            let sent = send_events(self.notifier.as_ref(), &events, &settings.notifications).await;
            tracing::info!(user = %user.username, sent, "Sent Telegram notifications");
            sent
        };

        self.store.put(&address, &current)?;

        Ok(UserOutcome::Reconciled {
            events: events.len(),
            sent,
        })
    }
}

/// Poll until `shutdown` resolves. Shutdown is honoured between cycles and
/// during the inter-cycle sleep; a cycle cut short loses at most the user in
/// flight, whose snapshot is then simply not replaced.
///
/// When `settings_path` is given, the monitored-user list is re-read from it
/// before every cycle.
pub async fn run_poll_loop<F>(
    monitor: &Monitor,
    settings_path: Option<&Path>,
    mut settings: MonitorSettings,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tracing::info!(
        interval_secs = settings.polling_interval_seconds,
        users = settings.monitored_users.len(),
        "Position monitor started"
    );

    tokio::pin!(shutdown);

    loop {
        if let Some(path) = settings_path {
            reload_monitored_users(path, &mut settings);
        }
        let interval = Duration::from_secs(settings.polling_interval_seconds);

        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested, stopping poll loop");
                break;
            }
            _ = async {
                monitor.run_cycle(&settings).await;
                sleep(interval).await;
            } => {}
        }
    }
}

/// Hot-reload the user list. On failure the current list is kept.
fn reload_monitored_users(path: &Path, settings: &mut MonitorSettings) {
    match MonitorSettings::load(path) {
        Ok(fresh) => {
            if fresh.monitored_users != settings.monitored_users {
                tracing::info!(
                    before = settings.monitored_users.len(),
                    after = fresh.monitored_users.len(),
                    "Monitored users reloaded"
                );
            }
            settings.monitored_users = fresh.monitored_users;
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{e:#}"),
                "Failed to reload monitored users, keeping previous list"
            );
        }
    }
}

//! Per-service monitoring loop.
//!
//! Each cycle checks the maintenance window, probes the service up to
//! `max_tries` times, records the outcome in the registry and notifies on
//! UP/DOWN transitions. Cycles of one service never overlap.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use super::downtime::format_elapsed;
use super::models::{MonitoredService, ServiceStatus};
use super::registry::StatusRegistry;
use crate::notify::{Notification, Notifier, NotifyError, Transition};
use crate::probe::{ProbeError, Prober};

/// How often the maintenance window is re-evaluated while inside it.
pub const MAINTENANCE_POLL: Duration = Duration::from_secs(60);

/// Pause between failed attempts within one cycle.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Slack on top of the service timeout before an attempt is abandoned.
const ATTEMPT_GRACE: Duration = Duration::from_secs(2);

/// Collaborators shared by every service loop.
#[derive(Clone)]
pub struct MonitorContext {
    pub registry: StatusRegistry,
    pub prober: Arc<dyn Prober>,
    pub notifier: Arc<dyn Notifier>,
    /// Process timezone, used for notification timestamps.
    pub timezone: Tz,
}

/// Outcome of the probe attempts of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub attempts: u32,
    pub failures: u32,
    /// Reason of the most recent failed attempt.
    pub reason: Option<String>,
}

/// State machine for a single service.
pub struct ServiceLoop {
    service: Arc<MonitoredService>,
    ctx: MonitorContext,
    span: tracing::Span,
    in_maintenance: bool,
}

impl ServiceLoop {
    pub fn new(service: Arc<MonitoredService>, ctx: MonitorContext) -> Self {
        let span = tracing::info_span!(
            "service",
            name = %service.name(),
            kind = service.definition.check.name()
        );
        Self {
            service,
            ctx,
            span,
            in_maintenance: false,
        }
    }

    /// Run cycles forever.
    pub async fn run(mut self) {
        let span = self.span.clone();
        async move {
            loop {
                self.run_cycle().await;
            }
        }
        .instrument(span)
        .await
    }

    /// Run one cycle including its trailing sleep.
    pub async fn run_cycle(&mut self) {
        let now = Utc::now();

        if self.service.in_maintenance(now) {
            if !self.in_maintenance {
                tracing::info!("entering maintenance window");
                self.in_maintenance = true;
            }
            tracing::info!("status: {}", ServiceStatus::Maintenance);
            tokio::time::sleep(MAINTENANCE_POLL).await;
            return;
        } else if self.in_maintenance {
            tracing::info!("exiting maintenance window");
            self.in_maintenance = false;
        }

        let result = self.check().await;
        self.record(&result, now, Utc::now()).await;

        tokio::time::sleep(self.service.definition.interval).await;
    }

    /// Probe up to `max_tries` times, stopping at the first success.
    pub async fn check(&self) -> CheckResult {
        let def = &self.service.definition;
        let mut result = CheckResult {
            attempts: 0,
            failures: 0,
            reason: None,
        };

        for attempt in 1..=def.max_tries {
            result.attempts = attempt;
            tracing::debug!("attempt {}/{}", attempt, def.max_tries);

            match self.attempt().await {
                Ok(latency) => {
                    tracing::debug!("attempt {} successful in {:?}", attempt, latency);
                    break;
                }
                Err(e) => {
                    let reason = e.reason(&def.check);
                    tracing::debug!("attempt {} failed: {} ({})", attempt, reason, e);
                    result.failures += 1;
                    result.reason = Some(reason);
                }
            }

            if attempt < def.max_tries {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        result
    }

    /// One probe on its own task, so a panic or a hang stays contained.
    async fn attempt(&self) -> Result<Duration, ProbeError> {
        let def = &self.service.definition;
        let prober = self.ctx.prober.clone();
        let check = def.check.clone();
        let timeout = def.timeout;

        let handle = tokio::spawn(async move { prober.probe(&check, timeout).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(timeout + ATTEMPT_GRACE, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ProbeError::Task(e.to_string())),
            Err(_) => {
                abort.abort();
                Err(ProbeError::Timeout(timeout))
            }
        }
    }

    /// Store the cycle outcome and notify on a transition.
    ///
    /// `started` is the cycle start and becomes `last_check` and `down_since`;
    /// downtime and notification timestamps use `finished`.
    /// Returns the transition, if one happened.
    pub async fn record(
        &self,
        result: &CheckResult,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    ) -> Option<Transition> {
        let def = &self.service.definition;
        let previous = self.ctx.registry.get(&def.name);
        let was_down = previous.as_ref().is_some_and(|e| e.status == ServiceStatus::Down);
        let is_down = result.failures >= def.max_tries;

        let notification = if is_down {
            let down_since = match &previous {
                Some(entry) if was_down => entry.down_since,
                _ => Some(started),
            };
            self.ctx.registry.record(&def.name, ServiceStatus::Down, down_since, started);
            tracing::info!("status: {}", ServiceStatus::Down);

            (!was_down).then(|| self.notification(Transition::Down, result.reason.clone(), None, finished))
        } else {
            self.ctx.registry.record(&def.name, ServiceStatus::Up, None, started);
            tracing::info!("status: {}", ServiceStatus::Up);

            was_down.then(|| {
                let downtime = previous
                    .and_then(|entry| entry.down_since)
                    .map(|since| format_elapsed(finished - since));
                self.notification(Transition::Up, None, downtime, finished)
            })
        };

        let transition = notification.as_ref().map(|n| n.transition);
        if let Some(notification) = notification {
            self.deliver(notification).await;
        }
        transition
    }

    fn notification(
        &self,
        transition: Transition,
        reason: Option<String>,
        downtime: Option<String>,
        now: DateTime<Utc>,
    ) -> Notification {
        Notification {
            service: self.service.name().to_string(),
            transition,
            reason,
            downtime,
            timestamp: now.with_timezone(&self.ctx.timezone),
        }
    }

    /// Deliver on a separate task. A notifier panic surfaces as
    /// `NotifyError::Task`.
    async fn deliver(&self, notification: Notification) {
        let transition = notification.transition;
        let notifier = self.ctx.notifier.clone();

        let result = match tokio::spawn(async move { notifier.notify(notification).await }).await {
            Ok(result) => result,
            Err(e) => Err(NotifyError::Task(e.to_string())),
        };

        if let Err(e) = result {
            tracing::error!("Failed to send {} notification: {}", transition, e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::monitor::MaintenanceWindow;
    use chrono::{TimeDelta, TimeZone};

    fn service_loop(max_tries: u32, prober: Arc<ScriptedProber>, notifier: Arc<RecordingNotifier>) -> ServiceLoop {
        let service = Arc::new(MonitoredService::new(definition("db", max_tries), Tz::UTC));
        ServiceLoop::new(service, context(prober, notifier))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn failed(max_tries: u32) -> CheckResult {
        CheckResult {
            attempts: max_tries,
            failures: max_tries,
            reason: Some("Could not connect to port 5432".to_string()),
        }
    }

    fn passed() -> CheckResult {
        CheckResult {
            attempts: 1,
            failures: 0,
            reason: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_attempts_fail() {
        let prober = ScriptedProber::always(Step::Fail);
        let lp = service_loop(3, prober.clone(), Arc::default());

        let result = lp.check().await;
        assert_eq!(prober.calls(), 3);
        assert_eq!(result.failures, 3);
        assert_eq!(result.reason.as_deref(), Some("Could not connect to port 5432"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let prober = ScriptedProber::new([Step::Fail, Step::Pass], Step::Fail);
        let lp = service_loop(3, prober.clone(), Arc::default());

        let result = lp.check().await;
        assert_eq!(prober.calls(), 2);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_between_attempts() {
        let prober = ScriptedProber::always(Step::Fail);
        let lp = service_loop(3, prober, Arc::default());

        let started = tokio::time::Instant::now();
        lp.check().await;
        // Two pauses for three attempts, none after the last
        let elapsed = started.elapsed();
        assert!(elapsed >= RETRY_DELAY * 2 && elapsed < RETRY_DELAY * 3, "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_probe_counts_as_failure() {
        let prober = ScriptedProber::new([Step::Panic], Step::Pass);
        let lp = service_loop(1, prober, Arc::default());

        let result = lp.check().await;
        assert_eq!(result.failures, 1);
        assert!(result.reason.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_first_down_notifies() {
        let notifier = Arc::new(RecordingNotifier::default());
        let lp = service_loop(3, ScriptedProber::always(Step::Fail), notifier.clone());

        assert_eq!(lp.record(&failed(3), t0(), t0()).await, Some(Transition::Down));

        let entry = lp.ctx.registry.get("db").unwrap();
        assert_eq!(entry.status, ServiceStatus::Down);
        assert_eq!(entry.down_since, Some(t0()));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].transition, Transition::Down);
        assert_eq!(sent[0].reason.as_deref(), Some("Could not connect to port 5432"));
        assert_eq!(sent[0].downtime, None);
    }

    #[tokio::test]
    async fn test_first_up_is_silent() {
        let notifier = Arc::new(RecordingNotifier::default());
        let lp = service_loop(3, ScriptedProber::always(Step::Pass), notifier.clone());

        assert_eq!(lp.record(&passed(), t0(), t0()).await, None);
        assert_eq!(lp.ctx.registry.status("db"), ServiceStatus::Up);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_down_notifies_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let lp = service_loop(3, ScriptedProber::always(Step::Fail), notifier.clone());

        lp.record(&failed(3), t0(), t0()).await;
        let later = t0() + TimeDelta::minutes(5);
        assert_eq!(lp.record(&failed(3), later, later).await, None);

        let entry = lp.ctx.registry.get("db").unwrap();
        assert_eq!(entry.down_since, Some(t0()));
        assert_eq!(entry.last_check, later);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_reports_downtime() {
        let notifier = Arc::new(RecordingNotifier::default());
        let lp = service_loop(3, ScriptedProber::always(Step::Pass), notifier.clone());

        lp.record(&failed(3), t0(), t0()).await;

        // Downtime runs until the recovering cycle finished, not until it started
        let started = t0() + TimeDelta::seconds(3600);
        let finished = t0() + TimeDelta::seconds(3661);
        assert_eq!(lp.record(&passed(), started, finished).await, Some(Transition::Up));

        let entry = lp.ctx.registry.get("db").unwrap();
        assert_eq!(entry.status, ServiceStatus::Up);
        assert_eq!(entry.down_since, None);
        assert_eq!(entry.last_check, started);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].transition, Transition::Up);
        assert_eq!(sent[1].downtime.as_deref(), Some("1 hours, 1 minutes, 1 seconds"));
        assert_eq!(sent[1].timestamp, finished.with_timezone(&Tz::UTC));
        assert_eq!(sent[1].reason, None);
    }

    #[tokio::test]
    async fn test_up_to_down_notifies() {
        let notifier = Arc::new(RecordingNotifier::default());
        let lp = service_loop(2, ScriptedProber::always(Step::Fail), notifier.clone());

        let (t1, t2) = (t0() + TimeDelta::minutes(1), t0() + TimeDelta::minutes(2));
        lp.record(&passed(), t0(), t0()).await;
        lp.record(&passed(), t1, t1).await;
        assert_eq!(lp.record(&failed(2), t2, t2).await, Some(Transition::Down));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].transition, Transition::Down);
    }

    #[tokio::test]
    async fn test_partial_failures_are_up() {
        let notifier = Arc::new(RecordingNotifier::default());
        let lp = service_loop(3, ScriptedProber::always(Step::Pass), notifier.clone());

        let result = CheckResult {
            attempts: 3,
            failures: 2,
            reason: Some("Could not connect to port 5432".to_string()),
        };
        let t1 = t0() + TimeDelta::minutes(1);
        lp.record(&failed(3), t0(), t0()).await;
        assert_eq!(lp.record(&result, t1, t1).await, Some(Transition::Up));
        assert_eq!(lp.ctx.registry.status("db"), ServiceStatus::Up);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_records() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let lp = service_loop(1, ScriptedProber::always(Step::Fail), notifier.clone());

        lp.record(&failed(1), t0(), t0()).await;
        assert_eq!(lp.ctx.registry.status("db"), ServiceStatus::Down);

        let t1 = t0() + TimeDelta::minutes(1);
        lp.record(&passed(), t1, t1).await;
        assert_eq!(lp.ctx.registry.status("db"), ServiceStatus::Up);
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_notifier_is_contained() {
        let notifier = Arc::new(RecordingNotifier {
            panic_on_down: true,
            ..Default::default()
        });
        let lp = service_loop(1, ScriptedProber::always(Step::Fail), notifier.clone());

        let (subscriber, errors) = counting_subscriber(tracing::Level::ERROR);
        let _guard = tracing::subscriber::set_default(subscriber);

        assert_eq!(lp.record(&failed(1), t0(), t0()).await, Some(Transition::Down));
        assert_eq!(lp.ctx.registry.status("db"), ServiceStatus::Down);
        assert_eq!(errors.load(std::sync::atomic::Ordering::SeqCst), 1);

        // The loop keeps going and still reports the recovery
        let t1 = t0() + TimeDelta::minutes(1);
        assert_eq!(lp.record(&passed(), t1, t1).await, Some(Transition::Up));
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_in_maintenance_skips_probes() {
        let prober = ScriptedProber::always(Step::Pass);
        let notifier = Arc::new(RecordingNotifier::default());
        let now = Utc::now();

        let mut def = definition("db", 3);
        def.maintenance_window = Some(MaintenanceWindow::new(
            (now - TimeDelta::hours(1)).time(),
            (now + TimeDelta::hours(1)).time(),
        ));
        let service = Arc::new(MonitoredService::new(def, Tz::UTC));
        let mut lp = ServiceLoop::new(service, context(prober.clone(), notifier.clone()));
        lp.ctx.registry.record("db", ServiceStatus::Down, Some(t0()), t0());

        let started = tokio::time::Instant::now();
        lp.run_cycle().await;

        let elapsed = started.elapsed();
        assert!(elapsed >= MAINTENANCE_POLL && elapsed < MAINTENANCE_POLL + RETRY_DELAY, "{:?}", elapsed);
        assert_eq!(prober.calls(), 0);
        assert!(notifier.sent().is_empty());
        let entry = lp.ctx.registry.get("db").unwrap();
        assert_eq!(entry.status, ServiceStatus::Down);
        assert_eq!(entry.last_check, t0());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_outside_maintenance_probes_and_sleeps_interval() {
        let prober = ScriptedProber::always(Step::Fail);
        let notifier = Arc::new(RecordingNotifier::default());
        let now = Utc::now();

        let mut def = definition("db", 2);
        def.maintenance_window = Some(MaintenanceWindow::new(
            (now + TimeDelta::hours(2)).time(),
            (now + TimeDelta::hours(3)).time(),
        ));
        let interval = def.interval;
        let service = Arc::new(MonitoredService::new(def, Tz::UTC));
        let mut lp = ServiceLoop::new(service, context(prober.clone(), notifier.clone()));

        let started = tokio::time::Instant::now();
        lp.run_cycle().await;

        let elapsed = started.elapsed();
        assert!(elapsed >= RETRY_DELAY + interval && elapsed < RETRY_DELAY * 2 + interval, "{:?}", elapsed);
        assert_eq!(prober.calls(), 2);
        assert_eq!(lp.ctx.registry.status("db"), ServiceStatus::Down);
        assert_eq!(notifier.sent().len(), 1);
    }
}

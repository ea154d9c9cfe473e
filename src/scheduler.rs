//! Per-subscriber daily delivery triggers.
//!
//! Each scheduled subscriber gets one spawned task that sleeps until the
//! next 07:00 (configurable) in the subscriber's own time zone, fires the
//! delivery sink once, and repeats. Triggers are independent: a hung or
//! failing delivery for one subscriber never delays another's.
//!
//! For fixed-offset zones the wall-clock target drifts by the DST delta
//! twice a year (see the timezone module). The scheduler does not
//! compensate.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::Subscriber;
use crate::timezone::TimeZoneIdentity;

/// Default local delivery hour (07:00)
pub const DEFAULT_FIRE_HOUR: u32 = 7;

/// A wake-up landing within this window after the target hour counts as
/// "fire now"; after firing the trigger sleeps past the window so a single
/// day never produces two fires.
pub const FIRE_GRACE_SECS: u32 = 600;

/// What a trigger invokes when it fires
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, subscriber_id: i64);
}

/// Stable job name for a subscriber's trigger, used in logs
pub fn job_name(subscriber_id: i64) -> String {
    format!("daily_weather_{}", subscriber_id)
}

/// Seconds until the next fire, given the local wall clock.
/// Returns 0 when the clock is within the grace window at the target hour.
/// `fire_hour` is taken modulo 24, so the result is always under 24 hours
/// for any input.
pub fn seconds_until_fire(hour: u32, minute: u32, second: u32, fire_hour: u32) -> u64 {
    let now = hour * 3600 + minute * 60 + second;
    let target = (fire_hour % 24) * 3600;

    if now >= target && now < target + FIRE_GRACE_SECS {
        return 0;
    }
    if now < target {
        (target - now) as u64
    } else {
        (86_400 - now + target) as u64
    }
}

/// Format a wait duration for logging
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

/// A live trigger: its cancellation handle and the zone it is bound to
struct TriggerHandle {
    token: CancellationToken,
    time_zone: TimeZoneIdentity,
}

/// Owns the mapping from subscriber id to at most one live trigger
pub struct DailyDeliveryScheduler {
    jobs: Mutex<HashMap<i64, TriggerHandle>>,
    sink: Arc<dyn DeliverySink>,
    fire_hour: u32,
    shutdown: CancellationToken,
}

impl DailyDeliveryScheduler {
    pub fn new(sink: Arc<dyn DeliverySink>, fire_hour: u32) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            sink,
            fire_hour,
            shutdown: CancellationToken::new(),
        }
    }

    /// Register the subscriber's recurring trigger, replacing any existing
    /// one. The swap happens under the job-map lock, so a concurrent
    /// re-subscription never leaves two triggers for the same id.
    pub fn schedule(&self, subscriber: &Subscriber) {
        let token = self.shutdown.child_token();
        {
            let mut jobs = self.jobs.lock().unwrap();
            let handle = TriggerHandle {
                token: token.clone(),
                time_zone: subscriber.time_zone,
            };
            if let Some(previous) = jobs.insert(subscriber.id, handle) {
                previous.token.cancel();
                debug!("{}: replacing existing trigger", job_name(subscriber.id));
            }
        }
        info!(
            "{}: daily at {:02}:00 {} (city {})",
            job_name(subscriber.id),
            self.fire_hour,
            subscriber.time_zone,
            subscriber.city
        );
        tokio::spawn(run_trigger(
            subscriber.id,
            subscriber.time_zone,
            self.fire_hour,
            Arc::clone(&self.sink),
            token,
        ));
    }

    /// Remove the subscriber's trigger if present; no-op otherwise.
    /// Effective before the next fire; an in-flight delivery completes.
    pub fn cancel(&self, subscriber_id: i64) {
        if let Some(handle) = self.jobs.lock().unwrap().remove(&subscriber_id) {
            handle.token.cancel();
            info!("{}: trigger cancelled", job_name(subscriber_id));
        }
    }

    pub fn is_scheduled(&self, subscriber_id: i64) -> bool {
        self.jobs.lock().unwrap().contains_key(&subscriber_id)
    }

    /// Time zone the live trigger is bound to, if one exists.
    /// Must always match the subscriber's stored zone.
    pub fn scheduled_zone(&self, subscriber_id: i64) -> Option<TimeZoneIdentity> {
        self.jobs
            .lock()
            .unwrap()
            .get(&subscriber_id)
            .map(|handle| handle.time_zone)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every trigger (graceful shutdown)
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.jobs.lock().unwrap().clear();
    }
}

async fn run_trigger(
    subscriber_id: i64,
    time_zone: TimeZoneIdentity,
    fire_hour: u32,
    sink: Arc<dyn DeliverySink>,
    token: CancellationToken,
) {
    loop {
        let (hour, minute, second) = time_zone.local_hms(Utc::now());
        let wait = seconds_until_fire(hour, minute, second, fire_hour);
        if wait > 0 {
            debug!(
                "{}: next fire in {}",
                job_name(subscriber_id),
                format_duration(Duration::from_secs(wait))
            );
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(Duration::from_secs(wait)) => {}
            }
        }
        if token.is_cancelled() {
            break;
        }

        sink.deliver(subscriber_id).await;

        // Step past the grace window before recomputing the next wait
        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(Duration::from_secs(FIRE_GRACE_SECS as u64)) => {}
        }
    }
    debug!("{}: trigger stopped", job_name(subscriber_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timezone;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSink {
        deliveries: AtomicU32,
    }

    #[async_trait]
    impl DeliverySink for CountingSink {
        async fn deliver(&self, _subscriber_id: i64) {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn subscriber(id: i64, city: &str) -> Subscriber {
        Subscriber {
            id,
            display_name: None,
            city: city.to_string(),
            time_zone: timezone::resolve(7200).unwrap(),
            subscription_active: true,
        }
    }

    fn scheduler() -> DailyDeliveryScheduler {
        let sink = Arc::new(CountingSink {
            deliveries: AtomicU32::new(0),
        });
        DailyDeliveryScheduler::new(sink, DEFAULT_FIRE_HOUR)
    }

    // === seconds_until_fire tests ===

    #[test]
    fn test_fire_now_within_grace_window() {
        assert_eq!(seconds_until_fire(7, 0, 0, 7), 0);
        assert_eq!(seconds_until_fire(7, 5, 30, 7), 0);
        assert_eq!(seconds_until_fire(7, 9, 59, 7), 0);
    }

    #[test]
    fn test_fire_after_grace_window_waits_until_tomorrow() {
        // 07:10:00 is past the window; next fire is 07:00 tomorrow
        assert_eq!(seconds_until_fire(7, 10, 0, 7), 86_400 - 600);
    }

    #[test]
    fn test_wait_before_fire_hour() {
        // 06:00:00 -> one hour
        assert_eq!(seconds_until_fire(6, 0, 0, 7), 3600);
        // 06:59:59 -> one second
        assert_eq!(seconds_until_fire(6, 59, 59, 7), 1);
        // midnight -> seven hours
        assert_eq!(seconds_until_fire(0, 0, 0, 7), 7 * 3600);
    }

    #[test]
    fn test_wait_after_fire_hour() {
        // 08:00:00 -> 23 hours
        assert_eq!(seconds_until_fire(8, 0, 0, 7), 23 * 3600);
        // 23:59:59 -> 7h + 1s
        assert_eq!(seconds_until_fire(23, 59, 59, 7), 7 * 3600 + 1);
    }

    #[test]
    fn test_midnight_fire_hour() {
        assert_eq!(seconds_until_fire(0, 0, 0, 0), 0);
        assert_eq!(seconds_until_fire(23, 0, 0, 0), 3600);
        assert_eq!(seconds_until_fire(0, 10, 0, 0), 86_400 - 600);
    }

    #[test]
    fn test_out_of_range_fire_hour_wraps_and_stays_bounded() {
        // hour 25 behaves as 01:00; an unwrapped target would push the
        // wait to a full day and the trigger would never enter the window
        assert_eq!(seconds_until_fire(1, 0, 0, 25), 0);
        assert_eq!(seconds_until_fire(2, 0, 0, 25), 23 * 3600);
        assert_eq!(seconds_until_fire(0, 0, 0, 48), 0);
        assert!(seconds_until_fire(12, 0, 0, 1000) < 86_400);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h 0m");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m");
        assert_eq!(format_duration(Duration::from_secs(0)), "0m");
        assert_eq!(format_duration(Duration::from_secs(23 * 3600 + 120)), "23h 2m");
    }

    #[test]
    fn test_job_name_is_stable() {
        assert_eq!(job_name(123456789), "daily_weather_123456789");
        assert_eq!(job_name(-5), "daily_weather_-5");
    }

    // === trigger map tests ===

    #[tokio::test]
    async fn test_schedule_registers_one_trigger() {
        let scheduler = scheduler();
        scheduler.schedule(&subscriber(1, "Warsaw"));
        assert!(scheduler.is_scheduled(1));
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_replaces_not_stacks() {
        let scheduler = scheduler();
        scheduler.schedule(&subscriber(1, "Warsaw"));
        scheduler.schedule(&subscriber(1, "Rivne"));
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.is_scheduled(1));
    }

    #[tokio::test]
    async fn test_reschedule_rebinds_zone() {
        let scheduler = scheduler();
        scheduler.schedule(&subscriber(1, "Warsaw"));
        assert_eq!(scheduler.scheduled_zone(1), Some(timezone::resolve(7200).unwrap()));

        let mut moved = subscriber(1, "Kelowna");
        moved.time_zone = timezone::resolve(-28800).unwrap();
        scheduler.schedule(&moved);
        assert_eq!(scheduler.scheduled_zone(1), Some(timezone::resolve(-28800).unwrap()));
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_zone_none_after_cancel() {
        let scheduler = scheduler();
        scheduler.schedule(&subscriber(1, "Warsaw"));
        scheduler.cancel(1);
        assert_eq!(scheduler.scheduled_zone(1), None);
    }

    #[tokio::test]
    async fn test_cancel_removes_trigger() {
        let scheduler = scheduler();
        scheduler.schedule(&subscriber(1, "Warsaw"));
        scheduler.cancel(1);
        assert!(!scheduler.is_scheduled(1));
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_is_noop() {
        let scheduler = scheduler();
        scheduler.cancel(42);
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_triggers_are_independent() {
        let scheduler = scheduler();
        scheduler.schedule(&subscriber(1, "Warsaw"));
        scheduler.schedule(&subscriber(2, "Kelowna"));
        scheduler.cancel(1);
        assert!(!scheduler.is_scheduled(1));
        assert!(scheduler.is_scheduled(2));
    }

    #[tokio::test]
    async fn test_shutdown_clears_all() {
        let scheduler = scheduler();
        scheduler.schedule(&subscriber(1, "Warsaw"));
        scheduler.schedule(&subscriber(2, "Rivne"));
        scheduler.shutdown();
        assert!(scheduler.is_empty());
    }
}


/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn wait_time_always_bounded() {
        let hour: u32 = kani::any();
        kani::assume(hour < 24);
        let minute: u32 = kani::any();
        kani::assume(minute < 60);
        let second: u32 = kani::any();
        kani::assume(second < 60);
        let fire_hour: u32 = kani::any();
        kani::assume(fire_hour < 48);

        let wait = seconds_until_fire(hour, minute, second, fire_hour);
        kani::assert(wait < 86_400, "wait must be under 24h");
    }
}

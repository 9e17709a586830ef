//! Tiered notification scheduling.
//!
//! Each alert expands into one "now" task plus, depending on severity, a
//! deferred reminder. Deferred task handles are tracked per location so a
//! dismiss or stop can cancel them deterministically.
//!
//! The scheduler also remembers which alert each location was last notified
//! for. A later non-material replacement keeps those reminders, so their
//! `metadata.alert_id` names the notified alert rather than the live one;
//! [`NotificationScheduler::notified_alert`] resolves that correlation.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    format_countdown, Alert, LocationKey, NotificationMetadata, NotificationPriority,
    NotificationTask, Severity, TaskHandle, TriggerAt,
};
use crate::ports::NotificationSink;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Delay of the single reminder for urgent alerts.
    pub urgent_reminder: Duration,
    /// Warning reminders fire this long before the countdown runs out.
    pub warning_reminder_lead: Duration,
    /// Advisory reminders fire this long before the countdown runs out.
    pub advisory_reminder_lead: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            urgent_reminder: Duration::from_secs(30 * 60),
            warning_reminder_lead: Duration::from_secs(2 * 3600),
            advisory_reminder_lead: Duration::from_secs(6 * 3600),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTask {
    alert_id: Uuid,
    handle: TaskHandle,
    trigger_at: OffsetDateTime,
}

pub struct NotificationScheduler {
    sink: Arc<dyn NotificationSink>,
    config: SchedulerConfig,
    pending: DashMap<LocationKey, Vec<PendingTask>>,
    notified: DashMap<LocationKey, Uuid>,
}

impl NotificationScheduler {
    pub fn new(sink: Arc<dyn NotificationSink>, config: SchedulerConfig) -> Self {
        Self {
            sink,
            config,
            pending: DashMap::new(),
            notified: DashMap::new(),
        }
    }

    pub fn plan(&self, alert: &Alert) -> Vec<NotificationTask> {
        plan_notifications(alert, &self.config)
    }

    /// Submits every planned task for `alert`. Submission failures are logged
    /// and skipped; the alert itself stays authoritative.
    ///
    /// If `session` is cancelled by the time submission finishes, the
    /// reminders just recorded are withdrawn again so nothing outlives a stop.
    #[instrument(skip(self, alert, session), fields(location = %key, alert_id = %alert.id, severity = %alert.severity))]
    pub async fn schedule(
        &self,
        key: &LocationKey,
        alert: &Alert,
        session: Option<&CancellationToken>,
    ) -> Vec<TaskHandle> {
        let now = OffsetDateTime::now_utc();
        self.prune_fired(key, now);
        self.notified.insert(key.clone(), alert.id);

        let mut handles = Vec::new();
        for task in self.plan(alert) {
            match self.sink.submit(&task).await {
                Ok(handle) => {
                    metrics::counter!("notifications_submitted_total", 1, "severity" => alert.severity.as_str());
                    if let Some(trigger_at) = task.trigger_at.deferred_until(now) {
                        self.pending.entry(key.clone()).or_default().push(PendingTask {
                            alert_id: alert.id,
                            handle: handle.clone(),
                            trigger_at,
                        });
                    }
                    handles.push(handle);
                }
                Err(e) => {
                    error!("Notification submission failed ({}): {:?}", task.title, e);
                    metrics::counter!("notification_submit_errors_total", 1);
                }
            }
        }

        if session.map_or(false, CancellationToken::is_cancelled) {
            self.notified.remove_if(key, |_, id| *id == alert.id);
            self.cancel_for_alert(key, alert.id).await;
        } else {
            info!(submitted = handles.len(), "Notifications scheduled");
        }
        handles
    }

    /// Cancels every tracked reminder for `key` and forgets that it was
    /// notified. Returns how many were cancelled.
    pub async fn cancel_all(&self, key: &LocationKey) -> usize {
        self.notified.remove(key);
        let doomed = self.pending.remove(key).map(|(_, tasks)| tasks).unwrap_or_default();
        self.cancel_tasks(key, doomed).await
    }

    /// Cancels only the reminders issued for one alert.
    pub async fn cancel_for_alert(&self, key: &LocationKey, alert_id: Uuid) -> usize {
        let doomed = match self.pending.get_mut(key) {
            Some(mut entry) => {
                let (doomed, keep): (Vec<_>, Vec<_>) =
                    std::mem::take(entry.value_mut()).into_iter().partition(|t| t.alert_id == alert_id);
                *entry.value_mut() = keep;
                doomed
            }
            None => Vec::new(),
        };
        self.cancel_tasks(key, doomed).await
    }

    /// Cancels reminders for every location.
    pub async fn cancel_everything(&self) -> usize {
        let mut cancelled = 0;
        for key in self.tracked_keys() {
            cancelled += self.cancel_all(&key).await;
        }
        cancelled
    }

    /// Every key with pending reminders or a notified alert.
    pub fn tracked_keys(&self) -> Vec<LocationKey> {
        let mut keys: Vec<LocationKey> = self
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.notified.iter().map(|entry| entry.key().clone()))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// The alert `key` was last notified for, until its reminders are cancelled.
    pub fn notified_alert(&self, key: &LocationKey) -> Option<Uuid> {
        self.notified.get(key).map(|entry| *entry.value())
    }

    pub fn is_notified(&self, key: &LocationKey) -> bool {
        self.notified.contains_key(key)
    }

    pub fn pending_count(&self, key: &LocationKey) -> usize {
        self.pending.get(key).map_or(0, |entry| entry.len())
    }

    async fn cancel_tasks(&self, key: &LocationKey, tasks: Vec<PendingTask>) -> usize {
        let mut cancelled = 0;
        for task in tasks {
            match self.sink.cancel(&task.handle).await {
                Ok(()) => cancelled += 1,
                Err(e) => warn!(location = %key, handle = %task.handle, "Notification cancel failed: {:?}", e),
            }
        }
        if cancelled > 0 {
            metrics::counter!("notifications_cancelled_total", cancelled as u64);
            info!(location = %key, cancelled, "Pending notifications cancelled");
        }
        cancelled
    }

    fn prune_fired(&self, key: &LocationKey, now: OffsetDateTime) {
        if let Some(mut entry) = self.pending.get_mut(key) {
            entry.retain(|t| t.trigger_at > now);
        }
    }
}

/// The notification tier for one alert, anchored at `alert.created_at`.
pub fn plan_notifications(alert: &Alert, config: &SchedulerConfig) -> Vec<NotificationTask> {
    let countdown = Duration::from_millis(alert.countdown_millis);
    let name = &alert.location.name;
    let guidance = &alert.preparation_guidance;

    let headline = NotificationTask {
        trigger_at: TriggerAt::Immediate,
        title: match alert.severity {
            Severity::Immediate => format!("Flood conditions now: {}", name),
            other => format!("{} flood alert: {}", capitalize(other.as_str()), name),
        },
        body: format!(
            "{} risk of flooding ({:.0}%), {}. {}",
            capitalize(&alert.risk_level.as_str().replace('_', " ")),
            alert.prediction_snapshot.probability * 100.0,
            match alert.severity {
                Severity::Immediate => "conditions are under way".to_string(),
                _ => format!("expected in {}", format_countdown(alert.countdown_millis)),
            },
            guidance.message
        ),
        priority: match alert.severity {
            Severity::Immediate => NotificationPriority::Max,
            Severity::Urgent => NotificationPriority::High,
            Severity::Warning => NotificationPriority::Normal,
            Severity::Advisory => NotificationPriority::Low,
        },
        metadata: NotificationMetadata {
            alert_id: alert.id,
            location_key: alert.location_key(),
            severity: alert.severity,
        },
    };

    let reminder_offset = match alert.severity {
        Severity::Immediate => None,
        Severity::Urgent => Some(config.urgent_reminder),
        Severity::Warning => countdown.checked_sub(config.warning_reminder_lead),
        Severity::Advisory => countdown.checked_sub(config.advisory_reminder_lead),
    }
    .filter(|offset| !offset.is_zero());

    let mut tasks = vec![headline.clone()];
    if let Some(offset) = reminder_offset {
        let remaining = countdown.saturating_sub(offset);
        let first_action = guidance.actions.first().map(String::as_str).unwrap_or("Stay alert");
        tasks.push(NotificationTask {
            trigger_at: TriggerAt::At(alert.created_at + offset),
            title: format!("Reminder: {}", headline.title),
            body: if remaining.is_zero() {
                format!("Flooding may begin at any time. {}.", first_action)
            } else {
                format!(
                    "Flooding expected in about {}. {}.",
                    format_countdown(remaining.as_millis() as u64),
                    first_action
                )
            },
            ..headline
        });
    }
    tasks
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

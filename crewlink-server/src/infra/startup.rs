use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infra::app_state::AppState;

/// Read notifications are kept this long before the sweep deletes them.
pub const READ_NOTIFICATION_RETENTION_DAYS: i64 = 7;

/// What one maintenance sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub idle_travel_sessions: usize,
    pub location_grants: u64,
    pub location_tokens: u64,
    pub sessions: usize,
    pub notifications: u64,
    pub rooms: usize,
}

/// Expire idle travel sessions, drop dead codes, tokens and sessions, and
/// clear out old read notifications and abandoned rooms.
///
/// Storage failures are logged; the sweep carries on with the remaining
/// steps.
pub async fn run_maintenance_once(
    state: &AppState,
    now: DateTime<Utc>,
) -> MaintenanceReport {
    let mut report = MaintenanceReport {
        idle_travel_sessions: state.location.expire_idle_sessions(now).len(),
        ..MaintenanceReport::default()
    };

    match state.sharing.purge_expired(now).await {
        Ok(purged) => {
            report.location_grants = purged.grants;
            report.location_tokens = purged.tokens;
        }
        Err(err) => warn!(error = %err, "failed to purge expired location grants"),
    }

    report.sessions = state.sessions.purge_expired(now);

    let read_before = now - Duration::days(READ_NOTIFICATION_RETENTION_DAYS);
    match state.repositories.notifications.prune_read(read_before).await {
        Ok(pruned) => report.notifications = pruned,
        Err(err) => warn!(error = %err, "failed to prune read notifications"),
    }

    report.rooms = state.hub.prune_idle();

    if report == MaintenanceReport::default() {
        debug!("maintenance sweep found nothing to expire");
    } else {
        info!(
            idle_travel_sessions = report.idle_travel_sessions,
            location_grants = report.location_grants,
            location_tokens = report.location_tokens,
            sessions = report.sessions,
            notifications = report.notifications,
            rooms = report.rooms,
            "maintenance sweep completed"
        );
    }
    report
}

/// Run [`run_maintenance_once`] every `location.sweep_interval`.
pub fn spawn_maintenance(state: AppState) -> JoinHandle<()> {
    let period = state.config.location.sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_maintenance_once(&state, Utc::now()).await;
        }
    })
}

//! Scheduled cookie scans.
//!
//! The scheduler wakes on a fixed tick, checks whether the configured scan
//! frequency has elapsed since the last scan, and if so dispatches
//! `ScheduledScan`. Frequency changes take effect on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cookiebar_core::ScanFrequency;
use cookiebar_store::schema::LAST_SCAN_OPTION;
use tracing::{debug, info, warn};

use crate::hooks::LifecycleEvent;
use crate::scan::LastScan;
use crate::state::AppContext;

const SCHEDULER_TICK: Duration = Duration::from_secs(15 * 60);

/// Whether a scan is due at `now` given the last scan time.
pub fn is_scan_due(
    last_scan: Option<DateTime<Utc>>,
    frequency: ScanFrequency,
    now: DateTime<Utc>,
) -> bool {
    let Some(interval) = frequency.interval() else {
        return false;
    };
    match last_scan {
        None => true,
        Some(last) => match chrono::Duration::from_std(interval) {
            Ok(interval) => now - last >= interval,
            Err(_) => false,
        },
    }
}

/// Spawn the scheduler task and hand its handle to the context.
pub fn start_scan_scheduler(ctx: Arc<AppContext>) {
    let task_ctx = ctx.clone();
    let handle = tokio::spawn(async move {
        info!("Scan scheduler started (tick {:?})", SCHEDULER_TICK);
        let mut ticker = tokio::time::interval(SCHEDULER_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            run_if_due(&task_ctx).await;
        }
    });
    ctx.set_scheduler(handle);
}

async fn run_if_due(ctx: &Arc<AppContext>) {
    let frequency = ctx.settings().scan_frequency;
    let last = match ctx.store.get_option::<LastScan>(LAST_SCAN_OPTION) {
        Ok(last) => last.map(|l| l.scanned_at),
        Err(e) => {
            warn!("Could not read last scan time: {}", e);
            return;
        }
    };
    if !is_scan_due(last, frequency, Utc::now()) {
        debug!("Scheduled scan not due ({:?})", frequency);
        return;
    }
    if ctx.is_scan_running() {
        info!("Skipping scheduled scan: a scan is already running");
        return;
    }
    ctx.hooks.dispatch(LifecycleEvent::ScheduledScan, ctx).await;
}

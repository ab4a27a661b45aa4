//! Periodic maintenance.
//!
//! The expiry sweeper walks the reservation stores on a fixed tick:
//! temporary local entries past `hold` are dropped, active prop-bans past
//! `hold` fall out of enforcement (their record stays for duplicate
//! suppression), and prop-ban records past `lifetime` are forgotten.

use crate::snomask::SnoMask;
use crate::state::{wall_clock, Matrix, ResvConf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub fn spawn_expiry_sweeper(matrix: Arc<Matrix>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            sweep_expired(&matrix).await;
        }
    })
}

/// One sweeper pass. Public so tests can drive the clock themselves.
pub async fn sweep_expired(matrix: &Matrix) {
    let now = wall_clock();
    sweep_expired_at(matrix, now).await;
}

pub async fn sweep_expired_at(matrix: &Matrix, now: i64) {
    let (expired, forgotten): (Vec<Arc<ResvConf>>, usize) = {
        let mut store = matrix.store.lock();

        let temps = store.resvs.expired_temps(now);
        for conf in &temps {
            store.resvs.remove(conf.kind, &conf.mask);
            store.opers.delete(&conf.oper);
        }

        let props = store.resvs.expired_propagated(now);
        for conf in &props {
            store.deactivate(conf);
        }

        let swept = store.prop_bans.sweep(now);
        for conf in &swept {
            store.opers.delete(&conf.oper);
        }

        let mut expired = temps;
        expired.extend(props);
        (expired, swept.len())
    };

    for conf in &expired {
        matrix
            .sendto_realops(
                SnoMask::GENERAL,
                &format!("Temporary RESV for [{}] expired", conf.mask),
            )
            .await;
        tracing::info!(target: "bandb", mask = %conf.mask, "RESV expired");
    }
    if forgotten > 0 {
        tracing::debug!(count = forgotten, "Forgot expired prop-ban records");
    }
}

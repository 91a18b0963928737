//! Refresh scheduler: periodically re-runs the proxy validator.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::UPDATE_TIME_MINUTES;
use crate::validator::{ProxyProbe, Validator};

/// Runs [`Validator::run_round`] once immediately, then every
/// `UPDATE_TIME_MINUTES`, until the process exits.
///
/// Mirrors the original `reload_proxies_background`: a warm-up round before
/// the RPC surface starts serving, then a fixed-interval loop with pool
/// stats logged after each round.
pub async fn run<P: ProxyProbe>(validator: Arc<Validator<P>>, pool: Arc<crate::pool::Pool>) {
    loop {
        info!("starting proxy validation round");
        validator.run_round().await;

        let (_, total) = validator.valid.stats().await;
        let stats = pool.stats().await;
        info!(
            total_valid_proxies = total,
            pool_active = stats.active,
            pool_available = stats.available,
            "validation round finished"
        );

        tokio::time::sleep(std::time::Duration::from_secs(UPDATE_TIME_MINUTES * 60)).await;
    }
}

/// Runs a single warm-up validation round before the caller proceeds, used
/// at startup so the server does not begin serving with an empty
/// `ValidProxyMap`. Errors are logged, never fatal: an empty round simply
/// leaves every session's list empty until the next scheduled refresh.
pub async fn warm_up<P: ProxyProbe>(validator: &Validator<P>) {
    info!("running warm-up proxy validation round");
    validator.run_round().await;
    let (_, total) = validator.valid.stats().await;
    if total == 0 {
        error!("warm-up validation round produced no valid proxies for any session");
    } else {
        info!(total_valid_proxies = total, "warm-up validation round complete");
    }
}

use std::time::Duration;

use chrono::Utc;
use gateway_auth::{NonceStore, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the nonce purge worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Tokens that are never redeemed leave their nonce record behind. Once the token has expired the record can never be
/// consumed, so the worker deletes it.
pub fn start_nonce_purge_worker(db: SqliteDatabase, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Nonce purge worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running nonce purge job");
            match db.purge_expired_nonces(Utc::now()).await {
                Ok(0) => trace!("🕰️ No expired nonces to purge"),
                Ok(n) => info!("🕰️ {n} expired nonces purged"),
                Err(e) => error!("🕰️ Error running nonce purge job: {e}"),
            }
        }
    })
}

//! Background scheduled tasks for the ledger service.
//!
//! Call `spawn_all` once during startup to launch them.

use crate::services::IdempotencyService;

/// Spawn all background tasks. Tasks are detached via `tokio::spawn`; this does not block.
pub fn spawn_all(idempotency_service: IdempotencyService, purge_interval_secs: u64) {
    // 过期幂等键清理
    {
        let svc = idempotency_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.purge_expired().await {
                    Ok(n) if n > 0 => log::info!("Expired idempotency keys purged: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to purge idempotency keys: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(purge_interval_secs.max(1)))
                    .await;
            }
        });
    }
}

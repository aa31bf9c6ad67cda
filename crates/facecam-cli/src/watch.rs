use crate::engine::{EngineError, EngineHandle, Snapshot};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Counters reported when the detection loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Run one detection cycle. A failed capture or analysis is logged and
/// yields `None`; only a dead engine is an error.
pub async fn run_cycle(handle: &EngineHandle, composite: bool) -> Result<Option<Snapshot>, EngineError> {
    match handle.cycle(composite).await {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(EngineError::ChannelClosed) => Err(EngineError::ChannelClosed),
        Err(e) => {
            tracing::warn!(error = %e, "detection cycle failed");
            Ok(None)
        }
    }
}

/// Run detection cycles on a fixed period until `shutdown` resolves or
/// `max_cycles` attempts have been made. Each cycle is awaited before the
/// next tick; ticks that fall behind are skipped.
pub async fn run_cycles<F>(
    handle: &EngineHandle,
    period: Duration,
    max_cycles: Option<u64>,
    composite: bool,
    shutdown: impl Future<Output = ()>,
    mut on_snapshot: F,
) -> anyhow::Result<WatchStats>
where
    F: FnMut(&Snapshot) -> anyhow::Result<()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut stats = WatchStats::default();
    loop {
        if max_cycles.is_some_and(|max| stats.completed + stats.failed >= max) {
            break;
        }
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        // A cycle still running at shutdown finishes on the engine thread;
        // its reply is dropped.
        let outcome = tokio::select! {
            _ = &mut shutdown => break,
            outcome = run_cycle(handle, composite) => outcome?,
        };

        let elapsed = started.elapsed();
        if elapsed > period {
            let late = (elapsed.as_millis() / period.as_millis().max(1)) as u64;
            stats.skipped += late;
            tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, late, skipped = stats.skipped, "detection overran interval");
        }

        match outcome {
            Some(snapshot) => {
                stats.completed += 1;
                on_snapshot(&snapshot)?;
            }
            None => stats.failed += 1,
        }
    }

    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        skipped = stats.skipped,
        "detection stopped"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fakes::{closed_handle, engine_with, face};

    const PERIOD: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_failed_cycle_does_not_end_session() {
        let (handle, counters) = engine_with(vec![vec![face(30.0)], vec![face(40.0)]], false, 1);
        handle.start_camera().await.unwrap();

        let mut ages = Vec::new();
        let stats = run_cycles(&handle, PERIOD, Some(3), false, std::future::pending(), |snapshot| {
            ages.push(snapshot.faces[0].age);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(ages, vec![30.0, 35.0]);
        let status = handle.status().await.unwrap();
        assert!(status.camera_active);
        assert_eq!(counters.stopped.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cycle_without_camera_is_logged_not_raised() {
        let (handle, _) = engine_with(vec![], false, 0);
        assert!(run_cycle(&handle, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_engine_is_fatal() {
        let handle = closed_handle();
        assert!(matches!(run_cycle(&handle, false).await, Err(EngineError::ChannelClosed)));

        let result = run_cycles(&handle, PERIOD, Some(3), false, std::future::pending(), |_| Ok(())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_callback_error_stops_loop() {
        let (handle, _) = engine_with(vec![vec![face(30.0)]], false, 0);
        handle.start_camera().await.unwrap();
        let result = run_cycles(&handle, PERIOD, None, false, std::future::pending(), |_| {
            anyhow::bail!("stdout closed")
        })
        .await;
        assert!(result.is_err());
    }
}

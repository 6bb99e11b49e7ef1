use log::{info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use super::trend::{LogRow, TrendLogger};
use crate::utils::error::LtError;

/// Shared drain state: percent progress and a cooperative cancel flag,
/// checked by the logger at step boundaries.
#[derive(Debug, Default)]
pub struct DrainControl {
    cancelled: AtomicBool,
    progress: AtomicU8,
}

impl DrainControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::SeqCst);
    }

    /// Progress in percent, 0 to 100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }
}

/// Session slot key: one live drain per (link, unit).
type SessionKey = (String, u8);

/// Enforces the one-session-per-unit rule. The remote cursor is unit-owned
/// mutable state, so two interleaved drains would corrupt each other's row
/// enumeration; the registry refuses the second one instead of trusting
/// caller discipline.
#[derive(Default)]
pub struct SessionRegistry {
    live: Mutex<HashSet<SessionKey>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the session slot for a unit on a link. Fails with `SessionBusy`
    /// while another session holds it; the slot frees when the guard drops.
    pub fn acquire(
        self: &Arc<Self>,
        link_id: &str,
        unit: u8,
    ) -> Result<SessionGuard, LtError> {
        let key = (link_id.to_string(), unit);
        let mut live = self.live.lock().map_err(|_| LtError::LockError)?;
        if !live.insert(key.clone()) {
            warn!("🚫 Session slot {}/{} already taken", link_id, unit);
            return Err(LtError::SessionBusy(format!(
                "unit {} on {} already has a live session",
                unit, link_id
            )));
        }
        Ok(SessionGuard {
            registry: Arc::clone(self),
            key,
        })
    }
}

pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    key: SessionKey,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut live) = self.registry.live.lock() {
            live.remove(&self.key);
        }
    }
}

/// A drain running on the runtime: observable progress, cancellable, joinable
/// for the collected rows. Holds its session guard for the task's lifetime.
pub struct DrainTask {
    ctl: Arc<DrainControl>,
    handle: JoinHandle<Result<Vec<LogRow>, LtError>>,
}

impl DrainTask {
    pub fn spawn(mut logger: TrendLogger, steps: u32, guard: SessionGuard) -> Self {
        let ctl = Arc::new(DrainControl::new());
        let task_ctl = Arc::clone(&ctl);

        let handle = tokio::spawn(async move {
            let _slot = guard;
            info!("🚀 Drain task started: {} steps on unit {}", steps, logger.unit());
            logger.drain(steps, &task_ctl).await
        });

        Self { ctl, handle }
    }

    /// Shared control block, for progress observers and cancellation hooks.
    pub fn control(&self) -> Arc<DrainControl> {
        Arc::clone(&self.ctl)
    }

    pub fn progress(&self) -> u8 {
        self.ctl.progress()
    }

    pub fn cancel(&self) {
        self.ctl.cancel();
    }

    pub async fn join(self) -> Result<Vec<LogRow>, LtError> {
        self.handle
            .await
            .map_err(|e| LtError::TaskError(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::trend::{LoggerState, PAR_CURSOR_DATE, PAR_FRAME_DATA, PAR_POINT_IDS};
    use crate::modbus::client::LtBusClient;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct StaticBus;

    #[async_trait]
    impl LtBusClient for StaticBus {
        async fn read_par(
            &self,
            _unit: u8,
            param_addr: u16,
            _param_count: u16,
        ) -> Result<Vec<f32>, LtError> {
            match param_addr {
                PAR_FRAME_DATA => Ok(vec![1.0; 18]),
                PAR_CURSOR_DATE => Ok(vec![14.0, 11.0, 2023.0, 22.0, 13.0, 20.0]),
                PAR_POINT_IDS => Ok((1..=18).map(|v| v as f32).collect()),
                _ => Ok(Vec::new()),
            }
        }

        async fn write_par(
            &self,
            _unit: u8,
            _param_addr: u16,
            _values: &[f32],
        ) -> Result<(u16, u16), LtError> {
            Ok((0, 0))
        }
    }

    #[test]
    fn test_progress_saturates_at_100() {
        let ctl = DrainControl::new();
        assert_eq!(ctl.progress(), 0);
        ctl.set_progress(250);
        assert_eq!(ctl.progress(), 100);
    }

    #[test]
    fn test_registry_refuses_second_session() {
        let registry = SessionRegistry::new();
        let guard = registry.acquire("/dev/ttyS0", 31).unwrap();

        assert!(matches!(
            registry.acquire("/dev/ttyS0", 31),
            Err(LtError::SessionBusy(_))
        ));
        // other units and links are independent
        assert!(registry.acquire("/dev/ttyS0", 30).is_ok());
        assert!(registry.acquire("192.168.1.100:502", 31).is_ok());

        drop(guard);
        assert!(registry.acquire("/dev/ttyS0", 31).is_ok());
    }

    #[tokio::test]
    async fn test_drain_task_runs_to_completion() {
        let registry = SessionRegistry::new();
        let guard = registry.acquire("test", 31).unwrap();

        let mut logger = TrendLogger::new(Arc::new(StaticBus), 31);
        logger
            .position(Utc.timestamp_opt(1700000000, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(logger.state(), LoggerState::Positioned);

        let task = DrainTask::spawn(logger, 3, guard);
        let rows = task.join().await.unwrap();

        assert_eq!(rows.len(), 3);
        // slot freed once the task is done
        assert!(registry.acquire("test", 31).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_before_run_stops_after_one_step() {
        let registry = SessionRegistry::new();
        let guard = registry.acquire("test", 31).unwrap();

        let mut logger = TrendLogger::new(Arc::new(StaticBus), 31);
        logger
            .position(Utc.timestamp_opt(1700000000, 0).unwrap())
            .await
            .unwrap();

        // current-thread runtime: the task has not polled yet, so the flag is
        // visible from its very first step boundary
        let task = DrainTask::spawn(logger, 1000, guard);
        task.cancel();
        let rows = task.join().await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}

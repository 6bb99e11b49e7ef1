use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::task::DrainControl;
use crate::modbus::client::LtBusClient;
use crate::utils::error::LtError;

// Parameter map of the unit's trend interface
pub const PAR_CURSOR_INC: u16 = 5940;
pub const PAR_CURSOR_DATE: u16 = 5941;
pub const PAR_FRAME_DATA: u16 = 5951;
pub const PAR_POINT_IDS: u16 = 5975;

/// Points per log frame; also the size of the point id table.
pub const FRAME_POINTS: u16 = 18;

/// Date-set range width: day, month, year, hour, minute, second.
pub const DATE_FIELDS: u16 = 6;

/// One entry of the unit's circular log buffer. `timestamp == 0` marks an
/// empty slot, not an error; downstream consumers skip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: i64,
    pub values: Vec<f32>,
}

impl LogRow {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    Idle,
    Positioned,
    Draining,
    Done,
    Failed,
}

/// Decode the six date registers to a UTC epoch timestamp. Anything that does
/// not form a valid calendar date reports as 0, which downstream treats the
/// same as an empty slot.
pub fn decode_timestamp(fields: &[f32]) -> i64 {
    if fields.len() != DATE_FIELDS as usize {
        return 0;
    }
    let (d, m, y, h, min, s) = (
        fields[0] as u32,
        fields[1] as u32,
        fields[2] as i32,
        fields[3] as u32,
        fields[4] as u32,
        fields[5] as u32,
    );
    match Utc.with_ymd_and_hms(y, m, d, h, min, s).single() {
        Some(dt) => dt.timestamp(),
        None => 0,
    }
}

/// One exclusive session against a unit's trend buffer.
///
/// The unit holds a single mutable frame cursor; positioning and advancing it
/// from two sessions at once would corrupt both row enumerations, so this
/// type owns its client and cursor advance is not independently callable.
pub struct TrendLogger {
    client: Arc<dyn LtBusClient>,
    unit: u8,
    state: LoggerState,
}

impl TrendLogger {
    pub fn new(client: Arc<dyn LtBusClient>, unit: u8) -> Self {
        Self {
            client,
            unit,
            state: LoggerState::Idle,
        }
    }

    pub fn unit(&self) -> u8 {
        self.unit
    }

    pub fn state(&self) -> LoggerState {
        self.state
    }

    /// Read the unit's configured point identifiers, used to build column
    /// headers. Independent of the cursor and safe to repeat.
    pub async fn read_points(&self) -> Result<Vec<u32>, LtError> {
        let points = self
            .client
            .read_par(self.unit, PAR_POINT_IDS, FRAME_POINTS)
            .await?;
        if points.is_empty() {
            warn!("⚠️  Unit {} returned no point table", self.unit);
        }
        Ok(points.iter().map(|&p| p as u32).collect())
    }

    /// Position the unit's frame cursor at (or just after) the given start
    /// time by writing the six date fields.
    pub async fn position(&mut self, start: DateTime<Utc>) -> Result<(), LtError> {
        info!(
            "🕐 Positioning unit {} cursor at {}",
            self.unit,
            start.format("%d/%m/%Y %H:%M:%S")
        );

        let fields = [
            start.day() as f32,
            start.month() as f32,
            start.year() as f32,
            start.hour() as f32,
            start.minute() as f32,
            start.second() as f32,
        ];
        match self
            .client
            .write_par(self.unit, PAR_CURSOR_DATE, &fields)
            .await
        {
            Ok(_) => {
                self.state = LoggerState::Positioned;
                Ok(())
            }
            Err(e) => {
                self.state = LoggerState::Failed;
                Err(e)
            }
        }
    }

    /// Read the frame under the cursor: 18 data values plus the timestamp
    /// decoded from the date registers.
    async fn read_frame(&self) -> Result<LogRow, LtError> {
        let values = self
            .client
            .read_par(self.unit, PAR_FRAME_DATA, FRAME_POINTS)
            .await?;
        if values.is_empty() {
            return Err(LtError::EmptyRead);
        }

        let date = self
            .client
            .read_par(self.unit, PAR_CURSOR_DATE, DATE_FIELDS)
            .await?;
        let timestamp = decode_timestamp(&date);

        Ok(LogRow { timestamp, values })
    }

    /// Advance the remote cursor one frame.
    async fn inc_cursor(&self) -> Result<(), LtError> {
        self.client
            .write_par(self.unit, PAR_CURSOR_INC, &[0.0])
            .await?;
        Ok(())
    }

    /// Walk the log buffer for exactly `steps` steps, collecting the rows
    /// that carried data.
    ///
    /// Each step reads the current frame, advances the cursor regardless of
    /// whether the read succeeded, and keeps the row only if its timestamp is
    /// non-zero. Read-side anomalies skip the step; transport failures and
    /// bad write echoes abort the session. Cancellation is honored at step
    /// boundaries and ends the drain cleanly in `Done`.
    pub async fn drain(&mut self, steps: u32, ctl: &DrainControl) -> Result<Vec<LogRow>, LtError> {
        if !matches!(self.state, LoggerState::Positioned | LoggerState::Draining) {
            return Err(LtError::InvalidState(format!(
                "drain requires a positioned cursor, logger is {:?}",
                self.state
            )));
        }
        self.state = LoggerState::Draining;
        info!("📈 Draining {} frames from unit {}", steps, self.unit);

        let mut rows = Vec::new();
        for step in 0..steps {
            let row = match self.read_frame().await {
                Ok(row) => Some(row),
                Err(e) if !e.is_fatal() => {
                    warn!("⚠️  Step {}: no data this cycle ({})", step, e);
                    None
                }
                Err(e) => {
                    self.state = LoggerState::Failed;
                    return Err(e);
                }
            };

            // The cursor moves on even when the read produced nothing, so one
            // bad cycle costs a row, never the session
            if let Err(e) = self.inc_cursor().await {
                self.state = LoggerState::Failed;
                return Err(e);
            }

            if let Some(row) = row {
                if row.timestamp != 0 {
                    rows.push(row);
                }
            }

            ctl.set_progress((((step as u64 + 1) * 100) / steps as u64) as u8);
            if ctl.is_cancelled() {
                info!("🛑 Drain cancelled after {} steps, {} rows", step + 1, rows.len());
                break;
            }
        }

        self.state = LoggerState::Done;
        info!("✅ Drain finished: {} rows", rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::frame::{raw_addr, raw_count};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fake engine: fixed frame data and date registers, counted writes.
    struct FakeBus {
        data: Vec<f32>,
        date: Vec<f32>,
        inc_writes: AtomicUsize,
        date_writes: AtomicUsize,
        fail_writes: AtomicBool,
    }

    impl FakeBus {
        fn new(data: Vec<f32>, date: Vec<f32>) -> Self {
            Self {
                data,
                date,
                inc_writes: AtomicUsize::new(0),
                date_writes: AtomicUsize::new(0),
                fail_writes: AtomicBool::new(false),
            }
        }

        fn with_frame_at_1700000000() -> Self {
            Self::new(
                (1..=18).map(|v| v as f32).collect(),
                vec![14.0, 11.0, 2023.0, 22.0, 13.0, 20.0],
            )
        }
    }

    #[async_trait]
    impl LtBusClient for FakeBus {
        async fn read_par(
            &self,
            _unit: u8,
            param_addr: u16,
            _param_count: u16,
        ) -> Result<Vec<f32>, LtError> {
            match param_addr {
                PAR_FRAME_DATA => Ok(self.data.clone()),
                PAR_CURSOR_DATE => Ok(self.date.clone()),
                PAR_POINT_IDS => Ok((1..=18).map(|v| v as f32).collect()),
                _ => Ok(Vec::new()),
            }
        }

        async fn write_par(
            &self,
            _unit: u8,
            param_addr: u16,
            values: &[f32],
        ) -> Result<(u16, u16), LtError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(LtError::MalformedResponse {
                    expected: 6,
                    got: 3,
                });
            }
            match param_addr {
                PAR_CURSOR_INC => self.inc_writes.fetch_add(1, Ordering::SeqCst),
                PAR_CURSOR_DATE => self.date_writes.fetch_add(1, Ordering::SeqCst),
                _ => 0,
            };
            Ok((raw_addr(param_addr), raw_count(values.len() as u16)))
        }
    }

    fn start_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1700000000, 0).unwrap()
    }

    #[test]
    fn test_decode_timestamp_known_date() {
        let fields = [14.0, 11.0, 2023.0, 22.0, 13.0, 20.0];
        assert_eq!(decode_timestamp(&fields), 1700000000);
    }

    #[test]
    fn test_decode_timestamp_invalid_is_zero() {
        assert_eq!(decode_timestamp(&[0.0; 6]), 0);
        assert_eq!(decode_timestamp(&[31.0, 2.0, 2023.0, 0.0, 0.0, 0.0]), 0);
        assert_eq!(decode_timestamp(&[14.0, 11.0]), 0);
    }

    #[tokio::test]
    async fn test_three_step_drain_yields_three_rows() {
        let bus = Arc::new(FakeBus::with_frame_at_1700000000());
        let mut logger = TrendLogger::new(bus.clone(), 31);

        logger.position(start_time()).await.unwrap();
        assert_eq!(logger.state(), LoggerState::Positioned);

        let ctl = DrainControl::new();
        let rows = logger.drain(3, &ctl).await.unwrap();

        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.timestamp, 1700000000);
            assert_eq!(row.values.len(), 18);
            assert_eq!(row.values[0], 1.0);
        }
        assert_eq!(logger.state(), LoggerState::Done);
        assert_eq!(bus.inc_writes.load(Ordering::SeqCst), 3);
        assert_eq!(ctl.progress(), 100);
    }

    #[tokio::test]
    async fn test_zero_timestamp_rows_are_skipped_but_cursor_advances() {
        let bus = Arc::new(FakeBus::new((1..=18).map(|v| v as f32).collect(), vec![0.0; 6]));
        let mut logger = TrendLogger::new(bus.clone(), 31);

        logger.position(start_time()).await.unwrap();
        let rows = logger.drain(5, &DrainControl::new()).await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(bus.inc_writes.load(Ordering::SeqCst), 5);
        assert_eq!(logger.state(), LoggerState::Done);
    }

    #[tokio::test]
    async fn test_empty_reads_skip_steps_without_failing() {
        let bus = Arc::new(FakeBus::new(Vec::new(), vec![14.0, 11.0, 2023.0, 0.0, 0.0, 0.0]));
        let mut logger = TrendLogger::new(bus.clone(), 31);

        logger.position(start_time()).await.unwrap();
        let rows = logger.drain(4, &DrainControl::new()).await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(bus.inc_writes.load(Ordering::SeqCst), 4);
        assert_eq!(logger.state(), LoggerState::Done);
    }

    #[tokio::test]
    async fn test_malformed_write_echo_fails_the_session() {
        let bus = Arc::new(FakeBus::with_frame_at_1700000000());
        let mut logger = TrendLogger::new(bus.clone(), 31);
        logger.position(start_time()).await.unwrap();

        bus.fail_writes.store(true, Ordering::SeqCst);
        let result = logger.drain(3, &DrainControl::new()).await;

        assert!(matches!(result, Err(LtError::MalformedResponse { .. })));
        assert_eq!(logger.state(), LoggerState::Failed);
    }

    #[tokio::test]
    async fn test_position_failure_is_fatal() {
        let bus = Arc::new(FakeBus::with_frame_at_1700000000());
        bus.fail_writes.store(true, Ordering::SeqCst);
        let mut logger = TrendLogger::new(bus, 31);

        assert!(logger.position(start_time()).await.is_err());
        assert_eq!(logger.state(), LoggerState::Failed);
    }

    #[tokio::test]
    async fn test_drain_requires_positioning() {
        let bus = Arc::new(FakeBus::with_frame_at_1700000000());
        let mut logger = TrendLogger::new(bus, 31);

        let result = logger.drain(3, &DrainControl::new()).await;
        assert!(matches!(result, Err(LtError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_cancellation_stops_after_current_step() {
        let bus = Arc::new(FakeBus::with_frame_at_1700000000());
        let mut logger = TrendLogger::new(bus.clone(), 31);
        logger.position(start_time()).await.unwrap();

        let ctl = DrainControl::new();
        ctl.cancel();
        let rows = logger.drain(10, &ctl).await.unwrap();

        // the step in flight completes, including its cursor increment
        assert_eq!(rows.len(), 1);
        assert_eq!(bus.inc_writes.load(Ordering::SeqCst), 1);
        assert_eq!(logger.state(), LoggerState::Done);
    }

    /// Full stack below the logger: real codec and engine over a scripted
    /// wire-level unit.
    struct FakeUnit;

    impl crate::modbus::transport::Transport for FakeUnit {
        fn send(&mut self, frame: &[u8], expected_reply_len: usize) -> Result<Vec<u8>, LtError> {
            use crate::modbus::frame::{FUNC_READ, FUNC_WRITE};

            let addr = u16::from_be_bytes([frame[2], frame[3]]);
            match frame[1] {
                FUNC_READ => {
                    let values: Vec<f32> = match addr {
                        a if a == raw_addr(PAR_FRAME_DATA) => (1..=18).map(|v| v as f32).collect(),
                        a if a == raw_addr(PAR_CURSOR_DATE) => {
                            vec![14.0, 11.0, 2023.0, 22.0, 13.0, 20.0]
                        }
                        a if a == raw_addr(PAR_POINT_IDS) => (1..=18).map(|v| v as f32).collect(),
                        _ => Vec::new(),
                    };
                    let mut reply = vec![frame[0], frame[1], (values.len() * 4) as u8];
                    for v in &values {
                        reply.extend_from_slice(&v.to_be_bytes());
                    }
                    assert_eq!(reply.len(), expected_reply_len);
                    Ok(reply)
                }
                FUNC_WRITE => Ok(frame[..6].to_vec()),
                _ => Ok(Vec::new()),
            }
        }
    }

    #[tokio::test]
    async fn test_end_to_end_drain_over_fake_transport() {
        use crate::modbus::client::LtClient;
        use std::time::Duration;

        let client = Arc::new(LtClient::new(Box::new(FakeUnit), Duration::ZERO));
        let mut logger = TrendLogger::new(client, 31);

        let points = logger.read_points().await.unwrap();
        assert_eq!(points.len(), 18);

        logger.position(start_time()).await.unwrap();
        let rows = logger.drain(3, &DrainControl::new()).await.unwrap();

        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.timestamp, 1700000000);
            assert_eq!(row.values, (1..=18).map(|v| v as f32).collect::<Vec<_>>());
        }
        assert_eq!(logger.state(), LoggerState::Done);
    }

    #[tokio::test]
    async fn test_read_points() {
        let bus = Arc::new(FakeBus::with_frame_at_1700000000());
        let logger = TrendLogger::new(bus, 31);
        let points = logger.read_points().await.unwrap();
        assert_eq!(points.len(), 18);
        assert_eq!(points[0], 1);
        assert_eq!(points[17], 18);
    }
}

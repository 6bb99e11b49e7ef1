use async_trait::async_trait;
use log::{debug, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::cache::ParCache;
use super::frame;
use super::transport::Transport;
use crate::utils::error::LtError;

/// Parameter-addressed register access, the way the rest of the crate sees
/// the unit. Implemented by [`LtClient`] over a real link and by fakes in
/// tests.
#[async_trait]
pub trait LtBusClient: Send + Sync {
    /// Read `param_count` parameters starting at `param_addr`. An empty list
    /// means "no usable data this cycle", not an error.
    async fn read_par(
        &self,
        unit: u8,
        param_addr: u16,
        param_count: u16,
    ) -> Result<Vec<f32>, LtError>;

    /// Write parameters starting at `param_addr`. Returns the unit's
    /// `(raw_addr, raw_count)` echo. Never served from cache.
    async fn write_par(
        &self,
        unit: u8,
        param_addr: u16,
        values: &[f32],
    ) -> Result<(u16, u16), LtError>;
}

/// Protocol engine: frame codec + transport + optional read cache. A pure
/// request/response relay; all cursor state lives on the remote unit.
pub struct LtClient {
    transport: Arc<Mutex<Box<dyn Transport>>>,
    cache: Arc<Mutex<ParCache>>,
}

impl LtClient {
    pub fn new(transport: Box<dyn Transport>, cache_ttl: Duration) -> Self {
        if !cache_ttl.is_zero() {
            info!("🗃️  Read cache enabled, TTL {} ms", cache_ttl.as_millis());
        }
        Self {
            transport: Arc::new(Mutex::new(transport)),
            cache: Arc::new(Mutex::new(ParCache::new(cache_ttl))),
        }
    }

    fn round_trip(&self, frame: &[u8], expected_reply_len: usize) -> Result<Vec<u8>, LtError> {
        let mut transport = self.transport.lock().map_err(|_| LtError::LockError)?;
        transport.send(frame, expected_reply_len)
    }
}

#[async_trait]
impl LtBusClient for LtClient {
    async fn read_par(
        &self,
        unit: u8,
        param_addr: u16,
        param_count: u16,
    ) -> Result<Vec<f32>, LtError> {
        let key = (unit, param_addr, param_count);
        if let Some(values) = self.cache.lock().map_err(|_| LtError::LockError)?.lookup(&key) {
            debug!("🗃️  Cache hit for {:?}", key);
            return Ok(values);
        }

        let request = frame::encode_read(unit, param_addr, param_count);
        let reply = self.round_trip(&request, frame::read_reply_len(param_count))?;
        let values = frame::decode_read(&reply, param_count);

        self.cache
            .lock()
            .map_err(|_| LtError::LockError)?
            .store(key, values.clone());
        Ok(values)
    }

    async fn write_par(
        &self,
        unit: u8,
        param_addr: u16,
        values: &[f32],
    ) -> Result<(u16, u16), LtError> {
        let request = frame::encode_write(unit, param_addr, values);
        let reply = self.round_trip(&request, frame::WRITE_REPLY_LEN)?;
        frame::decode_write(&reply)
    }
}

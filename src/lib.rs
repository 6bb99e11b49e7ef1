//! LT-Modbus trend reader
//!
//! Client for the Modbus-derived register dialect spoken by a family of
//! trend-logging units, over RS-485/RS-232 or TCP/IP. Parameters are pairs
//! of 16-bit registers interpreted as big-endian floats; the unit keeps a
//! circular log buffer with a remote frame cursor that this crate positions
//! and walks to export timestamped data rows.

pub mod cli;
pub mod config;
pub mod logger;
pub mod modbus;
pub mod output;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, LinkConfig};
pub use logger::{DrainControl, DrainTask, LogRow, LoggerState, SessionRegistry, TrendLogger};
pub use modbus::{open_link, LtBusClient, LtClient, Transport};
pub use output::{ConsoleSink, CsvFormatter, FileSink, RowFormatter, RowSink};
pub use utils::error::LtError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

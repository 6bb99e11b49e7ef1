pub mod cache;
pub mod client;
pub mod crc;
pub mod frame;
pub mod transport;

pub use cache::ParCache;
pub use client::{LtBusClient, LtClient};
pub use crc::{crc16, crc16_wire};
pub use transport::{open_link, SerialTransport, TcpTransport, Transport};

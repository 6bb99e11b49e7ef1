use log::{debug, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::crc::crc16_wire;
use crate::config::settings::{LinkConfig, SerialLinkConfig, TcpLinkConfig};
use crate::utils::error::LtError;

/// Length of the TCP envelope: two reserved u16 fields plus a u16 frame length.
pub const TCP_HEADER_LEN: usize = 6;

/// Raw byte-level link to the unit. Strictly half-duplex: one request, one
/// reply, no pipelining. A transport must never be driven by more than one
/// caller at a time.
pub trait Transport: Send {
    /// Send one frame and collect up to `expected_reply_len` payload bytes.
    ///
    /// A timeout or short read returns whatever was collected, truncated;
    /// callers disambiguate an empty result from a well-formed answer by
    /// length. Only link-level failures are errors.
    fn send(&mut self, frame: &[u8], expected_reply_len: usize) -> Result<Vec<u8>, LtError>;
}

/// Open the transport selected by the link configuration.
pub fn open_link(link: &LinkConfig) -> Result<Box<dyn Transport>, LtError> {
    match link {
        LinkConfig::Serial(cfg) => Ok(Box::new(SerialTransport::open(cfg)?)),
        LinkConfig::Tcp(cfg) => Ok(Box::new(TcpTransport::open(cfg)?)),
    }
}

/// Read up to `want` bytes, stopping early on a timeout. Anything else on the
/// link is fatal.
fn read_upto<R: Read>(reader: &mut R, want: usize) -> Result<Vec<u8>, LtError> {
    let mut collected = Vec::with_capacity(want);
    let mut buf = [0u8; 256];

    while collected.len() < want {
        let remaining = want - collected.len();
        let slice = &mut buf[..remaining.min(256)];
        match reader.read(slice) {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&slice[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                break
            }
            Err(e) => return Err(LtError::ConnectionFailed(format!("Read failed: {}", e))),
        }
    }
    Ok(collected)
}

/// RS-485/RS-232 link. The checksum lives here: every outgoing frame gets the
/// two CRC bytes appended, every reply carries two trailing CRC bytes which
/// are stripped without verification (accepted on faith, as the unit does).
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(cfg: &SerialLinkConfig) -> Result<Self, LtError> {
        info!("🔌 Opening serial link: {}", cfg.port);
        info!(
            "⚙️  Configuration: {} baud, {} data bits, {} parity, {} stop bits, {} ms timeout",
            cfg.baud_rate.to_wire(),
            cfg.data_bits.to_wire(),
            cfg.parity,
            cfg.stop_bits.to_wire(),
            cfg.timeout_ms
        );

        let port = serialport::new(&cfg.port, cfg.baud_rate.to_wire())
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .data_bits(cfg.data_bits.to_serial())
            .stop_bits(cfg.stop_bits.to_serial())
            .parity(cfg.parity.to_serial())
            .open()
            .map_err(|e| {
                LtError::ConnectionFailed(format!("Failed to open port {}: {}", cfg.port, e))
            })?;

        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &[u8], expected_reply_len: usize) -> Result<Vec<u8>, LtError> {
        // Leftovers from a previous partial exchange would desync the reply
        self.port
            .clear(ClearBuffer::All)
            .map_err(|e| LtError::ConnectionFailed(format!("Buffer flush failed: {}", e)))?;

        let mut msg = frame.to_vec();
        msg.extend_from_slice(&crc16_wire(frame));
        debug!("📤 TX {} bytes: {}", msg.len(), hex::encode(&msg));

        self.port
            .write_all(&msg)
            .map_err(|e| LtError::ConnectionFailed(format!("Write failed: {}", e)))?;
        self.port
            .flush()
            .map_err(|e| LtError::ConnectionFailed(format!("Flush failed: {}", e)))?;

        // Reply payload plus its own two CRC bytes
        let mut reply = read_upto(&mut self.port, expected_reply_len + 2)?;
        debug!("📥 RX {} bytes: {}", reply.len(), hex::encode(&reply));

        let keep = reply.len().saturating_sub(2);
        reply.truncate(keep);
        Ok(reply)
    }
}

/// Build the 6-byte TCP envelope: two reserved fields (always 0) and the
/// frame length, all big-endian u16.
pub fn tcp_envelope(frame_len: u16) -> [u8; TCP_HEADER_LEN] {
    let mut header = [0u8; TCP_HEADER_LEN];
    header[4..6].copy_from_slice(&frame_len.to_be_bytes());
    header
}

/// TCP-encapsulated link. The logical frame travels without a checksum; the
/// envelope carries the frame length instead.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn open(cfg: &TcpLinkConfig) -> Result<Self, LtError> {
        let addr = format!("{}:{}", cfg.host, cfg.port);
        info!("🔌 Connecting to unit at {}", addr);

        let timeout = Duration::from_millis(cfg.timeout_ms);
        let sock_addr = addr
            .to_socket_addrs()
            .map_err(|e| LtError::ConnectionFailed(format!("Bad address {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| LtError::ConnectionFailed(format!("No address for {}", addr)))?;
        let stream = TcpStream::connect_timeout(&sock_addr, timeout)
            .map_err(|e| LtError::ConnectionFailed(format!("Can't connect to unit: {}", e)))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, frame: &[u8], expected_reply_len: usize) -> Result<Vec<u8>, LtError> {
        let mut msg = tcp_envelope(frame.len() as u16).to_vec();
        msg.extend_from_slice(frame);
        debug!("📤 TX {} bytes: {}", msg.len(), hex::encode(&msg));

        self.stream
            .write_all(&msg)
            .map_err(|e| LtError::ConnectionFailed(format!("Write failed: {}", e)))?;

        let reply = read_upto(&mut self.stream, expected_reply_len + TCP_HEADER_LEN)?;
        debug!("📥 RX {} bytes: {}", reply.len(), hex::encode(&reply));

        if reply.len() <= TCP_HEADER_LEN {
            return Ok(Vec::new());
        }
        Ok(reply[TCP_HEADER_LEN..].to_vec())
    }
}

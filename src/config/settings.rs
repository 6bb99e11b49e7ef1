use clap::ArgMatches;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::utils::error::LtError;

/// The unit number the loggers ship with.
pub const DEFAULT_UNIT: u8 = 31;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Unit selection
    pub unit: u8,

    // Link settings
    pub link: LinkConfig,

    // Export settings
    pub start_time: Option<String>, // "dd/mm/yyyy hh:mm:ss", default: one hour ago
    pub frames: u32,
    pub cache_ttl_ms: u64,

    // Point id -> human readable column label, used only for headers
    pub point_labels: HashMap<String, String>,

    // Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LinkConfig {
    Serial(SerialLinkConfig),
    Tcp(TcpLinkConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialLinkConfig {
    pub port: String,
    pub baud_rate: BaudRate,
    pub parity: ParityConfig,
    pub data_bits: DataBitsConfig,
    pub stop_bits: StopBitsConfig,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpLinkConfig {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub csv_file: Option<String>,
    pub console: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
    Sql,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Result<Self, LtError> {
        match name {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "sql" => Ok(OutputFormat::Sql),
            other => Err(LtError::ConfigError(format!("Unknown format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

impl ParityConfig {
    pub fn to_serial(self) -> serialport::Parity {
        match self {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        }
    }

    /// One-letter form used by the CLI and the unit's documentation.
    pub fn from_wire(s: &str) -> Result<Self, LtError> {
        match s {
            "N" | "n" => Ok(ParityConfig::None),
            "E" | "e" => Ok(ParityConfig::Even),
            "O" | "o" => Ok(ParityConfig::Odd),
            other => Err(LtError::ConfigError(format!("Unknown parity: {}", other))),
        }
    }
}

impl fmt::Display for ParityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParityConfig::None => write!(f, "N"),
            ParityConfig::Even => write!(f, "E"),
            ParityConfig::Odd => write!(f, "O"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub fn to_wire(self) -> u32 {
        match self {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }

    pub fn from_wire(rate: u32) -> Result<Self, LtError> {
        match rate {
            1200 => Ok(BaudRate::B1200),
            2400 => Ok(BaudRate::B2400),
            4800 => Ok(BaudRate::B4800),
            9600 => Ok(BaudRate::B9600),
            19200 => Ok(BaudRate::B19200),
            38400 => Ok(BaudRate::B38400),
            57600 => Ok(BaudRate::B57600),
            115200 => Ok(BaudRate::B115200),
            other => Err(LtError::ConfigError(format!(
                "Unsupported baud rate: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBitsConfig {
    Seven,
    Eight,
}

impl DataBitsConfig {
    pub fn to_wire(self) -> u8 {
        match self {
            DataBitsConfig::Seven => 7,
            DataBitsConfig::Eight => 8,
        }
    }

    pub fn to_serial(self) -> serialport::DataBits {
        match self {
            DataBitsConfig::Seven => serialport::DataBits::Seven,
            DataBitsConfig::Eight => serialport::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBitsConfig {
    One,
    Two,
}

impl StopBitsConfig {
    pub fn to_wire(self) -> u8 {
        match self {
            StopBitsConfig::One => 1,
            StopBitsConfig::Two => 2,
        }
    }

    pub fn to_serial(self) -> serialport::StopBits {
        match self {
            StopBitsConfig::One => serialport::StopBits::One,
            StopBitsConfig::Two => serialport::StopBits::Two,
        }
    }
}

impl Default for SerialLinkConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".to_string(),
            baud_rate: BaudRate::B4800,
            parity: ParityConfig::Even,
            data_bits: DataBitsConfig::Eight,
            stop_bits: StopBitsConfig::One,
            timeout_ms: 1500,
        }
    }
}

impl Default for TcpLinkConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 502,
            timeout_ms: 2000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unit: DEFAULT_UNIT,
            link: LinkConfig::Serial(SerialLinkConfig::default()),
            start_time: None,
            frames: 20,
            cache_ttl_ms: 0,
            point_labels: HashMap::new(),
            output: OutputConfig {
                format: OutputFormat::Csv,
                csv_file: None,
                console: true,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LtError> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            LtError::ConfigError(format!("Can't read {}: {}", path.as_ref().display(), e))
        })?;
        toml::from_str(&content).map_err(|e| LtError::ConfigError(format!("Bad config: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), LtError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LtError::ConfigError(format!("Can't create dir: {}", e)))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| LtError::ConfigError(format!("Serialize failed: {}", e)))?;
        std::fs::write(&path, content)
            .map_err(|e| LtError::ConfigError(format!("Can't write config: {}", e)))
    }

    /// Build a config from command line arguments, starting from an optional
    /// config file and overriding with explicit flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, LtError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => {
                info!("📄 Loading configuration from {}", path);
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        if let Some(unit) = matches.get_one::<String>("unit") {
            config.unit = unit
                .parse()
                .map_err(|_| LtError::ConfigError(format!("Bad unit number: {}", unit)))?;
        }

        // An explicit ip selects the TCP link, otherwise serial settings apply
        if let Some(ip) = matches.get_one::<String>("ip") {
            config.link = LinkConfig::Tcp(TcpLinkConfig {
                host: ip.clone(),
                ..TcpLinkConfig::default()
            });
        } else {
            let mut serial = match &config.link {
                LinkConfig::Serial(s) => s.clone(),
                LinkConfig::Tcp(_) => SerialLinkConfig::default(),
            };
            if let Some(port) = matches.get_one::<String>("port") {
                serial.port = port.clone();
            }
            if let Some(baud) = matches.get_one::<String>("baud") {
                let rate: u32 = baud
                    .parse()
                    .map_err(|_| LtError::ConfigError(format!("Bad baud rate: {}", baud)))?;
                serial.baud_rate = BaudRate::from_wire(rate)?;
            }
            if let Some(parity) = matches.get_one::<String>("parity") {
                serial.parity = ParityConfig::from_wire(parity)?;
            }
            config.link = LinkConfig::Serial(serial);
        }

        if let Some(time_str) = matches.get_one::<String>("time") {
            config.start_time = Some(time_str.clone());
        }
        if let Some(num) = matches.get_one::<String>("num") {
            config.frames = num
                .parse()
                .map_err(|_| LtError::ConfigError(format!("Bad frame count: {}", num)))?;
        }
        if let Some(ttl) = matches.get_one::<String>("ttl") {
            config.cache_ttl_ms = ttl
                .parse()
                .map_err(|_| LtError::ConfigError(format!("Bad cache TTL: {}", ttl)))?;
        }
        if let Some(file) = matches.get_one::<String>("file") {
            config.output.csv_file = Some(file.clone());
        }
        if let Some(format) = matches.get_one::<String>("format") {
            config.output.format = OutputFormat::from_name(format)?;
        }

        Ok(config)
    }

    /// Column label for a point id read from the unit, falling back to the
    /// original tool's "Pnn" form.
    pub fn point_label(&self, point_id: u32) -> String {
        self.point_labels
            .get(&point_id.to_string())
            .cloned()
            .unwrap_or_else(|| format!("P{:02}", point_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_the_unit() {
        let config = Config::default();
        assert_eq!(config.unit, 31);
        assert_eq!(config.frames, 20);
        match config.link {
            LinkConfig::Serial(s) => {
                assert_eq!(s.baud_rate.to_wire(), 4800);
                assert_eq!(s.parity, ParityConfig::Even);
                assert_eq!(s.data_bits.to_wire(), 8);
                assert_eq!(s.stop_bits.to_wire(), 1);
                assert_eq!(s.timeout_ms, 1500);
            }
            LinkConfig::Tcp(_) => panic!("default link should be serial"),
        }
    }

    #[test]
    fn test_parity_wire_mapping() {
        assert_eq!(ParityConfig::from_wire("E").unwrap(), ParityConfig::Even);
        assert_eq!(ParityConfig::from_wire("n").unwrap(), ParityConfig::None);
        assert!(ParityConfig::from_wire("X").is_err());
        assert_eq!(ParityConfig::Odd.to_string(), "O");
    }

    #[test]
    fn test_baud_wire_mapping() {
        assert_eq!(BaudRate::from_wire(4800).unwrap(), BaudRate::B4800);
        assert_eq!(BaudRate::B115200.to_wire(), 115200);
        assert!(BaudRate::from_wire(1234).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.unit, config.unit);
        assert_eq!(back.frames, config.frames);
    }

    #[test]
    fn test_point_label_fallback() {
        let mut config = Config::default();
        config
            .point_labels
            .insert("3".to_string(), "Boiler temp".to_string());
        assert_eq!(config.point_label(3), "Boiler temp");
        assert_eq!(config.point_label(7), "P07");
    }
}

pub mod settings;

pub use settings::{
    BaudRate, Config, DataBitsConfig, LinkConfig, OutputConfig, OutputFormat, ParityConfig,
    SerialLinkConfig, StopBitsConfig, TcpLinkConfig, DEFAULT_UNIT,
};

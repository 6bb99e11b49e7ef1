use anyhow::Result;
use clap::{Arg, Command};
use log::info;

use ltmodbus::cli::run_export;
use ltmodbus::config::Config;
use ltmodbus::logger::SessionRegistry;
use ltmodbus::VERSION;

fn build_cli() -> Command {
    Command::new("ltmodbus")
        .version(VERSION)
        .about("LT-Modbus trend reader")
        .arg(
            Arg::new("unit")
                .short('u')
                .long("unit")
                .value_name("NUM")
                .help("unit number (default: 31)"),
        )
        .arg(
            Arg::new("port")
                .short('c')
                .long("port")
                .value_name("DEVICE")
                .help("serial com-port device (default: /dev/ttyS0)"),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_name("RATE")
                .help("serial port baudrate (default: 4800)"),
        )
        .arg(
            Arg::new("parity")
                .short('p')
                .long("parity")
                .value_name("N|E|O")
                .help("serial port parity (default: E)"),
        )
        .arg(
            Arg::new("ip")
                .short('i')
                .long("ip")
                .value_name("HOST")
                .help("unit ip, for TCP/IP communication"),
        )
        .arg(
            Arg::new("time")
                .short('t')
                .long("time")
                .value_name("TIME")
                .help("start time in \"dd/mm/yyyy hh:mm:ss\" format (default: one hour ago)"),
        )
        .arg(
            Arg::new("num")
                .short('n')
                .long("num")
                .value_name("FRAMES")
                .help("number of frames to read (default: 20)"),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("PATH")
                .help(".csv output file name"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("csv|json|sql")
                .help("row output format (default: csv)"),
        )
        .arg(
            Arg::new("ttl")
                .long("ttl")
                .value_name("MS")
                .help("read cache TTL in milliseconds (default: 0, disabled)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("TOML configuration file"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = build_cli().get_matches();
    let config = Config::from_matches(&matches)?;

    info!("🚀 LT-Modbus trend reader v{}", VERSION);

    let registry = SessionRegistry::new();
    run_export(config, registry).await?;
    Ok(())
}

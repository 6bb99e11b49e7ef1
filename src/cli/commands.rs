use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::config::settings::{Config, LinkConfig, OutputFormat};
use crate::logger::task::{DrainTask, SessionRegistry};
use crate::logger::trend::TrendLogger;
use crate::modbus::client::LtClient;
use crate::modbus::transport::open_link;
use crate::output::formatters::{
    CsvFormatter, JsonFormatter, RowFormatter, SqlValuesFormatter, CSV_DATETIME_FORMAT,
};
use crate::output::senders::{ConsoleSink, FileSink, RowSink};
use crate::utils::error::LtError;

/// Identifier for the session registry: one slot per physical link.
fn link_id(link: &LinkConfig) -> String {
    match link {
        LinkConfig::Serial(s) => s.port.clone(),
        LinkConfig::Tcp(t) => format!("{}:{}", t.host, t.port),
    }
}

/// Start time for the export: the configured "dd/mm/yyyy hh:mm:ss" string,
/// or one hour ago when none is given.
fn start_time(config: &Config) -> Result<DateTime<Utc>, LtError> {
    match &config.start_time {
        Some(s) => {
            let naive = NaiveDateTime::parse_from_str(s, CSV_DATETIME_FORMAT)
                .map_err(|e| LtError::ConfigError(format!("Bad start time '{}': {}", s, e)))?;
            Ok(naive.and_utc())
        }
        None => Ok(Utc::now() - ChronoDuration::hours(1)),
    }
}

/// One full export run: open the link, position the cursor, drain the
/// requested number of frames in the background and stream the rows out.
pub async fn run_export(config: Config, registry: Arc<SessionRegistry>) -> Result<(), LtError> {
    let transport = open_link(&config.link)?;
    let client = Arc::new(LtClient::new(
        transport,
        Duration::from_millis(config.cache_ttl_ms),
    ));
    let mut logger = TrendLogger::new(client, config.unit);

    // Column headers from the unit's point table
    let points = logger.read_points().await?;
    let labels: Vec<String> = points.iter().map(|&p| config.point_label(p)).collect();
    info!("📋 Points: timestamp, {}", labels.join(", "));

    let start = start_time(&config)?;
    logger.position(start).await?;

    // One live session per (link, unit); the slot frees when the task ends
    let guard = registry.acquire(&link_id(&config.link), config.unit)?;
    let task = DrainTask::spawn(logger, config.frames, guard);

    // Ctrl-C stops the drain at the next step boundary
    let ctl = task.control();
    let cancel_hook = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Cancellation requested, stopping after the current step");
            ctl.cancel();
        }
    });

    let progress_ctl = task.control();
    let monitor = tokio::spawn(async move {
        let mut last = 0u8;
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let percent = progress_ctl.progress();
            if percent != last {
                info!("📈 Drain progress: {}%", percent);
                last = percent;
            }
        }
    });

    let result = task.join().await;
    monitor.abort();
    cancel_hook.abort();

    let rows = match result {
        Ok(rows) => rows,
        Err(e) => {
            error!("❌ Export failed: {}", e);
            return Err(e);
        }
    };

    let formatter: Box<dyn RowFormatter> = match config.output.format {
        OutputFormat::Csv => Box::new(CsvFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Sql => Box::new(SqlValuesFormatter),
    };
    let mut sinks: Vec<Box<dyn RowSink>> = Vec::new();
    if config.output.console {
        sinks.push(Box::new(ConsoleSink));
    }
    if let Some(path) = &config.output.csv_file {
        sinks.push(Box::new(FileSink::new(path)?));
    }

    let header = formatter.format_header(&labels);
    if !header.is_empty() {
        for sink in sinks.iter_mut() {
            sink.send_line(&header)?;
        }
    }
    for row in &rows {
        let line = formatter.format_row(row);
        for sink in sinks.iter_mut() {
            sink.send_line(&line)?;
        }
    }
    for sink in sinks.iter_mut() {
        sink.flush()?;
    }

    info!("✅ Exported {} rows from unit {}", rows.len(), config.unit);
    Ok(())
}

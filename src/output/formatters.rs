use chrono::{DateTime, TimeZone, Utc};

use crate::logger::trend::LogRow;

pub const CSV_DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";
pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S.000000";

/// Turns log rows into text lines for a sink. Rows reaching a formatter have
/// already been filtered for the zero-timestamp "empty slot" sentinel.
pub trait RowFormatter: Send + Sync {
    fn format_header(&self, labels: &[String]) -> String;
    fn format_row(&self, row: &LogRow) -> String;
}

fn row_datetime(row: &LogRow) -> DateTime<Utc> {
    Utc.timestamp_opt(row.timestamp, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// `dd/mm/yyyy hh:mm:ss,v1,v2,...` with two-decimal values, the format the
/// downstream import tooling expects.
pub struct CsvFormatter;

impl RowFormatter for CsvFormatter {
    fn format_header(&self, labels: &[String]) -> String {
        format!("timestamp,{}", labels.join(","))
    }

    fn format_row(&self, row: &LogRow) -> String {
        let time_str = row_datetime(row).format(CSV_DATETIME_FORMAT);
        let values: Vec<String> = row.values.iter().map(|v| format!("{:.2}", v)).collect();
        format!("{},{}", time_str, values.join(","))
    }
}

/// One JSON object per line, for feeding the rows to other tooling.
pub struct JsonFormatter;

impl RowFormatter for JsonFormatter {
    fn format_header(&self, _labels: &[String]) -> String {
        String::new()
    }

    fn format_row(&self, row: &LogRow) -> String {
        serde_json::json!({
            "timestamp": row.timestamp,
            "time": row_datetime(row).to_rfc3339(),
            "values": row.values,
        })
        .to_string()
    }
}

/// Relational values list keyed by the epoch timestamp, matching the
/// `insert into data values (...)` layout of the import schema.
pub struct SqlValuesFormatter;

impl RowFormatter for SqlValuesFormatter {
    fn format_header(&self, _labels: &[String]) -> String {
        String::new()
    }

    fn format_row(&self, row: &LogRow) -> String {
        let time_str = row_datetime(row).format(SQL_DATETIME_FORMAT);
        let values: Vec<String> = row.values.iter().map(|v| format!("{:.2}", v)).collect();
        format!("{},'{}',{}", row.timestamp, time_str, values.join(","))
    }
}

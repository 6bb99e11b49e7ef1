pub mod formatters;
pub mod senders;

pub use formatters::{CsvFormatter, JsonFormatter, RowFormatter, SqlValuesFormatter};
pub use senders::{ConsoleSink, FileSink, RowSink};

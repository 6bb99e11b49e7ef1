use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::utils::error::LtError;

/// Destination for formatted row lines.
pub trait RowSink: Send {
    fn send_line(&mut self, line: &str) -> Result<(), LtError>;

    fn flush(&mut self) -> Result<(), LtError> {
        Ok(())
    }
}

pub struct ConsoleSink;

impl RowSink for ConsoleSink {
    fn send_line(&mut self, line: &str) -> Result<(), LtError> {
        println!("{}", line);
        Ok(())
    }
}

/// Line-per-row file export, used for the .csv output path.
pub struct FileSink {
    writer: BufWriter<File>,
    path: String,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, LtError> {
        let display = path.as_ref().display().to_string();
        let file = File::create(&path)
            .map_err(|e| LtError::OutputError(format!("Can't create {}: {}", display, e)))?;
        info!("📝 Writing rows to {}", display);
        Ok(Self {
            writer: BufWriter::new(file),
            path: display,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl RowSink for FileSink {
    fn send_line(&mut self, line: &str) -> Result<(), LtError> {
        writeln!(self.writer, "{}", line)
            .map_err(|e| LtError::OutputError(format!("Can't write to {}: {}", self.path, e)))
    }

    fn flush(&mut self) -> Result<(), LtError> {
        self.writer
            .flush()
            .map_err(|e| LtError::OutputError(format!("Can't flush {}: {}", self.path, e)))
    }
}

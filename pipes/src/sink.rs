use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

/// One scalar data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub tag: String,
    pub subset: String,
    pub value: f64,
    pub step: usize,
}

/// Where telemetry ends up.
pub trait TelemetrySink: Send {
    /// Appends `value` to the `tag` series of `subset` at `step`.
    fn add_scalar(&mut self, tag: &str, subset: &str, value: f64, step: usize) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Appends every [`Record`] as a JSON line to a file.
///
/// The file is only opened on the first write, so processes that never log
/// never touch it.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.writer = Some(BufWriter::new(file));
        }

        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("telemetry file not open"))
    }
}

impl TelemetrySink for JsonLinesSink {
    fn add_scalar(&mut self, tag: &str, subset: &str, value: f64, step: usize) -> io::Result<()> {
        let record = Record {
            tag: tag.to_string(),
            subset: subset.to_string(),
            value,
            step,
        };

        let writer = self.writer()?;
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn writes_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("telemetry.jsonl");

        let mut sink = JsonLinesSink::new(&path);
        sink.add_scalar("metrics/mse", "train", 0.5, 1).unwrap();
        sink.add_scalar("metrics/mse", "valid", 0.75, 1).unwrap();
        sink.flush().unwrap();

        let records: Vec<Record> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tag, "metrics/mse");
        assert_eq!(records[1].subset, "valid");
        assert_eq!(records[1].value, 0.75);
    }

    #[test]
    fn untouched_sink_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");

        let mut sink = JsonLinesSink::new(&path);
        sink.flush().unwrap();

        assert!(!path.exists());
    }
}

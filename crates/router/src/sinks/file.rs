//! FileSink - appends measurements to a JSON lines file

use contracts::{ContractError, Measurement, MeasurementSink, SignalId};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// Sink that writes one JSON object per measurement to `<base_path>/<name>.jsonl`
pub struct FileSink {
    name: String,
    signals: Option<Vec<SignalId>>,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create a new FileSink, appending to an existing file
    pub fn new(
        name: impl Into<String>,
        signals: Option<Vec<SignalId>>,
        config: FileSinkConfig,
    ) -> std::io::Result<Self> {
        let name = name.into();
        // Create base directory if it doesn't exist
        fs::create_dir_all(&config.base_path)?;

        let path = config.base_path.join(format!("{name}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            name,
            signals,
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Create from params map (for blueprint-driven setup)
    pub fn from_params(
        name: impl Into<String>,
        signals: Option<Vec<SignalId>>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, signals, config)
    }

    /// Output file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_batch(&mut self, batch: &[Measurement]) -> std::io::Result<()> {
        for measurement in batch {
            serde_json::to_writer(&mut self.writer, measurement)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }

    fn persist_batch(&mut self, batch: &[Measurement]) -> Result<(), ContractError> {
        self.write_batch(batch).map_err(|e| {
            error!(sink = %self.name, measurements = batch.len(), error = %e, "Write failed");
            ContractError::sink_deliver(&self.name, e.to_string())
        })
    }
}

impl MeasurementSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_signals(&self) -> Option<Vec<SignalId>> {
        self.signals.clone()
    }

    #[instrument(
        name = "file_sink_deliver",
        skip(self, batch),
        fields(sink = %self.name, measurements = batch.len())
    )]
    async fn deliver(&mut self, batch: &[Measurement]) -> Result<(), ContractError> {
        self.persist_batch(batch)
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.writer
            .flush()
            .map_err(|e| ContractError::sink_deliver(&self.name, e.to_string()))?;
        debug!(sink = %self.name, path = %self.path.display(), "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_sink_writes_json_lines() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig {
            base_path: dir.path().to_path_buf(),
        };

        let mut sink = FileSink::new("historian", None, config).unwrap();
        let batch = vec![
            Measurement::new("A", 1.5, 10.0),
            Measurement::new("B", -2.0, 10.5),
        ];

        sink.deliver(&batch).await.unwrap();
        sink.close().await.unwrap();

        let content = fs::read_to_string(dir.path().join("historian.jsonl")).unwrap();
        let lines: Vec<Measurement> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, batch);
    }

    #[tokio::test]
    async fn test_file_sink_from_params() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("out");
        let mut params = HashMap::new();
        params.insert(
            "base_path".to_string(),
            nested.to_string_lossy().into_owned(),
        );

        let sink = FileSink::from_params("pmu", Some(vec!["A".into()]), &params).unwrap();
        assert!(nested.exists());
        assert_eq!(sink.path(), nested.join("pmu.jsonl"));
        assert_eq!(sink.input_signals(), Some(vec![SignalId::from("A")]));
    }

    #[test]
    fn test_default_base_path() {
        let config = FileSinkConfig::from_params(&HashMap::new());
        assert_eq!(config.base_path, PathBuf::from("./output"));
    }
}

//! Reading and writing tabular files with polars

use crate::error::{FraudError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::info;

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| FraudError::DataError(format!("{}: {}", path.display(), e)))
}

/// Data loader for the file formats the pipeline reads
#[derive(Debug, Clone)]
pub struct DataLoader {
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self { infer_schema_length: Some(1000) }
    }

    /// Rows scanned to infer CSV column types; `None` scans the whole file
    pub fn with_infer_schema_length(mut self, n: Option<usize>) -> Self {
        self.infer_schema_length = n;
        self
    }

    /// Load a comma separated file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.load_csv_with_separator(path, b',')
    }

    pub fn load_csv_with_separator(&self, path: impl AsRef<Path>, separator: u8) -> Result<DataFrame> {
        let file = open(path.as_ref())?;
        let parse_opts = CsvParseOptions::default().with_separator(separator);

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()?;
        Ok(df)
    }

    pub fn load_parquet(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let file = open(path.as_ref())?;
        Ok(ParquetReader::new(file).finish()?)
    }

    /// Load a JSON array file, or newline-delimited JSON for `.jsonl`/`.ndjson`
    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = open(path)?;
        let format = match extension(path).as_str() {
            "jsonl" | "ndjson" => JsonFormat::JsonLines,
            _ => JsonFormat::Json,
        };
        Ok(JsonReader::new(file).with_json_format(format).finish()?)
    }

    /// Detect the format from the file extension and load
    pub fn load_auto(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let df = match extension(path).as_str() {
            "csv" => self.load_csv(path)?,
            "tsv" => self.load_csv_with_separator(path, b'\t')?,
            "parquet" | "pq" => self.load_parquet(path)?,
            "json" | "jsonl" | "ndjson" => self.load_json(path)?,
            other => {
                return Err(FraudError::DataError(format!(
                    "unsupported file extension '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };
        info!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "data loaded"
        );
        Ok(df)
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Writers for data frames
pub struct DataSaver;

impl DataSaver {
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;
        CsvWriter::new(&mut file).finish(df)?;
        Ok(())
    }

    pub fn save_parquet(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        ParquetWriter::new(file).finish(df)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = create_test_file(".csv", "a,b,c\n1,2,3\n4,5,6\n7,8,9\n");
        let df = DataLoader::new().load_auto(file.path()).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_load_tsv() {
        let file = create_test_file(".tsv", "a\tb\n1\t2\n3\t4\n");
        let df = DataLoader::new().load_auto(file.path()).unwrap();
        assert_eq!(df.width(), 2);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_unknown_extension() {
        let file = create_test_file(".xlsx", "junk");
        assert!(matches!(
            DataLoader::new().load_auto(file.path()),
            Err(FraudError::DataError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(DataLoader::new().load_csv("/nonexistent/train.csv").is_err());
    }

    #[test]
    fn test_save_and_reload_csv() {
        let mut df = DataFrame::new(vec![
            Column::new("a".into(), &[1, 2, 3]),
            Column::new("b".into(), &[0.5, 0.25, 0.125]),
        ])
        .unwrap();

        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        DataSaver::save_csv(&mut df, file.path()).unwrap();

        let loaded = DataLoader::new().load_csv(file.path()).unwrap();
        assert_eq!(loaded.height(), 3);
        assert_eq!(loaded.width(), 2);
    }
}

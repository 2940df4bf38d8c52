//! Bulk import of gold-card codes from a CSV file.

use std::io::Read;
use std::path::Path;

use cptlookup_core::GoldCardCode;
use cptlookup_storage::{GoldCardStore, StorageError};

/// Codes sent to the store per insert.
pub const BATCH_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CSV at line {line}: {message}")]
    Csv { line: u64, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    /// Non-blank codes found in the file.
    pub read: usize,
    /// Rows actually added; codes already present are not counted.
    pub inserted: u64,
}

/// Reads one code per record from the first column.
///
/// Blank records are skipped and whitespace is trimmed. There is no header
/// row.
pub fn read_codes<R: Read>(reader: R) -> Result<Vec<String>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut codes = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| ImportError::Csv {
            line: e.position().map(|p| p.line()).unwrap_or_default(),
            message: e.to_string(),
        })?;
        if let Some(entry) = record.get(0).and_then(GoldCardCode::parse) {
            codes.push(entry.code);
        }
    }
    Ok(codes)
}

pub fn read_codes_from_path(path: &Path) -> Result<Vec<String>, ImportError> {
    let file = std::fs::File::open(path).map_err(|source| ImportError::Open {
        path: path.display().to_string(),
        source,
    })?;
    read_codes(file)
}

/// Inserts `codes` in batches, skipping codes already on the list.
pub async fn import_codes(
    store: &dyn GoldCardStore,
    codes: &[String],
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary {
        read: codes.len(),
        inserted: 0,
    };

    for (index, batch) in codes.chunks(BATCH_SIZE).enumerate() {
        let inserted = store.insert_codes(batch).await?;
        tracing::debug!(batch = index, size = batch.len(), inserted, "gold-card batch stored");
        summary.inserted += inserted;
    }

    tracing::info!(read = summary.read, inserted = summary.inserted, "gold-card import finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    #[test]
    fn test_read_codes_first_column_trimmed() {
        let input = "99213\n  0001A ,extra\n\n   \n99214\r\n";
        let codes = read_codes(input.as_bytes()).unwrap();
        assert_eq!(codes, vec!["99213", "0001A", "99214"]);
    }

    #[test]
    fn test_read_codes_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "99213\n99215").unwrap();

        let codes = read_codes_from_path(file.path()).unwrap();
        assert_eq!(codes, vec!["99213", "99215"]);

        let err = read_codes_from_path(Path::new("/nonexistent/codes.csv")).unwrap_err();
        assert!(matches!(err, ImportError::Open { .. }));
    }

    /// Keeps every batch it was handed.
    #[derive(Default)]
    struct BatchRecorder {
        batches: Mutex<Vec<usize>>,
        seen: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl GoldCardStore for BatchRecorder {
        async fn find_existing(&self, _codes: &[String]) -> Result<HashSet<String>, StorageError> {
            Ok(HashSet::new())
        }

        async fn insert_codes(&self, codes: &[String]) -> Result<u64, StorageError> {
            self.batches.lock().unwrap().push(codes.len());
            let mut seen = self.seen.lock().unwrap();
            Ok(codes.iter().filter(|c| seen.insert((*c).clone())).count() as u64)
        }
    }

    #[tokio::test]
    async fn test_import_in_batches_of_100() {
        let store = BatchRecorder::default();
        let mut codes: Vec<String> = (0..250).map(|i| format!("{i:05}")).collect();
        codes.push("00000".into());

        let summary = import_codes(&store, &codes).await.unwrap();
        assert_eq!(summary, ImportSummary { read: 251, inserted: 250 });
        assert_eq!(*store.batches.lock().unwrap(), vec![100, 100, 51]);
    }

    #[tokio::test]
    async fn test_import_nothing() {
        let store = BatchRecorder::default();
        let summary = import_codes(&store, &[]).await.unwrap();
        assert_eq!(summary, ImportSummary::default());
        assert!(store.batches.lock().unwrap().is_empty());
    }
}

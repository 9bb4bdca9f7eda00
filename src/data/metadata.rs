//! Experimental metadata table, one row per sample id.

use crate::error::{PermivarError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// A metadata table keyed by sample id.
///
/// Values are kept as raw strings; coercion into categorical factors with
/// fixed level sets happens at join time so that the same table can back
/// several differently-configured analyses.
#[derive(Debug, Clone)]
pub struct MetadataTable {
    sample_ids: Vec<String>,
    column_names: Vec<String>,
    data: HashMap<String, HashMap<String, String>>,
}

impl MetadataTable {
    /// Load a tab-separated metadata table.
    ///
    /// The header must contain `id_column`; its values key the rows and
    /// must be unique.
    pub fn from_tsv<P: AsRef<Path>>(path: P, id_column: &str) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let id_idx = headers
            .iter()
            .position(|h| h == id_column)
            .ok_or_else(|| PermivarError::MissingColumn(id_column.to_string()))?;
        let column_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_idx)
            .map(|(_, h)| h.clone())
            .collect();

        let mut sample_ids = Vec::new();
        let mut data = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let id = record
                .get(id_idx)
                .unwrap_or("")
                .trim()
                .to_string();
            if id.is_empty() {
                continue;
            }
            let mut row = HashMap::new();
            for (i, header) in headers.iter().enumerate() {
                if i == id_idx {
                    continue;
                }
                row.insert(
                    header.clone(),
                    record.get(i).unwrap_or("").trim().to_string(),
                );
            }
            if data.insert(id.clone(), row).is_some() {
                return Err(PermivarError::Join(format!(
                    "duplicate metadata row for sample '{}'",
                    id
                )));
            }
            sample_ids.push(id);
        }

        Ok(Self {
            sample_ids,
            column_names,
            data,
        })
    }

    /// Sample ids in file order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Variable column names (id column excluded).
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of rows.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Value for one sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&str> {
        self.data
            .get(sample_id)
            .and_then(|row| row.get(column))
            .map(String::as_str)
    }

    /// Check whether a sample id has a row.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    /// Check whether a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\tsource\tcage\tday").unwrap();
        writeln!(file, "m1d0\tjackson\tc1\t0").unwrap();
        writeln!(file, "m2d0\ttaconic\tc2\t0").unwrap();
        writeln!(file, "m1d1\tjackson\tc1\t1").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load() {
        let file = create_test_tsv();
        let meta = MetadataTable::from_tsv(file.path(), "id").unwrap();
        assert_eq!(meta.n_samples(), 3);
        assert_eq!(meta.column_names(), &["source", "cage", "day"]);
        assert_eq!(meta.get("m2d0", "source"), Some("taconic"));
        assert!(meta.has_sample("m1d1"));
        assert!(!meta.has_sample("m9d9"));
    }

    #[test]
    fn test_missing_id_column() {
        let file = create_test_tsv();
        let err = MetadataTable::from_tsv(file.path(), "sample").unwrap_err();
        assert!(matches!(err, PermivarError::MissingColumn(_)));
    }

    #[test]
    fn test_duplicate_id() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\tsource").unwrap();
        writeln!(file, "m1\tjackson").unwrap();
        writeln!(file, "m1\ttaconic").unwrap();
        file.flush().unwrap();
        assert!(MetadataTable::from_tsv(file.path(), "id").is_err());
    }
}

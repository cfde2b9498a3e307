//! Loading and cleaning of the diagnostic CSV.

use csv::{ReaderBuilder, Trim};
use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};

pub const TARGET_COLUMN: &str = "diagnosis";
/// Columns that carry no signal: the row id and the empty trailing column
/// produced by the dataset's trailing commas.
pub const DROPPED_COLUMNS: &[&str] = &["id", "Unnamed: 32"];

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("{0} not found!")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("dataset has no `{0}` column")]
    MissingColumn(&'static str),
    #[error("dataset has no rows")]
    Empty,
    #[error("row {row}: unknown diagnosis `{value}` (expected M or B)")]
    InvalidLabel { row: usize, value: String },
    #[error("row {row}: column `{column}` is not a number: `{value}`")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("dataset needs both classes, only found class {0}")]
    SingleClass(usize),
}

/// Raw CSV contents, header plus string cells.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Numeric features with binary targets (1 = malignant, 0 = benign).
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    pub feature_names: Vec<String>,
    pub records: Array2<f64>,
    pub targets: Array1<usize>,
}

impl Samples {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of rows per class, indexed by label.
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0; 2];
        for &label in &self.targets {
            if let Some(count) = counts.get_mut(label) {
                *count += 1;
            }
        }
        counts
    }
}

pub fn load_csv(path: &Path) -> Result<Table, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()
        .map_err(csv_err)?;
    Ok(Table { headers, rows })
}

/// Drops the id columns, encodes the diagnosis and parses every other column
/// as a feature.
pub fn preprocess(table: &Table) -> Result<Samples, DatasetError> {
    let target_idx = table
        .headers
        .iter()
        .position(|h| h == TARGET_COLUMN)
        .ok_or(DatasetError::MissingColumn(TARGET_COLUMN))?;
    let feature_cols: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            *idx != target_idx && !name.is_empty() && !DROPPED_COLUMNS.contains(&name.as_str())
        })
        .map(|(idx, _)| idx)
        .collect();
    if table.rows.is_empty() {
        return Err(DatasetError::Empty);
    }

    let mut values = Vec::with_capacity(table.rows.len() * feature_cols.len());
    let mut targets = Vec::with_capacity(table.rows.len());
    for (row_idx, row) in table.rows.iter().enumerate() {
        let row_no = row_idx + 1;
        let cell = |idx: usize| row.get(idx).map(String::as_str).unwrap_or("");
        let label = match cell(target_idx) {
            "M" => 1,
            "B" => 0,
            other => {
                return Err(DatasetError::InvalidLabel {
                    row: row_no,
                    value: other.to_string(),
                })
            }
        };
        targets.push(label);
        for &col in &feature_cols {
            let raw = cell(col);
            let value = raw.parse::<f64>().map_err(|_| DatasetError::InvalidValue {
                row: row_no,
                column: table.headers[col].clone(),
                value: raw.to_string(),
            })?;
            values.push(value);
        }
    }

    let records = Array2::from_shape_vec((targets.len(), feature_cols.len()), values)
        .map_err(|_| DatasetError::Empty)?;
    let samples = Samples {
        feature_names: feature_cols.iter().map(|&c| table.headers[c].clone()).collect(),
        records,
        targets: Array1::from(targets),
    };
    match samples.class_counts() {
        [0, _] => Err(DatasetError::SingleClass(1)),
        [_, 0] => Err(DatasetError::SingleClass(0)),
        _ => Ok(samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "\
id,diagnosis,radius_mean,texture_mean,
842302,M,17.99,10.38,
842517,B,20.57,17.77,
84300903,M,19.69,21.25,
";

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn drops_id_and_blank_columns() {
        let file = write_csv(CSV);
        let samples = preprocess(&load_csv(file.path()).unwrap()).unwrap();
        assert_eq!(samples.feature_names, vec!["radius_mean", "texture_mean"]);
        assert_eq!(samples.records.dim(), (3, 2));
        assert_eq!(samples.targets.to_vec(), vec![1, 0, 1]);
        assert_eq!(samples.class_counts(), [1, 2]);
        assert_eq!(samples.records[[1, 1]], 17.77);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_csv(Path::new("/nonexistent/breast-cancer.csv")).unwrap_err();
        assert!(err.to_string().ends_with("not found!"));
    }

    #[test]
    fn unknown_diagnosis_is_rejected() {
        let file = write_csv("diagnosis,a\nM,1\nX,2\n");
        let err = preprocess(&load_csv(file.path()).unwrap()).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidLabel { row: 2, .. }));
    }

    #[test]
    fn non_numeric_feature_is_rejected() {
        let file = write_csv("diagnosis,a\nM,1\nB,abc\n");
        let err = preprocess(&load_csv(file.path()).unwrap()).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidValue { row: 2, .. }));
    }

    #[test]
    fn single_class_is_rejected() {
        let file = write_csv("diagnosis,a\nB,1\nB,2\n");
        let err = preprocess(&load_csv(file.path()).unwrap()).unwrap_err();
        assert!(matches!(err, DatasetError::SingleClass(0)));
    }
}

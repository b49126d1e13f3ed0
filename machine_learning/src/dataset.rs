use std::{collections::BTreeMap, fs, path::Path};

use anyhow::anyhow;
use engine::collab::{Dataset, Sample};
use log::info;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{MlErr, Result};

/// Rows held in memory, each subset a flat buffer of `x_size + y_size` values per row.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    x_size: usize,
    y_size: usize,
    subsets: BTreeMap<String, Vec<f32>>,
}

impl InMemoryDataset {
    pub fn new(x_size: usize, y_size: usize) -> Self {
        Self {
            x_size,
            y_size,
            subsets: BTreeMap::new(),
        }
    }

    fn row_size(&self) -> usize {
        self.x_size + self.y_size
    }

    /// Adds or replaces `subset` with the given flat rows.
    ///
    /// # Errors
    /// If `data` doesn't hold a whole amount of rows.
    pub fn insert(&mut self, subset: impl Into<String>, data: Vec<f32>) -> Result<()> {
        let row_size = self.row_size();
        if row_size == 0 || data.len() % row_size != 0 {
            return Err(MlErr::SizeMismatch {
                what: "dataset rows",
                got: data.len(),
                expected: data.len().next_multiple_of(row_size.max(1)),
            });
        }

        self.subsets.insert(subset.into(), data);
        Ok(())
    }

    /// Loads comma separated rows of `x_size` inputs followed by `y_size`
    /// outputs. Blank lines are skipped.
    pub fn read_csv(path: &Path, x_size: usize, y_size: usize) -> Result<Vec<f32>> {
        let row_size = x_size + y_size;
        let content = fs::read_to_string(path)?;
        let mut data = Vec::new();

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let csv_err = |reason: String| MlErr::Csv {
                path: path.to_path_buf(),
                line: i + 1,
                reason,
            };

            let values = line
                .split(',')
                .map(|v| {
                    v.trim()
                        .parse::<f32>()
                        .map_err(|_| csv_err(format!("cannot parse '{v}' as f32")))
                })
                .collect::<Result<Vec<_>>>()?;

            if values.len() != row_size {
                return Err(csv_err(format!(
                    "expected {row_size} values (x_size={x_size} + y_size={y_size}), got {}",
                    values.len()
                )));
            }

            data.extend(values);
        }

        Ok(data)
    }

    /// Loads a CSV file and splits its rows into a `train` and a `valid` subset.
    ///
    /// # Arguments
    /// * `path` - The CSV file.
    /// * `x_size` - The amount of input columns.
    /// * `y_size` - The amount of output columns.
    /// * `valid_fraction` - The share of rows held out for validation.
    /// * `seed` - Shuffles the rows before splitting when set.
    pub fn from_csv(
        path: &Path,
        x_size: usize,
        y_size: usize,
        valid_fraction: f32,
        seed: Option<u64>,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&valid_fraction) {
            return Err(MlErr::InvalidArg {
                key: "valid_fraction".to_string(),
                reason: format!("must lie in [0, 1), got {valid_fraction}"),
            });
        }

        let data = Self::read_csv(path, x_size, y_size)?;
        let row_size = x_size + y_size;

        let mut rows: Vec<&[f32]> = data.chunks_exact(row_size).collect();
        if rows.is_empty() {
            return Err(MlErr::Csv {
                path: path.to_path_buf(),
                line: 0,
                reason: "dataset is empty".to_string(),
            });
        }

        if let Some(seed) = seed {
            rows.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let n_valid = (rows.len() as f32 * valid_fraction).round() as usize;
        let (valid, train) = rows.split_at(n_valid);

        let mut dataset = Self::new(x_size, y_size);
        dataset.insert("train", train.concat())?;
        if !valid.is_empty() {
            dataset.insert("valid", valid.concat())?;
        }

        info!(train = train.len(), valid = valid.len(); "loaded {}", path.display());
        Ok(dataset)
    }
}

impl Dataset for InMemoryDataset {
    fn subsets(&self) -> Vec<String> {
        self.subsets.keys().cloned().collect()
    }

    fn len(&self, subset: &str) -> Option<usize> {
        let data = self.subsets.get(subset)?;
        Some(data.len() / self.row_size())
    }

    fn sample(&self, subset: &str, index: usize) -> anyhow::Result<Sample> {
        let data = self
            .subsets
            .get(subset)
            .ok_or_else(|| anyhow!("no `{subset}` subset"))?;

        let row_size = self.row_size();
        let row = data
            .get(index * row_size..(index + 1) * row_size)
            .ok_or_else(|| anyhow!("sample {index} out of range for `{subset}`"))?;

        let (x, y) = row.split_at(self.x_size);
        Ok(Sample {
            x: x.to_vec(),
            y: y.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn csv(rows: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..rows {
            writeln!(file, "{i}, {}, {}", i * 2, i % 2).unwrap();
            writeln!(file).unwrap();
        }
        file
    }

    #[test]
    fn splits_rows_into_subsets() {
        let file = csv(10);
        let dataset = InMemoryDataset::from_csv(file.path(), 2, 1, 0.2, None).unwrap();

        assert_eq!(dataset.subsets(), ["train", "valid"]);
        assert_eq!(dataset.len("train"), Some(8));
        assert_eq!(dataset.len("valid"), Some(2));
        assert_eq!(dataset.len("test"), None);

        let sample = dataset.sample("train", 0).unwrap();
        assert_eq!(sample.x, [2., 4.]);
        assert_eq!(sample.y, [0.]);
        assert!(dataset.sample("train", 8).is_err());
    }

    #[test]
    fn seeded_split_keeps_every_row() {
        let file = csv(10);
        let dataset = InMemoryDataset::from_csv(file.path(), 2, 1, 0.5, Some(1)).unwrap();

        let mut firsts = Vec::new();
        for subset in ["train", "valid"] {
            for i in 0..dataset.len(subset).unwrap() {
                firsts.push(dataset.sample(subset, i).unwrap().x[0]);
            }
        }
        firsts.sort_by(f32::total_cmp);

        assert_eq!(firsts, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn malformed_rows_point_at_their_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1,2,3\n4,x,6").unwrap();

        match InMemoryDataset::from_csv(file.path(), 2, 1, 0.0, None) {
            Err(MlErr::Csv { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a csv error, got {other:?}"),
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1,2").unwrap();
        assert!(InMemoryDataset::from_csv(file.path(), 2, 1, 0.0, None).is_err());
    }
}

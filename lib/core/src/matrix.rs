use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Dense labeled pairwise distance matrix, row-major
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairwiseMatrix {
    labels: Vec<String>,
    values: Vec<f64>,
}

impl PairwiseMatrix {
    pub fn new(labels: Vec<String>, values: Vec<f64>) -> Result<Self> {
        let n = labels.len();
        if values.len() != n * n {
            return Err(Error::MalformedInput(format!(
                "matrix has {} values for {} labels",
                values.len(),
                n
            )));
        }
        let matrix = Self { labels, values };
        matrix.validate()?;
        Ok(matrix)
    }

    fn validate(&self) -> Result<()> {
        let n = self.len();
        for i in 0..n {
            for j in i..n {
                let (a, b) = (self.get(i, j), self.get(j, i));
                if !a.is_finite() || a < 0.0 {
                    return Err(Error::MalformedInput(format!(
                        "invalid distance {} between {} and {}",
                        a, self.labels[i], self.labels[j]
                    )));
                }
                if (a - b).abs() > SYMMETRY_TOLERANCE {
                    return Err(Error::MalformedInput(format!(
                        "asymmetric distance between {} and {}",
                        self.labels[i], self.labels[j]
                    )));
                }
            }
        }
        Ok(())
    }

    /// Read a tab-separated matrix: a header row of labels (first cell
    /// ignored), then one row per label.
    pub fn read_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut lines = reader.lines().filter(|l| !matches!(l, Ok(s) if s.trim().is_empty()));

        let header = lines
            .next()
            .ok_or_else(|| Error::MalformedInput("empty distance matrix".to_string()))??;
        let labels: Vec<String> = header
            .split('\t')
            .skip(1)
            .map(|s| s.trim().to_string())
            .collect();

        let n = labels.len();
        let mut values = Vec::with_capacity(n * n);
        for (row, line) in lines.enumerate() {
            let line = line?;
            let mut cells = line.split('\t');
            let label = cells.next().unwrap_or_default().trim();
            if labels.get(row).map(String::as_str) != Some(label) {
                return Err(Error::MalformedInput(format!(
                    "row {} is labeled {:?}, expected {:?}",
                    row,
                    label,
                    labels.get(row)
                )));
            }
            let start = values.len();
            for cell in cells {
                let v: f64 = cell.trim().parse().map_err(|_| {
                    Error::MalformedInput(format!("bad distance {:?} in row {}", cell, label))
                })?;
                values.push(v);
            }
            if values.len() - start != n {
                return Err(Error::MalformedInput(format!(
                    "row {} has {} values, expected {}",
                    label,
                    values.len() - start,
                    n
                )));
            }
        }

        Self::new(labels, values)
    }

    pub fn write_tsv<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for label in &self.labels {
            write!(out, "\t{}", label)?;
        }
        writeln!(out)?;
        for (i, label) in self.labels.iter().enumerate() {
            write!(out, "{}", label)?;
            for j in 0..self.len() {
                write!(out, "\t{}", self.get(i, j))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.len() + j]
    }

    /// Grow by `new_labels`, filling every pair that involves a new label
    /// with `dist(i, j)` (indices into the grown matrix). Existing entries
    /// keep their positions. On error the matrix is unchanged.
    pub fn extend<F>(&mut self, new_labels: &[String], mut dist: F) -> Result<()>
    where
        F: FnMut(usize, usize) -> Result<f64>,
    {
        let old = self.len();
        let n = old + new_labels.len();
        let mut values = vec![0.0; n * n];
        for i in 0..old {
            values[i * n..i * n + old].copy_from_slice(&self.values[i * old..(i + 1) * old]);
        }
        for j in old..n {
            for i in 0..j {
                let d = dist(i, j)?;
                values[i * n + j] = d;
                values[j * n + i] = d;
            }
        }

        self.labels.extend(new_labels.iter().cloned());
        self.values = values;
        Ok(())
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsv_roundtrip() {
        let m = PairwiseMatrix::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![0.0, 0.5, 1.0, 0.5, 0.0, 0.25, 1.0, 0.25, 0.0],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.tsv");
        let mut f = File::create(&path).unwrap();
        m.write_tsv(&mut f).unwrap();
        drop(f);

        assert_eq!(PairwiseMatrix::read_tsv(&path).unwrap(), m);
    }

    #[test]
    fn test_rejects_asymmetric() {
        let res = PairwiseMatrix::new(vec!["a".into(), "b".into()], vec![0.0, 0.5, 0.4, 0.0]);
        assert!(matches!(res, Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_extend_keeps_positions() {
        let mut m = PairwiseMatrix::new(vec!["a".into(), "b".into()], vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        m.extend(&["c".to_string()], |i, j| Ok((j - i) as f64 * 10.0)).unwrap();

        assert_eq!(m.labels(), &["a", "b", "c"]);
        assert_eq!(m.get(0, 1), 1.0);
        assert_eq!(m.get(0, 2), 20.0);
        assert_eq!(m.get(2, 1), 10.0);
        assert_eq!(m.get(2, 2), 0.0);
    }

    #[test]
    fn test_extend_failure_leaves_matrix() {
        let mut m = PairwiseMatrix::new(vec!["a".into()], vec![0.0]).unwrap();
        let res = m.extend(&["b".to_string()], |_, _| Err(Error::not_computable("a", "b")));
        assert!(res.is_err());
        assert_eq!(m.len(), 1);
    }
}

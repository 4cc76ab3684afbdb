//! The table of searched architectures, its CSV form and its column statistics.

use std::{
    fmt::{self, Display},
    fs::File,
    path::Path,
};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{AnalyzerErr, Result};

/// One searched architecture: its search metrics and its profiled cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    #[serde(rename = "Model name")]
    pub name: String,
    #[serde(rename = "Weight")]
    pub weight: f64,
    /// Model size the search reported, in millions of parameters.
    #[serde(rename = "Params")]
    pub params: Option<f64>,
    #[serde(rename = "Search train acc")]
    pub train_acc: Option<f64>,
    #[serde(rename = "Search valid acc")]
    pub valid_acc: Option<f64>,
    #[serde(rename = "Search criterion loss")]
    pub criterion_loss: Option<f64>,
    #[serde(rename = "Search regularization loss")]
    pub reg_loss: Option<f64>,
    /// Profiled parameters in millions.
    #[serde(rename = "Parameters")]
    pub parameters: Option<f64>,
    #[serde(rename = "FLOPs")]
    pub flops: Option<f64>,
    #[serde(rename = "Latency GPU")]
    pub latency_gpu: Option<f64>,
    #[serde(rename = "Latency CPU")]
    pub latency_cpu: Option<f64>,
}

/// The numeric columns of a `SearchRow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Weight,
    Params,
    TrainAcc,
    ValidAcc,
    CriterionLoss,
    RegLoss,
    Parameters,
    Flops,
    LatencyGpu,
    LatencyCpu,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Weight,
        Column::Params,
        Column::TrainAcc,
        Column::ValidAcc,
        Column::CriterionLoss,
        Column::RegLoss,
        Column::Parameters,
        Column::Flops,
        Column::LatencyGpu,
        Column::LatencyCpu,
    ];

    /// The header of this column in the CSV file.
    pub fn header(&self) -> &'static str {
        match self {
            Column::Weight => "Weight",
            Column::Params => "Params",
            Column::TrainAcc => "Search train acc",
            Column::ValidAcc => "Search valid acc",
            Column::CriterionLoss => "Search criterion loss",
            Column::RegLoss => "Search regularization loss",
            Column::Parameters => "Parameters",
            Column::Flops => "FLOPs",
            Column::LatencyGpu => "Latency GPU",
            Column::LatencyCpu => "Latency CPU",
        }
    }

    pub fn value(&self, row: &SearchRow) -> Option<f64> {
        match self {
            Column::Weight => Some(row.weight),
            Column::Params => row.params,
            Column::TrainAcc => row.train_acc,
            Column::ValidAcc => row.valid_acc,
            Column::CriterionLoss => row.criterion_loss,
            Column::RegLoss => row.reg_loss,
            Column::Parameters => row.parameters,
            Column::Flops => row.flops,
            Column::LatencyGpu => row.latency_gpu,
            Column::LatencyCpu => row.latency_cpu,
        }
    }
}

const NAME_HEADER: &str = "Model name";

/// The rows of a search analysis, ordered by descending weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchTable {
    rows: Vec<SearchRow>,
}

impl SearchTable {
    /// Creates a table, sorting the rows by descending weight. Rows with equal weights keep
    /// their relative order.
    pub fn new(mut rows: Vec<SearchRow>) -> Self {
        rows.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        Self { rows }
    }

    /// Reads a table previously written by `write_csv`, keeping the file's row order.
    ///
    /// # Errors
    /// Returns an error if the file can't be opened or a record doesn't match the columns.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| AnalyzerErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let rows = csv::Reader::from_reader(file)
            .deserialize()
            .collect::<std::result::Result<Vec<SearchRow>, _>>()?;
        Ok(Self { rows })
    }

    /// Writes the table as CSV with a header line. Absent values are empty fields.
    ///
    /// # Errors
    /// Returns an error if the file can't be created or written.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| AnalyzerErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut writer = csv::Writer::from_writer(file);
        if self.rows.is_empty() {
            let mut header = vec![NAME_HEADER];
            header.extend(Column::ALL.iter().map(Column::header));
            writer.write_record(header)?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }

        writer.flush().map_err(|source| AnalyzerErr::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn rows(&self) -> &[SearchRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The rows where both columns have a value, as `(x, y)` points.
    pub fn points(&self, x: Column, y: Column) -> Vec<(f64, f64)> {
        self.rows
            .iter()
            .filter_map(|row| Some((x.value(row)?, y.value(row)?)))
            .collect()
    }

    /// Pearson correlation between every pair of numeric columns, each pair computed over the
    /// rows where both columns have a value. Pairs with fewer than two such rows or without
    /// variance are NaN.
    pub fn correlation(&self) -> Array2<f64> {
        let n = Column::ALL.len();
        Array2::from_shape_fn((n, n), |(i, j)| {
            let (xs, ys): (Vec<f64>, Vec<f64>) =
                self.points(Column::ALL[i], Column::ALL[j]).into_iter().unzip();
            pearson(&Array1::from(xs), &Array1::from(ys))
        })
    }
}

fn pearson(xs: &Array1<f64>, ys: &Array1<f64>) -> f64 {
    let (Some(mean_x), Some(mean_y)) = (xs.mean(), ys.mean()) else {
        return f64::NAN;
    };
    if xs.len() < 2 {
        return f64::NAN;
    }

    let dx = xs - mean_x;
    let dy = ys - mean_y;
    let denom = (dx.dot(&dx) * dy.dot(&dy)).sqrt();
    if denom == 0. {
        return f64::NAN;
    }
    dx.dot(&dy) / denom
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.6}"),
        None => "NaN".to_string(),
    }
}

/// Renders the whole table with right-aligned columns.
impl Display for SearchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![
            std::iter::once(NAME_HEADER.to_string())
                .chain(Column::ALL.iter().map(|c| c.header().to_string()))
                .collect::<Vec<_>>(),
        ];
        lines.extend(self.rows.iter().map(|row| {
            std::iter::once(row.name.clone())
                .chain(Column::ALL.iter().map(|c| cell(c.value(row))))
                .collect()
        }));

        let widths: Vec<usize> = (0..=Column::ALL.len())
            .map(|i| lines.iter().map(|line| line[i].len()).max().unwrap_or(0))
            .collect();

        for line in &lines {
            let (name, values) = line.split_at(1);
            write!(f, "{:<width$}", name[0], width = widths[0])?;
            for (value, width) in values.iter().zip(&widths[1..]) {
                write!(f, "  {value:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

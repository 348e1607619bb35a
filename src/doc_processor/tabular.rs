//! CSV reports and the descriptive charts drawn from them.
//!
//! Charts are produced as data series; the browser draws them. Column names
//! are matched exactly (`age`, `chol`, `sex`).

use std::collections::BTreeMap;

use serde::Serialize;

use super::ExtractionError;

pub const HISTOGRAM_BINS: usize = 30;
pub const HIGH_CHOLESTEROL_MG_DL: f64 = 240.0;

const MISSING_COLUMNS_WARNING: &str = "CSV does not contain expected columns like 'age' and 'chol'.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TabularReport {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReferenceLine {
    pub value: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chart {
    Scatter {
        title: String,
        x_label: String,
        y_label: String,
        points: Vec<ScatterPoint>,
    },
    Histogram {
        title: String,
        x_label: String,
        y_label: String,
        bins: Vec<HistogramBin>,
        reference: Option<ReferenceLine>,
    },
    Bar {
        title: String,
        x_label: String,
        y_label: String,
        bars: Vec<Bar>,
    },
}

#[derive(Debug, Default)]
pub struct ChartSet {
    pub charts: Vec<Chart>,
    pub warning: Option<String>,
}

/// 0 → Female, 1 → Male; anything else stays unmapped.
pub fn gender_label(code: &str) -> Option<&'static str> {
    match parse_number(code)? {
        c if c == 0.0 => Some("Female"),
        c if c == 1.0 => Some("Male"),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn cell(row: &[String], col: usize) -> Option<&str> {
    row.get(col).map(String::as_str)
}

impl TabularReport {
    pub fn parse(bytes: &[u8]) -> Result<Self, ExtractionError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(|c| c.trim().is_empty()) {
            return Err(ExtractionError::EmptyCsv);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() > columns.len() {
                return Err(ExtractionError::CsvFieldCount {
                    line: record.position().map_or(0, |p| p.line()),
                    expected: columns.len(),
                    found: record.len(),
                });
            }
            // Short rows are padded with blank cells.
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(columns.len(), String::new());
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Re-serialise the table as CSV; this is the report text handed on to
    /// the summary download and the chat.
    pub fn to_csv(&self) -> Result<String, ExtractionError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ExtractionError::Csv(e.into_error().into()))?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.column_index(n).is_some())
    }

    /// Numeric values of a column; non-numeric or blank cells are dropped.
    pub fn numeric_column(&self, name: &str) -> Vec<f64> {
        let Some(col) = self.column_index(name) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| cell(row, col).and_then(parse_number))
            .collect()
    }

    pub fn charts(&self) -> ChartSet {
        let mut set = ChartSet::default();

        if self.has_columns(&["age", "chol"]) {
            set.charts.push(self.age_scatter());
            set.charts.push(self.cholesterol_histogram());
        } else {
            set.warning = Some(MISSING_COLUMNS_WARNING.to_string());
        }

        if self.has_columns(&["sex", "chol"]) {
            set.charts.push(self.cholesterol_by_gender());
        }

        set
    }

    fn age_scatter(&self) -> Chart {
        let (age, chol) = (self.column_index("age"), self.column_index("chol"));
        let sex = self.column_index("sex");
        let points = match (age, chol) {
            (Some(age), Some(chol)) => self
                .rows
                .iter()
                .filter_map(|row| {
                    let x = cell(row, age).and_then(parse_number)?;
                    let y = cell(row, chol).and_then(parse_number)?;
                    let group = sex
                        .and_then(|s| cell(row, s))
                        .map(str::trim)
                        .filter(|g| !g.is_empty())
                        .map(str::to_string);
                    Some(ScatterPoint { x, y, group })
                })
                .collect(),
            _ => Vec::new(),
        };

        Chart::Scatter {
            title: "Cholesterol Levels by Age".into(),
            x_label: "Age".into(),
            y_label: "Cholesterol (mg/dL)".into(),
            points,
        }
    }

    fn cholesterol_histogram(&self) -> Chart {
        Chart::Histogram {
            title: "Cholesterol Distribution in Patients".into(),
            x_label: "Cholesterol (mg/dL)".into(),
            y_label: "Number of Patients".into(),
            bins: histogram(&self.numeric_column("chol"), HISTOGRAM_BINS),
            reference: Some(ReferenceLine {
                value: HIGH_CHOLESTEROL_MG_DL,
                label: "High Cholesterol (240 mg/dL)".into(),
            }),
        }
    }

    fn cholesterol_by_gender(&self) -> Chart {
        let mut groups: BTreeMap<&'static str, (f64, usize)> = BTreeMap::new();
        if let (Some(sex), Some(chol)) = (self.column_index("sex"), self.column_index("chol")) {
            for row in &self.rows {
                let Some(label) = cell(row, sex).and_then(gender_label) else {
                    continue;
                };
                let Some(value) = cell(row, chol).and_then(parse_number) else {
                    continue;
                };
                let entry = groups.entry(label).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }

        let bars = groups
            .into_iter()
            .map(|(label, (sum, n))| Bar {
                label: label.to_string(),
                value: sum / n as f64,
            })
            .collect();

        Chart::Bar {
            title: "Average Cholesterol Levels by Gender".into(),
            x_label: "Gender".into(),
            y_label: "Average Cholesterol (mg/dL)".into(),
            bars,
        }
    }
}

/// Equal-width bins over `[min, max]`, the last bin closed on the right.
/// A single distinct value is centred in a unit-wide range.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + width * i as f64,
            end: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}

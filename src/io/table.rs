//! io/table.rs — whitespace-delimited numeric tables.
//!
//! One row per line, `#` starts a comment, blank lines are skipped. Every row
//! must have the same number of columns.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use nalgebra::DMatrix;

use crate::error::{Error, Result};

fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let content = line.split('#').next().unwrap_or("").trim();
        (!content.is_empty()).then_some((i + 1, content))
    })
}

fn parse_err(path: &Path, line: usize, message: impl Into<String>) -> Error {
    Error::Parse {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}

/// Parse table text; `path` is only used in error messages.
pub fn parse_table(text: &str, path: &Path) -> Result<DMatrix<f64>> {
    let mut values = Vec::new();
    let mut n_cols = None;
    let mut n_rows = 0;
    for (line_no, content) in data_lines(text) {
        let mut count = 0;
        for token in content.split_whitespace() {
            let v: f64 = token
                .parse()
                .map_err(|_| parse_err(path, line_no, format!("not a number: {token:?}")))?;
            values.push(v);
            count += 1;
        }
        match n_cols {
            None => n_cols = Some(count),
            Some(expected) if expected != count => {
                return Err(parse_err(
                    path,
                    line_no,
                    format!("expected {expected} columns, found {count}"),
                ));
            }
            Some(_) => {}
        }
        n_rows += 1;
    }
    let Some(n_cols) = n_cols else {
        return Err(parse_err(path, 0, "table has no data rows"));
    };
    Ok(DMatrix::from_row_slice(n_rows, n_cols, &values))
}

pub fn read_table(path: &Path) -> Result<DMatrix<f64>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_table(&text, path)
}

/// Integer labels, one token per vertex, any line layout.
pub fn parse_labels(text: &str, path: &Path) -> Result<Vec<i32>> {
    let mut out = Vec::new();
    for (line_no, content) in data_lines(text) {
        for token in content.split_whitespace() {
            let v: i32 = match token.parse::<i32>() {
                Ok(v) => v,
                // label files exported from float arrays carry "12.0"
                Err(_) => match token.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 && f.abs() <= i32::MAX as f64 => f as i32,
                    _ => {
                        return Err(parse_err(
                            path,
                            line_no,
                            format!("not an integer label: {token:?}"),
                        ));
                    }
                },
            };
            out.push(v);
        }
    }
    Ok(out)
}

pub fn read_labels(path: &Path) -> Result<Vec<i32>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_labels(&text, path)
}

pub fn format_table(m: &DMatrix<f64>) -> String {
    let mut out = String::new();
    for i in 0..m.nrows() {
        let row: Vec<String> = m.row(i).iter().map(|v| format!("{v:.18e}")).collect();
        let _ = writeln!(out, "{}", row.join(" "));
    }
    out
}

pub fn write_table(path: &Path, m: &DMatrix<f64>) -> Result<()> {
    fs::write(path, format_table(m)).map_err(|e| Error::io(path, e))
}

//! Generic ranked table: sorting, truncation, auto-widening columns, lookup.

use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Write};

/// Padding added to every column on top of its widest cell.
const COLUMN_PADDING: usize = 2;

/// Sort key types for table rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Integer(i64),
    String(String),
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (SortKey::Integer(a), SortKey::Integer(b)) => a.partial_cmp(b),
            (SortKey::String(a), SortKey::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Anything that can be shown as a row of a [`RankedTable`].
pub trait Rankable {
    /// Cell values as strings, one per table column.
    fn cells(&self) -> Vec<String>;

    /// Sort key, comparable with keys of the same row family.
    fn sort_key(&self) -> SortKey;
}

/// Sort direction of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Errors raised by [`RankedTable::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// A row rendered a different number of cells than there are headers.
    TypeMismatch { expected: usize, found: usize },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::TypeMismatch { expected, found } => write!(
                f,
                "row renders {} cells, table has {} columns",
                found, expected
            ),
        }
    }
}

impl std::error::Error for TableError {}

/// Sorted, truncated, left-justified table of [`Rankable`] rows.
///
/// Column widths start at header length + 2 and only ever grow: once a cell
/// is wider than its column, the column keeps the new width for every later
/// print. Rows are replaced wholesale on each [`refresh`](Self::refresh).
#[derive(Debug, Clone)]
pub struct RankedTable<T: Rankable> {
    headers: Vec<&'static str>,
    widths: Vec<usize>,
    direction: SortDirection,
    max_rows: Option<usize>,
    rows: Vec<T>,
}

impl<T: Rankable> RankedTable<T> {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            widths: headers.iter().map(|h| h.len() + COLUMN_PADDING).collect(),
            direction: SortDirection::Ascending,
            max_rows: None,
            rows: Vec::new(),
        }
    }

    pub fn with_direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    /// Current column widths (cell width + padding).
    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Rows of the current generation, in display order.
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replaces the current generation with `records`.
    ///
    /// Records are sorted by [`Rankable::sort_key`] in the table direction
    /// (stable, so equal keys keep submission order) and truncated to the
    /// row limit. On arity mismatch the previous generation is kept.
    pub fn refresh(&mut self, records: impl IntoIterator<Item = T>) -> Result<(), TableError> {
        let mut rows: Vec<T> = records.into_iter().collect();
        let expected = self.headers.len();
        if let Some(found) = rows
            .iter()
            .map(|row| row.cells().len())
            .find(|&len| len != expected)
        {
            return Err(TableError::TypeMismatch { expected, found });
        }

        let descending = self.direction == SortDirection::Descending;
        rows.sort_by(|a, b| {
            let cmp = a
                .sort_key()
                .partial_cmp(&b.sort_key())
                .unwrap_or(Ordering::Equal);
            if descending { cmp.reverse() } else { cmp }
        });
        if let Some(max) = self.max_rows {
            rows.truncate(max);
        }

        self.rows = rows;
        Ok(())
    }

    /// Writes the header and every row, widening columns as needed.
    ///
    /// Lines end with `\r\n` so the output stays aligned in raw mode.
    pub fn print(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let header = self
            .headers
            .iter()
            .zip(&self.widths)
            .map(|(h, &w)| format!("{:<w$}", h, w = w))
            .collect::<String>();
        write!(out, "{}\r\n", header.trim_end())?;

        for row in &self.rows {
            let mut line = String::new();
            for (idx, cell) in row.cells().iter().enumerate() {
                let needed = cell.chars().count() + COLUMN_PADDING;
                if needed > self.widths[idx] {
                    self.widths[idx] = needed;
                }
                line.push_str(&format!("{:<w$}", cell, w = self.widths[idx]));
            }
            write!(out, "{}\r\n", line.trim_end())?;
        }
        Ok(())
    }

    /// First row whose leading cells equal `prefix`, position by position.
    ///
    /// An empty prefix matches the first row. A prefix longer than the row
    /// never matches.
    pub fn find<S: AsRef<str>>(&self, prefix: &[S]) -> Option<&T> {
        self.rows.iter().find(|row| {
            let cells = row.cells();
            prefix.len() <= cells.len()
                && prefix
                    .iter()
                    .zip(&cells)
                    .all(|(want, have)| want.as_ref() == have)
        })
    }
}

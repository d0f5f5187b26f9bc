use serde::{Deserialize, Serialize};

use crate::contract::ColumnType;

/// One column of a fixed-width layout: a half-open byte span
/// `[start, end)` within the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutColumn {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub ty: ColumnType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    pub nullable: bool,
}

impl LayoutColumn {
    #[must_use]
    pub fn new(name: &str, start: usize, end: usize, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
            ty,
            precision: None,
            nullable: false,
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }
}

/// A fixed-width file layout, versioned `v<year>.<quarter>.<patch>`.
///
/// The version gets a major bump whenever a column's width or
/// position changes; the parsers refuse to apply a layout to a line
/// shorter than [`LayoutSpec::min_line_len`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub version: String,
    pub columns: Vec<LayoutColumn>,
}

impl LayoutSpec {
    #[must_use]
    pub fn new(year: u16, quarter: u8, patch: u16, columns: Vec<LayoutColumn>) -> Self {
        Self {
            version: format!("v{year}.{quarter}.{patch}"),
            columns,
        }
    }

    /// Shortest line this layout can slice: rows shorter than the end
    /// of the last mandatory column cannot be parsed.
    #[must_use]
    pub fn min_line_len(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| !c.nullable)
            .map(|c| c.end)
            .max()
            .unwrap_or(0)
    }

    /// Slice one line into raw column strings. Nullable columns that
    /// fall past the end of a short line yield `None`.
    ///
    /// Returns `None` when the line is shorter than the mandatory
    /// minimum; callers decide whether to skip or fail.
    #[must_use]
    pub fn slice<'a>(&self, line: &'a str) -> Option<Vec<Option<&'a str>>> {
        if line.len() < self.min_line_len() {
            return None;
        }
        let mut out = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            if line.len() < col.end {
                out.push(None);
            } else {
                out.push(Some(&line[col.start..col.end]));
            }
        }
        Some(out)
    }
}

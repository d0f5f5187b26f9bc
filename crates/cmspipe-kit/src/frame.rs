use cmspipe_types::{PipelineError, Severity, Value};

use crate::metrics::ParseMetrics;

/// An ordered, named collection of typed rows.
///
/// Frames are the working representation between raw bytes and
/// published artifacts. Columns are positional; rows always match the
/// column arity. Row identity (`row_id`) is the original position in
/// the source file and survives into reject records.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row, enforcing arity.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), PipelineError> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::Internal(format!(
                "row arity {} does not match {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Rename a column in place; no-op when absent.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Append a constant-valued column.
    pub fn add_constant_column(&mut self, name: &str, value: Value) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.clone());
        }
    }

    /// Append a column with one value per row.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), PipelineError> {
        if values.len() != self.rows.len() {
            return Err(PipelineError::Internal(format!(
                "column {name} has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Map each row in place with access to the column indices.
    pub fn map_rows<F: FnMut(&mut Vec<Value>)>(&mut self, mut f: F) {
        for row in &mut self.rows {
            f(row);
        }
    }

    /// Split rows by predicate: rows failing it are removed and
    /// returned with their positional index, in order.
    pub fn drain_failing<F: FnMut(usize, &[Value]) -> bool>(
        &mut self,
        mut keep: F,
    ) -> Vec<(usize, Vec<Value>)> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.rows.len());
        for (idx, row) in self.rows.drain(..).enumerate() {
            if keep(idx, &row) {
                kept.push(row);
            } else {
                removed.push((idx, row));
            }
        }
        self.rows = kept;
        removed
    }

    /// Stable sort of the rows by a caller-supplied key comparison.
    pub fn sort_rows_by<F: FnMut(&[Value], &[Value]) -> std::cmp::Ordering>(&mut self, mut f: F) {
        self.rows.sort_by(|a, b| f(a, b));
    }
}

/// One rejected row with its rule evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Reject {
    /// Original parsed values, in the reject frame's column order.
    pub row: Vec<Value>,
    /// Positional row id in the source file.
    pub row_id: usize,
    pub rule_id: String,
    pub severity: Severity,
    pub error: String,
}

/// Rows that failed a validation or uniqueness rule, kept alongside
/// the data they were split from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RejectFrame {
    pub columns: Vec<String>,
    pub rejects: Vec<Reject>,
}

impl RejectFrame {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rejects: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        row: Vec<Value>,
        row_id: usize,
        rule_id: impl Into<String>,
        severity: Severity,
        error: impl Into<String>,
    ) {
        self.rejects.push(Reject {
            row,
            row_id,
            rule_id: rule_id.into(),
            severity,
            error: error.into(),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rejects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rejects.is_empty()
    }
}

/// The triple every parser returns.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub data: Frame,
    pub rejects: RejectFrame,
    pub metrics: ParseMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    #[test]
    fn push_row_enforces_arity() {
        let mut f = Frame::new(vec!["a".into(), "b".into()]);
        assert!(f.push_row(vec![v("1")]).is_err());
        assert!(f.push_row(vec![v("1"), v("2")]).is_ok());
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn drain_failing_preserves_order_and_ids() {
        let mut f = Frame::new(vec!["a".into()]);
        for s in ["x", "bad", "y", "bad"] {
            f.push_row(vec![v(s)]).unwrap();
        }
        let removed = f.drain_failing(|_, row| row[0].as_str() != Some("bad"));
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].0, 1);
        assert_eq!(removed[1].0, 3);
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn add_column_checks_length() {
        let mut f = Frame::new(vec!["a".into()]);
        f.push_row(vec![v("1")]).unwrap();
        assert!(f.add_column("b", vec![]).is_err());
        assert!(f.add_column("b", vec![v("2")]).is_ok());
        assert_eq!(f.columns(), ["a", "b"]);
    }
}

use compact_str::CompactString;
use conjecture_error::{ConjectureResult, ensure};
use std::collections::HashMap;

/// A keyed column store: each variable name resolves to a numeric column,
/// and all columns share one length.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: HashMap<CompactString, Vec<f64>>,
    len: usize,
}

impl Frame {
    pub fn new() -> Self {
        Frame::default()
    }

    pub fn with_column(
        mut self,
        name: impl Into<CompactString>,
        values: Vec<f64>,
    ) -> ConjectureResult<Self> {
        let name = name.into();
        ensure!(
            self.columns.is_empty() || values.len() == self.len,
            InvalidConfig: "column `{}` has {} rows, expected {}",
            name,
            values.len(),
            self.len
        );

        self.len = values.len();
        self.columns.insert(name, values);
        Ok(self)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    /// Number of rows shared by every column.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.len == 0
    }
}

/// Training data: a [Frame] of input columns plus the scalar targets.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    x: Frame,
    y: Vec<f64>,
}

impl DataSet {
    pub fn new(x: Frame, y: Vec<f64>) -> ConjectureResult<Self> {
        ensure!(
            x.is_empty() || x.len() == y.len(),
            InvalidConfig: "input columns have {} rows but y has {}",
            x.len(),
            y.len()
        );
        Ok(DataSet { x, y })
    }

    /// A dataset with no observations. Chains built on it sample from the
    /// prior alone: sse = 0, bic = 0.
    pub fn empty() -> Self {
        DataSet::default()
    }

    pub fn x(&self) -> &Frame {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }
}

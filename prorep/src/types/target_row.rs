use std::fmt;

use crate::types::{Cell, Epoch, RecId};

/// A change row translated into target names and typed values.
///
/// Columns are kept sorted by target name so statements for the same table are identical.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRow {
    pub rec_id: RecId,
    pub epoch: Epoch,
    columns: Vec<(String, Cell)>,
}

impl TargetRow {
    pub fn new(rec_id: RecId, epoch: Epoch, mut columns: Vec<(String, Cell)>) -> Self {
        columns.sort_by(|(a, _), (b, _)| a.cmp(b));

        Self {
            rec_id,
            epoch,
            columns,
        }
    }

    /// Returns the `(target column, value)` pairs in column name order.
    pub fn columns(&self) -> &[(String, Cell)] {
        &self.columns
    }

    pub fn value(&self, column: &str) -> Option<&Cell> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for TargetRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{repl_recid: {}, repl_epoch: {}", self.rec_id, self.epoch)?;
        for (name, value) in &self.columns {
            write!(f, ", {name}: {value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_sorted_and_rendered() {
        let row = TargetRow::new(
            RecId(42),
            Epoch(7),
            vec![
                ("name".to_string(), Cell::String("Acme".to_string())),
                ("balance".to_string(), Cell::I32(3)),
            ],
        );

        assert_eq!(row.columns()[0].0, "balance");
        assert_eq!(row.value("name"), Some(&Cell::String("Acme".to_string())));
        assert_eq!(
            row.to_string(),
            "{repl_recid: 42, repl_epoch: 7, balance: 3, name: \"Acme\"}"
        );
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::SqlValue;

/// An owned row copied out of a [`ResultSet`](super::ResultSet).
///
/// Column names and the name lookup cache are shared by every row taken from the same cursor.
#[derive(Debug, Clone)]
pub struct Row {
    /// The column names for this row (shared across all rows of a query)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub values: Vec<SqlValue>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Create a row, building the lookup cache for `column_names`.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        let cache = super::build_index_cache(&column_names);
        Self::with_cache(column_names, values, cache)
    }

    pub(crate) fn with_cache(
        column_names: Arc<Vec<String>>,
        values: Vec<SqlValue>,
        column_index_cache: Arc<HashMap<String, usize>>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index_cache,
        }
    }

    /// Index of a column by name, ignoring ASCII and Unicode case.
    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_index_cache
            .get(&column_name.to_lowercase())
            .copied()
    }

    /// Value of a column by name, or `None` if the row has no such column.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column name -> value map of this row.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, SqlValue> {
        self.column_names
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::new(
            Arc::new(vec!["Id".to_owned(), "name".to_owned(), "id".to_owned()]),
            vec![SqlValue::Int(1), SqlValue::Text("a".into()), SqlValue::Int(2)],
        )
    }

    #[test]
    fn lookup_ignores_case_and_prefers_first_column() {
        let row = sample();
        assert_eq!(row.column_index("ID"), Some(0));
        assert_eq!(row.get("NAME"), Some(&SqlValue::Text("a".into())));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_by_index(2), Some(&SqlValue::Int(2)));
    }

    #[test]
    fn map_uses_original_names() {
        let map = sample().to_map();
        assert_eq!(map.get("Id"), Some(&SqlValue::Int(1)));
    }
}

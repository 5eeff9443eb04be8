pub mod result_set;
pub mod row;

pub use result_set::{ColumnIndex, ResultSet};
pub use row::Row;

use std::collections::HashMap;
use std::sync::Arc;

/// Lowercased column name -> first index with that name.
pub(crate) fn build_index_cache(column_names: &[String]) -> Arc<HashMap<String, usize>> {
    let mut cache = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        cache.entry(name.to_lowercase()).or_insert(i);
    }
    Arc::new(cache)
}

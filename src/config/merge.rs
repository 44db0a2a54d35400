//! Deep merge of configuration layers.
//!
//! Tables merge key by key; every other value (scalars and arrays) is
//! replaced wholesale by the higher-priority layer.

use toml::{Table, Value};

/// Merges `overlay` into `base`; values in `overlay` win.
pub fn deep_merge(base: &mut Table, overlay: &Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Merges layers given highest priority first into a single table.
#[must_use]
pub fn merge_layers<'a, I>(layers: I) -> Table
where
    I: IntoIterator<Item = &'a Table>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut merged = Table::new();
    for layer in layers.into_iter().rev() {
        deep_merge(&mut merged, layer);
    }
    merged
}

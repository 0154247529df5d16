use std::collections::HashMap;

use serde::Serialize;

use crate::results::Row;

/// Rows removed from and appended to a model by one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelDiff {
    pub inserted: Vec<Row>,
    pub deleted: Vec<Row>,
}

impl ModelDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }
}

/// Reconcile `old` against `fresh` by row-value equality, counting duplicates.
///
/// Old rows still present survive in their original order; fresh rows without an old match are
/// appended in result order. A changed row shows up as one delete plus one insert.
pub(crate) fn reconcile(old: &[Row], fresh: &[Row]) -> (Vec<Row>, ModelDiff) {
    let mut available: HashMap<&Row, usize> = HashMap::with_capacity(fresh.len());
    for row in fresh {
        *available.entry(row).or_default() += 1;
    }

    let mut data = Vec::with_capacity(fresh.len());
    let mut changes = ModelDiff::default();
    let mut matched: HashMap<&Row, usize> = HashMap::new();
    for row in old {
        match available.get_mut(row) {
            Some(left) if *left > 0 => {
                *left -= 1;
                *matched.entry(row).or_default() += 1;
                data.push(row.clone());
            }
            _ => changes.deleted.push(row.clone()),
        }
    }

    for row in fresh {
        if let Some(count) = matched.get_mut(row)
            && *count > 0
        {
            *count -= 1;
            continue;
        }
        changes.inserted.push(row.clone());
        data.push(row.clone());
    }

    (data, changes)
}

//! Record Index
//!
//! Binary search over a shard's record array, which is kept sorted ascending
//! by the id field. Only the id column is compared.

use std::cmp::Ordering;

use crate::schema::{FieldValue, Record};

/// Result of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Where the id is, or where it would be inserted to keep the order
    pub index: usize,

    /// True if `records[index]` carries the id
    pub found: bool,
}

/// Locate `id` in `records` (sorted by the field at `id_index`)
///
/// O(log n). Records shorter than `id_index` sort before everything; a
/// validated shard never contains one.
pub fn locate(records: &[Record], id_index: usize, id: &FieldValue) -> Location {
    let result = records.binary_search_by(|record| match record.get(id_index) {
        Some(value) => value.id_cmp(id),
        None => Ordering::Less,
    });

    match result {
        Ok(index) => Location { index, found: true },
        Err(index) => Location {
            index,
            found: false,
        },
    }
}

/// True if the ids are strictly ascending
pub fn is_sorted(records: &[Record], id_index: usize) -> bool {
    records.windows(2).all(|pair| {
        match (pair[0].get(id_index), pair[1].get(id_index)) {
            (Some(a), Some(b)) => a.id_cmp(b) == Ordering::Less,
            _ => false,
        }
    })
}

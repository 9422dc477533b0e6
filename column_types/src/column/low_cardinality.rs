//! Dictionary encoded columns.

use crate::column::{Column, ColumnUnique};
use crate::error::{Error, Result};
use crate::field::Field;

/// Dictionary positions of each row, stored in the narrowest unsigned width that fits the
/// largest position seen so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Positions {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl Default for Positions {
    fn default() -> Self {
        Self::U8(Vec::new())
    }
}

impl Positions {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per position.
    pub fn width(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
            Self::U64(_) => 8,
        }
    }

    /// Position of row `row`, widened to `u64`.
    pub fn get(&self, row: usize) -> Option<u64> {
        match self {
            Self::U8(v) => v.get(row).map(|&p| p as u64),
            Self::U16(v) => v.get(row).map(|&p| p as u64),
            Self::U32(v) => v.get(row).map(|&p| p as u64),
            Self::U64(v) => v.get(row).copied(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len()).filter_map(|row| self.get(row))
    }

    /// Append `position`, widening the storage first if it does not fit.
    pub fn push(&mut self, position: u64) {
        self.widen_for(position);
        match self {
            Self::U8(v) => v.push(position as u8),
            Self::U16(v) => v.push(position as u16),
            Self::U32(v) => v.push(position as u32),
            Self::U64(v) => v.push(position),
        }
    }

    fn widen_for(&mut self, position: u64) {
        let needed = if position <= u8::MAX as u64 {
            1
        } else if position <= u16::MAX as u64 {
            2
        } else if position <= u32::MAX as u64 {
            4
        } else {
            8
        };
        if needed <= self.width() {
            return;
        }
        let current: Vec<u64> = self.iter().collect();
        *self = match needed {
            2 => Self::U16(current.into_iter().map(|p| p as u16).collect()),
            4 => Self::U32(current.into_iter().map(|p| p as u32).collect()),
            _ => Self::U64(current),
        };
    }
}

/// A column of positions into a [`ColumnUnique`] dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLowCardinality {
    dictionary: ColumnUnique,
    positions: Positions,
}

impl ColumnLowCardinality {
    pub fn new(dictionary: ColumnUnique) -> Self {
        Self {
            dictionary,
            positions: Positions::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn dictionary(&self) -> &ColumnUnique {
        &self.dictionary
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    /// Dictionary position of row `row`.
    ///
    /// # Panics
    ///
    /// If `row` is out of bounds.
    pub fn index_at(&self, row: usize) -> u64 {
        self.positions
            .get(row)
            .unwrap_or_else(|| panic!("row {row} out of bounds for {} rows", self.len()))
    }

    pub fn field_at(&self, row: usize) -> Field {
        self.dictionary.value_at(self.index_at(row))
    }

    /// Append a row referring to an existing dictionary entry.
    pub fn push_index(&mut self, position: u64) -> Result<()> {
        if position >= self.dictionary.len() as u64 {
            return Err(Error::corruption(format!(
                "dictionary position {position} out of range for {} keys",
                self.dictionary.len()
            )));
        }
        self.positions.push(position);
        Ok(())
    }

    pub fn insert_field(&mut self, field: &Field) -> Result<()> {
        let position = self.dictionary.insert_field(field)?;
        self.positions.push(position);
        Ok(())
    }

    /// Add row `row` of `src` to the dictionary without appending a row, returning its
    /// position.
    pub fn insert_key_from_full(&mut self, src: &Column, row: usize) -> Result<u64> {
        self.dictionary.insert_from(src, row)
    }

    /// Append row `row` of `src`, a full column of the dictionary type.
    pub fn insert_from_full(&mut self, src: &Column, row: usize) -> Result<()> {
        let position = self.dictionary.insert_from(src, row)?;
        self.positions.push(position);
        Ok(())
    }

    pub fn insert_range_from_full(&mut self, src: &Column, start: usize, len: usize) -> Result<()> {
        for row in start..start + len {
            self.insert_from_full(src, row)?;
        }
        Ok(())
    }

    /// Append row `row` of another dictionary encoded column, re-encoding it against this
    /// column's dictionary.
    pub fn push_from_low_cardinality(&mut self, src: &Self, row: usize) -> Result<()> {
        self.insert_from_full(src.dictionary.keys(), src.index_at(row) as usize)
    }

    pub fn push_default(&mut self) -> Result<()> {
        let default = self.dictionary.keys_type().default_value();
        self.insert_field(&default)
    }

    /// Expand every row into a column of the dictionary type.
    pub fn convert_to_full_column(&self) -> Result<Column> {
        self.dictionary
            .keys()
            .take(self.positions.iter().map(|p| p as usize))
    }

    /// An empty column with an empty dictionary of the same type.
    pub fn empty_like(&self) -> Self {
        Self::new(self.dictionary.cloned_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::column::unique::{ReverseIndex, StringIndex};
    use crate::types::string::DataTypeString;

    fn string_column() -> ColumnLowCardinality {
        ColumnLowCardinality::new(ColumnUnique::new(
            Arc::new(DataTypeString::new()),
            ReverseIndex::String(StringIndex::default()),
        ))
    }

    #[test]
    fn positions_widen() {
        let mut positions = Positions::default();
        positions.push(3);
        positions.push(300);
        assert_eq!(positions, Positions::U16(vec![3, 300]));
        positions.push(70_000);
        assert_eq!(positions.width(), 4);
        assert_eq!(positions.iter().collect::<Vec<_>>(), vec![3, 300, 70_000]);
    }

    #[test]
    fn encode_and_expand() {
        let mut column = string_column();
        for value in ["x", "y", "x", "x"] {
            column.insert_field(&Field::from(value)).unwrap();
        }
        assert_eq!(column.dictionary().len(), 2);
        assert_eq!(column.positions(), &Positions::U8(vec![0, 1, 0, 0]));

        let full = column.convert_to_full_column().unwrap();
        assert_eq!(
            full.to_fields(),
            vec![
                Field::from("x"),
                Field::from("y"),
                Field::from("x"),
                Field::from("x")
            ]
        );
    }

    #[test]
    fn out_of_range_position() {
        let mut column = string_column();
        column.insert_field(&Field::from("a")).unwrap();
        assert!(column.push_index(0).is_ok());
        assert!(column.push_index(1).unwrap_err().is_corruption());
    }

    #[test]
    fn reencode_from_other_dictionary() {
        let mut a = string_column();
        a.insert_field(&Field::from("p")).unwrap();
        a.insert_field(&Field::from("q")).unwrap();

        let mut b = string_column();
        b.insert_field(&Field::from("q")).unwrap();
        b.push_from_low_cardinality(&a, 0).unwrap();

        assert_eq!(b.positions(), &Positions::U8(vec![0, 1]));
        assert_eq!(b.field_at(1), Field::from("p"));
    }

    #[test]
    fn keys_without_rows() {
        let keys = Column::String(["m", "n"].into_iter().collect());
        let mut column = string_column();
        assert_eq!(column.insert_key_from_full(&keys, 1).unwrap(), 0);
        assert_eq!(column.insert_key_from_full(&keys, 0).unwrap(), 1);
        assert_eq!(column.insert_key_from_full(&keys, 1).unwrap(), 0);
        assert!(column.is_empty());

        column.push_index(1).unwrap();
        assert_eq!(column.field_at(0), Field::from("m"));
    }
}

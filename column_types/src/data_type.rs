//! The [`DataType`] trait every column type descriptor implements.

use std::any::Any;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use crate::bulk::{BulkState, DeserializeBulkSettings, SerializeBulkSettings, SubstreamPath};
use crate::column::Column;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::format::FormatSettings;
use crate::io::{ReadBuffer, WriteBuffer};

/// Shared, immutable handle to a type descriptor.
pub type DataTypeRef = Arc<dyn DataType>;

/// Stable identity of a type family, used when comparing type trees and as a wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeIndex {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Nullable,
    Array,
    Tuple,
    Map,
    LowCardinality,
}

/// The shape of a type node. Composite types expose their children so tree walks can rebuild
/// them without knowing the concrete descriptor.
#[derive(Debug, Clone, Copy)]
pub enum TypeNode<'a> {
    Leaf,
    Nullable(&'a DataTypeRef),
    Array(&'a DataTypeRef),
    Tuple {
        elements: &'a [DataTypeRef],
        names: &'a [String],
    },
    Map {
        key: &'a DataTypeRef,
        value: &'a DataTypeRef,
    },
    LowCardinality(&'a DataTypeRef),
}

/// Boolean and size properties of a type, computed once when the descriptor is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTraits {
    pub is_parametric: bool,
    pub have_subtypes: bool,
    pub cannot_be_stored_in_tables: bool,
    pub should_align_right_in_pretty_formats: bool,
    pub text_can_contain_only_valid_utf8: bool,
    pub is_comparable: bool,
    pub can_be_compared_with_collation: bool,
    pub can_be_used_as_version: bool,
    pub is_summable: bool,
    pub can_be_used_in_bit_operations: bool,
    pub can_be_used_in_boolean_context: bool,
    pub is_value_represented_by_number: bool,
    pub is_value_represented_by_integer: bool,
    pub is_value_unambiguously_represented_in_contiguous_memory_region: bool,
    /// `None` if values are unbounded in size.
    pub maximum_size_of_value_in_memory: Option<usize>,
    /// `None` if values are not of a fixed size.
    pub size_of_value_in_memory: Option<usize>,
    pub is_categorial: bool,
    pub is_nullable: bool,
    pub only_null: bool,
    pub low_cardinality: bool,
    pub can_be_inside_nullable: bool,
}

impl TypeTraits {
    pub const DEFAULT: Self = Self {
        is_parametric: false,
        have_subtypes: false,
        cannot_be_stored_in_tables: false,
        should_align_right_in_pretty_formats: false,
        text_can_contain_only_valid_utf8: false,
        is_comparable: false,
        can_be_compared_with_collation: false,
        can_be_used_as_version: false,
        is_summable: false,
        can_be_used_in_bit_operations: false,
        can_be_used_in_boolean_context: false,
        is_value_represented_by_number: false,
        is_value_represented_by_integer: false,
        is_value_unambiguously_represented_in_contiguous_memory_region: false,
        maximum_size_of_value_in_memory: None,
        size_of_value_in_memory: None,
        is_categorial: false,
        is_nullable: false,
        only_null: false,
        low_cardinality: false,
        can_be_inside_nullable: false,
    };
}

impl Default for TypeTraits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A column type descriptor.
///
/// Descriptors are immutable and shared through [`DataTypeRef`]. Besides identity and trait
/// queries they own every codec for values of the type: the field level binary codec, one row
/// codec per [`RowFormat`](crate::format::RowFormat) and the multi-stream bulk protocol.
pub trait DataType: Debug + Send + Sync + 'static {
    /// Full name including parameters, e.g. `Array(String)`.
    fn name(&self) -> String;

    fn family_name(&self) -> &'static str;

    fn type_index(&self) -> TypeIndex;

    fn as_any(&self) -> &dyn Any;

    fn node(&self) -> TypeNode<'_> {
        TypeNode::Leaf
    }

    /// Structural equality.
    fn equals(&self, other: &dyn DataType) -> bool;

    fn traits(&self) -> &TypeTraits;

    fn default_value(&self) -> Field;

    /// An empty mutable column for values of this type.
    fn create_column(&self) -> Column;

    fn serialize_binary_field(&self, field: &Field, ostr: &mut dyn WriteBuffer) -> Result<()>;

    fn deserialize_binary_field(&self, istr: &mut dyn ReadBuffer) -> Result<Field>;

    fn serialize_binary(&self, column: &Column, row: usize, ostr: &mut dyn WriteBuffer)
    -> Result<()>;

    fn deserialize_binary(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()>;

    fn serialize_text_escaped(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()>;

    fn deserialize_text_escaped(
        &self,
        _column: &mut Column,
        _istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        Err(Error::unsupported_format(self.name(), "TSV"))
    }

    fn serialize_text_quoted(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()>;

    fn deserialize_text_quoted(
        &self,
        _column: &mut Column,
        _istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        Err(Error::unsupported_format(self.name(), "Values"))
    }

    fn serialize_text_csv(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()>;

    fn deserialize_text_csv(
        &self,
        _column: &mut Column,
        _istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        Err(Error::unsupported_format(self.name(), "CSV"))
    }

    fn serialize_text_json(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()>;

    fn deserialize_text_json(
        &self,
        _column: &mut Column,
        _istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        Err(Error::unsupported_format(self.name(), "JSON"))
    }

    fn serialize_text_xml(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()>;

    /// Plain text for pretty output, not meant to be parsed back.
    fn serialize_text(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()>;

    /// Tagged structured record encoding.
    fn serialize_record(
        &self,
        _column: &Column,
        _row: usize,
        _ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        Err(Error::unsupported_format(self.name(), "Record"))
    }

    fn deserialize_record(
        &self,
        _column: &mut Column,
        _istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        Err(Error::unsupported_format(self.name(), "Record"))
    }

    /// Report every sub-stream this type writes, relative to `path`.
    fn enumerate_streams(
        &self,
        callback: &mut dyn FnMut(&SubstreamPath),
        path: &mut SubstreamPath,
    ) {
        callback(path)
    }

    fn serialize_bulk_state_prefix(
        &self,
        _settings: &mut SerializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        Ok(None)
    }

    fn serialize_bulk_state_suffix(
        &self,
        _settings: &mut SerializeBulkSettings<'_>,
        _state: &mut Option<BulkState>,
    ) -> Result<()> {
        Ok(())
    }

    fn deserialize_bulk_state_prefix(
        &self,
        _settings: &mut DeserializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        Ok(None)
    }

    /// Write rows `[offset, offset + limit)` to the streams in `settings`. A `limit` of zero
    /// means every row from `offset` to the end of the column.
    fn serialize_bulk_with_multiple_streams(
        &self,
        column: &Column,
        offset: usize,
        limit: usize,
        settings: &mut SerializeBulkSettings<'_>,
        _state: &mut Option<BulkState>,
    ) -> Result<()> {
        match settings.output() {
            Some(ostr) => self.serialize_bulk(column, ostr, offset, limit),
            None => Ok(()),
        }
    }

    /// Append up to `limit` rows read from the streams in `settings` to `column`, returning the
    /// number of rows appended.
    fn deserialize_bulk_with_multiple_streams(
        &self,
        column: &mut Column,
        limit: usize,
        settings: &mut DeserializeBulkSettings<'_>,
        _state: &mut Option<BulkState>,
    ) -> Result<usize> {
        match settings.input() {
            Some(istr) => self.deserialize_bulk(column, istr, limit),
            None => Ok(0),
        }
    }

    /// Single stream bulk encoding, defaults to a sequence of binary rows.
    fn serialize_bulk(
        &self,
        column: &Column,
        ostr: &mut dyn WriteBuffer,
        offset: usize,
        limit: usize,
    ) -> Result<()> {
        for row in offset..bulk_range_end(column.len(), offset, limit)? {
            self.serialize_binary(column, row, ostr)?;
        }
        Ok(())
    }

    /// Reads rows until `limit` is reached or the stream ends on a row boundary.
    fn deserialize_bulk(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        limit: usize,
    ) -> Result<usize> {
        let mut rows = 0;
        while rows < limit && !istr.eof() {
            self.deserialize_binary(column, istr)?;
            rows += 1;
        }
        Ok(rows)
    }

    fn is_parametric(&self) -> bool {
        self.traits().is_parametric
    }

    fn have_subtypes(&self) -> bool {
        self.traits().have_subtypes
    }

    fn cannot_be_stored_in_tables(&self) -> bool {
        self.traits().cannot_be_stored_in_tables
    }

    fn should_align_right_in_pretty_formats(&self) -> bool {
        self.traits().should_align_right_in_pretty_formats
    }

    fn text_can_contain_only_valid_utf8(&self) -> bool {
        self.traits().text_can_contain_only_valid_utf8
    }

    fn is_comparable(&self) -> bool {
        self.traits().is_comparable
    }

    fn can_be_compared_with_collation(&self) -> bool {
        self.traits().can_be_compared_with_collation
    }

    fn can_be_used_as_version(&self) -> bool {
        self.traits().can_be_used_as_version
    }

    fn is_summable(&self) -> bool {
        self.traits().is_summable
    }

    fn can_be_used_in_bit_operations(&self) -> bool {
        self.traits().can_be_used_in_bit_operations
    }

    fn can_be_used_in_boolean_context(&self) -> bool {
        self.traits().can_be_used_in_boolean_context
    }

    fn is_value_represented_by_number(&self) -> bool {
        self.traits().is_value_represented_by_number
    }

    fn is_value_represented_by_integer(&self) -> bool {
        self.traits().is_value_represented_by_integer
    }

    fn is_value_unambiguously_represented_in_contiguous_memory_region(&self) -> bool {
        self.traits()
            .is_value_unambiguously_represented_in_contiguous_memory_region
    }

    fn have_maximum_size_of_value(&self) -> bool {
        self.traits().maximum_size_of_value_in_memory.is_some()
    }

    fn maximum_size_of_value_in_memory(&self) -> Option<usize> {
        self.traits().maximum_size_of_value_in_memory
    }

    fn size_of_value_in_memory(&self) -> Option<usize> {
        self.traits().size_of_value_in_memory
    }

    fn is_categorial(&self) -> bool {
        self.traits().is_categorial
    }

    fn is_nullable(&self) -> bool {
        self.traits().is_nullable
    }

    fn only_null(&self) -> bool {
        self.traits().only_null
    }

    fn low_cardinality(&self) -> bool {
        self.traits().low_cardinality
    }
}

impl dyn DataType {
    pub fn downcast_ref<T: DataType>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: DataType>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl PartialEq for dyn DataType {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Display for dyn DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Exclusive end row of a bulk window over a column of `len` rows.
pub fn bulk_range_end(len: usize, offset: usize, limit: usize) -> Result<usize> {
    if offset > len {
        return Err(Error::serialization(format!(
            "bulk offset {offset} is past the end of a column of {len} rows"
        )));
    }
    if limit == 0 {
        return Ok(len);
    }
    Ok(offset.saturating_add(limit).min(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_window() {
        assert_eq!(bulk_range_end(6, 0, 0).unwrap(), 6);
        assert_eq!(bulk_range_end(6, 2, 2).unwrap(), 4);
        assert_eq!(bulk_range_end(6, 4, 10).unwrap(), 6);
        assert_eq!(bulk_range_end(6, 6, 1).unwrap(), 6);
        assert!(bulk_range_end(6, 7, 1).is_err());
    }
}

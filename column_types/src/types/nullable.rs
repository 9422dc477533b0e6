use std::any::Any;
use std::sync::Arc;

use crate::bulk::{
    BulkState, DeserializeBulkSettings, SerializeBulkSettings, Substream, SubstreamPath,
    expect_rows,
};
use crate::column::Column;
use crate::data_type::{DataType, DataTypeRef, TypeIndex, TypeNode, TypeTraits, bulk_range_end};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::format::{FormatSettings, record};
use crate::io::{ReadBuffer, ReadBufferExt, WriteBuffer, WriteBufferExt};

/// Adds a null value to a scalar type.
#[derive(Debug, Clone)]
pub struct DataTypeNullable {
    nested: DataTypeRef,
    traits: TypeTraits,
}

impl DataTypeNullable {
    pub fn new(nested: DataTypeRef) -> Result<Self> {
        if !nested.traits().can_be_inside_nullable {
            return Err(Error::construction(
                format!("Nullable({})", nested.name()),
                format!("{} cannot be inside Nullable", nested.name()),
            ));
        }
        let inner = *nested.traits();
        let traits = TypeTraits {
            is_comparable: inner.is_comparable,
            can_be_compared_with_collation: inner.can_be_compared_with_collation,
            text_can_contain_only_valid_utf8: inner.text_can_contain_only_valid_utf8,
            should_align_right_in_pretty_formats: inner.should_align_right_in_pretty_formats,
            is_summable: inner.is_summable,
            can_be_used_in_boolean_context: inner.can_be_used_in_boolean_context,
            is_categorial: inner.is_categorial,
            maximum_size_of_value_in_memory: inner.maximum_size_of_value_in_memory.map(|s| s + 1),
            is_nullable: true,
            have_subtypes: true,
            is_parametric: true,
            ..TypeTraits::DEFAULT
        };
        Ok(Self { nested, traits })
    }

    pub fn nested(&self) -> &DataTypeRef {
        &self.nested
    }

    fn parts<'a>(&self, column: &'a Column) -> Result<(&'a [u8], &'a Column)> {
        match column {
            Column::Nullable { null_map, nested } => Ok((null_map, nested)),
            other => Err(Error::type_mismatch(self.name(), other.name())),
        }
    }

    fn parts_mut<'a>(&self, column: &'a mut Column) -> Result<(&'a mut Vec<u8>, &'a mut Column)> {
        match column {
            Column::Nullable { null_map, nested } => Ok((null_map, nested)),
            other => Err(Error::type_mismatch(self.name(), other.name())),
        }
    }

    /// Writes `null` for null rows and defers to `write` otherwise.
    fn serialize_or_null(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        null: &str,
        write: impl FnOnce(&dyn DataType, &Column, &mut dyn WriteBuffer) -> Result<()>,
    ) -> Result<()> {
        let (null_map, nested) = self.parts(column)?;
        if null_map[row] != 0 {
            ostr.write_str(null)
        } else {
            write(self.nested.as_ref(), nested, ostr)
        }
    }

    /// Consumes `null` if present, otherwise reads a value with `read`.
    fn deserialize_or_null(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        null: &[u8],
        read: impl FnOnce(&dyn DataType, &mut Column, &mut dyn ReadBuffer) -> Result<()>,
    ) -> Result<()> {
        let nested_type = Arc::clone(&self.nested);
        let (null_map, nested) = self.parts_mut(column)?;
        if istr.check_word(null)? {
            nested.push_default()?;
            null_map.push(1);
        } else {
            read(nested_type.as_ref(), nested, istr)?;
            null_map.push(0);
        }
        Ok(())
    }
}

impl DataType for DataTypeNullable {
    fn name(&self) -> String {
        format!("Nullable({})", self.nested.name())
    }

    fn family_name(&self) -> &'static str {
        "Nullable"
    }

    fn type_index(&self) -> TypeIndex {
        TypeIndex::Nullable
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn node(&self) -> TypeNode<'_> {
        TypeNode::Nullable(&self.nested)
    }

    fn equals(&self, other: &dyn DataType) -> bool {
        match other.node() {
            TypeNode::Nullable(nested) => {
                other.type_index() == TypeIndex::Nullable && self.nested.equals(nested.as_ref())
            }
            _ => false,
        }
    }

    fn traits(&self) -> &TypeTraits {
        &self.traits
    }

    fn default_value(&self) -> Field {
        Field::Null
    }

    fn create_column(&self) -> Column {
        Column::Nullable {
            null_map: Vec::new(),
            nested: Box::new(self.nested.create_column()),
        }
    }

    fn serialize_binary_field(&self, field: &Field, ostr: &mut dyn WriteBuffer) -> Result<()> {
        if field.is_null() {
            ostr.write_u8(1)
        } else {
            ostr.write_u8(0)?;
            self.nested.serialize_binary_field(field, ostr)
        }
    }

    fn deserialize_binary_field(&self, istr: &mut dyn ReadBuffer) -> Result<Field> {
        if istr.read_u8()? != 0 {
            Ok(Field::Null)
        } else {
            self.nested.deserialize_binary_field(istr)
        }
    }

    fn serialize_binary(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
    ) -> Result<()> {
        let (null_map, nested) = self.parts(column)?;
        if null_map[row] != 0 {
            ostr.write_u8(1)
        } else {
            ostr.write_u8(0)?;
            self.nested.serialize_binary(nested, row, ostr)
        }
    }

    fn deserialize_binary(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()> {
        let nested_type = Arc::clone(&self.nested);
        let (null_map, nested) = self.parts_mut(column)?;
        if istr.read_u8()? != 0 {
            nested.push_default()?;
            null_map.push(1);
        } else {
            nested_type.deserialize_binary(nested, istr)?;
            null_map.push(0);
        }
        Ok(())
    }

    fn serialize_text_escaped(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_or_null(column, row, ostr, "\\N", |t, c, o| {
            t.serialize_text_escaped(c, row, o, settings)
        })
    }

    fn deserialize_text_escaped(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_or_null(column, istr, b"\\N", |t, c, i| {
            t.deserialize_text_escaped(c, i, settings)
        })
    }

    fn serialize_text_quoted(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_or_null(column, row, ostr, "NULL", |t, c, o| {
            t.serialize_text_quoted(c, row, o, settings)
        })
    }

    fn deserialize_text_quoted(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_or_null(column, istr, b"NULL", |t, c, i| {
            t.deserialize_text_quoted(c, i, settings)
        })
    }

    fn serialize_text_csv(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_or_null(column, row, ostr, "\\N", |t, c, o| {
            t.serialize_text_csv(c, row, o, settings)
        })
    }

    fn deserialize_text_csv(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_or_null(column, istr, b"\\N", |t, c, i| {
            t.deserialize_text_csv(c, i, settings)
        })
    }

    fn serialize_text_json(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_or_null(column, row, ostr, "null", |t, c, o| {
            t.serialize_text_json(c, row, o, settings)
        })
    }

    fn deserialize_text_json(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_or_null(column, istr, b"null", |t, c, i| {
            t.deserialize_text_json(c, i, settings)
        })
    }

    fn serialize_text_xml(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_or_null(column, row, ostr, "\\N", |t, c, o| {
            t.serialize_text_xml(c, row, o, settings)
        })
    }

    fn serialize_text(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_or_null(column, row, ostr, "NULL", |t, c, o| {
            t.serialize_text(c, row, o, settings)
        })
    }

    fn serialize_record(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        let (null_map, nested) = self.parts(column)?;
        if null_map[row] != 0 {
            record::write_tag(ostr, record::NULL)
        } else {
            self.nested.serialize_record(nested, row, ostr, settings)
        }
    }

    fn deserialize_record(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        let nested_type = Arc::clone(&self.nested);
        let (null_map, nested) = self.parts_mut(column)?;
        if istr.peek_byte() == Some(record::NULL) {
            istr.skip(1)?;
            nested.push_default()?;
            null_map.push(1);
        } else {
            nested_type.deserialize_record(nested, istr, settings)?;
            null_map.push(0);
        }
        Ok(())
    }

    fn enumerate_streams(
        &self,
        callback: &mut dyn FnMut(&SubstreamPath),
        path: &mut SubstreamPath,
    ) {
        path.push(Substream::NullMap);
        callback(path);
        path.pop();
        path.push(Substream::NullableElements);
        self.nested.enumerate_streams(callback, path);
        path.pop();
    }

    fn serialize_bulk_state_prefix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        settings.with_substream(Substream::NullableElements, |settings| {
            self.nested.serialize_bulk_state_prefix(settings)
        })
    }

    fn serialize_bulk_state_suffix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        settings.with_substream(Substream::NullableElements, |settings| {
            self.nested.serialize_bulk_state_suffix(settings, state)
        })
    }

    fn deserialize_bulk_state_prefix(
        &self,
        settings: &mut DeserializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        settings.with_substream(Substream::NullableElements, |settings| {
            self.nested.deserialize_bulk_state_prefix(settings)
        })
    }

    fn serialize_bulk_with_multiple_streams(
        &self,
        column: &Column,
        offset: usize,
        limit: usize,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        let (null_map, nested) = self.parts(column)?;
        let end = bulk_range_end(null_map.len(), offset, limit)?;
        settings.with_substream(Substream::NullMap, |settings| match settings.output() {
            Some(ostr) => ostr.write_bytes(&null_map[offset..end]),
            None => Ok(()),
        })?;
        if end == offset {
            return Ok(());
        }
        settings.with_substream(Substream::NullableElements, |settings| {
            self.nested.serialize_bulk_with_multiple_streams(
                nested,
                offset,
                end - offset,
                settings,
                state,
            )
        })
    }

    fn deserialize_bulk_with_multiple_streams(
        &self,
        column: &mut Column,
        limit: usize,
        settings: &mut DeserializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<usize> {
        let nested_type = Arc::clone(&self.nested);
        let (null_map, nested) = self.parts_mut(column)?;
        let rows = settings.with_substream(Substream::NullMap, |settings| {
            let Some(istr) = settings.input() else {
                return Ok(0);
            };
            let mut rows = 0;
            while rows < limit && !istr.eof() {
                null_map.push(istr.read_u8()?);
                rows += 1;
            }
            Ok(rows)
        })?;
        if rows == 0 {
            return Ok(0);
        }
        let read = settings.with_substream(Substream::NullableElements, |settings| {
            nested_type.deserialize_bulk_with_multiple_streams(nested, rows, settings, state)
        })?;
        expect_rows("nullable elements", rows, read)?;
        Ok(rows)
    }
}

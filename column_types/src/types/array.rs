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
use crate::format::FormatSettings;
use crate::io::{ReadBuffer, ReadBufferExt, WriteBuffer, WriteBufferExt};
use crate::text::write_csv_string;

/// Variable length arrays of a nested type.
#[derive(Debug, Clone)]
pub struct DataTypeArray {
    nested: DataTypeRef,
    traits: TypeTraits,
}

impl DataTypeArray {
    pub fn new(nested: DataTypeRef) -> Self {
        let traits = TypeTraits {
            is_parametric: true,
            have_subtypes: true,
            is_comparable: nested.is_comparable(),
            cannot_be_stored_in_tables: nested.cannot_be_stored_in_tables(),
            text_can_contain_only_valid_utf8: nested.text_can_contain_only_valid_utf8(),
            ..TypeTraits::DEFAULT
        };
        Self { nested, traits }
    }

    pub fn nested(&self) -> &DataTypeRef {
        &self.nested
    }

    fn parts<'a>(&self, column: &'a Column) -> Result<(&'a [u64], &'a Column)> {
        match column {
            Column::Array { offsets, values } => Ok((offsets, values)),
            other => Err(Error::type_mismatch(self.name(), other.name())),
        }
    }

    fn parts_mut<'a>(&self, column: &'a mut Column) -> Result<(&'a mut Vec<u64>, &'a mut Column)> {
        match column {
            Column::Array { offsets, values } => Ok((offsets, values)),
            other => Err(Error::type_mismatch(self.name(), other.name())),
        }
    }

    /// `[a, b]` with every element written by `write`.
    fn serialize_elements(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        mut write: impl FnMut(&dyn DataType, &Column, usize, &mut dyn WriteBuffer) -> Result<()>,
    ) -> Result<()> {
        let (offsets, values) = self.parts(column)?;
        let (start, end) = Column::array_range(offsets, row);
        ostr.write_u8(b'[')?;
        for i in start..end {
            if i > start {
                ostr.write_u8(b',')?;
            }
            write(self.nested.as_ref(), values, i, ostr)?;
        }
        ostr.write_u8(b']')
    }
}

impl DataType for DataTypeArray {
    fn name(&self) -> String {
        format!("Array({})", self.nested.name())
    }

    fn family_name(&self) -> &'static str {
        "Array"
    }

    fn type_index(&self) -> TypeIndex {
        TypeIndex::Array
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn node(&self) -> TypeNode<'_> {
        TypeNode::Array(&self.nested)
    }

    fn equals(&self, other: &dyn DataType) -> bool {
        match other.node() {
            TypeNode::Array(nested) => self.nested.equals(nested.as_ref()),
            _ => false,
        }
    }

    fn traits(&self) -> &TypeTraits {
        &self.traits
    }

    fn default_value(&self) -> Field {
        Field::Array(Vec::new())
    }

    fn create_column(&self) -> Column {
        Column::Array {
            offsets: Vec::new(),
            values: Box::new(self.nested.create_column()),
        }
    }

    fn serialize_binary_field(&self, field: &Field, ostr: &mut dyn WriteBuffer) -> Result<()> {
        let Field::Array(items) = field else {
            return Err(Error::type_mismatch(self.name(), field.kind()));
        };
        ostr.write_var_uint(items.len() as u64)?;
        for item in items {
            self.nested.serialize_binary_field(item, ostr)?;
        }
        Ok(())
    }

    fn deserialize_binary_field(&self, istr: &mut dyn ReadBuffer) -> Result<Field> {
        let len = istr.read_var_uint()?;
        let mut items = Vec::new();
        for _ in 0..len {
            items.push(self.nested.deserialize_binary_field(istr)?);
        }
        Ok(Field::Array(items))
    }

    fn serialize_binary(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
    ) -> Result<()> {
        let (offsets, values) = self.parts(column)?;
        let (start, end) = Column::array_range(offsets, row);
        ostr.write_var_uint((end - start) as u64)?;
        for i in start..end {
            self.nested.serialize_binary(values, i, ostr)?;
        }
        Ok(())
    }

    fn deserialize_binary(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()> {
        let nested_type = Arc::clone(&self.nested);
        let (offsets, values) = self.parts_mut(column)?;
        let len = istr.read_var_uint()?;
        for _ in 0..len {
            nested_type.deserialize_binary(values, istr)?;
        }
        offsets.push(values.len() as u64);
        Ok(())
    }

    fn serialize_text_escaped(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_text_quoted(column, row, ostr, settings)
    }

    fn serialize_text_quoted(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_elements(column, row, ostr, |t, c, i, o| {
            t.serialize_text_quoted(c, i, o, settings)
        })
    }

    fn serialize_text_csv(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        let mut buf = Vec::new();
        self.serialize_text_quoted(column, row, &mut buf, settings)?;
        let text = String::from_utf8(buf)
            .map_err(|e| Error::serialization(format!("non utf-8 array text: {e}")))?;
        write_csv_string(ostr, &text)
    }

    fn serialize_text_json(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_elements(column, row, ostr, |t, c, i, o| {
            t.serialize_text_json(c, i, o, settings)
        })
    }

    fn serialize_text_xml(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        let (offsets, values) = self.parts(column)?;
        let (start, end) = Column::array_range(offsets, row);
        ostr.write_str("<array>")?;
        for i in start..end {
            ostr.write_str("<elem>")?;
            self.nested.serialize_text_xml(values, i, ostr, settings)?;
            ostr.write_str("</elem>")?;
        }
        ostr.write_str("</array>")
    }

    fn serialize_text(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_text_quoted(column, row, ostr, settings)
    }

    fn enumerate_streams(
        &self,
        callback: &mut dyn FnMut(&SubstreamPath),
        path: &mut SubstreamPath,
    ) {
        path.push(Substream::ArraySizes);
        callback(path);
        path.pop();
        path.push(Substream::ArrayElements);
        self.nested.enumerate_streams(callback, path);
        path.pop();
    }

    fn serialize_bulk_state_prefix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        settings.with_substream(Substream::ArrayElements, |settings| {
            self.nested.serialize_bulk_state_prefix(settings)
        })
    }

    fn serialize_bulk_state_suffix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        settings.with_substream(Substream::ArrayElements, |settings| {
            self.nested.serialize_bulk_state_suffix(settings, state)
        })
    }

    fn deserialize_bulk_state_prefix(
        &self,
        settings: &mut DeserializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        settings.with_substream(Substream::ArrayElements, |settings| {
            self.nested.deserialize_bulk_state_prefix(settings)
        })
    }

    /// Sizes go to their own stream as little-endian `u64`s, the flattened elements of the
    /// written rows follow in the element streams.
    fn serialize_bulk_with_multiple_streams(
        &self,
        column: &Column,
        offset: usize,
        limit: usize,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        let (offsets, values) = self.parts(column)?;
        let end = bulk_range_end(offsets.len(), offset, limit)?;
        if end == offset {
            return Ok(());
        }
        settings.with_substream(Substream::ArraySizes, |settings| {
            let Some(ostr) = settings.output() else {
                return Ok(());
            };
            for row in offset..end {
                let (start, stop) = Column::array_range(offsets, row);
                ostr.write_u64_le((stop - start) as u64)?;
            }
            Ok(())
        })?;

        let first = Column::array_range(offsets, offset).0;
        let last = Column::array_range(offsets, end - 1).1;
        if last == first {
            return Ok(());
        }
        settings.with_substream(Substream::ArrayElements, |settings| {
            self.nested
                .serialize_bulk_with_multiple_streams(values, first, last - first, settings, state)
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
        let (offsets, values) = self.parts_mut(column)?;
        let mut total = values.len() as u64;
        let base = total;
        let rows = settings.with_substream(Substream::ArraySizes, |settings| {
            let Some(istr) = settings.input() else {
                return Ok(0);
            };
            let mut rows = 0;
            while rows < limit && !istr.eof() {
                total += istr.read_u64_le()?;
                offsets.push(total);
                rows += 1;
            }
            Ok(rows)
        })?;
        let wanted = (total - base) as usize;
        if wanted == 0 {
            return Ok(rows);
        }
        let read = settings.with_substream(Substream::ArrayElements, |settings| {
            nested_type.deserialize_bulk_with_multiple_streams(values, wanted, settings, state)
        })?;
        expect_rows("array elements", wanted, read)?;
        Ok(rows)
    }
}

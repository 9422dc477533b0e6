use std::any::Any;
use std::sync::Arc;

use crate::bulk::{BulkState, DeserializeBulkSettings, SerializeBulkSettings, SubstreamPath};
use crate::column::Column;
use crate::data_type::{DataType, DataTypeRef, TypeIndex, TypeNode, TypeTraits};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::format::FormatSettings;
use crate::io::{ReadBuffer, WriteBuffer, WriteBufferExt};
use crate::text::{write_csv_string, write_json_string};
use crate::types::array::DataTypeArray;
use crate::types::tuple::DataTypeTuple;

/// Key/value maps, stored as `Array(Tuple(keys K, values V))`.
#[derive(Debug, Clone)]
pub struct DataTypeMap {
    key: DataTypeRef,
    value: DataTypeRef,
    nested: DataTypeRef,
    traits: TypeTraits,
}

impl DataTypeMap {
    pub fn new(key: DataTypeRef, value: DataTypeRef) -> Self {
        let entry = DataTypeTuple::with_names(
            vec![Arc::clone(&key), Arc::clone(&value)],
            vec!["keys".to_string(), "values".to_string()],
        )
        .map(|tuple| Arc::new(tuple) as DataTypeRef)
        .unwrap_or_else(|_| unreachable!("two distinct non-empty names"));
        let nested: DataTypeRef = Arc::new(DataTypeArray::new(entry));
        let traits = TypeTraits {
            is_parametric: true,
            have_subtypes: true,
            text_can_contain_only_valid_utf8: key.text_can_contain_only_valid_utf8()
                && value.text_can_contain_only_valid_utf8(),
            ..TypeTraits::DEFAULT
        };
        Self {
            key,
            value,
            nested,
            traits,
        }
    }

    pub fn key(&self) -> &DataTypeRef {
        &self.key
    }

    pub fn value(&self) -> &DataTypeRef {
        &self.value
    }

    /// The `Array(Tuple(keys, values))` type the column is stored as.
    pub fn nested(&self) -> &DataTypeRef {
        &self.nested
    }

    fn inner<'a>(&self, column: &'a Column) -> Result<&'a Column> {
        match column {
            Column::Map(nested) => Ok(nested),
            other => Err(Error::type_mismatch(self.name(), other.name())),
        }
    }

    fn inner_mut<'a>(&self, column: &'a mut Column) -> Result<&'a mut Column> {
        match column {
            Column::Map(nested) => Ok(nested),
            other => Err(Error::type_mismatch(self.name(), other.name())),
        }
    }

    /// Calls `entry` for every key/value pair of row `row`. The columns passed are the keys and
    /// values columns followed by the row within them.
    fn for_each_entry(
        &self,
        column: &Column,
        row: usize,
        mut entry: impl FnMut(usize, &Column, &Column, usize) -> Result<()>,
    ) -> Result<()> {
        let Column::Array { offsets, values } = self.inner(column)? else {
            return Err(Error::type_mismatch("Array", "map storage"));
        };
        let Column::Tuple(kv) = values.as_ref() else {
            return Err(Error::type_mismatch("Tuple", values.name()));
        };
        let [keys, values] = kv.as_slice() else {
            return Err(Error::type_mismatch("Tuple of 2 elements", "map storage"));
        };
        let (start, end) = Column::array_range(offsets, row);
        for (i, r) in (start..end).enumerate() {
            entry(i, keys, values, r)?;
        }
        Ok(())
    }

    fn serialize_text_with(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        write: impl Fn(&dyn DataType, &Column, usize, &mut dyn WriteBuffer) -> Result<()>,
    ) -> Result<()> {
        ostr.write_u8(b'{')?;
        self.for_each_entry(column, row, |i, keys, values, r| {
            if i > 0 {
                ostr.write_u8(b',')?;
            }
            write(self.key.as_ref(), keys, r, ostr)?;
            ostr.write_u8(b':')?;
            write(self.value.as_ref(), values, r, ostr)
        })?;
        ostr.write_u8(b'}')
    }
}

impl DataType for DataTypeMap {
    fn name(&self) -> String {
        format!("Map({}, {})", self.key.name(), self.value.name())
    }

    fn family_name(&self) -> &'static str {
        "Map"
    }

    fn type_index(&self) -> TypeIndex {
        TypeIndex::Map
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn node(&self) -> TypeNode<'_> {
        TypeNode::Map {
            key: &self.key,
            value: &self.value,
        }
    }

    fn equals(&self, other: &dyn DataType) -> bool {
        match other.node() {
            TypeNode::Map { key, value } => {
                self.key.equals(key.as_ref()) && self.value.equals(value.as_ref())
            }
            _ => false,
        }
    }

    fn traits(&self) -> &TypeTraits {
        &self.traits
    }

    fn default_value(&self) -> Field {
        Field::Map(Vec::new())
    }

    fn create_column(&self) -> Column {
        Column::Map(Box::new(self.nested.create_column()))
    }

    fn serialize_binary_field(&self, field: &Field, ostr: &mut dyn WriteBuffer) -> Result<()> {
        let Field::Map(entries) = field else {
            return Err(Error::type_mismatch(self.name(), field.kind()));
        };
        ostr.write_var_uint(entries.len() as u64)?;
        for (key, value) in entries {
            self.key.serialize_binary_field(key, ostr)?;
            self.value.serialize_binary_field(value, ostr)?;
        }
        Ok(())
    }

    fn deserialize_binary_field(&self, istr: &mut dyn ReadBuffer) -> Result<Field> {
        match self.nested.deserialize_binary_field(istr)? {
            Field::Array(items) => Ok(Field::Map(
                items
                    .into_iter()
                    .map(|item| match item {
                        Field::Tuple(mut kv) if kv.len() == 2 => {
                            let value = kv.pop().unwrap_or(Field::Null);
                            let key = kv.pop().unwrap_or(Field::Null);
                            Ok((key, value))
                        }
                        other => Err(Error::type_mismatch("Tuple", other.kind())),
                    })
                    .collect::<Result<_>>()?,
            )),
            other => Err(Error::type_mismatch("Array", other.kind())),
        }
    }

    fn serialize_binary(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
    ) -> Result<()> {
        self.nested.serialize_binary(self.inner(column)?, row, ostr)
    }

    fn deserialize_binary(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()> {
        let nested = Arc::clone(&self.nested);
        nested.deserialize_binary(self.inner_mut(column)?, istr)
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
        self.serialize_text_with(column, row, ostr, |t, c, r, o| {
            t.serialize_text_quoted(c, r, o, settings)
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
            .map_err(|e| Error::serialization(format!("non utf-8 map text: {e}")))?;
        write_csv_string(ostr, &text)
    }

    /// Keys that are not JSON strings are quoted so that the result is a valid object.
    fn serialize_text_json(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        ostr.write_u8(b'{')?;
        self.for_each_entry(column, row, |i, keys, values, r| {
            if i > 0 {
                ostr.write_u8(b',')?;
            }
            let mut key = Vec::new();
            self.key.serialize_text_json(keys, r, &mut key, settings)?;
            if key.first() == Some(&b'"') {
                ostr.write_bytes(&key)?;
            } else {
                let key = String::from_utf8(key)
                    .map_err(|e| Error::serialization(format!("non utf-8 map key: {e}")))?;
                write_json_string(ostr, &key)?;
            }
            ostr.write_u8(b':')?;
            self.value.serialize_text_json(values, r, ostr, settings)
        })?;
        ostr.write_u8(b'}')
    }

    fn serialize_text_xml(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        ostr.write_str("<map>")?;
        self.for_each_entry(column, row, |_, keys, values, r| {
            ostr.write_str("<elem><key>")?;
            self.key.serialize_text_xml(keys, r, ostr, settings)?;
            ostr.write_str("</key><value>")?;
            self.value.serialize_text_xml(values, r, ostr, settings)?;
            ostr.write_str("</value></elem>")
        })?;
        ostr.write_str("</map>")
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
        self.nested.enumerate_streams(callback, path)
    }

    fn serialize_bulk_state_prefix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        self.nested.serialize_bulk_state_prefix(settings)
    }

    fn serialize_bulk_state_suffix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        self.nested.serialize_bulk_state_suffix(settings, state)
    }

    fn deserialize_bulk_state_prefix(
        &self,
        settings: &mut DeserializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        self.nested.deserialize_bulk_state_prefix(settings)
    }

    fn serialize_bulk_with_multiple_streams(
        &self,
        column: &Column,
        offset: usize,
        limit: usize,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        self.nested.serialize_bulk_with_multiple_streams(
            self.inner(column)?,
            offset,
            limit,
            settings,
            state,
        )
    }

    fn deserialize_bulk_with_multiple_streams(
        &self,
        column: &mut Column,
        limit: usize,
        settings: &mut DeserializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<usize> {
        let nested = Arc::clone(&self.nested);
        nested.deserialize_bulk_with_multiple_streams(
            self.inner_mut(column)?,
            limit,
            settings,
            state,
        )
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::bulk::MemoryStreams;
    use crate::format::RowFormat;
    use crate::types::number::DataTypeUInt64;
    use crate::types::string::DataTypeString;

    fn sample() -> (DataTypeMap, Column) {
        let data_type = DataTypeMap::new(
            Arc::new(DataTypeUInt64::new()),
            Arc::new(DataTypeString::new()),
        );
        let mut column = data_type.create_column();
        column
            .push_field(&Field::Map(vec![
                (Field::UInt64(1), Field::from("a")),
                (Field::UInt64(2), Field::from("b")),
            ]))
            .unwrap();
        (data_type, column)
    }

    #[test]
    fn text() {
        let (data_type, column) = sample();
        let settings = FormatSettings::default();
        let render = |format: RowFormat| {
            let mut buf = Vec::new();
            format
                .serialize(&data_type, &column, 0, &mut buf, &settings)
                .unwrap();
            String::from_utf8(buf).unwrap()
        };
        assert_eq!(data_type.name(), "Map(UInt64, String)");
        assert_eq!(render(RowFormat::Quoted), "{1:'a',2:'b'}");
        assert_eq!(render(RowFormat::Json), r#"{"1":"a","2":"b"}"#);
    }

    #[test]
    fn binary_field() {
        let (data_type, column) = sample();
        let field = column.field_at(0);
        let mut buf = Vec::new();
        data_type.serialize_binary_field(&field, &mut buf).unwrap();

        let mut row = Vec::new();
        data_type.serialize_binary(&column, 0, &mut row).unwrap();
        assert_eq!(buf, row);

        let decoded = data_type
            .deserialize_binary_field(&mut Bytes::from(buf))
            .unwrap();
        assert_eq!(decoded, field);
    }

    #[test]
    fn streams() {
        let (data_type, _) = sample();
        let streams = MemoryStreams::for_type(&data_type, "m");
        assert_eq!(
            streams.stream_names().collect::<Vec<_>>(),
            vec!["m.keys", "m.size0", "m.values"]
        );
    }
}

use std::any::Any;

use crate::column::Column;
use crate::data_type::{DataType, TypeIndex, TypeTraits};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::format::{FormatSettings, record};
use crate::io::{ReadBuffer, ReadBufferExt, WriteBuffer, WriteBufferExt};
use crate::string::PackedStringArray;
use crate::text::{
    read_csv_string, read_escaped_string, read_json_string, read_quoted_string, write_csv_string,
    write_escaped_string, write_json_string, write_quoted_string, write_xml_string,
};

const STRING_TRAITS: TypeTraits = TypeTraits {
    text_can_contain_only_valid_utf8: true,
    is_comparable: true,
    can_be_compared_with_collation: true,
    is_value_unambiguously_represented_in_contiguous_memory_region: true,
    is_categorial: true,
    can_be_inside_nullable: true,
    ..TypeTraits::DEFAULT
};

/// Variable length UTF-8 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataTypeString {}

impl DataTypeString {
    pub fn new() -> Self {
        Self {}
    }

    fn value<'a>(&self, column: &'a Column, row: usize) -> Result<&'a str> {
        let Column::String(values) = column else {
            return Err(Error::type_mismatch("String", column.name()));
        };
        values.get(row).ok_or_else(|| {
            Error::serialization(format!("row {row} out of bounds for {} rows", values.len()))
        })
    }

    fn values_mut<'a>(&self, column: &'a mut Column) -> Result<&'a mut PackedStringArray> {
        match column {
            Column::String(values) => Ok(values),
            other => Err(Error::type_mismatch("String", other.name())),
        }
    }

    fn push(&self, column: &mut Column, value: &str) -> Result<()> {
        self.values_mut(column)?.append(value);
        Ok(())
    }
}

impl DataType for DataTypeString {
    fn name(&self) -> String {
        "String".to_string()
    }

    fn family_name(&self) -> &'static str {
        "String"
    }

    fn type_index(&self) -> TypeIndex {
        TypeIndex::String
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn DataType) -> bool {
        other.type_index() == TypeIndex::String
    }

    fn traits(&self) -> &TypeTraits {
        &STRING_TRAITS
    }

    fn default_value(&self) -> Field {
        Field::String(String::new())
    }

    fn create_column(&self) -> Column {
        Column::String(PackedStringArray::new())
    }

    fn serialize_binary_field(&self, field: &Field, ostr: &mut dyn WriteBuffer) -> Result<()> {
        match field {
            Field::String(s) => ostr.write_string_binary(s),
            other => Err(Error::type_mismatch("String", other.kind())),
        }
    }

    fn deserialize_binary_field(&self, istr: &mut dyn ReadBuffer) -> Result<Field> {
        Ok(Field::String(istr.read_string_binary()?))
    }

    fn serialize_binary(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
    ) -> Result<()> {
        ostr.write_string_binary(self.value(column, row)?)
    }

    fn deserialize_binary(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()> {
        let value = istr.read_string_binary()?;
        self.push(column, &value)
    }

    fn serialize_text_escaped(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        write_escaped_string(ostr, self.value(column, row)?)
    }

    fn deserialize_text_escaped(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        let value = read_escaped_string(istr)?;
        self.push(column, &value)
    }

    fn serialize_text_quoted(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        write_quoted_string(ostr, self.value(column, row)?)
    }

    fn deserialize_text_quoted(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        let value = read_quoted_string(istr)?;
        self.push(column, &value)
    }

    fn serialize_text_csv(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        write_csv_string(ostr, self.value(column, row)?)
    }

    fn deserialize_text_csv(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        let value = read_csv_string(istr, settings.csv_delimiter)?;
        self.push(column, &value)
    }

    fn serialize_text_json(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        write_json_string(ostr, self.value(column, row)?)
    }

    fn deserialize_text_json(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        let value = read_json_string(istr)?;
        self.push(column, &value)
    }

    fn serialize_text_xml(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        write_xml_string(ostr, self.value(column, row)?)
    }

    fn serialize_text(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        ostr.write_str(self.value(column, row)?)
    }

    fn serialize_record(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        record::write_tag(ostr, record::LENGTH_DELIMITED)?;
        ostr.write_string_binary(self.value(column, row)?)
    }

    fn deserialize_record(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        record::expect_tag(istr, record::LENGTH_DELIMITED)?;
        let value = istr.read_string_binary()?;
        self.push(column, &value)
    }
}

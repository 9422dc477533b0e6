//! The `LowCardinality(T)` type descriptor.

use std::any::Any;

use column_types::bulk::{BulkState, DeserializeBulkSettings, SerializeBulkSettings, SubstreamPath};
use column_types::column::ColumnLowCardinality;
use column_types::format::{DeserializeRowFn, RowFormat, SerializeRowFn};
use column_types::io::{ReadBuffer, WriteBuffer};
use column_types::{
    Column, DataType, DataTypeRef, Error, Field, FormatSettings, Result, TypeIndex, TypeNode,
    TypeTraits,
};

use crate::bulk;
use crate::unique::create_column_unique;

/// Stores values of a dictionary type as positions into a per column dictionary of distinct
/// values.
///
/// Every row format and every [`TypeTraits`] query behaves as it does for the dictionary type,
/// so the wrapper can replace it transparently. Only the bulk encoding differs: indices and
/// dictionary updates are written to separate streams.
#[derive(Debug, Clone)]
pub struct DataTypeLowCardinality {
    dictionary_type: DataTypeRef,
    traits: TypeTraits,
}

impl DataTypeLowCardinality {
    /// Wrap `dictionary_type`. Fails if it is already dictionary encoded.
    pub fn new(dictionary_type: DataTypeRef) -> Result<Self> {
        if dictionary_type.type_index() == TypeIndex::LowCardinality
            || dictionary_type.low_cardinality()
        {
            return Err(Error::construction(
                format!("LowCardinality({})", dictionary_type.name()),
                "the dictionary type is already LowCardinality",
            ));
        }
        let traits = TypeTraits {
            is_parametric: true,
            have_subtypes: true,
            is_value_unambiguously_represented_in_contiguous_memory_region: true,
            is_categorial: false,
            is_nullable: false,
            only_null: false,
            low_cardinality: true,
            can_be_inside_nullable: false,
            ..*dictionary_type.traits()
        };
        Ok(Self {
            dictionary_type,
            traits,
        })
    }

    /// The type of the dictionary entries.
    pub fn dictionary_type(&self) -> &DataTypeRef {
        &self.dictionary_type
    }

    fn column<'a>(&self, column: &'a Column) -> Result<&'a ColumnLowCardinality> {
        column
            .as_low_cardinality()
            .ok_or_else(|| Error::type_mismatch(self.name(), column.name()))
    }

    fn column_mut<'a>(&self, column: &'a mut Column) -> Result<&'a mut ColumnLowCardinality> {
        let name = column.name();
        column
            .as_low_cardinality_mut()
            .ok_or_else(|| Error::type_mismatch(self.name(), name))
    }

    /// Resolve the dictionary entry of `row` and write it with `serialize`.
    fn serialize_impl(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
        serialize: SerializeRowFn,
    ) -> Result<()> {
        let column = self.column(column)?;
        let position = column.positions().get(row).ok_or_else(|| {
            Error::serialization(format!(
                "row {row} out of bounds for {} rows",
                column.len()
            ))
        })?;
        serialize(
            self.dictionary_type.as_ref(),
            column.dictionary().keys(),
            position as usize,
            ostr,
            settings,
        )
    }

    /// Read one value with `deserialize`, then append its dictionary position.
    fn deserialize_impl(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
        deserialize: DeserializeRowFn,
    ) -> Result<()> {
        let column = self.column_mut(column)?;
        let mut value = column.dictionary().keys().empty_like();
        deserialize(self.dictionary_type.as_ref(), &mut value, istr, settings)?;
        column.insert_from_full(&value, 0)
    }
}

impl DataType for DataTypeLowCardinality {
    fn name(&self) -> String {
        format!("LowCardinality({})", self.dictionary_type.name())
    }

    fn family_name(&self) -> &'static str {
        "LowCardinality"
    }

    fn type_index(&self) -> TypeIndex {
        TypeIndex::LowCardinality
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn node(&self) -> TypeNode<'_> {
        TypeNode::LowCardinality(&self.dictionary_type)
    }

    fn equals(&self, other: &dyn DataType) -> bool {
        match other.node() {
            TypeNode::LowCardinality(dictionary_type) => {
                self.dictionary_type.equals(dictionary_type.as_ref())
            }
            _ => false,
        }
    }

    fn traits(&self) -> &TypeTraits {
        &self.traits
    }

    fn default_value(&self) -> Field {
        self.dictionary_type.default_value()
    }

    fn create_column(&self) -> Column {
        Column::LowCardinality(ColumnLowCardinality::new(create_column_unique(
            &self.dictionary_type,
        )))
    }

    fn serialize_binary_field(&self, field: &Field, ostr: &mut dyn WriteBuffer) -> Result<()> {
        self.dictionary_type.serialize_binary_field(field, ostr)
    }

    fn deserialize_binary_field(&self, istr: &mut dyn ReadBuffer) -> Result<Field> {
        self.dictionary_type.deserialize_binary_field(istr)
    }

    fn serialize_binary(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
    ) -> Result<()> {
        let settings = FormatSettings::default();
        self.serialize_impl(column, row, ostr, &settings, RowFormat::Binary.serializer())
    }

    fn deserialize_binary(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()> {
        let settings = FormatSettings::default();
        self.deserialize_impl(column, istr, &settings, RowFormat::Binary.deserializer())
    }

    fn serialize_text_escaped(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_impl(column, row, ostr, settings, RowFormat::Escaped.serializer())
    }

    fn deserialize_text_escaped(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_impl(column, istr, settings, RowFormat::Escaped.deserializer())
    }

    fn serialize_text_quoted(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_impl(column, row, ostr, settings, RowFormat::Quoted.serializer())
    }

    fn deserialize_text_quoted(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_impl(column, istr, settings, RowFormat::Quoted.deserializer())
    }

    fn serialize_text_csv(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_impl(column, row, ostr, settings, RowFormat::Csv.serializer())
    }

    fn deserialize_text_csv(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_impl(column, istr, settings, RowFormat::Csv.deserializer())
    }

    fn serialize_text_json(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_impl(column, row, ostr, settings, RowFormat::Json.serializer())
    }

    fn deserialize_text_json(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_impl(column, istr, settings, RowFormat::Json.deserializer())
    }

    fn serialize_text_xml(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_impl(column, row, ostr, settings, RowFormat::Xml.serializer())
    }

    fn serialize_text(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_impl(column, row, ostr, settings, RowFormat::Text.serializer())
    }

    fn serialize_record(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_impl(column, row, ostr, settings, RowFormat::Record.serializer())
    }

    fn deserialize_record(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.deserialize_impl(column, istr, settings, RowFormat::Record.deserializer())
    }

    fn enumerate_streams(
        &self,
        callback: &mut dyn FnMut(&SubstreamPath),
        path: &mut SubstreamPath,
    ) {
        bulk::enumerate_streams(&self.dictionary_type, callback, path)
    }

    fn serialize_bulk_state_prefix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        bulk::serialize_state_prefix(&self.dictionary_type, settings)
    }

    fn serialize_bulk_state_suffix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        bulk::serialize_state_suffix(&self.dictionary_type, settings, state)
    }

    fn deserialize_bulk_state_prefix(
        &self,
        settings: &mut DeserializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        bulk::deserialize_state_prefix(&self.dictionary_type, settings)
    }

    fn serialize_bulk_with_multiple_streams(
        &self,
        column: &Column,
        offset: usize,
        limit: usize,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        let column = self.column(column)?;
        bulk::serialize_chunk(&self.dictionary_type, column, offset, limit, settings, state)
    }

    fn deserialize_bulk_with_multiple_streams(
        &self,
        column: &mut Column,
        limit: usize,
        settings: &mut DeserializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<usize> {
        let column = self.column_mut(column)?;
        bulk::deserialize_chunk(&self.dictionary_type, column, limit, settings, state)
    }
}

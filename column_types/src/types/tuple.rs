use std::any::Any;

use crate::bulk::{
    BulkState, DeserializeBulkSettings, SerializeBulkSettings, Substream, SubstreamPath,
    expect_rows, state_mut,
};
use crate::column::Column;
use crate::data_type::{DataType, DataTypeRef, TypeIndex, TypeNode, TypeTraits};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::format::FormatSettings;
use crate::io::{ReadBuffer, WriteBuffer, WriteBufferExt};
use crate::text::{write_csv_string, write_json_string};

/// A fixed sequence of possibly named elements.
#[derive(Debug, Clone)]
pub struct DataTypeTuple {
    elements: Vec<DataTypeRef>,
    names: Vec<String>,
    explicit_names: bool,
    traits: TypeTraits,
}

/// Bulk states of the elements, in element order.
#[derive(Debug, Default)]
struct TupleBulkState {
    elements: Vec<Option<BulkState>>,
}

impl DataTypeTuple {
    /// A tuple with elements named `1`, `2`, ...
    pub fn new(elements: Vec<DataTypeRef>) -> Result<Self> {
        let names = (1..=elements.len()).map(|i| i.to_string()).collect();
        Self::build(elements, names, false)
    }

    pub fn with_names(elements: Vec<DataTypeRef>, names: Vec<String>) -> Result<Self> {
        Self::build(elements, names, true)
    }

    fn build(elements: Vec<DataTypeRef>, names: Vec<String>, explicit_names: bool) -> Result<Self> {
        let type_name = || {
            let inner: Vec<_> = elements.iter().map(|e| e.name()).collect();
            format!("Tuple({})", inner.join(", "))
        };
        if elements.is_empty() {
            return Err(Error::construction(type_name(), "a tuple needs at least one element"));
        }
        if names.len() != elements.len() {
            return Err(Error::construction(
                type_name(),
                format!("{} names for {} elements", names.len(), elements.len()),
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || names[..i].contains(name) {
                return Err(Error::construction(
                    type_name(),
                    format!("element name '{name}' is empty or duplicated"),
                ));
            }
        }
        Ok(Self::from_parts(elements, names, explicit_names))
    }

    fn from_parts(elements: Vec<DataTypeRef>, names: Vec<String>, explicit_names: bool) -> Self {
        let traits = TypeTraits {
            is_parametric: true,
            have_subtypes: true,
            is_comparable: elements.iter().all(|e| e.is_comparable()),
            text_can_contain_only_valid_utf8: elements
                .iter()
                .all(|e| e.text_can_contain_only_valid_utf8()),
            cannot_be_stored_in_tables: elements.iter().any(|e| e.cannot_be_stored_in_tables()),
            ..TypeTraits::DEFAULT
        };
        Self {
            elements,
            names,
            explicit_names,
            traits,
        }
    }

    /// The same tuple with its elements replaced, one for one.
    pub fn with_elements(&self, elements: Vec<DataTypeRef>) -> Self {
        debug_assert_eq!(elements.len(), self.elements.len());
        Self::from_parts(elements, self.names.clone(), self.explicit_names)
    }

    pub fn elements(&self) -> &[DataTypeRef] {
        &self.elements
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_explicit_names(&self) -> bool {
        self.explicit_names
    }

    fn columns<'a>(&self, column: &'a Column) -> Result<&'a [Column]> {
        match column {
            Column::Tuple(columns) if columns.len() == self.elements.len() => Ok(columns),
            other => Err(Error::type_mismatch(self.name(), other.name())),
        }
    }

    fn columns_mut<'a>(&self, column: &'a mut Column) -> Result<&'a mut [Column]> {
        let name = column.name();
        match column {
            Column::Tuple(columns) if columns.len() == self.elements.len() => Ok(columns),
            _ => Err(Error::type_mismatch(self.name(), name)),
        }
    }

    fn serialize_elements(
        &self,
        column: &Column,
        ostr: &mut dyn WriteBuffer,
        (open, close): (u8, u8),
        mut write: impl FnMut(&dyn DataType, &Column, &mut dyn WriteBuffer) -> Result<()>,
    ) -> Result<()> {
        let columns = self.columns(column)?;
        ostr.write_u8(open)?;
        for (i, (element, column)) in self.elements.iter().zip(columns).enumerate() {
            if i > 0 {
                ostr.write_u8(b',')?;
            }
            write(element.as_ref(), column, ostr)?;
        }
        ostr.write_u8(close)
    }
}

impl DataType for DataTypeTuple {
    fn name(&self) -> String {
        let inner: Vec<_> = self
            .elements
            .iter()
            .zip(&self.names)
            .map(|(element, name)| {
                if self.explicit_names {
                    format!("{name} {}", element.name())
                } else {
                    element.name()
                }
            })
            .collect();
        format!("Tuple({})", inner.join(", "))
    }

    fn family_name(&self) -> &'static str {
        "Tuple"
    }

    fn type_index(&self) -> TypeIndex {
        TypeIndex::Tuple
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn node(&self) -> TypeNode<'_> {
        TypeNode::Tuple {
            elements: &self.elements,
            names: &self.names,
        }
    }

    fn equals(&self, other: &dyn DataType) -> bool {
        let Some(other) = other.downcast_ref::<Self>() else {
            return false;
        };
        self.explicit_names == other.explicit_names
            && (!self.explicit_names || self.names == other.names)
            && self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| a.equals(b.as_ref()))
    }

    fn traits(&self) -> &TypeTraits {
        &self.traits
    }

    fn default_value(&self) -> Field {
        Field::Tuple(self.elements.iter().map(|e| e.default_value()).collect())
    }

    fn create_column(&self) -> Column {
        Column::Tuple(self.elements.iter().map(|e| e.create_column()).collect())
    }

    fn serialize_binary_field(&self, field: &Field, ostr: &mut dyn WriteBuffer) -> Result<()> {
        match field {
            Field::Tuple(items) if items.len() == self.elements.len() => {
                for (element, item) in self.elements.iter().zip(items) {
                    element.serialize_binary_field(item, ostr)?;
                }
                Ok(())
            }
            other => Err(Error::type_mismatch(self.name(), other.kind())),
        }
    }

    fn deserialize_binary_field(&self, istr: &mut dyn ReadBuffer) -> Result<Field> {
        let items = self
            .elements
            .iter()
            .map(|element| element.deserialize_binary_field(istr))
            .collect::<Result<_>>()?;
        Ok(Field::Tuple(items))
    }

    fn serialize_binary(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
    ) -> Result<()> {
        let columns = self.columns(column)?;
        for (element, column) in self.elements.iter().zip(columns) {
            element.serialize_binary(column, row, ostr)?;
        }
        Ok(())
    }

    fn deserialize_binary(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()> {
        let columns = self.columns_mut(column)?;
        for (element, column) in self.elements.iter().zip(columns.iter_mut()) {
            element.deserialize_binary(column, istr)?;
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
        self.serialize_text_quoted(column, row, ostr, settings)
    }

    fn serialize_text_quoted(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        self.serialize_elements(column, ostr, (b'(', b')'), |t, c, o| {
            t.serialize_text_quoted(c, row, o, settings)
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
            .map_err(|e| Error::serialization(format!("non utf-8 tuple text: {e}")))?;
        write_csv_string(ostr, &text)
    }

    /// Named tuples become objects, others arrays.
    fn serialize_text_json(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        if !self.explicit_names {
            return self.serialize_elements(column, ostr, (b'[', b']'), |t, c, o| {
                t.serialize_text_json(c, row, o, settings)
            });
        }
        let columns = self.columns(column)?;
        ostr.write_u8(b'{')?;
        for (i, ((element, name), column)) in
            self.elements.iter().zip(&self.names).zip(columns).enumerate()
        {
            if i > 0 {
                ostr.write_u8(b',')?;
            }
            write_json_string(ostr, name)?;
            ostr.write_u8(b':')?;
            element.serialize_text_json(column, row, ostr, settings)?;
        }
        ostr.write_u8(b'}')
    }

    fn serialize_text_xml(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        let columns = self.columns(column)?;
        ostr.write_str("<tuple>")?;
        for (element, column) in self.elements.iter().zip(columns) {
            ostr.write_str("<elem>")?;
            element.serialize_text_xml(column, row, ostr, settings)?;
            ostr.write_str("</elem>")?;
        }
        ostr.write_str("</tuple>")
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
        for (element, name) in self.elements.iter().zip(&self.names) {
            path.push(Substream::TupleElement(name.clone()));
            element.enumerate_streams(callback, path);
            path.pop();
        }
    }

    fn serialize_bulk_state_prefix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        let mut state = TupleBulkState::default();
        for (element, name) in self.elements.iter().zip(&self.names) {
            state.elements.push(
                settings.with_substream(Substream::TupleElement(name.clone()), |settings| {
                    element.serialize_bulk_state_prefix(settings)
                })?,
            );
        }
        Ok(Some(Box::new(state)))
    }

    fn serialize_bulk_state_suffix(
        &self,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        let state = state_mut::<TupleBulkState>(state)
            .ok_or_else(|| Error::serialization("tuple bulk state missing"))?;
        for ((element, name), element_state) in self
            .elements
            .iter()
            .zip(&self.names)
            .zip(state.elements.iter_mut())
        {
            settings.with_substream(Substream::TupleElement(name.clone()), |settings| {
                element.serialize_bulk_state_suffix(settings, element_state)
            })?;
        }
        Ok(())
    }

    fn deserialize_bulk_state_prefix(
        &self,
        settings: &mut DeserializeBulkSettings<'_>,
    ) -> Result<Option<BulkState>> {
        let mut state = TupleBulkState::default();
        for (element, name) in self.elements.iter().zip(&self.names) {
            state.elements.push(
                settings.with_substream(Substream::TupleElement(name.clone()), |settings| {
                    element.deserialize_bulk_state_prefix(settings)
                })?,
            );
        }
        Ok(Some(Box::new(state)))
    }

    fn serialize_bulk_with_multiple_streams(
        &self,
        column: &Column,
        offset: usize,
        limit: usize,
        settings: &mut SerializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<()> {
        let columns = self.columns(column)?;
        let state = state_mut::<TupleBulkState>(state)
            .ok_or_else(|| Error::serialization("tuple bulk state missing"))?;
        for (((element, name), column), element_state) in self
            .elements
            .iter()
            .zip(&self.names)
            .zip(columns)
            .zip(state.elements.iter_mut())
        {
            settings.with_substream(Substream::TupleElement(name.clone()), |settings| {
                element.serialize_bulk_with_multiple_streams(
                    column,
                    offset,
                    limit,
                    settings,
                    element_state,
                )
            })?;
        }
        Ok(())
    }

    /// The first element decides how many rows are available, the others must match it.
    fn deserialize_bulk_with_multiple_streams(
        &self,
        column: &mut Column,
        limit: usize,
        settings: &mut DeserializeBulkSettings<'_>,
        state: &mut Option<BulkState>,
    ) -> Result<usize> {
        let columns = self.columns_mut(column)?;
        let state = state_mut::<TupleBulkState>(state)
            .ok_or_else(|| Error::corruption("tuple bulk state missing"))?;
        let mut rows = None;
        for (((element, name), column), element_state) in self
            .elements
            .iter()
            .zip(&self.names)
            .zip(columns.iter_mut())
            .zip(state.elements.iter_mut())
        {
            let wanted = rows.unwrap_or(limit);
            if wanted == 0 {
                break;
            }
            let read = settings.with_substream(Substream::TupleElement(name.clone()), |settings| {
                element.deserialize_bulk_with_multiple_streams(
                    column,
                    wanted,
                    settings,
                    element_state,
                )
            })?;
            match rows {
                None => rows = Some(read),
                Some(expected) => expect_rows(name, expected, read)?,
            }
        }
        Ok(rows.unwrap_or(0))
    }
}

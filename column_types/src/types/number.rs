//! Fixed width integer and floating point types.

use std::any::Any;
use std::fmt::{Debug, Display};
use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

use crate::column::Column;
use crate::data_type::{DataType, TypeIndex, TypeTraits, bulk_range_end};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::format::{FormatSettings, record};
use crate::io::{ReadBuffer, ReadBufferExt, WriteBuffer, WriteBufferExt};
use crate::text::{read_csv_string, read_json_string, read_token, write_xml_string};

/// A native value stored in a numeric column.
pub trait NativeNumber:
    Copy + Default + PartialEq + PartialOrd + Debug + Display + Send + Sync + 'static
{
    const TYPE_INDEX: TypeIndex;
    const NAME: &'static str;
    const SIZE: usize;
    const IS_INTEGER: bool;

    fn to_field(self) -> Field;

    fn from_field(field: &Field) -> Result<Self>;

    /// Bit pattern, widened to 64 bits. Equal bit patterns mean equal values, which lets floats
    /// be used as hash keys.
    fn to_bits(self) -> u64;

    fn write_le_into(src: &[Self], dst: &mut [u8]);

    fn read_le_into(src: &[u8], dst: &mut [Self]);

    fn parse_text(text: &str) -> Option<Self>;

    fn format_text(self) -> String {
        self.to_string()
    }

    fn write_record(self, ostr: &mut dyn WriteBuffer) -> Result<()>;

    fn read_record(istr: &mut dyn ReadBuffer) -> Result<Self>;

    fn values(column: &Column) -> Option<&Vec<Self>>;

    fn values_mut(column: &mut Column) -> Option<&mut Vec<Self>>;

    fn into_column(values: Vec<Self>) -> Column;
}

fn out_of_range(name: &str, field: &Field) -> Error {
    Error::type_mismatch(name, format!("{} {field} out of range", field.kind()))
}

fn write_u8_into(src: &[u8], dst: &mut [u8]) {
    dst.copy_from_slice(src)
}

fn read_u8_into(src: &[u8], dst: &mut [u8]) {
    dst.copy_from_slice(src)
}

fn write_i8_into(src: &[i8], dst: &mut [u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = *s as u8;
    }
}

fn read_i8_into(src: &[u8], dst: &mut [i8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = *s as i8;
    }
}

macro_rules! impl_integer {
    ($native:ty, $variant:ident, $signed:literal, $write:path, $read:path) => {
        impl NativeNumber for $native {
            const TYPE_INDEX: TypeIndex = TypeIndex::$variant;
            const NAME: &'static str = stringify!($variant);
            const SIZE: usize = std::mem::size_of::<$native>();
            const IS_INTEGER: bool = true;

            fn to_field(self) -> Field {
                if $signed {
                    Field::Int64(self as i64)
                } else {
                    Field::UInt64(self as u64)
                }
            }

            fn from_field(field: &Field) -> Result<Self> {
                match field {
                    Field::UInt64(v) => Self::try_from(*v).map_err(|_| out_of_range(Self::NAME, field)),
                    Field::Int64(v) => Self::try_from(*v).map_err(|_| out_of_range(Self::NAME, field)),
                    other => Err(Error::type_mismatch(Self::NAME, other.kind())),
                }
            }

            fn to_bits(self) -> u64 {
                self as u64
            }

            fn write_le_into(src: &[Self], dst: &mut [u8]) {
                $write(src, dst)
            }

            fn read_le_into(src: &[u8], dst: &mut [Self]) {
                $read(src, dst)
            }

            fn parse_text(text: &str) -> Option<Self> {
                text.parse().ok()
            }

            fn write_record(self, ostr: &mut dyn WriteBuffer) -> Result<()> {
                record::write_tag(ostr, record::VARINT)?;
                if $signed {
                    ostr.write_var_uint(record::zigzag_encode(self as i64))
                } else {
                    ostr.write_var_uint(self as u64)
                }
            }

            fn read_record(istr: &mut dyn ReadBuffer) -> Result<Self> {
                record::expect_tag(istr, record::VARINT)?;
                let raw = istr.read_var_uint()?;
                let value = if $signed {
                    Self::try_from(record::zigzag_decode(raw)).ok()
                } else {
                    Self::try_from(raw).ok()
                };
                value.ok_or_else(|| {
                    Error::corruption(format!("record value {raw} out of range for {}", Self::NAME))
                })
            }

            fn values(column: &Column) -> Option<&Vec<Self>> {
                match column {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn values_mut(column: &mut Column) -> Option<&mut Vec<Self>> {
                match column {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_column(values: Vec<Self>) -> Column {
                Column::$variant(values)
            }
        }
    };
}

impl_integer!(u8, UInt8, false, write_u8_into, read_u8_into);
impl_integer!(u16, UInt16, false, LittleEndian::write_u16_into, LittleEndian::read_u16_into);
impl_integer!(u32, UInt32, false, LittleEndian::write_u32_into, LittleEndian::read_u32_into);
impl_integer!(u64, UInt64, false, LittleEndian::write_u64_into, LittleEndian::read_u64_into);
impl_integer!(i8, Int8, true, write_i8_into, read_i8_into);
impl_integer!(i16, Int16, true, LittleEndian::write_i16_into, LittleEndian::read_i16_into);
impl_integer!(i32, Int32, true, LittleEndian::write_i32_into, LittleEndian::read_i32_into);
impl_integer!(i64, Int64, true, LittleEndian::write_i64_into, LittleEndian::read_i64_into);

macro_rules! impl_float {
    ($native:ty, $variant:ident, $wire:path, $write:path, $read:path) => {
        impl NativeNumber for $native {
            const TYPE_INDEX: TypeIndex = TypeIndex::$variant;
            const NAME: &'static str = stringify!($variant);
            const SIZE: usize = std::mem::size_of::<$native>();
            const IS_INTEGER: bool = false;

            fn to_field(self) -> Field {
                Field::Float64(self as f64)
            }

            fn from_field(field: &Field) -> Result<Self> {
                match field {
                    Field::Float64(v) => Ok(*v as Self),
                    Field::UInt64(v) => Ok(*v as Self),
                    Field::Int64(v) => Ok(*v as Self),
                    other => Err(Error::type_mismatch(Self::NAME, other.kind())),
                }
            }

            fn to_bits(self) -> u64 {
                <$native>::to_bits(self).into()
            }

            fn write_le_into(src: &[Self], dst: &mut [u8]) {
                $write(src, dst)
            }

            fn read_le_into(src: &[u8], dst: &mut [Self]) {
                $read(src, dst)
            }

            fn parse_text(text: &str) -> Option<Self> {
                text.parse().ok()
            }

            fn format_text(self) -> String {
                if self.is_nan() {
                    "nan".to_string()
                } else if self == <$native>::INFINITY {
                    "inf".to_string()
                } else if self == <$native>::NEG_INFINITY {
                    "-inf".to_string()
                } else {
                    self.to_string()
                }
            }

            fn write_record(self, ostr: &mut dyn WriteBuffer) -> Result<()> {
                record::write_tag(ostr, $wire)?;
                ostr.write_bytes(&self.to_le_bytes())
            }

            fn read_record(istr: &mut dyn ReadBuffer) -> Result<Self> {
                record::expect_tag(istr, $wire)?;
                let mut buf = [0_u8; std::mem::size_of::<$native>()];
                istr.read_exact(&mut buf)?;
                Ok(Self::from_le_bytes(buf))
            }

            fn values(column: &Column) -> Option<&Vec<Self>> {
                match column {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn values_mut(column: &mut Column) -> Option<&mut Vec<Self>> {
                match column {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_column(values: Vec<Self>) -> Column {
                Column::$variant(values)
            }
        }
    };
}

impl_float!(f32, Float32, record::FIXED32, LittleEndian::write_f32_into, LittleEndian::read_f32_into);
impl_float!(f64, Float64, record::FIXED64, LittleEndian::write_f64_into, LittleEndian::read_f64_into);

const fn number_traits(size: usize, is_integer: bool) -> TypeTraits {
    TypeTraits {
        should_align_right_in_pretty_formats: true,
        text_can_contain_only_valid_utf8: true,
        is_comparable: true,
        can_be_used_as_version: is_integer,
        is_summable: true,
        can_be_used_in_bit_operations: is_integer,
        can_be_used_in_boolean_context: true,
        is_value_represented_by_number: true,
        is_value_represented_by_integer: is_integer,
        is_value_unambiguously_represented_in_contiguous_memory_region: true,
        maximum_size_of_value_in_memory: Some(size),
        size_of_value_in_memory: Some(size),
        is_categorial: is_integer,
        can_be_inside_nullable: true,
        ..TypeTraits::DEFAULT
    }
}

/// A fixed width numeric type, see the aliases below.
#[derive(Debug, Clone, Copy)]
pub struct DataTypeNumber<T> {
    traits: TypeTraits,
    _marker: PhantomData<T>,
}

pub type DataTypeUInt8 = DataTypeNumber<u8>;
pub type DataTypeUInt16 = DataTypeNumber<u16>;
pub type DataTypeUInt32 = DataTypeNumber<u32>;
pub type DataTypeUInt64 = DataTypeNumber<u64>;
pub type DataTypeInt8 = DataTypeNumber<i8>;
pub type DataTypeInt16 = DataTypeNumber<i16>;
pub type DataTypeInt32 = DataTypeNumber<i32>;
pub type DataTypeInt64 = DataTypeNumber<i64>;
pub type DataTypeFloat32 = DataTypeNumber<f32>;
pub type DataTypeFloat64 = DataTypeNumber<f64>;

impl<T: NativeNumber> DataTypeNumber<T> {
    pub fn new() -> Self {
        Self {
            traits: number_traits(T::SIZE, T::IS_INTEGER),
            _marker: PhantomData,
        }
    }

    fn value(&self, column: &Column, row: usize) -> Result<T> {
        let values = T::values(column)
            .ok_or_else(|| Error::type_mismatch(T::NAME, column.name()))?;
        values.get(row).copied().ok_or_else(|| {
            Error::serialization(format!("row {row} out of bounds for {} rows", values.len()))
        })
    }

    fn values_mut<'a>(&self, column: &'a mut Column) -> Result<&'a mut Vec<T>> {
        let name = column.name();
        T::values_mut(column).ok_or_else(|| Error::type_mismatch(T::NAME, name))
    }

    fn parse(&self, token: &str) -> Result<T> {
        T::parse_text(token)
            .ok_or_else(|| Error::corruption(format!("cannot parse '{token}' as {}", T::NAME)))
    }

    fn write_plain(&self, column: &Column, row: usize, ostr: &mut dyn WriteBuffer) -> Result<()> {
        ostr.write_str(&self.value(column, row)?.format_text())
    }

    fn read_plain(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()> {
        let value = self.parse(&read_token(istr)?)?;
        self.values_mut(column)?.push(value);
        Ok(())
    }

    fn quote_in_json(&self, value: T, settings: &FormatSettings) -> bool {
        if T::IS_INTEGER {
            settings.json_quote_64bit_integers && T::SIZE == 8
        } else {
            matches!(value.format_text().as_str(), "nan" | "inf" | "-inf")
        }
    }
}

impl<T: NativeNumber> Default for DataTypeNumber<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NativeNumber> DataType for DataTypeNumber<T> {
    fn name(&self) -> String {
        T::NAME.to_string()
    }

    fn family_name(&self) -> &'static str {
        T::NAME
    }

    fn type_index(&self) -> TypeIndex {
        T::TYPE_INDEX
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn DataType) -> bool {
        other.type_index() == T::TYPE_INDEX
    }

    fn traits(&self) -> &TypeTraits {
        &self.traits
    }

    fn default_value(&self) -> Field {
        T::default().to_field()
    }

    fn create_column(&self) -> Column {
        T::into_column(Vec::new())
    }

    fn serialize_binary_field(&self, field: &Field, ostr: &mut dyn WriteBuffer) -> Result<()> {
        let value = T::from_field(field)?;
        let mut buf = [0_u8; 8];
        T::write_le_into(&[value], &mut buf[..T::SIZE]);
        ostr.write_bytes(&buf[..T::SIZE])
    }

    fn deserialize_binary_field(&self, istr: &mut dyn ReadBuffer) -> Result<Field> {
        let mut buf = [0_u8; 8];
        istr.read_exact(&mut buf[..T::SIZE])?;
        let mut value = [T::default()];
        T::read_le_into(&buf[..T::SIZE], &mut value);
        Ok(value[0].to_field())
    }

    fn serialize_binary(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
    ) -> Result<()> {
        let mut buf = [0_u8; 8];
        T::write_le_into(&[self.value(column, row)?], &mut buf[..T::SIZE]);
        ostr.write_bytes(&buf[..T::SIZE])
    }

    fn deserialize_binary(&self, column: &mut Column, istr: &mut dyn ReadBuffer) -> Result<()> {
        let mut buf = [0_u8; 8];
        istr.read_exact(&mut buf[..T::SIZE])?;
        let mut value = [T::default()];
        T::read_le_into(&buf[..T::SIZE], &mut value);
        self.values_mut(column)?.push(value[0]);
        Ok(())
    }

    fn serialize_text_escaped(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        self.write_plain(column, row, ostr)
    }

    fn deserialize_text_escaped(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        self.read_plain(column, istr)
    }

    fn serialize_text_quoted(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        self.write_plain(column, row, ostr)
    }

    fn deserialize_text_quoted(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        self.read_plain(column, istr)
    }

    fn serialize_text_csv(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        self.write_plain(column, row, ostr)
    }

    fn deserialize_text_csv(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        let token = read_csv_string(istr, settings.csv_delimiter)?;
        let value = self.parse(token.trim())?;
        self.values_mut(column)?.push(value);
        Ok(())
    }

    fn serialize_text_json(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        let value = self.value(column, row)?;
        if self.quote_in_json(value, settings) {
            ostr.write_u8(b'"')?;
            ostr.write_str(&value.format_text())?;
            ostr.write_u8(b'"')
        } else {
            ostr.write_str(&value.format_text())
        }
    }

    fn deserialize_text_json(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        let token = match istr.peek_byte() {
            Some(b'"') => read_json_string(istr)?,
            _ => read_token(istr)?,
        };
        let value = self.parse(&token)?;
        self.values_mut(column)?.push(value);
        Ok(())
    }

    fn serialize_text_xml(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        write_xml_string(ostr, &self.value(column, row)?.format_text())
    }

    fn serialize_text(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        self.write_plain(column, row, ostr)
    }

    fn serialize_record(
        &self,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        self.value(column, row)?.write_record(ostr)
    }

    fn deserialize_record(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        _settings: &FormatSettings,
    ) -> Result<()> {
        let value = T::read_record(istr)?;
        self.values_mut(column)?.push(value);
        Ok(())
    }

    fn serialize_bulk(
        &self,
        column: &Column,
        ostr: &mut dyn WriteBuffer,
        offset: usize,
        limit: usize,
    ) -> Result<()> {
        let values = T::values(column)
            .ok_or_else(|| Error::type_mismatch(T::NAME, column.name()))?;
        let end = bulk_range_end(values.len(), offset, limit)?;
        let mut buf = vec![0_u8; (end - offset) * T::SIZE];
        T::write_le_into(&values[offset..end], &mut buf);
        ostr.write_bytes(&buf)
    }

    fn deserialize_bulk(
        &self,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        limit: usize,
    ) -> Result<usize> {
        let values = self.values_mut(column)?;
        let mut buf = [0_u8; 8];
        let mut value = [T::default()];
        let mut rows = 0;
        while rows < limit && !istr.eof() {
            istr.read_exact(&mut buf[..T::SIZE])?;
            T::read_le_into(&buf[..T::SIZE], &mut value);
            values.push(value[0]);
            rows += 1;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::format::RowFormat;

    fn render(data_type: &dyn DataType, column: &Column, format: RowFormat) -> String {
        let mut buf = Vec::new();
        format
            .serialize(data_type, column, 0, &mut buf, &FormatSettings::default())
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn binary_is_little_endian() {
        let data_type = DataTypeUInt32::new();
        let column = Column::UInt32(vec![0x0102_0304]);
        let mut buf = Vec::new();
        data_type.serialize_binary(&column, 0, &mut buf).unwrap();
        assert_eq!(buf, [4, 3, 2, 1]);

        let mut out = data_type.create_column();
        data_type
            .deserialize_binary(&mut out, &mut Bytes::from(buf))
            .unwrap();
        assert_eq!(out.to_fields(), vec![Field::UInt64(0x0102_0304)]);
    }

    #[test]
    fn text_formats() {
        let data_type = DataTypeInt64::new();
        let column = Column::Int64(vec![-42]);
        assert_eq!(render(&data_type, &column, RowFormat::Escaped), "-42");
        assert_eq!(render(&data_type, &column, RowFormat::Json), "\"-42\"");
        assert_eq!(render(&data_type, &column, RowFormat::Xml), "-42");

        let data_type = DataTypeFloat64::new();
        let column = Column::Float64(vec![f64::NAN]);
        assert_eq!(render(&data_type, &column, RowFormat::Text), "nan");
        assert_eq!(render(&data_type, &column, RowFormat::Json), "\"nan\"");
    }

    #[test]
    fn parse_json() {
        let data_type = DataTypeUInt8::new();
        let mut column = data_type.create_column();
        let settings = FormatSettings::default();
        data_type
            .deserialize_text_json(&mut column, &mut Bytes::from_static(b"\"7\""), &settings)
            .unwrap();
        data_type
            .deserialize_text_json(&mut column, &mut Bytes::from_static(b"8"), &settings)
            .unwrap();
        let err = data_type
            .deserialize_text_json(&mut column, &mut Bytes::from_static(b"300"), &settings)
            .unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(column, Column::UInt8(vec![7, 8]));
    }

    #[test]
    fn record_zigzag() {
        let data_type = DataTypeInt16::new();
        let column = Column::Int16(vec![-1]);
        let mut buf = Vec::new();
        data_type
            .serialize_record(&column, 0, &mut buf, &FormatSettings::default())
            .unwrap();
        assert_eq!(buf, [record::VARINT, 1]);
    }

    #[test]
    fn field_range() {
        assert!(u8::from_field(&Field::UInt64(256)).is_err());
        assert_eq!(i8::from_field(&Field::Int64(-128)).unwrap(), -128);
        assert!(u8::from_field(&Field::from("1")).is_err());
    }

    #[test]
    fn bulk_truncated_value() {
        let data_type = DataTypeUInt16::new();
        let mut column = data_type.create_column();
        let err = data_type
            .deserialize_bulk(&mut column, &mut Bytes::from_static(&[1, 0, 2]), 10)
            .unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(column, Column::UInt16(vec![1]));
    }
}

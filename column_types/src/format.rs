//! Row formats and the settings that tune them.

use crate::column::Column;
use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::io::{ReadBuffer, ReadBufferExt, WriteBuffer, WriteBufferExt};

/// Settings shared by the text row formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSettings {
    /// Field delimiter for CSV.
    pub csv_delimiter: u8,
    /// Write 64 bit integers as JSON strings so that JavaScript readers keep every digit.
    pub json_quote_64bit_integers: bool,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            csv_delimiter: b',',
            json_quote_64bit_integers: true,
        }
    }
}

/// Writes one row of `column` in a row format.
pub type SerializeRowFn = fn(
    &dyn DataType,
    &Column,
    usize,
    &mut dyn WriteBuffer,
    &FormatSettings,
) -> Result<()>;

/// Reads one value in a row format and appends it to `column`.
pub type DeserializeRowFn =
    fn(&dyn DataType, &mut Column, &mut dyn ReadBuffer, &FormatSettings) -> Result<()>;

/// The row level encodings a [`DataType`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowFormat {
    Binary,
    /// Tab separated, with backslash escapes.
    Escaped,
    /// SQL literal syntax.
    Quoted,
    Csv,
    Json,
    /// Output only.
    Xml,
    /// Tagged structured record encoding.
    Record,
    /// Output only, for human readers.
    Text,
}

impl RowFormat {
    pub const ALL: [Self; 8] = [
        Self::Binary,
        Self::Escaped,
        Self::Quoted,
        Self::Csv,
        Self::Json,
        Self::Xml,
        Self::Record,
        Self::Text,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Binary => "RowBinary",
            Self::Escaped => "TSV",
            Self::Quoted => "Values",
            Self::Csv => "CSV",
            Self::Json => "JSON",
            Self::Xml => "XML",
            Self::Record => "Record",
            Self::Text => "Pretty",
        }
    }

    /// False for formats that are only ever written.
    pub fn is_readable(self) -> bool {
        !matches!(self, Self::Xml | Self::Text)
    }

    pub fn serializer(self) -> SerializeRowFn {
        match self {
            Self::Binary => serialize_binary,
            Self::Escaped => serialize_escaped,
            Self::Quoted => serialize_quoted,
            Self::Csv => serialize_csv,
            Self::Json => serialize_json,
            Self::Xml => serialize_xml,
            Self::Record => serialize_record,
            Self::Text => serialize_text,
        }
    }

    pub fn deserializer(self) -> DeserializeRowFn {
        match self {
            Self::Binary => deserialize_binary,
            Self::Escaped => deserialize_escaped,
            Self::Quoted => deserialize_quoted,
            Self::Csv => deserialize_csv,
            Self::Json => deserialize_json,
            Self::Xml => deserialize_xml,
            Self::Record => deserialize_record,
            Self::Text => deserialize_text,
        }
    }

    pub fn serialize(
        self,
        data_type: &dyn DataType,
        column: &Column,
        row: usize,
        ostr: &mut dyn WriteBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        (self.serializer())(data_type, column, row, ostr, settings)
    }

    pub fn deserialize(
        self,
        data_type: &dyn DataType,
        column: &mut Column,
        istr: &mut dyn ReadBuffer,
        settings: &FormatSettings,
    ) -> Result<()> {
        (self.deserializer())(data_type, column, istr, settings)
    }
}

fn serialize_binary(
    data_type: &dyn DataType,
    column: &Column,
    row: usize,
    ostr: &mut dyn WriteBuffer,
    _settings: &FormatSettings,
) -> Result<()> {
    data_type.serialize_binary(column, row, ostr)
}

fn serialize_escaped(
    data_type: &dyn DataType,
    column: &Column,
    row: usize,
    ostr: &mut dyn WriteBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.serialize_text_escaped(column, row, ostr, settings)
}

fn serialize_quoted(
    data_type: &dyn DataType,
    column: &Column,
    row: usize,
    ostr: &mut dyn WriteBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.serialize_text_quoted(column, row, ostr, settings)
}

fn serialize_csv(
    data_type: &dyn DataType,
    column: &Column,
    row: usize,
    ostr: &mut dyn WriteBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.serialize_text_csv(column, row, ostr, settings)
}

fn serialize_json(
    data_type: &dyn DataType,
    column: &Column,
    row: usize,
    ostr: &mut dyn WriteBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.serialize_text_json(column, row, ostr, settings)
}

fn serialize_xml(
    data_type: &dyn DataType,
    column: &Column,
    row: usize,
    ostr: &mut dyn WriteBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.serialize_text_xml(column, row, ostr, settings)
}

fn serialize_record(
    data_type: &dyn DataType,
    column: &Column,
    row: usize,
    ostr: &mut dyn WriteBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.serialize_record(column, row, ostr, settings)
}

fn serialize_text(
    data_type: &dyn DataType,
    column: &Column,
    row: usize,
    ostr: &mut dyn WriteBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.serialize_text(column, row, ostr, settings)
}

fn deserialize_binary(
    data_type: &dyn DataType,
    column: &mut Column,
    istr: &mut dyn ReadBuffer,
    _settings: &FormatSettings,
) -> Result<()> {
    data_type.deserialize_binary(column, istr)
}

fn deserialize_escaped(
    data_type: &dyn DataType,
    column: &mut Column,
    istr: &mut dyn ReadBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.deserialize_text_escaped(column, istr, settings)
}

fn deserialize_quoted(
    data_type: &dyn DataType,
    column: &mut Column,
    istr: &mut dyn ReadBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.deserialize_text_quoted(column, istr, settings)
}

fn deserialize_csv(
    data_type: &dyn DataType,
    column: &mut Column,
    istr: &mut dyn ReadBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.deserialize_text_csv(column, istr, settings)
}

fn deserialize_json(
    data_type: &dyn DataType,
    column: &mut Column,
    istr: &mut dyn ReadBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.deserialize_text_json(column, istr, settings)
}

fn deserialize_xml(
    data_type: &dyn DataType,
    _column: &mut Column,
    _istr: &mut dyn ReadBuffer,
    _settings: &FormatSettings,
) -> Result<()> {
    Err(Error::unsupported_format(
        data_type.name(),
        RowFormat::Xml.name(),
    ))
}

fn deserialize_record(
    data_type: &dyn DataType,
    column: &mut Column,
    istr: &mut dyn ReadBuffer,
    settings: &FormatSettings,
) -> Result<()> {
    data_type.deserialize_record(column, istr, settings)
}

fn deserialize_text(
    data_type: &dyn DataType,
    _column: &mut Column,
    _istr: &mut dyn ReadBuffer,
    _settings: &FormatSettings,
) -> Result<()> {
    Err(Error::unsupported_format(
        data_type.name(),
        RowFormat::Text.name(),
    ))
}

/// Wire types of the [`RowFormat::Record`] encoding. Every value is prefixed by one tag byte.
pub mod record {
    use super::*;

    pub const VARINT: u8 = 0;
    pub const FIXED64: u8 = 1;
    pub const LENGTH_DELIMITED: u8 = 2;
    pub const FIXED32: u8 = 5;
    pub const NULL: u8 = 6;

    pub fn write_tag(ostr: &mut dyn WriteBuffer, wire_type: u8) -> Result<()> {
        ostr.write_u8(wire_type)
    }

    pub fn expect_tag(istr: &mut dyn ReadBuffer, wire_type: u8) -> Result<()> {
        let tag = istr.read_u8()?;
        if tag != wire_type {
            return Err(Error::corruption(format!(
                "record wire type {tag} where {wire_type} was expected"
            )));
        }
        Ok(())
    }

    pub fn zigzag_encode(v: i64) -> u64 {
        ((v << 1) ^ (v >> 63)) as u64
    }

    pub fn zigzag_decode(v: u64) -> i64 {
        ((v >> 1) as i64) ^ -((v & 1) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::record::*;
    use super::*;

    #[test]
    fn zigzag() {
        for v in [0_i64, -1, 1, -64, 63, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
    }

    #[test]
    fn readable_formats() {
        let readable: Vec<_> = RowFormat::ALL
            .into_iter()
            .filter(|f| f.is_readable())
            .map(RowFormat::name)
            .collect();
        assert_eq!(readable, ["RowBinary", "TSV", "Values", "CSV", "JSON", "Record"]);
    }
}

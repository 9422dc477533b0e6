//! The multi-stream bulk protocol.
//!
//! A column is written as a set of named sub-streams, one per [`SubstreamPath`] reported by
//! [`DataType::enumerate_streams`]. Types that carry state across the chunks of one write (or
//! read) session create it in the state prefix and receive it back on every call, see
//! [`BulkWriter`] and [`BulkReader`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Deref;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::column::Column;
use crate::data_type::{DataType, DataTypeRef};
use crate::error::{Error, Result};
use crate::io::{ReadBuffer, WriteBuffer};

/// One step of a path into a nested type's streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Substream {
    ArrayElements,
    ArraySizes,
    NullableElements,
    NullMap,
    TupleElement(String),
    DictionaryKeys,
    DictionaryIndexes,
}

/// Identifies one sub-stream of a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubstreamPath(Vec<Substream>);

impl SubstreamPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, substream: Substream) {
        self.0.push(substream)
    }

    pub fn pop(&mut self) -> Option<Substream> {
        self.0.pop()
    }

    /// File style stream name, e.g. `tags.size0`, `tags.dict` or `tags.null`.
    pub fn stream_name(&self, column_name: &str) -> String {
        let mut name = column_name.to_string();
        let mut array_level = 0;
        for substream in &self.0 {
            match substream {
                Substream::NullMap => name.push_str(".null"),
                Substream::ArraySizes => name.push_str(&format!(".size{array_level}")),
                Substream::ArrayElements => array_level += 1,
                Substream::TupleElement(element) => {
                    name.push('.');
                    name.push_str(element);
                }
                Substream::DictionaryKeys => name.push_str(".dict"),
                Substream::NullableElements | Substream::DictionaryIndexes => {}
            }
        }
        name
    }
}

impl Deref for SubstreamPath {
    type Target = [Substream];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<Substream> for SubstreamPath {
    fn from_iter<T: IntoIterator<Item = Substream>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resolves sub-stream paths to sinks. A missing stream means the caller is not interested in
/// that part of the column and it is skipped.
pub trait OutputStreams: Debug {
    fn output(&mut self, path: &SubstreamPath) -> Option<&mut dyn WriteBuffer>;
}

/// Resolves sub-stream paths to sources.
pub trait InputStreams: Debug {
    fn input(&mut self, path: &SubstreamPath) -> Option<&mut dyn ReadBuffer>;
}

/// Which chunks of a write session share one dictionary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DictionaryScope {
    /// Keys accumulate across chunks until the dictionary reaches its maximum size.
    #[default]
    Session,
    /// Every chunk carries its own dictionary.
    Chunk,
}

/// Tuning for dictionary encoded bulk writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowCardinalitySettings {
    pub dictionary_scope: DictionaryScope,
    /// Start a new dictionary once a session dictionary holds this many keys. Zero disables
    /// the limit.
    pub max_dictionary_size: u64,
    /// Never reset the session dictionary, regardless of its size.
    pub use_single_dictionary_for_part: bool,
}

impl Default for LowCardinalitySettings {
    fn default() -> Self {
        Self {
            dictionary_scope: DictionaryScope::Session,
            max_dictionary_size: 8192,
            use_single_dictionary_for_part: false,
        }
    }
}

/// Per-type state carried across the calls of one bulk session.
pub type BulkState = Box<dyn Any + Send>;

/// Borrow the concrete state a type stored in its prefix.
pub fn state_mut<T: 'static>(state: &mut Option<BulkState>) -> Option<&mut T> {
    state.as_mut()?.downcast_mut::<T>()
}

#[derive(Debug)]
pub struct SerializeBulkSettings<'a> {
    pub streams: &'a mut dyn OutputStreams,
    pub path: SubstreamPath,
    pub low_cardinality: LowCardinalitySettings,
}

impl<'a> SerializeBulkSettings<'a> {
    pub fn new(streams: &'a mut dyn OutputStreams) -> Self {
        Self {
            streams,
            path: SubstreamPath::new(),
            low_cardinality: LowCardinalitySettings::default(),
        }
    }

    pub fn with_low_cardinality(mut self, low_cardinality: LowCardinalitySettings) -> Self {
        self.low_cardinality = low_cardinality;
        self
    }

    /// The sink for the current path, if the caller wants it.
    pub fn output(&mut self) -> Option<&mut dyn WriteBuffer> {
        self.streams.output(&self.path)
    }

    /// Run `f` with `substream` appended to the current path.
    pub fn with_substream<T>(
        &mut self,
        substream: Substream,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.path.push(substream);
        let result = f(self);
        self.path.pop();
        result
    }
}

#[derive(Debug)]
pub struct DeserializeBulkSettings<'a> {
    pub streams: &'a mut dyn InputStreams,
    pub path: SubstreamPath,
}

impl<'a> DeserializeBulkSettings<'a> {
    pub fn new(streams: &'a mut dyn InputStreams) -> Self {
        Self {
            streams,
            path: SubstreamPath::new(),
        }
    }

    /// The source for the current path, if present.
    pub fn input(&mut self) -> Option<&mut dyn ReadBuffer> {
        self.streams.input(&self.path)
    }

    /// Run `f` with `substream` appended to the current path.
    pub fn with_substream<T>(
        &mut self,
        substream: Substream,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.path.push(substream);
        let result = f(self);
        self.path.pop();
        result
    }
}

/// In-memory sub-streams of one column, keyed by stream name.
#[derive(Debug, Default)]
pub struct MemoryStreams {
    column_name: String,
    streams: BTreeMap<String, BytesMut>,
}

impl MemoryStreams {
    /// Declare every stream `data_type` writes.
    pub fn for_type(data_type: &dyn DataType, column_name: impl Into<String>) -> Self {
        let column_name = column_name.into();
        let mut streams = BTreeMap::new();
        data_type.enumerate_streams(
            &mut |path: &SubstreamPath| {
                streams.insert(path.stream_name(&column_name), BytesMut::new());
            },
            &mut SubstreamPath::new(),
        );
        debug!(
            column = %column_name,
            data_type = %data_type.name(),
            streams = streams.len(),
            "declared column streams"
        );
        Self {
            column_name,
            streams,
        }
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn get(&self, stream_name: &str) -> Option<&[u8]> {
        self.streams.get(stream_name).map(|b| &b[..])
    }

    /// Freeze the written bytes for reading.
    pub fn into_input(self) -> MemoryInputStreams {
        MemoryInputStreams {
            column_name: self.column_name,
            streams: self
                .streams
                .into_iter()
                .map(|(name, buf)| (name, buf.freeze()))
                .collect(),
        }
    }
}

impl OutputStreams for MemoryStreams {
    fn output(&mut self, path: &SubstreamPath) -> Option<&mut dyn WriteBuffer> {
        let name = path.stream_name(&self.column_name);
        self.streams
            .get_mut(&name)
            .map(|buf| buf as &mut dyn WriteBuffer)
    }
}

#[derive(Debug, Default)]
pub struct MemoryInputStreams {
    column_name: String,
    streams: BTreeMap<String, Bytes>,
}

impl MemoryInputStreams {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            streams: BTreeMap::new(),
        }
    }

    /// Add or replace a stream.
    pub fn insert(&mut self, stream_name: impl Into<String>, data: impl Into<Bytes>) {
        self.streams.insert(stream_name.into(), data.into());
    }

    /// Bytes not yet consumed from a stream.
    pub fn remaining(&self, stream_name: &str) -> Option<usize> {
        self.streams.get(stream_name).map(Bytes::len)
    }
}

impl InputStreams for MemoryInputStreams {
    fn input(&mut self, path: &SubstreamPath) -> Option<&mut dyn ReadBuffer> {
        let name = path.stream_name(&self.column_name);
        self.streams
            .get_mut(&name)
            .map(|buf| buf as &mut dyn ReadBuffer)
    }
}

/// A bulk write session: state prefix, any number of chunks, state suffix.
///
/// Finishing consumes the writer so no chunk can follow the suffix.
#[derive(Debug)]
pub struct BulkWriter {
    data_type: DataTypeRef,
    state: Option<BulkState>,
    rows: usize,
}

impl BulkWriter {
    pub fn start(data_type: DataTypeRef, settings: &mut SerializeBulkSettings<'_>) -> Result<Self> {
        let state = data_type.serialize_bulk_state_prefix(settings)?;
        Ok(Self {
            data_type,
            state,
            rows: 0,
        })
    }

    /// Write rows `[offset, offset + limit)`, zero `limit` meaning to the end of `column`.
    pub fn write(
        &mut self,
        column: &Column,
        offset: usize,
        limit: usize,
        settings: &mut SerializeBulkSettings<'_>,
    ) -> Result<()> {
        self.data_type.serialize_bulk_with_multiple_streams(
            column,
            offset,
            limit,
            settings,
            &mut self.state,
        )?;
        let end = crate::data_type::bulk_range_end(column.len(), offset, limit)?;
        self.rows += end - offset;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self, settings: &mut SerializeBulkSettings<'_>) -> Result<()> {
        self.data_type
            .serialize_bulk_state_suffix(settings, &mut self.state)?;
        debug!(
            data_type = %self.data_type.name(),
            rows = self.rows,
            "finished bulk write"
        );
        Ok(())
    }
}

/// A bulk read session.
#[derive(Debug)]
pub struct BulkReader {
    data_type: DataTypeRef,
    state: Option<BulkState>,
}

impl BulkReader {
    pub fn start(
        data_type: DataTypeRef,
        settings: &mut DeserializeBulkSettings<'_>,
    ) -> Result<Self> {
        let state = data_type.deserialize_bulk_state_prefix(settings)?;
        Ok(Self { data_type, state })
    }

    /// Append up to `limit` rows to `column`, returning how many were read. Fewer than `limit`
    /// means the streams are exhausted.
    pub fn read(
        &mut self,
        column: &mut Column,
        limit: usize,
        settings: &mut DeserializeBulkSettings<'_>,
    ) -> Result<usize> {
        self.data_type
            .deserialize_bulk_with_multiple_streams(column, limit, settings, &mut self.state)
    }

    /// Read everything left in the streams into a new column.
    pub fn read_to_end(&mut self, settings: &mut DeserializeBulkSettings<'_>) -> Result<Column> {
        const BATCH: usize = 8192;

        let mut column = self.data_type.create_column();
        while self.read(&mut column, BATCH, settings)? == BATCH {}
        Ok(column)
    }
}

/// Fail with a corruption error when a nested read produced a different number of rows than
/// its sizes stream promised.
pub fn expect_rows(stream: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::corruption(format!(
            "{stream}: expected {expected} rows, read {actual}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_names() {
        let path: SubstreamPath = [
            Substream::ArrayElements,
            Substream::TupleElement("keys".into()),
            Substream::ArraySizes,
        ]
        .into_iter()
        .collect();
        assert_eq!(path.stream_name("m"), "m.keys.size1");

        let path: SubstreamPath = [Substream::DictionaryKeys, Substream::NullMap]
            .into_iter()
            .collect();
        assert_eq!(path.stream_name("c"), "c.dict.null");

        let path: SubstreamPath = [Substream::DictionaryIndexes].into_iter().collect();
        assert_eq!(path.stream_name("c"), "c");
    }

    #[test]
    fn missing_state() {
        let mut state: Option<BulkState> = Some(Box::new(1_u32));
        assert_eq!(state_mut::<u32>(&mut state).copied(), Some(1));
        assert!(state_mut::<u64>(&mut state).is_none());
        assert!(state_mut::<u32>(&mut None).is_none());
    }
}

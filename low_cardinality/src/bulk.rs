//! Multi-stream bulk encoding of dictionary encoded columns.
//!
//! A column is written as two groups of streams:
//!
//! * the index stream, at the column path, holding a version header once per session followed by
//!   one granule per written chunk;
//! * the keys streams, below [`Substream::DictionaryKeys`], holding dictionary entries in the
//!   dictionary type's own bulk layout.
//!
//! A granule is
//!
//! ```text
//! u64 flags | [u64 new_keys] | u64 num_rows | num_rows indices
//! ```
//!
//! where the low byte of `flags` selects the index width, [`HAS_DICTIONARY_UPDATE`] announces
//! `new_keys` entries appended to the keys streams and [`RESET_DICTIONARY`] clears the
//! dictionary before they are applied. All integers are little endian.

use byteorder::{ByteOrder, LittleEndian};
use column_types::bulk::{
    BulkState, DeserializeBulkSettings, DictionaryScope, LowCardinalitySettings,
    SerializeBulkSettings, Substream, SubstreamPath, expect_rows, state_mut,
};
use column_types::column::{ColumnLowCardinality, ColumnUnique};
use column_types::data_type::bulk_range_end;
use column_types::io::{ReadBuffer, ReadBufferExt, WriteBuffer, WriteBufferExt};
use column_types::{Column, DataTypeRef, Error, Result};
use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::unique::create_column_unique;

/// Keys version: one dictionary shared by the granules of a session, extended by updates.
pub const KEYS_VERSION_SHARED_WITH_UPDATES: u64 = 1;

/// Bits of the granule flags holding the [`IndexWidth`] code.
pub const INDEX_WIDTH_MASK: u64 = 0xff;
/// Set when the granule header carries a count of keys appended to the keys streams.
pub const HAS_DICTIONARY_UPDATE: u64 = 1 << 9;
/// Set when the reader must clear its dictionary before applying the granule.
pub const RESET_DICTIONARY: u64 = 1 << 10;

const KNOWN_FLAGS: u64 = INDEX_WIDTH_MASK | HAS_DICTIONARY_UPDATE | RESET_DICTIONARY;

/// Byte width of the indices of one granule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
    U64,
}

impl IndexWidth {
    /// The narrowest width addressing every entry of a dictionary of `len` keys.
    pub fn for_dictionary_len(len: usize) -> Self {
        let max = len.saturating_sub(1) as u64;
        if max <= u8::MAX as u64 {
            Self::U8
        } else if max <= u16::MAX as u64 {
            Self::U16
        } else if max <= u32::MAX as u64 {
            Self::U32
        } else {
            Self::U64
        }
    }

    fn code(self) -> u64 {
        match self {
            Self::U8 => 0,
            Self::U16 => 1,
            Self::U32 => 2,
            Self::U64 => 3,
        }
    }

    fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(Self::U8),
            1 => Ok(Self::U16),
            2 => Ok(Self::U32),
            3 => Ok(Self::U64),
            other => Err(Error::corruption(format!("invalid index width code {other}"))),
        }
    }

    /// Size in bytes of one index.
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    fn write(self, ostr: &mut dyn WriteBuffer, indices: &[u64]) -> Result<()> {
        let width = self.bytes();
        let mut buf = vec![0; indices.len() * width];
        for (chunk, &index) in buf.chunks_exact_mut(width).zip(indices) {
            LittleEndian::write_uint(chunk, index, width);
        }
        ostr.write_bytes(&buf)
    }

    fn read(self, istr: &mut dyn ReadBuffer) -> Result<u64> {
        let width = self.bytes();
        let mut buf = [0; 8];
        istr.read_exact(&mut buf[..width])?;
        Ok(LittleEndian::read_uint(&buf, width))
    }
}

/// Header of one granule of the index stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GranuleHeader {
    width: IndexWidth,
    reset: bool,
    new_keys: Option<u64>,
    num_rows: u64,
}

impl GranuleHeader {
    fn write(&self, ostr: &mut dyn WriteBuffer) -> Result<()> {
        let mut flags = self.width.code();
        if self.reset {
            flags |= RESET_DICTIONARY;
        }
        if self.new_keys.is_some() {
            flags |= HAS_DICTIONARY_UPDATE;
        }
        ostr.write_u64_le(flags)?;
        if let Some(new_keys) = self.new_keys {
            ostr.write_u64_le(new_keys)?;
        }
        ostr.write_u64_le(self.num_rows)
    }

    /// `None` if the stream ends cleanly before the header.
    fn read(istr: &mut dyn ReadBuffer) -> Result<Option<Self>> {
        if istr.eof() {
            return Ok(None);
        }
        let flags = istr.read_u64_le()?;
        if flags & !KNOWN_FLAGS != 0 {
            return Err(Error::corruption(format!(
                "unknown granule flags {:#x}",
                flags & !KNOWN_FLAGS
            )));
        }
        let width = IndexWidth::from_code(flags & INDEX_WIDTH_MASK)?;
        let new_keys = if flags & HAS_DICTIONARY_UPDATE != 0 {
            Some(istr.read_u64_le()?)
        } else {
            None
        };
        let num_rows = istr.read_u64_le()?;
        Ok(Some(Self {
            width,
            reset: flags & RESET_DICTIONARY != 0,
            new_keys,
            num_rows,
        }))
    }
}

/// Write side session state.
#[derive(Debug)]
struct SerializeState {
    /// Keys referenced by the session so far, in the order they were written.
    dictionary: ColumnUnique,
    /// Leading entries of `dictionary` already in the keys streams.
    written_keys: usize,
    keys_state: Option<BulkState>,
    settings: LowCardinalitySettings,
    granules: usize,
}

impl SerializeState {
    fn needs_reset(&self) -> bool {
        match self.settings.dictionary_scope {
            DictionaryScope::Chunk => true,
            DictionaryScope::Session => {
                let max = self.settings.max_dictionary_size;
                !self.settings.use_single_dictionary_for_part
                    && max != 0
                    && self.dictionary.len() as u64 >= max
            }
        }
    }
}

/// Read side session state.
#[derive(Debug)]
struct DeserializeState {
    /// Keys received so far, indexed by the positions of the index stream.
    dictionary: Column,
    keys_state: Option<BulkState>,
    /// Rows of the current granule not yet read.
    pending_rows: u64,
    width: IndexWidth,
}

pub(crate) fn enumerate_streams(
    dictionary_type: &DataTypeRef,
    callback: &mut dyn FnMut(&SubstreamPath),
    path: &mut SubstreamPath,
) {
    path.push(Substream::DictionaryKeys);
    dictionary_type.enumerate_streams(callback, path);
    path.pop();
    path.push(Substream::DictionaryIndexes);
    callback(path);
    path.pop();
}

fn index_output<'a>(
    settings: &'a mut SerializeBulkSettings<'_>,
) -> Result<&'a mut dyn WriteBuffer> {
    let path = settings.path.clone();
    settings.streams.output(&path).ok_or_else(|| {
        Error::serialization(format!("no output for dictionary index stream {path:?}"))
    })
}

fn index_input<'a>(settings: &'a mut DeserializeBulkSettings<'_>) -> Result<&'a mut dyn ReadBuffer> {
    let path = settings.path.clone();
    settings
        .streams
        .input(&path)
        .ok_or_else(|| Error::corruption(format!("missing dictionary index stream {path:?}")))
}

/// Fail unless every keys stream of the dictionary type has a sink.
fn require_keys_outputs(
    dictionary_type: &DataTypeRef,
    settings: &mut SerializeBulkSettings<'_>,
) -> Result<()> {
    let mut paths = Vec::new();
    let mut path = settings.path.clone();
    path.push(Substream::DictionaryKeys);
    dictionary_type.enumerate_streams(
        &mut |stream: &SubstreamPath| paths.push(stream.clone()),
        &mut path,
    );
    match paths.into_iter().find(|path| settings.streams.output(path).is_none()) {
        Some(path) => Err(Error::serialization(format!(
            "no output for dictionary keys stream {path:?}"
        ))),
        None => Ok(()),
    }
}

pub(crate) fn serialize_state_prefix(
    dictionary_type: &DataTypeRef,
    settings: &mut SerializeBulkSettings<'_>,
) -> Result<Option<BulkState>> {
    require_keys_outputs(dictionary_type, settings)?;
    settings.with_substream(Substream::DictionaryIndexes, |settings| {
        index_output(settings)?.write_u64_le(KEYS_VERSION_SHARED_WITH_UPDATES)
    })?;
    let keys_state = settings.with_substream(Substream::DictionaryKeys, |settings| {
        dictionary_type.serialize_bulk_state_prefix(settings)
    })?;
    debug!(
        dictionary_type = %dictionary_type.name(),
        scope = ?settings.low_cardinality.dictionary_scope,
        max_dictionary_size = settings.low_cardinality.max_dictionary_size,
        "opened dictionary encoded bulk write"
    );
    Ok(Some(Box::new(SerializeState {
        dictionary: create_column_unique(dictionary_type),
        written_keys: 0,
        keys_state,
        settings: settings.low_cardinality,
        granules: 0,
    })))
}

pub(crate) fn serialize_state_suffix(
    dictionary_type: &DataTypeRef,
    settings: &mut SerializeBulkSettings<'_>,
    state: &mut Option<BulkState>,
) -> Result<()> {
    let state = state
        .take()
        .ok_or_else(|| Error::serialization("dictionary encoded bulk write is already closed"))?;
    let mut state = state
        .downcast::<SerializeState>()
        .map_err(|_| Error::serialization("bulk state does not belong to a LowCardinality write"))?;
    settings.with_substream(Substream::DictionaryKeys, |settings| {
        dictionary_type.serialize_bulk_state_suffix(settings, &mut state.keys_state)
    })?;
    debug!(
        dictionary_type = %dictionary_type.name(),
        granules = state.granules,
        keys = state.dictionary.len(),
        "closed dictionary encoded bulk write"
    );
    Ok(())
}

pub(crate) fn deserialize_state_prefix(
    dictionary_type: &DataTypeRef,
    settings: &mut DeserializeBulkSettings<'_>,
) -> Result<Option<BulkState>> {
    let version = settings.with_substream(Substream::DictionaryIndexes, |settings| {
        index_input(settings)?.read_u64_le()
    })?;
    if version != KEYS_VERSION_SHARED_WITH_UPDATES {
        return Err(Error::corruption(format!(
            "unknown dictionary keys serialization version {version}"
        )));
    }
    let keys_state = settings.with_substream(Substream::DictionaryKeys, |settings| {
        dictionary_type.deserialize_bulk_state_prefix(settings)
    })?;
    debug!(dictionary_type = %dictionary_type.name(), "opened dictionary encoded bulk read");
    Ok(Some(Box::new(DeserializeState {
        dictionary: dictionary_type.create_column(),
        keys_state,
        pending_rows: 0,
        width: IndexWidth::U8,
    })))
}

/// Write rows `[offset, offset + limit)` of `column` as one granule.
pub(crate) fn serialize_chunk(
    dictionary_type: &DataTypeRef,
    column: &ColumnLowCardinality,
    offset: usize,
    limit: usize,
    settings: &mut SerializeBulkSettings<'_>,
    state: &mut Option<BulkState>,
) -> Result<()> {
    let end = bulk_range_end(column.len(), offset, limit)?;
    let state = state_mut::<SerializeState>(state).ok_or_else(|| {
        Error::serialization("dictionary encoded bulk write without an open session")
    })?;
    if end == offset {
        return Ok(());
    }

    let reset = state.needs_reset();
    if reset {
        trace!(
            keys = state.dictionary.len(),
            granule = state.granules,
            "resetting dictionary"
        );
        state.dictionary.clear();
        state.written_keys = 0;
    }

    // positions in the column's dictionary -> positions in the session dictionary
    let mut remap = HashMap::new();
    let mut indices = Vec::with_capacity(end - offset);
    for row in offset..end {
        let position = column.index_at(row);
        let index = match remap.get(&position) {
            Some(&index) => index,
            None => {
                let index = state
                    .dictionary
                    .insert_from(column.dictionary().keys(), position as usize)?;
                remap.insert(position, index);
                index
            }
        };
        indices.push(index);
    }

    let new_keys = state.dictionary.len() - state.written_keys;
    let header = GranuleHeader {
        width: IndexWidth::for_dictionary_len(state.dictionary.len()),
        reset,
        new_keys: (new_keys > 0 || reset).then_some(new_keys as u64),
        num_rows: indices.len() as u64,
    };
    settings.with_substream(Substream::DictionaryIndexes, |settings| {
        header.write(index_output(settings)?)
    })?;

    if new_keys > 0 {
        trace!(new_keys, "writing dictionary update");
        let SerializeState {
            dictionary,
            written_keys,
            keys_state,
            ..
        } = state;
        settings.with_substream(Substream::DictionaryKeys, |settings| {
            dictionary_type.serialize_bulk_with_multiple_streams(
                dictionary.keys(),
                *written_keys,
                new_keys,
                settings,
                keys_state,
            )
        })?;
        *written_keys = dictionary.len();
    }

    settings.with_substream(Substream::DictionaryIndexes, |settings| {
        header.width.write(index_output(settings)?, &indices)
    })?;
    state.granules += 1;
    Ok(())
}

/// Append up to `limit` rows to `column`, crossing granule boundaries as needed.
pub(crate) fn deserialize_chunk(
    dictionary_type: &DataTypeRef,
    column: &mut ColumnLowCardinality,
    limit: usize,
    settings: &mut DeserializeBulkSettings<'_>,
    state: &mut Option<BulkState>,
) -> Result<usize> {
    let state = state_mut::<DeserializeState>(state).ok_or_else(|| {
        Error::corruption("dictionary encoded bulk read without an open session")
    })?;

    let mut rows = 0;
    while rows < limit {
        if state.pending_rows == 0 {
            let header = settings.with_substream(Substream::DictionaryIndexes, |settings| {
                GranuleHeader::read(index_input(settings)?)
            })?;
            let Some(header) = header else {
                break;
            };
            read_dictionary_update(dictionary_type, &header, state, settings)?;
            state.width = header.width;
            state.pending_rows = header.num_rows;
            continue;
        }

        let take = (limit - rows).min(usize::try_from(state.pending_rows).unwrap_or(usize::MAX));
        let DeserializeState {
            dictionary, width, ..
        } = state;
        settings.with_substream(Substream::DictionaryIndexes, |settings| {
            let istr = index_input(settings)?;
            // positions in the session dictionary -> positions in the column's dictionary
            let mut remap = HashMap::new();
            for _ in 0..take {
                let index = width.read(istr)?;
                if index >= dictionary.len() as u64 {
                    return Err(Error::corruption(format!(
                        "dictionary index {index} out of range for {} keys",
                        dictionary.len()
                    )));
                }
                let position = match remap.get(&index) {
                    Some(&position) => position,
                    None => {
                        let position = column.insert_key_from_full(dictionary, index as usize)?;
                        remap.insert(index, position);
                        position
                    }
                };
                column.push_index(position)?;
            }
            Ok(())
        })?;
        state.pending_rows -= take as u64;
        rows += take;
    }
    Ok(rows)
}

fn read_dictionary_update(
    dictionary_type: &DataTypeRef,
    header: &GranuleHeader,
    state: &mut DeserializeState,
    settings: &mut DeserializeBulkSettings<'_>,
) -> Result<()> {
    if header.reset {
        trace!(keys = state.dictionary.len(), "resetting dictionary");
        state.dictionary = state.dictionary.empty_like();
    }
    let Some(new_keys) = header.new_keys else {
        return Ok(());
    };
    let new_keys = usize::try_from(new_keys)
        .map_err(|_| Error::corruption(format!("dictionary update of {new_keys} keys")))?;
    if new_keys == 0 {
        return Ok(());
    }
    let read = settings.with_substream(Substream::DictionaryKeys, |settings| {
        dictionary_type.deserialize_bulk_with_multiple_streams(
            &mut state.dictionary,
            new_keys,
            settings,
            &mut state.keys_state,
        )
    })?;
    expect_rows("dictionary update", new_keys, read)?;
    trace!(new_keys, keys = state.dictionary.len(), "applied dictionary update");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_width() {
        assert_eq!(IndexWidth::for_dictionary_len(0), IndexWidth::U8);
        assert_eq!(IndexWidth::for_dictionary_len(256), IndexWidth::U8);
        assert_eq!(IndexWidth::for_dictionary_len(257), IndexWidth::U16);
        assert_eq!(IndexWidth::for_dictionary_len(65_537), IndexWidth::U32);
    }

    #[test]
    fn header_round_trip() {
        let header = GranuleHeader {
            width: IndexWidth::U16,
            reset: true,
            new_keys: Some(4),
            num_rows: 9,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 24);
        assert_eq!(
            LittleEndian::read_u64(&buf),
            1 | HAS_DICTIONARY_UPDATE | RESET_DICTIONARY
        );
        let read = GranuleHeader::read(&mut bytes::Bytes::from(buf)).unwrap();
        assert_eq!(read, Some(header));
    }

    #[test]
    fn header_at_end_of_stream() {
        assert_eq!(GranuleHeader::read(&mut bytes::Bytes::new()).unwrap(), None);

        let truncated = 0_u64.to_le_bytes();
        let err = GranuleHeader::read(&mut bytes::Bytes::copy_from_slice(&truncated)).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn unknown_flags() {
        let mut buf = Vec::new();
        buf.write_u64_le(1 << 20).unwrap();
        buf.write_u64_le(0).unwrap();
        let err = GranuleHeader::read(&mut bytes::Bytes::from(buf)).unwrap_err();
        assert!(err.is_corruption());

        let mut buf = Vec::new();
        buf.write_u64_le(7).unwrap();
        buf.write_u64_le(0).unwrap();
        let err = GranuleHeader::read(&mut bytes::Bytes::from(buf)).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn indices_are_little_endian() {
        let mut buf = Vec::new();
        IndexWidth::U16.write(&mut buf, &[1, 0x0203]).unwrap();
        assert_eq!(buf, vec![1, 0, 3, 2]);

        let mut input = bytes::Bytes::from(buf);
        assert_eq!(IndexWidth::U16.read(&mut input).unwrap(), 1);
        assert_eq!(IndexWidth::U16.read(&mut input).unwrap(), 0x0203);
        assert!(IndexWidth::U16.read(&mut input).unwrap_err().is_corruption());
    }
}

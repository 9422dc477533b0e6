use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use column_types::bulk::{
    BulkReader, BulkWriter, DeserializeBulkSettings, DictionaryScope, LowCardinalitySettings,
    MemoryInputStreams, MemoryStreams, OutputStreams, SerializeBulkSettings, SubstreamPath,
};
use column_types::io::WriteBuffer;
use column_types::types::{DataTypeArray, DataTypeNullable, DataTypeString, DataTypeUInt32};
use column_types::{Column, DataTypeRef, Error, Field};
use low_cardinality::DataTypeLowCardinality;
use low_cardinality::bulk::{HAS_DICTIONARY_UPDATE, INDEX_WIDTH_MASK, RESET_DICTIONARY};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn lc(dictionary_type: DataTypeRef) -> DataTypeRef {
    Arc::new(DataTypeLowCardinality::new(dictionary_type).unwrap())
}

fn lc_string() -> DataTypeRef {
    lc(Arc::new(DataTypeString::new()))
}

fn lc_uint32() -> DataTypeRef {
    lc(Arc::new(DataTypeUInt32::new()))
}

fn column_of(data_type: &DataTypeRef, fields: impl IntoIterator<Item = Field>) -> Column {
    let mut column = data_type.create_column();
    for field in fields {
        column.push_field(&field).unwrap();
    }
    column
}

fn strings(values: &[&str]) -> Vec<Field> {
    values.iter().map(|v| Field::from(*v)).collect()
}

/// Write `column` as one session with one granule per `(offset, limit)` chunk.
fn write(
    data_type: &DataTypeRef,
    column: &Column,
    chunks: &[(usize, usize)],
    low_cardinality: LowCardinalitySettings,
) -> MemoryStreams {
    let mut streams = MemoryStreams::for_type(data_type.as_ref(), "c");
    let mut settings = SerializeBulkSettings::new(&mut streams).with_low_cardinality(low_cardinality);
    let mut writer = BulkWriter::start(Arc::clone(data_type), &mut settings).unwrap();
    for &(offset, limit) in chunks {
        writer.write(column, offset, limit, &mut settings).unwrap();
    }
    writer.finish(&mut settings).unwrap();
    streams
}

fn read(data_type: &DataTypeRef, streams: MemoryStreams) -> Result<Column, Error> {
    let mut input = streams.into_input();
    let mut settings = DeserializeBulkSettings::new(&mut input);
    BulkReader::start(Arc::clone(data_type), &mut settings)?.read_to_end(&mut settings)
}

fn flags_at(stream: &[u8], offset: usize) -> u64 {
    LittleEndian::read_u64(&stream[offset..offset + 8])
}

#[test_log::test]
fn chunking_does_not_change_rows() {
    let data_type = lc_uint32();
    let fields: Vec<Field> = [5_u64, 5, 5, 1, 2, 1].into_iter().map(Field::from).collect();
    let column = column_of(&data_type, fields.clone());

    let split = read(
        &data_type,
        write(&data_type, &column, &[(0, 2), (2, 4)], Default::default()),
    )
    .unwrap();
    let whole = read(
        &data_type,
        write(&data_type, &column, &[(0, 6)], Default::default()),
    )
    .unwrap();

    assert_eq!(split.to_fields(), fields);
    assert_eq!(whole.to_fields(), fields);
    assert_eq!(split.as_low_cardinality().unwrap().dictionary().len(), 3);
}

#[test]
fn stream_names() {
    let streams = MemoryStreams::for_type(lc_string().as_ref(), "c");
    assert_eq!(streams.stream_names().collect::<Vec<_>>(), vec!["c", "c.dict"]);

    let nested: DataTypeRef = Arc::new(DataTypeArray::new(lc(Arc::new(
        DataTypeNullable::new(Arc::new(DataTypeString::new())).unwrap(),
    ))));
    let streams = MemoryStreams::for_type(nested.as_ref(), "a");
    assert_eq!(
        streams.stream_names().collect::<Vec<_>>(),
        vec!["a", "a.dict", "a.dict.null", "a.size0"]
    );
}

#[test]
fn index_stream_layout() {
    let data_type = lc_string();
    let column = column_of(&data_type, strings(&["a", "b", "a"]));
    let streams = write(&data_type, &column, &[(0, 0)], Default::default());

    let index = streams.get("c").unwrap();
    assert_eq!(index.len(), 8 + 8 + 8 + 8 + 3);
    assert_eq!(LittleEndian::read_u64(&index[..8]), 1);
    let flags = flags_at(index, 8);
    assert_eq!(flags & INDEX_WIDTH_MASK, 0);
    assert_eq!(flags & HAS_DICTIONARY_UPDATE, HAS_DICTIONARY_UPDATE);
    assert_eq!(flags & RESET_DICTIONARY, 0);
    assert_eq!(LittleEndian::read_u64(&index[16..24]), 2);
    assert_eq!(LittleEndian::read_u64(&index[24..32]), 3);
    assert_eq!(&index[32..], &[0, 1, 0]);

    // varint length then bytes, per key
    assert_eq!(streams.get("c.dict").unwrap(), &[1, b'a', 1, b'b']);
}

#[test_log::test]
fn index_out_of_range_is_corruption() {
    let data_type = lc_string();
    let column = column_of(&data_type, strings(&["a", "b", "c"]));
    let streams = write(&data_type, &column, &[(0, 0)], Default::default());

    let mut index = streams.get("c").unwrap().to_vec();
    assert_eq!(index.len(), 35);
    *index.last_mut().unwrap() = 100;
    let keys = streams.get("c.dict").unwrap().to_vec();

    let mut input = streams.into_input();
    input.insert("c", index);
    input.insert("c.dict", keys);
    let mut settings = DeserializeBulkSettings::new(&mut input);
    let err = BulkReader::start(Arc::clone(&data_type), &mut settings)
        .unwrap()
        .read_to_end(&mut settings)
        .unwrap_err();
    assert!(err.is_corruption(), "{err}");
}

#[test]
fn truncated_granule_is_corruption() {
    let data_type = lc_string();
    let column = column_of(&data_type, strings(&["a", "b", "c"]));
    let streams = write(&data_type, &column, &[(0, 0)], Default::default());

    for len in [34, 30, 12] {
        let index = streams.get("c").unwrap()[..len].to_vec();
        let keys = streams.get("c.dict").unwrap().to_vec();
        let mut input = MemoryInputStreams::new("c");
        input.insert("c", index);
        input.insert("c.dict", keys);
        let mut settings = DeserializeBulkSettings::new(&mut input);
        let err = BulkReader::start(Arc::clone(&data_type), &mut settings)
            .unwrap()
            .read_to_end(&mut settings)
            .unwrap_err();
        assert!(err.is_corruption(), "{len}: {err}");
    }
}

#[test]
fn truncated_dictionary_update_is_corruption() {
    let data_type = lc_string();
    let column = column_of(&data_type, strings(&["a", "b", "c"]));
    let streams = write(&data_type, &column, &[(0, 0)], Default::default());

    let mut input = streams.into_input();
    input.insert("c.dict", Vec::new());
    let mut settings = DeserializeBulkSettings::new(&mut input);
    let err = BulkReader::start(Arc::clone(&data_type), &mut settings)
        .unwrap()
        .read_to_end(&mut settings)
        .unwrap_err();
    assert!(err.is_corruption(), "{err}");
}

#[test]
fn unknown_version_is_corruption() {
    let data_type = lc_string();
    let mut input = MemoryInputStreams::new("c");
    input.insert("c", 7_u64.to_le_bytes().to_vec());
    input.insert("c.dict", Vec::new());
    let mut settings = DeserializeBulkSettings::new(&mut input);
    let err = BulkReader::start(data_type, &mut settings).unwrap_err();
    assert!(err.is_corruption(), "{err}");
}

#[test_log::test]
fn chunk_scope_writes_a_dictionary_per_granule() {
    let data_type = lc_string();
    let column = column_of(&data_type, strings(&["a", "b", "a", "b"]));
    let chunks = [(0, 2), (2, 2)];

    let session = write(&data_type, &column, &chunks, Default::default());
    let chunk = write(
        &data_type,
        &column,
        &chunks,
        LowCardinalitySettings {
            dictionary_scope: DictionaryScope::Chunk,
            ..Default::default()
        },
    );

    assert_eq!(session.get("c.dict").unwrap().len(), 4);
    assert_eq!(chunk.get("c.dict").unwrap().len(), 8);

    // the second session granule reuses the dictionary: no update, no reset
    let index = session.get("c").unwrap();
    let second = 8 + 24 + 2;
    assert_eq!(flags_at(index, second) & (HAS_DICTIONARY_UPDATE | RESET_DICTIONARY), 0);

    let index = chunk.get("c").unwrap();
    assert_ne!(flags_at(index, 8) & RESET_DICTIONARY, 0);
    assert_ne!(flags_at(index, second) & RESET_DICTIONARY, 0);

    let expected = strings(&["a", "b", "a", "b"]);
    assert_eq!(read(&data_type, session).unwrap().to_fields(), expected);
    assert_eq!(read(&data_type, chunk).unwrap().to_fields(), expected);
}

#[test]
fn session_dictionary_resets_at_max_size() {
    let data_type = lc_string();
    let fields = strings(&["a", "b", "c", "a"]);
    let column = column_of(&data_type, fields.clone());
    let chunks = [(0, 2), (2, 1), (3, 1)];
    let second = 8 + 24 + 2;

    let limited = LowCardinalitySettings {
        max_dictionary_size: 2,
        ..Default::default()
    };
    let streams = write(&data_type, &column, &chunks, limited);
    let index = streams.get("c").unwrap();
    assert_eq!(flags_at(index, 8) & RESET_DICTIONARY, 0);
    assert_ne!(flags_at(index, second) & RESET_DICTIONARY, 0);
    // "a" has to be written again after the reset
    assert_eq!(streams.get("c.dict").unwrap().len(), 8);
    assert_eq!(read(&data_type, streams).unwrap().to_fields(), fields);

    for settings in [
        LowCardinalitySettings {
            max_dictionary_size: 2,
            use_single_dictionary_for_part: true,
            ..Default::default()
        },
        LowCardinalitySettings {
            max_dictionary_size: 0,
            ..Default::default()
        },
    ] {
        let streams = write(&data_type, &column, &chunks, settings);
        let index = streams.get("c").unwrap();
        assert_eq!(flags_at(index, second) & RESET_DICTIONARY, 0);
        assert_eq!(streams.get("c.dict").unwrap().len(), 6);
        assert_eq!(read(&data_type, streams).unwrap().to_fields(), fields);
    }
}

#[test]
fn reads_cross_granules() {
    let data_type = lc_uint32();
    let fields: Vec<Field> = (0..10_u64).map(|v| Field::from(v % 4)).collect();
    let column = column_of(&data_type, fields.clone());
    let streams = write(
        &data_type,
        &column,
        &[(0, 3), (3, 3), (6, 3), (9, 3)],
        Default::default(),
    );

    let mut input = streams.into_input();
    let mut settings = DeserializeBulkSettings::new(&mut input);
    let mut reader = BulkReader::start(Arc::clone(&data_type), &mut settings).unwrap();
    let mut result = data_type.create_column();
    let mut batches = Vec::new();
    loop {
        let rows = reader.read(&mut result, 4, &mut settings).unwrap();
        batches.push(rows);
        if rows < 4 {
            break;
        }
    }
    assert_eq!(batches, vec![4, 4, 2]);
    assert_eq!(result.to_fields(), fields);
    assert_eq!(reader.read(&mut result, 4, &mut settings).unwrap(), 0);
}

#[test]
fn empty_ranges_write_nothing() {
    let data_type = lc_string();
    let column = column_of(&data_type, strings(&["a"]));
    let streams = write(&data_type, &column, &[(1, 5)], Default::default());
    assert_eq!(streams.get("c").unwrap().len(), 8);
    assert!(streams.get("c.dict").unwrap().is_empty());
    assert_eq!(read(&data_type, streams).unwrap().len(), 0);
}

#[test]
fn session_state_is_required() {
    let data_type = lc_string();
    let column = column_of(&data_type, strings(&["a"]));
    let mut streams = MemoryStreams::for_type(data_type.as_ref(), "c");
    let mut settings = SerializeBulkSettings::new(&mut streams);

    let err = data_type
        .serialize_bulk_with_multiple_streams(&column, 0, 0, &mut settings, &mut None)
        .unwrap_err();
    assert!(matches!(err, Error::Serialization { .. }), "{err}");

    let mut state = data_type.serialize_bulk_state_prefix(&mut settings).unwrap();
    data_type
        .serialize_bulk_state_suffix(&mut settings, &mut state)
        .unwrap();
    let err = data_type
        .serialize_bulk_state_suffix(&mut settings, &mut state)
        .unwrap_err();
    assert!(matches!(err, Error::Serialization { .. }), "{err}");
}

/// Declared streams of column `c` with one of them withheld from the writer.
#[derive(Debug)]
struct WithoutStream {
    streams: MemoryStreams,
    missing: &'static str,
}

impl OutputStreams for WithoutStream {
    fn output(&mut self, path: &SubstreamPath) -> Option<&mut dyn WriteBuffer> {
        if path.stream_name("c") == self.missing {
            return None;
        }
        self.streams.output(path)
    }
}

fn start_without(data_type: &DataTypeRef, missing: &'static str) -> (Error, MemoryStreams) {
    let mut streams = WithoutStream {
        streams: MemoryStreams::for_type(data_type.as_ref(), "c"),
        missing,
    };
    let mut settings = SerializeBulkSettings::new(&mut streams);
    let err = BulkWriter::start(Arc::clone(data_type), &mut settings).unwrap_err();
    (err, streams.streams)
}

#[test_log::test]
fn missing_keys_stream_fails_the_write() {
    let (err, streams) = start_without(&lc_string(), "c.dict");
    assert!(matches!(err, Error::Serialization { .. }), "{err}");
    assert!(streams.get("c").unwrap().is_empty());

    let nullable = lc(Arc::new(
        DataTypeNullable::new(Arc::new(DataTypeString::new())).unwrap(),
    ));
    let (err, _) = start_without(&nullable, "c.dict.null");
    assert!(matches!(err, Error::Serialization { .. }), "{err}");
}

#[test_log::test]
fn missing_index_stream_fails_the_write() {
    let (err, streams) = start_without(&lc_string(), "c");
    assert!(matches!(err, Error::Serialization { .. }), "{err}");
    assert!(streams.get("c.dict").unwrap().is_empty());
}

#[test]
fn nested_dictionary_columns() {
    let data_type: DataTypeRef = Arc::new(DataTypeArray::new(lc(Arc::new(
        DataTypeNullable::new(Arc::new(DataTypeString::new())).unwrap(),
    ))));
    let fields = vec![
        Field::Array(vec!["x".into(), Field::Null]),
        Field::Array(vec![]),
        Field::Array(vec![Field::Null, "y".into(), "x".into()]),
    ];
    let column = column_of(&data_type, fields.clone());
    let mut streams = MemoryStreams::for_type(data_type.as_ref(), "a");
    let mut settings = SerializeBulkSettings::new(&mut streams);
    let mut writer = BulkWriter::start(Arc::clone(&data_type), &mut settings).unwrap();
    writer.write(&column, 0, 2, &mut settings).unwrap();
    writer.write(&column, 2, 0, &mut settings).unwrap();
    assert_eq!(writer.rows(), 3);
    writer.finish(&mut settings).unwrap();

    let mut input = streams.into_input();
    let mut settings = DeserializeBulkSettings::new(&mut input);
    let result = BulkReader::start(Arc::clone(&data_type), &mut settings)
        .unwrap()
        .read_to_end(&mut settings)
        .unwrap();
    assert_eq!(result.to_fields(), fields);
}

proptest! {
    #[test]
    fn any_chunking_decodes_the_same_rows(
        values in prop::collection::vec(0_u64..16, 1..64),
        cuts in prop::collection::vec(1_usize..8, 0..16),
        max_dictionary_size in 0_u64..6,
        per_chunk in any::<bool>(),
    ) {
        let data_type = lc_uint32();
        let fields: Vec<Field> = values.into_iter().map(Field::from).collect();
        let column = column_of(&data_type, fields.clone());

        let mut chunks = Vec::new();
        let mut offset = 0;
        for cut in cuts.into_iter().chain(std::iter::repeat(usize::MAX)) {
            if offset >= fields.len() {
                break;
            }
            let limit = cut.min(fields.len() - offset);
            chunks.push((offset, limit));
            offset += limit;
        }

        let settings = LowCardinalitySettings {
            dictionary_scope: if per_chunk { DictionaryScope::Chunk } else { DictionaryScope::Session },
            max_dictionary_size,
            use_single_dictionary_for_part: false,
        };
        let streams = write(&data_type, &column, &chunks, settings);
        let result = read(&data_type, streams).unwrap();
        prop_assert_eq!(result.to_fields(), fields);
    }
}

//! Environment variable overrides. Kept in their own test binary so no other test parses a
//! config while the variables are set.

use clap::Parser;
use clap_blocks::low_cardinality::LowCardinalityConfig;
use column_types::bulk::{DictionaryScope, LowCardinalitySettings};

#[test]
fn low_cardinality_config_from_env() {
    // SAFETY: the only test in this binary, so nothing reads the environment concurrently.
    unsafe {
        std::env::set_var("COLSTORE_LOW_CARDINALITY_DICTIONARY_SCOPE", "chunk");
        std::env::set_var("COLSTORE_LOW_CARDINALITY_MAX_DICTIONARY_SIZE", "16");
        std::env::set_var(
            "COLSTORE_LOW_CARDINALITY_USE_SINGLE_DICTIONARY_FOR_PART",
            "true",
        );
    }

    let config = LowCardinalityConfig::try_parse_from(["my_binary"]).unwrap();
    assert_eq!(
        config.settings(),
        LowCardinalitySettings {
            dictionary_scope: DictionaryScope::Chunk,
            max_dictionary_size: 16,
            use_single_dictionary_for_part: true,
        }
    );

    let config = LowCardinalityConfig::try_parse_from([
        "my_binary",
        "--low-cardinality-max-dictionary-size",
        "0",
    ])
    .unwrap();
    assert_eq!(config.settings().max_dictionary_size, 0);
}

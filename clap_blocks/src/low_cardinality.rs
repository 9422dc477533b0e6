//! Dictionary encoding related configs.

use column_types::bulk::{DictionaryScope, LowCardinalitySettings};

/// How long one dictionary is shared by the granules of a bulk write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DictionaryScopeArg {
    /// Keep one dictionary for the whole write session, subject to the size limit.
    #[default]
    Session,

    /// Start a new dictionary for every written chunk.
    Chunk,
}

impl From<DictionaryScopeArg> for DictionaryScope {
    fn from(value: DictionaryScopeArg) -> Self {
        match value {
            DictionaryScopeArg::Session => Self::Session,
            DictionaryScopeArg::Chunk => Self::Chunk,
        }
    }
}

/// CLI config for writing dictionary encoded columns.
#[derive(Debug, Clone, Copy, clap::Parser)]
pub struct LowCardinalityConfig {
    /// Which written chunks share a dictionary.
    #[clap(
        value_enum,
        long = "low-cardinality-dictionary-scope",
        env = "COLSTORE_LOW_CARDINALITY_DICTIONARY_SCOPE",
        default_value = "session",
        action
    )]
    pub dictionary_scope: DictionaryScopeArg,

    /// Number of keys after which a session dictionary is dropped and a new one started.
    ///
    /// Zero disables the limit.
    #[clap(
        long = "low-cardinality-max-dictionary-size",
        env = "COLSTORE_LOW_CARDINALITY_MAX_DICTIONARY_SIZE",
        default_value = "8192",
        action
    )]
    pub max_dictionary_size: u64,

    /// Keep a single dictionary for the whole write session, ignoring the size limit.
    #[clap(
        long = "low-cardinality-use-single-dictionary-for-part",
        env = "COLSTORE_LOW_CARDINALITY_USE_SINGLE_DICTIONARY_FOR_PART",
        default_value = "false",
        action
    )]
    pub use_single_dictionary_for_part: bool,
}

impl LowCardinalityConfig {
    /// The bulk write settings this config selects.
    pub fn settings(&self) -> LowCardinalitySettings {
        LowCardinalitySettings {
            dictionary_scope: self.dictionary_scope.into(),
            max_dictionary_size: self.max_dictionary_size,
            use_single_dictionary_for_part: self.use_single_dictionary_for_part,
        }
    }
}

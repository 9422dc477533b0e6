//! Row format related configs.

use column_types::FormatSettings;

/// CLI config for text row formats.
#[derive(Debug, Clone, Copy, clap::Parser)]
pub struct FormatConfig {
    /// Field delimiter used by the CSV format. Must be a single ASCII character.
    #[clap(
        long = "format-csv-delimiter",
        env = "COLSTORE_FORMAT_CSV_DELIMITER",
        default_value = ",",
        value_parser = parse_delimiter,
        action
    )]
    pub csv_delimiter: u8,

    /// Write 64 bit integers as quoted strings in JSON.
    #[clap(
        long = "format-json-quote-64bit-integers",
        env = "COLSTORE_FORMAT_JSON_QUOTE_64BIT_INTEGERS",
        default_value = "true",
        action
    )]
    pub json_quote_64bit_integers: bool,
}

impl FormatConfig {
    pub fn settings(&self) -> FormatSettings {
        FormatSettings {
            csv_delimiter: self.csv_delimiter,
            json_quote_64bit_integers: self.json_quote_64bit_integers,
        }
    }
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(format!(
            "expected a single ASCII character, got '{s}'"
        )),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn defaults_match_settings() {
        let config = FormatConfig::try_parse_from(["my_binary"]).unwrap();
        assert_eq!(config.settings(), FormatSettings::default());
    }

    #[test]
    fn delimiter() {
        let config =
            FormatConfig::try_parse_from(["my_binary", "--format-csv-delimiter", ";"]).unwrap();
        assert_eq!(config.settings().csv_delimiter, b';');

        let error = FormatConfig::try_parse_from(["my_binary", "--format-csv-delimiter", ";;"])
            .unwrap_err()
            .to_string();
        assert!(error.contains("expected a single ASCII character"), "{error}");
    }
}

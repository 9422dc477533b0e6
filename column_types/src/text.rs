//! Escaping and parsing helpers shared by the text row formats.

use crate::error::{Error, Result};
use crate::io::{ReadBuffer, ReadBufferExt, WriteBuffer, WriteBufferExt};

/// Backslash escaping used by the tab separated format. Quotes are escaped as well so the same
/// routine serves quoted literals.
pub fn write_escaped_string(ostr: &mut dyn WriteBuffer, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        let escape: &[u8] = match b {
            b'\\' => b"\\\\",
            b'\t' => b"\\t",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            b'\0' => b"\\0",
            0x08 => b"\\b",
            0x0c => b"\\f",
            b'\'' => b"\\'",
            _ => continue,
        };
        ostr.write_bytes(&bytes[start..i])?;
        ostr.write_bytes(escape)?;
        start = i + 1;
    }
    ostr.write_bytes(&bytes[start..])
}

pub fn write_quoted_string(ostr: &mut dyn WriteBuffer, s: &str) -> Result<()> {
    ostr.write_u8(b'\'')?;
    write_escaped_string(ostr, s)?;
    ostr.write_u8(b'\'')
}

/// Always quoted; embedded quotes are doubled.
pub fn write_csv_string(ostr: &mut dyn WriteBuffer, s: &str) -> Result<()> {
    ostr.write_u8(b'"')?;
    for (i, part) in s.split('"').enumerate() {
        if i > 0 {
            ostr.write_bytes(b"\"\"")?;
        }
        ostr.write_str(part)?;
    }
    ostr.write_u8(b'"')
}

pub fn write_json_string(ostr: &mut dyn WriteBuffer, s: &str) -> Result<()> {
    ostr.write_u8(b'"')?;
    for c in s.chars() {
        match c {
            '"' => ostr.write_bytes(b"\\\"")?,
            '\\' => ostr.write_bytes(b"\\\\")?,
            '\n' => ostr.write_bytes(b"\\n")?,
            '\r' => ostr.write_bytes(b"\\r")?,
            '\t' => ostr.write_bytes(b"\\t")?,
            '\u{08}' => ostr.write_bytes(b"\\b")?,
            '\u{0c}' => ostr.write_bytes(b"\\f")?,
            c if (c as u32) < 0x20 => ostr.write_str(&format!("\\u{:04x}", c as u32))?,
            c => {
                let mut buf = [0_u8; 4];
                ostr.write_str(c.encode_utf8(&mut buf))?
            }
        }
    }
    ostr.write_u8(b'"')
}

pub fn write_xml_string(ostr: &mut dyn WriteBuffer, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        let escape: &[u8] = match b {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'"' => b"&quot;",
            b'\'' => b"&apos;",
            _ => continue,
        };
        ostr.write_bytes(&bytes[start..i])?;
        ostr.write_bytes(escape)?;
        start = i + 1;
    }
    ostr.write_bytes(&bytes[start..])
}

fn into_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::corruption(format!("invalid utf-8: {e}")))
}

fn unescape(istr: &mut dyn ReadBuffer, out: &mut Vec<u8>) -> Result<()> {
    let b = istr
        .read_u8()
        .map_err(|_| Error::corruption("dangling backslash at end of stream"))?;
    out.push(match b {
        b't' => b'\t',
        b'n' => b'\n',
        b'r' => b'\r',
        b'0' => b'\0',
        b'b' => 0x08,
        b'f' => 0x0c,
        other => other,
    });
    Ok(())
}

/// Reads up to the next unescaped tab, newline or the end of the stream. The terminator is
/// not consumed.
pub fn read_escaped_string(istr: &mut dyn ReadBuffer) -> Result<String> {
    let mut out = Vec::new();
    while let Some(b) = istr.peek_byte() {
        match b {
            b'\t' | b'\n' => break,
            b'\\' => {
                istr.skip(1)?;
                unescape(istr, &mut out)?;
            }
            _ => {
                istr.skip(1)?;
                out.push(b);
            }
        }
    }
    into_string(out)
}

pub fn read_quoted_string(istr: &mut dyn ReadBuffer) -> Result<String> {
    istr.expect_byte(b'\'')?;
    let mut out = Vec::new();
    loop {
        match istr.read_u8()? {
            b'\'' => break,
            b'\\' => unescape(istr, &mut out)?,
            b => out.push(b),
        }
    }
    into_string(out)
}

/// A CSV field, quoted or bare. Bare fields end at the delimiter or a line break.
pub fn read_csv_string(istr: &mut dyn ReadBuffer, delimiter: u8) -> Result<String> {
    let mut out = Vec::new();
    match istr.peek_byte() {
        Some(quote @ (b'"' | b'\'')) => {
            istr.skip(1)?;
            loop {
                let b = istr.read_u8()?;
                if b == quote {
                    if istr.peek_byte() == Some(quote) {
                        istr.skip(1)?;
                        out.push(quote);
                    } else {
                        break;
                    }
                } else {
                    out.push(b);
                }
            }
        }
        _ => {
            while let Some(b) = istr.peek_byte() {
                if b == delimiter || b == b'\n' || b == b'\r' {
                    break;
                }
                istr.skip(1)?;
                out.push(b);
            }
        }
    }
    into_string(out)
}

fn read_hex4(istr: &mut dyn ReadBuffer) -> Result<u32> {
    let mut buf = [0_u8; 4];
    istr.read_exact(&mut buf)?;
    std::str::from_utf8(&buf)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(|| Error::corruption("invalid \\u escape in JSON string"))
}

pub fn read_json_string(istr: &mut dyn ReadBuffer) -> Result<String> {
    istr.expect_byte(b'"')?;
    let mut out = Vec::new();
    loop {
        match istr.read_u8()? {
            b'"' => break,
            b'\\' => match istr.read_u8()? {
                b'u' => {
                    let mut code = read_hex4(istr)?;
                    if (0xd800..0xdc00).contains(&code) && istr.check_word(b"\\u")? {
                        let low = read_hex4(istr)?;
                        code = 0x10000 + ((code - 0xd800) << 10) + (low.wrapping_sub(0xdc00));
                    }
                    let c = char::from_u32(code)
                        .ok_or_else(|| Error::corruption("invalid code point in JSON string"))?;
                    let mut buf = [0_u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'b' => out.push(0x08),
                b'f' => out.push(0x0c),
                other => out.push(other),
            },
            b => out.push(b),
        }
    }
    into_string(out)
}

/// A bare numeric or keyword token such as `-1.5e3`, `nan` or `inf`.
pub fn read_token(istr: &mut dyn ReadBuffer) -> Result<String> {
    let mut out = Vec::new();
    while let Some(b) = istr.peek_byte() {
        if !(b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.' | b'_')) {
            break;
        }
        istr.skip(1)?;
        out.push(b);
    }
    if out.is_empty() {
        return Err(match istr.peek_byte() {
            Some(b) => Error::corruption(format!("expected a value, found '{}'", b.escape_ascii())),
            None => Error::corruption("expected a value, found end of stream"),
        });
    }
    into_string(out)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn written(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn escaped() {
        let s = "a\tb\n'c'\\";
        assert_eq!(
            written(|b| write_escaped_string(b, s)),
            r"a\tb\n\'c\'\\"
        );

        let mut src = Bytes::from(written(|b| write_escaped_string(b, s)) + "\tnext");
        assert_eq!(read_escaped_string(&mut src).unwrap(), s);
        assert_eq!(src.peek_byte(), Some(b'\t'));
    }

    #[test]
    fn quoted() {
        let mut src = Bytes::from(written(|b| write_quoted_string(b, "it's")));
        assert_eq!(read_quoted_string(&mut src).unwrap(), "it's");
        assert!(src.eof());

        let mut unterminated = Bytes::from_static(b"'abc");
        assert!(read_quoted_string(&mut unterminated).unwrap_err().is_corruption());
    }

    #[test]
    fn csv() {
        assert_eq!(written(|b| write_csv_string(b, r#"say "hi""#)), r#""say ""hi""""#);

        let mut src = Bytes::from_static(br#""say ""hi""",x"#);
        assert_eq!(read_csv_string(&mut src, b',').unwrap(), r#"say "hi""#);
        assert_eq!(src.peek_byte(), Some(b','));

        let mut bare = Bytes::from_static(b"abc;def");
        assert_eq!(read_csv_string(&mut bare, b';').unwrap(), "abc");
    }

    #[test]
    fn json() {
        let s = "q\"\u{1}\u{e9}\u{1F600}";
        assert_eq!(written(|b| write_json_string(b, s)), "\"q\\\"\\u0001\u{e9}\u{1F600}\"");

        let mut src = Bytes::from_static(br#""\u00e9\ud83d\ude00\n""#);
        assert_eq!(read_json_string(&mut src).unwrap(), "\u{e9}\u{1F600}\n");
    }

    #[test]
    fn xml() {
        assert_eq!(
            written(|b| write_xml_string(b, "<a href=\"x\">&</a>")),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn token() {
        let mut src = Bytes::from_static(b"-1.5e3,2");
        assert_eq!(read_token(&mut src).unwrap(), "-1.5e3");
        assert!(read_token(&mut src).unwrap_err().is_corruption());
    }
}

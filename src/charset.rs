//! Directory of wire charset numbers and their symbolic names.
//!
//! The ids are the server's default collation ids for each character set.
//! Connect validates that the negotiated charset appears here; queries
//! and identifiers travel as UTF-8, so text decoding is faithful for the
//! UTF-8-compatible sets and byte-preserving for the rest.

/// One character-set directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    pub number: u8,
    pub name: &'static str,
}

/// Charset sent when the configuration names none and the server default
/// is unusable (utf8_general_ci).
pub const DEFAULT_CHARSET_NUMBER: u8 = 33;

static CHARSETS: &[Charset] = &[
    Charset { number: 1, name: "big5" },
    Charset { number: 3, name: "dec8" },
    Charset { number: 4, name: "cp850" },
    Charset { number: 6, name: "hp8" },
    Charset { number: 7, name: "koi8r" },
    Charset { number: 8, name: "latin1" },
    Charset { number: 9, name: "latin2" },
    Charset { number: 10, name: "swe7" },
    Charset { number: 11, name: "ascii" },
    Charset { number: 12, name: "ujis" },
    Charset { number: 13, name: "sjis" },
    Charset { number: 16, name: "hebrew" },
    Charset { number: 18, name: "tis620" },
    Charset { number: 19, name: "euckr" },
    Charset { number: 22, name: "koi8u" },
    Charset { number: 24, name: "gb2312" },
    Charset { number: 25, name: "greek" },
    Charset { number: 26, name: "cp1250" },
    Charset { number: 28, name: "gbk" },
    Charset { number: 30, name: "latin5" },
    Charset { number: 32, name: "armscii8" },
    Charset { number: 33, name: "utf8" },
    Charset { number: 35, name: "ucs2" },
    Charset { number: 36, name: "cp866" },
    Charset { number: 37, name: "keybcs2" },
    Charset { number: 38, name: "macce" },
    Charset { number: 39, name: "macroman" },
    Charset { number: 40, name: "cp852" },
    Charset { number: 41, name: "latin7" },
    Charset { number: 45, name: "utf8mb4" },
    Charset { number: 51, name: "cp1251" },
    Charset { number: 57, name: "cp1256" },
    Charset { number: 59, name: "cp1257" },
    Charset { number: 63, name: "binary" },
    Charset { number: 92, name: "geostd8" },
    Charset { number: 95, name: "cp932" },
    Charset { number: 97, name: "eucjpms" },
];

/// Look up a charset by its wire number.
pub fn by_number(number: u8) -> Option<&'static Charset> {
    CHARSETS.iter().find(|c| c.number == number)
}

/// Look up a charset by symbolic name.
pub fn by_name(name: &str) -> Option<&'static Charset> {
    CHARSETS.iter().find(|c| c.name == name)
}

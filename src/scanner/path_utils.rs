//! Path key utilities.
//!
//! Every file in the index is keyed by one canonical string form of its path so
//! that the same file always maps to the same row, whichever root or working
//! directory it was reached from.
//!
//! # Key form
//!
//! - absolute (relative inputs are resolved against the current directory)
//! - lexically cleaned (`.` dropped, `..` folded into its parent)
//! - `/` as the only separator, also on Windows
//! - lossless: bytes (or, on Windows, UTF-16 units) that do not form valid text
//!   are stored as code points from `U+10F000` up, the tail of the last private
//!   use plane. A real character from that range is preceded by `U+10FFFF`.
//!
//! Symlinks are not resolved and Unicode is left as the filesystem reported it,
//! so [`key_to_path`] always gives back the exact path the key was built from.
//!
//! # Example
//!
//! ```
//! use imgdedup::scanner::path_utils::{file_name_of, folder_of};
//!
//! assert_eq!(folder_of("/photos/2020/beach.jpg"), "/photos/2020");
//! assert_eq!(file_name_of("/photos/2020/beach.jpg"), "beach.jpg");
//! ```

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

/// First code point standing in for a byte that is not valid text.
const RAW_BASE: u32 = 0x10_F000;

/// Offset of the range holding unpaired UTF-16 surrogates.
#[cfg(windows)]
const SURROGATE_OFFSET: u32 = 0x100;

/// Marks the following character as literal text.
const LITERAL_MARK: char = '\u{10FFFF}';

/// Build the index key for a filesystem path.
#[must_use]
pub fn index_key(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let cleaned = lexical_clean(&absolute);
    to_slash(&os_to_key_text(cleaned.as_os_str())).into_owned()
}

/// Replace the platform separator with `/`.
///
/// A no-op on platforms whose separator already is `/`.
#[must_use]
pub fn to_slash(s: &str) -> Cow<'_, str> {
    if MAIN_SEPARATOR == '\\' && s.contains('\\') {
        Cow::Owned(s.replace('\\', "/"))
    } else {
        Cow::Borrowed(s)
    }
}

/// Containing folder of a key: everything before the last `/`.
///
/// A file directly under the filesystem root yields `/`, and one directly under a
/// drive yields the drive with its slash (`C:/`). A key without any `/` has no
/// folder and yields the empty string.
#[must_use]
pub fn folder_of(key: &str) -> &str {
    match key.rfind('/') {
        None => "",
        Some(0) => "/",
        Some(idx) if key[..idx].ends_with(':') => &key[..=idx],
        Some(idx) => &key[..idx],
    }
}

/// Final component of a key.
#[must_use]
pub fn file_name_of(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

/// Turn a key back into a path the OS accepts.
///
/// Inverse of [`index_key`]: `key_to_path(&index_key(p))` is `p` made absolute
/// and lexically cleaned, byte for byte.
#[must_use]
pub fn key_to_path(key: &str) -> PathBuf {
    if key.chars().any(is_reserved) {
        PathBuf::from(decode_os(key))
    } else {
        PathBuf::from(key)
    }
}

/// Whether the file behind a key is definitely gone.
///
/// An existence check that itself fails (for example on a permission error up
/// the tree) does not count as missing.
#[must_use]
pub fn is_missing(key: &str) -> bool {
    matches!(key_to_path(key).try_exists(), Ok(false))
}

/// Case-insensitive extension check against an allow-list of bare extensions
/// (`"jpg"`, not `".jpg"`).
#[must_use]
pub fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

fn is_reserved(c: char) -> bool {
    u32::from(c) >= RAW_BASE
}

fn raw_char(offset: u32) -> char {
    char::from_u32(RAW_BASE + offset).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn push_literal(out: &mut String, c: char) {
    if is_reserved(c) {
        out.push(LITERAL_MARK);
    }
    out.push(c);
}

/// Text form of an OS string. Borrowed whenever no escaping is needed.
fn os_to_key_text(s: &OsStr) -> Cow<'_, str> {
    match s.to_str() {
        Some(text) if !text.chars().any(is_reserved) => Cow::Borrowed(text),
        _ => Cow::Owned(encode_os(s)),
    }
}

#[cfg(unix)]
fn encode_os(s: &OsStr) -> String {
    use std::os::unix::ffi::OsStrExt;

    let mut out = String::with_capacity(s.len());
    for chunk in s.as_bytes().utf8_chunks() {
        chunk.valid().chars().for_each(|c| push_literal(&mut out, c));
        for &byte in chunk.invalid() {
            out.push(raw_char(u32::from(byte)));
        }
    }
    out
}

#[cfg(windows)]
fn encode_os(s: &OsStr) -> String {
    use std::os::windows::ffi::OsStrExt;

    let mut out = String::with_capacity(s.len());
    for unit in char::decode_utf16(s.encode_wide()) {
        match unit {
            Ok(c) => push_literal(&mut out, c),
            Err(e) => {
                let offset = u32::from(e.unpaired_surrogate()) - 0xD800;
                out.push(raw_char(SURROGATE_OFFSET + offset));
            }
        }
    }
    out
}

#[cfg(not(any(unix, windows)))]
fn encode_os(s: &OsStr) -> String {
    let mut out = String::new();
    s.to_string_lossy().chars().for_each(|c| push_literal(&mut out, c));
    out
}

#[cfg(unix)]
fn decode_os(key: &str) -> OsString {
    use std::os::unix::ffi::OsStringExt;

    fn push_utf8(bytes: &mut Vec<u8>, c: char) {
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    let mut bytes = Vec::with_capacity(key.len());
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        if c == LITERAL_MARK {
            if let Some(next) = chars.next() {
                push_utf8(&mut bytes, next);
            }
        } else if is_reserved(c) {
            match u8::try_from(u32::from(c) - RAW_BASE) {
                Ok(byte) => bytes.push(byte),
                Err(_) => push_utf8(&mut bytes, c),
            }
        } else {
            push_utf8(&mut bytes, c);
        }
    }
    OsString::from_vec(bytes)
}

#[cfg(windows)]
fn decode_os(key: &str) -> OsString {
    use std::os::windows::ffi::OsStringExt;

    fn push_utf16(units: &mut Vec<u16>, c: char) {
        let mut buf = [0u16; 2];
        units.extend_from_slice(c.encode_utf16(&mut buf));
    }

    let mut units = Vec::with_capacity(key.len());
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        if c == LITERAL_MARK {
            if let Some(next) = chars.next() {
                push_utf16(&mut units, next);
            }
        } else if is_reserved(c) {
            let offset = u32::from(c) - RAW_BASE;
            match offset.checked_sub(SURROGATE_OFFSET).map(|o| u16::try_from(o + 0xD800)) {
                Some(Ok(unit @ 0xD800..=0xDFFF)) => units.push(unit),
                _ => push_utf16(&mut units, c),
            }
        } else {
            push_utf16(&mut units, c);
        }
    }
    OsString::from_wide(&units)
}

#[cfg(not(any(unix, windows)))]
fn decode_os(key: &str) -> OsString {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        if c == LITERAL_MARK {
            out.extend(chars.next());
        } else {
            out.push(c);
        }
    }
    OsString::from(out)
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root or a drive prefix.
                if matches!(
                    cleaned.components().next_back(),
                    Some(Component::Normal(_))
                ) {
                    cleaned.pop();
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

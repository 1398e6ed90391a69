//! Small cursor helpers shared by the resource and program codecs.

use std::io::Cursor;

pub(crate) fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    let len = cursor.get_ref().len();
    len.saturating_sub(cursor.position() as usize)
}

/// Borrow the next `len` bytes and advance past them.
pub(crate) fn take<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> Option<&'a [u8]> {
    let start = cursor.position() as usize;
    let end = start.checked_add(len)?;
    let bytes = cursor.get_ref().get(start..end)?;
    cursor.set_position(end as u64);
    Some(bytes)
}

/// One byte per character; every byte maps to the code point of the same value.
pub(crate) fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub(crate) fn encode_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(c).ok()).collect()
}

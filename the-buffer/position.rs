use std::fmt;

use ropey::RopeSlice;

/// A line/column pair in a document.
/// 0-indexed as all things should be. Columns count `char`s from the start of
/// the line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextLocation {
  pub line:   usize,
  pub column: usize,
}

impl TextLocation {
  pub const fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }

  pub const fn zero() -> Self {
    Self { line: 0, column: 0 }
  }

  pub const fn is_zero(&self) -> bool {
    self.line == 0 && self.column == 0
  }
}

impl From<(usize, usize)> for TextLocation {
  fn from(value: (usize, usize)) -> Self {
    TextLocation::new(value.0, value.1)
  }
}

impl fmt::Display for TextLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

/// Characters ropey treats as line breaks.
#[inline]
pub fn char_is_line_ending(ch: char) -> bool {
  matches!(
    ch,
    '\u{000A}' | '\u{000B}' | '\u{000C}' | '\u{000D}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
  )
}

pub fn str_has_line_ending(text: &str) -> bool {
  text.chars().any(char_is_line_ending)
}

/// Length of the line terminator at the end of `line` (0, 1 or 2 for CRLF).
pub fn line_delimiter_len(line: RopeSlice) -> usize {
  let len = line.len_chars();
  let Some(last) = len.checked_sub(1).and_then(|idx| line.get_char(idx)) else {
    return 0;
  };

  if !char_is_line_ending(last) {
    return 0;
  }

  if last == '\n' && len >= 2 && line.char(len - 2) == '\r' {
    2
  } else {
    1
  }
}

/// Number of chars on `line`, excluding its terminator.
pub fn line_content_len(line: RopeSlice) -> usize {
  line.len_chars() - line_delimiter_len(line)
}

/// Converts a char offset into a [`TextLocation`].
///
/// Offsets past the end of the text resolve to the end of the text.
pub fn location_at_offset(text: RopeSlice, offset: usize) -> TextLocation {
  let offset = offset.min(text.len_chars());
  let line = text.char_to_line(offset);
  TextLocation::new(line, offset - text.line_to_char(line))
}

/// Clamps `location` into the text: the line to `[0, len_lines - 1]` and the
/// column to `[0, line length]`.
pub fn clamp_location(text: RopeSlice, location: TextLocation) -> TextLocation {
  let line = location.line.min(text.len_lines().saturating_sub(1));
  let column = location.column.min(line_content_len(text.line(line)));
  TextLocation::new(line, column)
}

/// Converts a [`TextLocation`] into a char offset, clamping it first.
pub fn offset_at_location(text: RopeSlice, location: TextLocation) -> usize {
  let location = clamp_location(text, location);
  text.line_to_char(location.line) + location.column
}

#[cfg(test)]
mod tests {
  use ropey::Rope;

  use super::*;

  #[test]
  fn location_roundtrips_through_offsets() {
    let text = Rope::from("one\ntwo\r\nthree");
    let slice = text.slice(..);

    assert_eq!(location_at_offset(slice, 0), TextLocation::new(0, 0));
    assert_eq!(location_at_offset(slice, 5), TextLocation::new(1, 1));
    assert_eq!(location_at_offset(slice, 9), TextLocation::new(2, 0));
    assert_eq!(offset_at_location(slice, TextLocation::new(2, 3)), 12);
  }

  #[test]
  fn line_lengths_exclude_terminators() {
    let text = Rope::from("ab\ncd\r\nef");

    assert_eq!(line_content_len(text.line(0)), 2);
    assert_eq!(line_delimiter_len(text.line(0)), 1);
    assert_eq!(line_content_len(text.line(1)), 2);
    assert_eq!(line_delimiter_len(text.line(1)), 2);
    assert_eq!(line_content_len(text.line(2)), 2);
    assert_eq!(line_delimiter_len(text.line(2)), 0);
  }

  #[test]
  fn clamp_pulls_locations_into_the_text() {
    let text = Rope::from("a\nbb\nccc");
    let slice = text.slice(..);

    assert_eq!(
      clamp_location(slice, TextLocation::new(9999, 9999)),
      TextLocation::new(2, 3)
    );
    assert_eq!(
      clamp_location(slice, TextLocation::new(0, 40)),
      TextLocation::new(0, 1)
    );
  }

  #[test]
  fn empty_text_has_a_single_empty_line() {
    let text = Rope::new();
    let slice = text.slice(..);

    assert_eq!(
      clamp_location(slice, TextLocation::new(3, 3)),
      TextLocation::zero()
    );
    assert_eq!(offset_at_location(slice, TextLocation::new(3, 3)), 0);
  }
}

//! Terminal cell
//!
//! `CellData` is the unpacked view of one grid cell. Lines store cells as
//! packed words and load them into a reusable `CellData` on access.

use serde::{Deserialize, Serialize};

use super::attributes::{AttributeData, ExtendedAttrs};
use super::constants::{
    CODEPOINT_MASK, HAS_CONTENT_MASK, IS_COMBINED_MASK, NULL_CELL_CHAR, NULL_CELL_CODE,
    NULL_CELL_WIDTH, WHITESPACE_CELL_CHAR, WHITESPACE_CELL_CODE, WHITESPACE_CELL_WIDTH,
    WIDTH_MASK, WIDTH_SHIFT,
};

/// Legacy tuple view of a cell: `(attr, chars, width, code)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharData {
    pub attr: u32,
    pub chars: String,
    pub width: u32,
    pub code: u32,
}

impl CharData {
    pub fn new(attr: u32, chars: &str, width: u32, code: u32) -> Self {
        Self {
            attr,
            chars: chars.to_string(),
            width,
            code,
        }
    }

    /// An empty cell
    pub fn null() -> Self {
        Self::new(0, NULL_CELL_CHAR, NULL_CELL_WIDTH, NULL_CELL_CODE)
    }

    /// A blank cell holding a space
    pub fn whitespace() -> Self {
        Self::new(0, WHITESPACE_CELL_CHAR, WHITESPACE_CELL_WIDTH, WHITESPACE_CELL_CODE)
    }
}

/// A single cell: packed content word, attributes and combined text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellData {
    /// Codepoint, combined flag and width
    pub content: u32,
    pub attr: AttributeData,
    /// Full text when `IS_COMBINED_MASK` is set
    pub combined_data: String,
}

impl CellData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty cell with the given attributes, used to fill erased space
    pub fn null(attr: AttributeData) -> Self {
        Self {
            content: NULL_CELL_WIDTH << WIDTH_SHIFT,
            attr,
            combined_data: String::new(),
        }
    }

    /// Space cell with the given attributes
    pub fn whitespace(attr: AttributeData) -> Self {
        Self {
            content: WHITESPACE_CELL_CODE | WHITESPACE_CELL_WIDTH << WIDTH_SHIFT,
            attr,
            combined_data: String::new(),
        }
    }

    pub fn from_char_data(value: &CharData) -> Self {
        let mut cell = Self::new();
        cell.set_from_char_data(value);
        cell
    }

    /// Cell holding `text`; `width` defaults to 1, or 0 for empty text
    pub fn from_char(text: &str, width: Option<u32>, fg: u32) -> Self {
        let mut cell = Self::new();
        cell.set_from_char(text, width, fg);
        cell
    }

    pub fn set_from_char(&mut self, text: &str, width: Option<u32>, fg: u32) {
        let width = width.unwrap_or(if text.is_empty() { 0 } else { 1 });
        self.attr = AttributeData::new(fg, 0);
        let mut chars = text.chars();
        let first = chars.next().map_or(0, |c| c as u32);
        let mut code = first;
        if chars.next().is_some() {
            self.combined_data = text.to_string();
            code |= IS_COMBINED_MASK;
        } else {
            self.combined_data.clear();
        }
        self.content = code | (width << WIDTH_SHIFT & WIDTH_MASK);
    }

    pub fn set_from_char_data(&mut self, value: &CharData) {
        self.set_from_char(&value.chars, Some(value.width), value.attr);
    }

    pub fn char_data(&self) -> CharData {
        CharData {
            attr: self.attr.fg,
            chars: self.chars(),
            width: self.width(),
            code: self.code(),
        }
    }

    /// Copy content and attributes from `src`
    pub fn copy_from(&mut self, src: &CellData) {
        self.content = src.content;
        self.attr = src.attr;
        self.combined_data.clear();
        self.combined_data.push_str(&src.combined_data);
    }

    pub fn is_combined(&self) -> bool {
        self.content & IS_COMBINED_MASK != 0
    }

    pub fn width(&self) -> u32 {
        (self.content & WIDTH_MASK) >> WIDTH_SHIFT
    }

    pub fn has_content(&self) -> bool {
        self.content & HAS_CONTENT_MASK != 0
    }

    /// Text of the cell, empty for null cells and wide-char placeholders
    pub fn chars(&self) -> String {
        if self.is_combined() {
            return self.combined_data.clone();
        }
        match self.content & CODEPOINT_MASK {
            0 => String::new(),
            cp => char::from_u32(cp).map(String::from).unwrap_or_default(),
        }
    }

    /// Codepoint of the cell, the last one for combined text
    pub fn code(&self) -> u32 {
        if self.is_combined() {
            return self.combined_data.chars().last().map_or(0, |c| c as u32);
        }
        self.content & CODEPOINT_MASK
    }

    pub fn extended(&self) -> &ExtendedAttrs {
        &self.attr.extended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_char() {
        let cell = CellData::from_char("a", None, 0);
        assert_eq!(cell.chars(), "a");
        assert_eq!(cell.width(), 1);
        assert_eq!(cell.code(), 'a' as u32);
        assert!(!cell.is_combined());

        let wide = CellData::from_char("\u{1f600}", Some(2), 0);
        assert_eq!(wide.width(), 2);
        assert_eq!(wide.code(), 0x1f600);
        assert!(!wide.is_combined());
    }

    #[test]
    fn test_combined() {
        let cell = CellData::from_char("e\u{301}", Some(1), 0);
        assert!(cell.is_combined());
        assert_eq!(cell.chars(), "e\u{301}");
        assert_eq!(cell.code(), 0x301);
    }

    #[test]
    fn test_char_data_roundtrip() {
        let data = CharData::new(123, "x", 1, 'x' as u32);
        let cell = CellData::from_char_data(&data);
        assert_eq!(cell.char_data(), data);
        assert_eq!(CellData::from_char_data(&CharData::null()).char_data(), CharData::null());
    }

    #[test]
    fn test_null_and_whitespace() {
        let null = CellData::null(AttributeData::default());
        assert!(!null.has_content());
        assert_eq!(null.width(), 1);
        let ws = CellData::whitespace(AttributeData::default());
        assert_eq!(ws.chars(), " ");
    }
}

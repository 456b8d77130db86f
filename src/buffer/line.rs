//! Packed terminal line
//!
//! A `BufferLine` stores its cells as `CELL_SIZE` consecutive `u32` words
//! (content, fg, bg). Combined text and extended attributes live in side
//! maps keyed by column; a map entry exists exactly when the matching bit
//! (`IS_COMBINED_MASK` on content, `HAS_EXTENDED` on bg) is set.
//!
//! Wide characters occupy two columns: the first carries the codepoint with
//! width 2, the second is a placeholder with width 0 and no content. Every
//! mutating operation that could separate the two halves blanks the
//! orphaned half.

use std::collections::HashMap;

use super::attributes::{AttributeData, ExtendedAttrs};
use super::cell::{CellData, CharData};
use super::constants::{
    BgFlags, CM_MASK, CODEPOINT_MASK, HAS_CONTENT_MASK, IS_COMBINED_MASK, WHITESPACE_CELL_CHAR,
    WIDTH_MASK, WIDTH_SHIFT,
};

/// Words per cell
pub const CELL_SIZE: usize = 3;

const CONTENT: usize = 0;
const FG: usize = 1;
const BG: usize = 2;

/// Shrink the backing storage once it is this many times larger than needed
const CLEANUP_THRESHOLD: usize = 2;

/// A row of packed cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLine {
    data: Vec<u32>,
    combined: HashMap<usize, String>,
    extended_attrs: HashMap<usize, ExtendedAttrs>,
    length: usize,
    /// Soft-wrapped continuation of the previous line
    pub is_wrapped: bool,
}

impl BufferLine {
    /// Create a line of `cols` cells, filled with `fill` or null cells
    pub fn new(cols: usize, fill: Option<&CellData>, is_wrapped: bool) -> Self {
        let mut line = Self {
            data: vec![0; cols * CELL_SIZE],
            combined: HashMap::new(),
            extended_attrs: HashMap::new(),
            length: cols,
            is_wrapped,
        };
        let null = CellData::null(AttributeData::default());
        let fill = fill.unwrap_or(&null);
        for i in 0..cols {
            line.set_cell(i, fill);
        }
        line
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    fn word(&self, index: usize, field: usize) -> u32 {
        self.data[index * CELL_SIZE + field]
    }

    /// Legacy tuple view of a cell
    pub fn get(&self, index: usize) -> CharData {
        let content = self.word(index, CONTENT);
        let cp = content & CODEPOINT_MASK;
        let (chars, code) = if content & IS_COMBINED_MASK != 0 {
            let text = self.combined.get(&index).cloned().unwrap_or_default();
            let code = text.chars().last().map_or(0, |c| c as u32);
            (text, code)
        } else {
            (char::from_u32(cp).filter(|_| cp != 0).map(String::from).unwrap_or_default(), cp)
        };
        CharData {
            attr: self.word(index, FG),
            chars,
            width: content >> WIDTH_SHIFT,
            code,
        }
    }

    /// Set a cell from its legacy tuple view
    pub fn set(&mut self, index: usize, value: &CharData) {
        let base = index * CELL_SIZE;
        self.data[base + FG] = value.attr;
        let mut chars = value.chars.chars();
        let first = chars.next().map_or(0, |c| c as u32);
        if chars.next().is_some() {
            self.combined.insert(index, value.chars.clone());
            self.data[base + CONTENT] = first | IS_COMBINED_MASK | value.width << WIDTH_SHIFT;
        } else {
            self.combined.remove(&index);
            self.data[base + CONTENT] = first | value.width << WIDTH_SHIFT;
        }
    }

    pub fn get_width(&self, index: usize) -> u32 {
        self.word(index, CONTENT) >> WIDTH_SHIFT
    }

    pub fn has_width(&self, index: usize) -> bool {
        self.word(index, CONTENT) & WIDTH_MASK != 0
    }

    pub fn get_fg(&self, index: usize) -> u32 {
        self.word(index, FG)
    }

    pub fn get_bg(&self, index: usize) -> u32 {
        self.word(index, BG)
    }

    /// Whether the cell holds any text (it may still carry colors)
    pub fn has_content(&self, index: usize) -> bool {
        self.word(index, CONTENT) & HAS_CONTENT_MASK != 0
    }

    /// Codepoint of the cell, the last one for combined text
    pub fn get_code_point(&self, index: usize) -> u32 {
        let content = self.word(index, CONTENT);
        if content & IS_COMBINED_MASK != 0 {
            return self
                .combined
                .get(&index)
                .and_then(|s| s.chars().last())
                .map_or(0, |c| c as u32);
        }
        content & CODEPOINT_MASK
    }

    pub fn is_combined(&self, index: usize) -> bool {
        self.word(index, CONTENT) & IS_COMBINED_MASK != 0
    }

    pub fn get_string(&self, index: usize) -> String {
        let content = self.word(index, CONTENT);
        if content & IS_COMBINED_MASK != 0 {
            return self.combined.get(&index).cloned().unwrap_or_default();
        }
        match content & CODEPOINT_MASK {
            0 => String::new(),
            cp => char::from_u32(cp).map(String::from).unwrap_or_default(),
        }
    }

    pub fn is_protected(&self, index: usize) -> bool {
        self.word(index, BG) & BgFlags::PROTECTED.bits() != 0
    }

    /// Load a cell into `cell` without allocating a new one
    pub fn load_cell<'a>(&self, index: usize, cell: &'a mut CellData) -> &'a mut CellData {
        let base = index * CELL_SIZE;
        cell.content = self.data[base + CONTENT];
        cell.attr.fg = self.data[base + FG];
        cell.attr.bg = self.data[base + BG];
        cell.combined_data.clear();
        if cell.content & IS_COMBINED_MASK != 0 {
            if let Some(text) = self.combined.get(&index) {
                cell.combined_data.push_str(text);
            }
        }
        cell.attr.extended = if cell.attr.bg & BgFlags::HAS_EXTENDED.bits() != 0 {
            self.extended_attrs.get(&index).copied().unwrap_or_default()
        } else {
            ExtendedAttrs::default()
        };
        cell
    }

    /// Store `cell` at `index`
    pub fn set_cell(&mut self, index: usize, cell: &CellData) {
        if cell.content & IS_COMBINED_MASK != 0 {
            self.combined.insert(index, cell.combined_data.clone());
        } else {
            self.combined.remove(&index);
        }
        if cell.attr.bg & BgFlags::HAS_EXTENDED.bits() != 0 {
            self.extended_attrs.insert(index, cell.attr.extended);
        } else {
            self.extended_attrs.remove(&index);
        }
        let base = index * CELL_SIZE;
        self.data[base + CONTENT] = cell.content;
        self.data[base + FG] = cell.attr.fg;
        self.data[base + BG] = cell.attr.bg;
    }

    /// Store a single codepoint with attributes; the fast path for printing
    pub fn set_cell_from_codepoint(&mut self, index: usize, codepoint: u32, width: u32, attrs: &AttributeData) {
        if attrs.bg & BgFlags::HAS_EXTENDED.bits() != 0 {
            self.extended_attrs.insert(index, attrs.extended);
        } else {
            self.extended_attrs.remove(&index);
        }
        self.combined.remove(&index);
        let base = index * CELL_SIZE;
        self.data[base + CONTENT] = codepoint | width << WIDTH_SHIFT;
        self.data[base + FG] = attrs.fg;
        self.data[base + BG] = attrs.bg;
    }

    /// Append a combining codepoint to a cell
    ///
    /// An empty cell takes the codepoint as its content. A non-zero `width`
    /// replaces the cell width, which lets emoji presentation selectors widen
    /// the preceding character.
    pub fn add_codepoint_to_cell(&mut self, index: usize, codepoint: u32, width: u32) {
        let base = index * CELL_SIZE;
        let mut content = self.data[base + CONTENT];
        let ch = char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER);
        if content & IS_COMBINED_MASK != 0 {
            self.combined.entry(index).or_default().push(ch);
        } else if content & CODEPOINT_MASK != 0 {
            let mut text = String::new();
            text.push(char::from_u32(content & CODEPOINT_MASK).unwrap_or(char::REPLACEMENT_CHARACTER));
            text.push(ch);
            self.combined.insert(index, text);
            content |= IS_COMBINED_MASK;
        } else {
            content = codepoint | 1 << WIDTH_SHIFT;
        }
        if width != 0 {
            content &= !WIDTH_MASK;
            content |= width << WIDTH_SHIFT;
        }
        self.data[base + CONTENT] = content;
    }

    /// Insert `n` cells at `pos`, shifting the rest right; cells pushed past
    /// the end are lost
    pub fn insert_cells(&mut self, pos: usize, n: usize, fill: &CellData) {
        if self.length == 0 {
            return;
        }
        let pos = pos % self.length;

        // a wide char left of pos loses its placeholder
        if pos > 0 && self.get_width(pos - 1) == 2 {
            self.set_cell_from_codepoint(pos - 1, 0, 1, &fill.attr);
        }

        if n < self.length - pos {
            let mut cell = CellData::new();
            for i in (0..self.length - pos - n).rev() {
                self.load_cell(pos + i, &mut cell);
                self.set_cell(pos + n + i, &cell);
            }
            for i in 0..n {
                self.set_cell(pos + i, fill);
            }
        } else {
            for i in pos..self.length {
                self.set_cell(i, fill);
            }
        }

        // a wide char shifted onto the last column loses its placeholder
        let last = self.length - 1;
        if self.get_width(last) == 2 {
            self.set_cell_from_codepoint(last, 0, 1, &fill.attr);
        }
    }

    /// Delete `n` cells at `pos`, shifting the rest left and filling the end
    pub fn delete_cells(&mut self, pos: usize, n: usize, fill: &CellData) {
        if self.length == 0 {
            return;
        }
        let pos = pos % self.length;
        if n < self.length - pos {
            let mut cell = CellData::new();
            for i in 0..self.length - pos - n {
                self.load_cell(pos + n + i, &mut cell);
                self.set_cell(pos + i, &cell);
            }
            for i in self.length - n..self.length {
                self.set_cell(i, fill);
            }
        } else {
            for i in pos..self.length {
                self.set_cell(i, fill);
            }
        }

        if pos > 0 && self.get_width(pos - 1) == 2 {
            self.set_cell_from_codepoint(pos - 1, 0, 1, &fill.attr);
        }
        // a placeholder shifted onto pos has lost its wide char
        if self.get_width(pos) == 0 && !self.has_content(pos) {
            self.set_cell_from_codepoint(pos, 0, 1, &fill.attr);
        }
    }

    /// Overwrite cells `start..end` with `fill`
    ///
    /// With `respect_protect`, cells carrying `BgFlags::PROTECTED` keep
    /// their content.
    pub fn replace_cells(&mut self, start: usize, end: usize, fill: &CellData, respect_protect: bool) {
        let mut start = start;
        if respect_protect {
            if start > 0 && start <= self.length && self.get_width(start - 1) == 2 && !self.is_protected(start - 1) {
                self.set_cell_from_codepoint(start - 1, 0, 1, &fill.attr);
            }
            if end > 0 && end < self.length && self.get_width(end - 1) == 2 && !self.is_protected(end) {
                self.set_cell_from_codepoint(end, 0, 1, &fill.attr);
            }
            while start < end && start < self.length {
                if !self.is_protected(start) {
                    self.set_cell(start, fill);
                }
                start += 1;
            }
            return;
        }

        if start > 0 && start <= self.length && self.get_width(start - 1) == 2 {
            self.set_cell_from_codepoint(start - 1, 0, 1, &fill.attr);
        }
        if end > 0 && end < self.length && self.get_width(end - 1) == 2 {
            self.set_cell_from_codepoint(end, 0, 1, &fill.attr);
        }
        while start < end && start < self.length {
            self.set_cell(start, fill);
            start += 1;
        }
    }

    /// Resize to `cols`, filling new cells with `fill`
    ///
    /// Returns true when the backing storage is oversized and
    /// [`BufferLine::cleanup_memory`] would release memory.
    pub fn resize(&mut self, cols: usize, fill: &CellData) -> bool {
        if cols == self.length {
            return self.data.len() * CLEANUP_THRESHOLD < self.data.capacity();
        }
        if cols > self.length {
            let old = self.length;
            self.data.resize(cols * CELL_SIZE, 0);
            self.length = cols;
            for i in old..cols {
                self.set_cell(i, fill);
            }
        } else {
            self.data.truncate(cols * CELL_SIZE);
            self.combined.retain(|&k, _| k < cols);
            self.extended_attrs.retain(|&k, _| k < cols);
            self.length = cols;
            // a wide char cut off from its placeholder
            if cols > 0 && self.get_width(cols - 1) == 2 {
                self.set_cell(cols - 1, fill);
            }
        }
        self.data.len() * CLEANUP_THRESHOLD < self.data.capacity()
    }

    /// Release excess storage, returns 1 if memory was freed
    pub fn cleanup_memory(&mut self) -> usize {
        if self.data.len() * CLEANUP_THRESHOLD < self.data.capacity() {
            self.data.shrink_to_fit();
            return 1;
        }
        0
    }

    /// Fill the whole line with `fill`
    pub fn fill(&mut self, fill: &CellData, respect_protect: bool) {
        if respect_protect {
            for i in 0..self.length {
                if !self.is_protected(i) {
                    self.set_cell(i, fill);
                }
            }
            return;
        }
        self.combined.clear();
        self.extended_attrs.clear();
        for i in 0..self.length {
            self.set_cell(i, fill);
        }
    }

    /// Become a full copy of `line`
    pub fn copy_from(&mut self, line: &BufferLine) {
        self.data.clone_from(&line.data);
        self.combined.clone_from(&line.combined);
        self.extended_attrs.clone_from(&line.extended_attrs);
        self.length = line.length;
        self.is_wrapped = line.is_wrapped;
    }

    /// Column after the last cell with content, wide chars counted in full
    pub fn get_trimmed_length(&self) -> usize {
        for i in (0..self.length).rev() {
            let content = self.word(i, CONTENT);
            if content & HAS_CONTENT_MASK != 0 {
                return i + (content >> WIDTH_SHIFT) as usize;
            }
        }
        0
    }

    /// Like [`BufferLine::get_trimmed_length`], also counting colored blanks
    pub fn get_no_bg_trimmed_length(&self) -> usize {
        for i in (0..self.length).rev() {
            let content = self.word(i, CONTENT);
            if content & HAS_CONTENT_MASK != 0 || self.word(i, BG) & CM_MASK != 0 {
                return i + (content >> WIDTH_SHIFT) as usize;
            }
        }
        0
    }

    /// Copy `length` cells from `src` starting at `src_col` to `dest_col`
    ///
    /// `apply_in_reverse` copies right to left, needed when `src` is this
    /// line's own snapshot and the ranges overlap to the right.
    pub fn copy_cells_from(
        &mut self,
        src: &BufferLine,
        src_col: usize,
        dest_col: usize,
        length: usize,
        apply_in_reverse: bool,
    ) {
        let mut cell = CellData::new();
        if apply_in_reverse {
            for i in (0..length).rev() {
                src.load_cell(src_col + i, &mut cell);
                self.set_cell(dest_col + i, &cell);
            }
        } else {
            for i in 0..length {
                src.load_cell(src_col + i, &mut cell);
                self.set_cell(dest_col + i, &cell);
            }
        }
    }

    /// Text of the columns `start_col..end_col`
    ///
    /// Null cells render as spaces. With `trim_right` the range stops at the
    /// trimmed length. `out_columns`, if given, receives the source column
    /// of every char in the result plus one final entry for the end column.
    pub fn translate_to_string(
        &self,
        trim_right: bool,
        start_col: usize,
        end_col: Option<usize>,
        mut out_columns: Option<&mut Vec<usize>>,
    ) -> String {
        let mut end_col = end_col.unwrap_or(self.length).min(self.length);
        if trim_right {
            end_col = end_col.min(self.get_trimmed_length());
        }
        if let Some(cols) = out_columns.as_deref_mut() {
            cols.clear();
        }
        let mut result = String::new();
        let mut col = start_col;
        while col < end_col {
            let content = self.word(col, CONTENT);
            let cp = content & CODEPOINT_MASK;
            let before = result.chars().count();
            if content & IS_COMBINED_MASK != 0 {
                if let Some(text) = self.combined.get(&col) {
                    result.push_str(text);
                }
            } else if cp != 0 {
                result.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
            } else {
                result.push_str(WHITESPACE_CELL_CHAR);
            }
            if let Some(cols) = out_columns.as_deref_mut() {
                let added = result.chars().count() - before;
                cols.extend(std::iter::repeat(col).take(added));
            }
            col += ((content >> WIDTH_SHIFT) as usize).max(1);
        }
        if let Some(cols) = out_columns {
            cols.push(col);
        }
        result
    }
}

//! Terminal buffer
//!
//! The buffer is the line list plus everything the input handler mutates
//! alongside it: cursor, scroll region, tab stops, the current SGR state,
//! saved cursor, title, pending replies and the hyperlink registry.
//!
//! Rows are addressed two ways. Viewport rows (`y`) are relative to
//! `ybase`, absolute rows index straight into `lines`. Rows above `ybase`
//! are scrollback.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::attributes::AttributeData;
use super::cell::CellData;
use super::circular_list::CircularList;
use super::constants::FLAGS_MASK;
use super::line::BufferLine;
use super::marker::{MarkerId, MarkerSet};

/// Default distance between tab stops
pub const TAB_WIDTH: usize = 8;

/// Cursor state saved by DECSC / SCOSC
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCursor {
    pub x: usize,
    pub y: usize,
    pub attr: AttributeData,
}

/// OSC 8 link targets keyed by the id stored in cell attributes
///
/// Id 0 means "no link". Links opened with an explicit `id=` parameter and
/// the same uri share an entry.
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    entries: Vec<LinkEntry>,
}

#[derive(Debug, Clone)]
struct LinkEntry {
    key: Option<String>,
    uri: String,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link and return its id
    pub fn register(&mut self, id: Option<&str>, uri: &str) -> u32 {
        if let Some(id) = id {
            let key = format!("{id};;{uri}");
            if let Some(pos) = self
                .entries
                .iter()
                .position(|e| e.key.as_deref() == Some(key.as_str()))
            {
                return pos as u32 + 1;
            }
            self.entries.push(LinkEntry {
                key: Some(key),
                uri: uri.to_string(),
            });
        } else {
            self.entries.push(LinkEntry {
                key: None,
                uri: uri.to_string(),
            });
        }
        self.entries.len() as u32
    }

    pub fn uri(&self, id: u32) -> Option<&str> {
        let index = (id as usize).checked_sub(1)?;
        self.entries.get(index).map(|e| e.uri.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Line list with cursor and scroll state
#[derive(Debug)]
pub struct Buffer {
    pub lines: CircularList<BufferLine>,
    cols: usize,
    rows: usize,
    scrollback: usize,
    /// Absolute row of the top viewport line
    pub ybase: usize,
    /// Absolute row shown at the top of the display
    pub ydisp: usize,
    /// Cursor column; equals `cols` while a wrap is pending
    pub x: usize,
    /// Cursor row, relative to `ybase`
    pub y: usize,
    pub scroll_top: usize,
    pub scroll_bottom: usize,
    tabs: Vec<bool>,
    pub saved: SavedCursor,
    /// Attributes applied to printed cells
    pub cur_attr: AttributeData,
    /// DECAWM
    pub wraparound: bool,
    /// IRM
    pub insert_mode: bool,
    /// Last printed codepoint, repeated by REP
    pub preceding_codepoint: u32,
    pub bell_count: usize,
    pub title: String,
    pub links: LinkRegistry,
    markers: Rc<RefCell<MarkerSet>>,
    replies: VecDeque<String>,
}

impl Buffer {
    /// Create a buffer of `cols` x `rows` keeping `scrollback` extra rows
    pub fn new(cols: usize, rows: usize, scrollback: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut lines = CircularList::new(rows + scrollback);
        let markers = MarkerSet::attach(&mut lines);
        let mut buffer = Self {
            lines,
            cols,
            rows,
            scrollback,
            ybase: 0,
            ydisp: 0,
            x: 0,
            y: 0,
            scroll_top: 0,
            scroll_bottom: rows - 1,
            tabs: Vec::new(),
            saved: SavedCursor::default(),
            cur_attr: AttributeData::default(),
            wraparound: true,
            insert_mode: false,
            preceding_codepoint: 0,
            bell_count: 0,
            title: String::new(),
            links: LinkRegistry::new(),
            markers,
            replies: VecDeque::new(),
        };
        buffer.setup_tab_stops(0);
        buffer.fill_viewport_rows(None);
        buffer
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn scrollback(&self) -> usize {
        self.scrollback
    }

    /// Append blank rows until the viewport is covered
    pub fn fill_viewport_rows(&mut self, fill_attr: Option<&AttributeData>) {
        if !self.lines.is_empty() {
            return;
        }
        let blank = self.get_blank_line(fill_attr.copied().unwrap_or_default(), false);
        for _ in 0..self.rows {
            self.lines.push(blank.clone());
        }
    }

    /// Empty cell carrying the colors of `attr`
    pub fn get_null_cell(&self, attr: AttributeData) -> CellData {
        CellData::null(attr)
    }

    /// Space cell carrying the colors of `attr`
    pub fn get_whitespace_cell(&self, attr: AttributeData) -> CellData {
        CellData::whitespace(attr)
    }

    pub fn get_blank_line(&self, attr: AttributeData, is_wrapped: bool) -> BufferLine {
        BufferLine::new(self.cols, Some(&self.get_null_cell(attr)), is_wrapped)
    }

    /// Attributes used to erase cells: the current background color only
    pub fn erase_attr(&self) -> AttributeData {
        AttributeData::new(0, self.cur_attr.bg & !FLAGS_MASK)
    }

    /// Absolute index of viewport row `y`
    pub fn absolute_y(&self, y: usize) -> usize {
        self.ybase + y
    }

    /// Viewport row `y`
    pub fn line(&self, y: usize) -> Option<&BufferLine> {
        self.lines.get(self.ybase + y)
    }

    pub fn line_mut(&mut self, y: usize) -> Option<&mut BufferLine> {
        self.lines.get_mut(self.ybase + y)
    }

    /// Row under the cursor
    pub fn cursor_line_mut(&mut self) -> Option<&mut BufferLine> {
        self.line_mut(self.y)
    }

    /// Scroll the scroll region up by one row
    ///
    /// With the region at the top of the screen, the top row moves into
    /// scrollback; the oldest scrollback row is recycled once the list is
    /// full. Otherwise rows rotate inside the region and the top one is
    /// discarded.
    pub fn scroll(&mut self, erase_attr: AttributeData, is_wrapped: bool) {
        let new_line = self.get_blank_line(erase_attr, is_wrapped);
        let top_row = self.ybase + self.scroll_top;
        let bottom_row = self.ybase + self.scroll_bottom;

        if self.scroll_top == 0 {
            let will_trim = self.lines.is_full();
            if bottom_row + 1 == self.lines.len() {
                if will_trim {
                    if let Ok(line) = self.lines.recycle() {
                        line.copy_from(&new_line);
                    }
                } else {
                    self.lines.push(new_line);
                }
            } else {
                self.lines.splice(bottom_row + 1, 0, vec![new_line]);
            }
            if !will_trim {
                self.ybase += 1;
            }
            self.ydisp = self.ybase;
        } else {
            self.rotate_up(top_row, bottom_row, 1);
            if let Some(line) = self.lines.get_mut(bottom_row) {
                line.copy_from(&new_line);
            }
        }
    }

    /// Scroll viewport rows `top..=bottom` up by `n`, blanking the bottom
    ///
    /// Nothing enters scrollback.
    pub fn scroll_region_up(&mut self, top: usize, bottom: usize, n: usize, attr: AttributeData) {
        if top > bottom || bottom >= self.rows {
            return;
        }
        let n = n.min(bottom - top + 1);
        let (top, bottom) = (self.ybase + top, self.ybase + bottom);
        self.rotate_up(top, bottom, n);
        self.blank_rows(bottom + 1 - n, bottom, attr);
    }

    /// Scroll viewport rows `top..=bottom` down by `n`, blanking the top
    pub fn scroll_region_down(&mut self, top: usize, bottom: usize, n: usize, attr: AttributeData) {
        if top > bottom || bottom >= self.rows {
            return;
        }
        let n = n.min(bottom - top + 1);
        let (top, bottom) = (self.ybase + top, self.ybase + bottom);
        for i in (top + n..=bottom).rev() {
            self.lines.swap(i, i - n);
        }
        self.blank_rows(top, top + n - 1, attr);
    }

    fn rotate_up(&mut self, top: usize, bottom: usize, n: usize) {
        if n == 0 || bottom < top + n {
            return;
        }
        for i in top..=bottom - n {
            self.lines.swap(i, i + n);
        }
    }

    fn blank_rows(&mut self, from: usize, to: usize, attr: AttributeData) {
        let blank = self.get_blank_line(attr, false);
        for i in from..=to {
            if let Some(line) = self.lines.get_mut(i) {
                line.copy_from(&blank);
            }
        }
    }

    /// Move the cursor one row down, scrolling at the bottom margin
    pub fn index(&mut self) {
        if self.y == self.scroll_bottom {
            self.scroll(self.erase_attr(), false);
        } else if self.y + 1 < self.rows {
            self.y += 1;
        }
    }

    /// Move the cursor one row up, scrolling down at the top margin
    pub fn reverse_index(&mut self) {
        if self.y == self.scroll_top {
            let attr = self.erase_attr();
            self.scroll_region_down(self.scroll_top, self.scroll_bottom, 1, attr);
        } else if self.y > 0 {
            self.y -= 1;
        }
    }

    /// Clamp the cursor into the grid; a pending wrap is cancelled
    pub fn restrict_cursor(&mut self) {
        self.x = self.x.min(self.cols - 1);
        self.y = self.y.min(self.rows - 1);
    }

    /// Resize without reflow
    ///
    /// Growing pulls rows back from scrollback while there is any, shrinking
    /// pushes rows above the cursor into scrollback.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let fill = self.get_null_cell(AttributeData::default());

        if cols != self.cols {
            for i in 0..self.lines.len() {
                if let Some(line) = self.lines.get_mut(i) {
                    if line.resize(cols, &fill) {
                        line.cleanup_memory();
                    }
                }
            }
        }
        self.cols = cols;

        let new_max = rows + self.scrollback;
        if rows > self.rows {
            if self.lines.max_length() < new_max {
                self.lines.set_max_length(new_max);
            }
            for _ in self.rows..rows {
                if self.lines.len() < self.ybase + rows {
                    if self.ybase > 0 && self.lines.len() <= self.ybase + self.y + 1 {
                        self.ybase -= 1;
                        self.y += 1;
                    } else {
                        self.lines.push(BufferLine::new(cols, Some(&fill), false));
                    }
                }
            }
        } else {
            for _ in rows..self.rows {
                if self.lines.len() > rows + self.ybase {
                    if self.lines.len() > self.ybase + self.y + 1 {
                        self.lines.pop();
                    } else {
                        self.ybase += 1;
                        self.y = self.y.saturating_sub(1);
                    }
                }
            }
        }

        if new_max < self.lines.max_length() {
            let trimmed = self.lines.len().saturating_sub(new_max);
            self.lines.set_max_length(new_max);
            self.ybase = self.ybase.saturating_sub(trimmed);
        }
        self.ydisp = self.ybase;
        self.rows = rows;

        self.x = self.x.min(cols - 1);
        self.y = self.y.min(rows - 1);
        self.saved.x = self.saved.x.min(cols - 1);
        self.saved.y = self.saved.y.min(rows - 1);
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.setup_tab_stops(0);
    }

    /// Drop all content and state, keeping the dimensions
    pub fn clear(&mut self) {
        self.ybase = 0;
        self.ydisp = 0;
        self.x = 0;
        self.y = 0;
        self.scroll_top = 0;
        self.scroll_bottom = self.rows - 1;
        self.saved = SavedCursor::default();
        self.cur_attr = AttributeData::default();
        self.wraparound = true;
        self.insert_mode = false;
        self.preceding_codepoint = 0;
        self.title.clear();
        self.links.clear();
        self.replies.clear();
        let count = self.lines.len();
        self.lines.trim_start(count);
        self.markers.borrow_mut().clear();
        self.setup_tab_stops(0);
        self.fill_viewport_rows(None);
    }

    /// Reset tab stops from column `from` onwards to every `TAB_WIDTH`
    pub fn setup_tab_stops(&mut self, from: usize) {
        if from == 0 {
            self.tabs = vec![false; self.cols];
        } else {
            self.tabs.resize(self.cols, false);
        }
        let mut i = from - from % TAB_WIDTH;
        while i < self.cols {
            self.tabs[i] = true;
            i += TAB_WIDTH;
        }
    }

    pub fn set_tab_stop(&mut self, x: usize) {
        if let Some(stop) = self.tabs.get_mut(x) {
            *stop = true;
        }
    }

    pub fn clear_tab_stop(&mut self, x: usize) {
        if let Some(stop) = self.tabs.get_mut(x) {
            *stop = false;
        }
    }

    pub fn clear_all_tab_stops(&mut self) {
        self.tabs.iter_mut().for_each(|t| *t = false);
    }

    pub fn is_tab_stop(&self, x: usize) -> bool {
        self.tabs.get(x).copied().unwrap_or(false)
    }

    /// Next tab stop right of `x`, or the last column
    pub fn next_stop(&self, x: usize) -> usize {
        let mut x = x;
        loop {
            x += 1;
            if x >= self.cols || self.tabs[x] {
                break;
            }
        }
        x.min(self.cols - 1)
    }

    /// Previous tab stop left of `x`, or column 0
    pub fn prev_stop(&self, x: usize) -> usize {
        let mut x = x.min(self.cols);
        while x > 0 {
            x -= 1;
            if self.tabs.get(x).copied().unwrap_or(false) {
                break;
            }
        }
        x
    }

    /// Save cursor position and attributes
    pub fn save_cursor(&mut self) {
        self.saved = SavedCursor {
            x: self.x,
            y: self.y,
            attr: self.cur_attr,
        };
    }

    pub fn restore_cursor(&mut self) {
        self.x = self.saved.x.min(self.cols - 1);
        self.y = self.saved.y.min(self.rows - 1);
        self.cur_attr = self.saved.attr;
    }

    /// Text of an absolute row
    pub fn translate_line_to_string(
        &self,
        line_index: usize,
        trim_right: bool,
        start_col: usize,
        end_col: Option<usize>,
    ) -> String {
        self.lines
            .get(line_index)
            .map(|line| line.translate_to_string(trim_right, start_col, end_col, None))
            .unwrap_or_default()
    }

    /// Right-trimmed text of every viewport row
    pub fn viewport_text(&self) -> Vec<String> {
        (0..self.rows)
            .map(|y| self.translate_line_to_string(self.ybase + y, true, 0, None))
            .collect()
    }

    /// Place a marker on an absolute row
    pub fn add_marker(&mut self, line: usize) -> MarkerId {
        self.markers.borrow_mut().add(line)
    }

    /// Current absolute row of a marker, `None` once its row is gone
    pub fn marker_line(&self, id: MarkerId) -> Option<usize> {
        self.markers.borrow().line(id)
    }

    pub fn dispose_marker(&mut self, id: MarkerId) -> bool {
        self.markers.borrow_mut().dispose(id)
    }

    /// Queue a reply for the host
    pub fn push_reply(&mut self, reply: impl Into<String>) {
        self.replies.push_back(reply.into());
    }

    /// Take all queued replies in order
    pub fn drain_replies(&mut self) -> Vec<String> {
        self.replies.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::constants::CM_P16;

    fn write(buffer: &mut Buffer, y: usize, text: &str) {
        let attr = buffer.cur_attr;
        let line = buffer.line_mut(y).expect("row");
        for (x, c) in text.chars().enumerate() {
            line.set_cell_from_codepoint(x, c as u32, 1, &attr);
        }
    }

    #[test]
    fn test_new_buffer() {
        let buffer = Buffer::new(10, 3, 5);
        assert_eq!(buffer.lines.len(), 3);
        assert_eq!(buffer.lines.max_length(), 8);
        assert_eq!(buffer.scroll_bottom, 2);
        assert_eq!(buffer.viewport_text(), vec!["", "", ""]);
    }

    #[test]
    fn test_scroll_into_scrollback() {
        let mut buffer = Buffer::new(5, 2, 1);
        write(&mut buffer, 0, "a");
        write(&mut buffer, 1, "b");
        buffer.scroll(AttributeData::default(), false);
        assert_eq!(buffer.ybase, 1);
        assert_eq!(buffer.viewport_text(), vec!["b", ""]);

        buffer.scroll(AttributeData::default(), false);
        assert_eq!(buffer.ybase, 1);
        assert_eq!(buffer.lines.len(), 3);
        assert_eq!(buffer.translate_line_to_string(0, true, 0, None), "b");
    }

    #[test]
    fn test_scroll_region() {
        let mut buffer = Buffer::new(5, 4, 10);
        for (y, text) in ["a", "b", "c", "d"].iter().enumerate() {
            write(&mut buffer, y, text);
        }
        buffer.scroll_top = 1;
        buffer.scroll_bottom = 2;
        buffer.scroll(AttributeData::default(), false);
        assert_eq!(buffer.ybase, 0);
        assert_eq!(buffer.viewport_text(), vec!["a", "c", "", "d"]);

        buffer.scroll_region_down(0, 3, 2, AttributeData::default());
        assert_eq!(buffer.viewport_text(), vec!["", "", "a", "c"]);
    }

    #[test]
    fn test_blank_line_uses_erase_color() {
        let mut buffer = Buffer::new(4, 2, 0);
        buffer.cur_attr.bg = CM_P16 | 4;
        buffer.scroll(buffer.erase_attr(), false);
        let line = buffer.line(1).expect("row");
        assert_eq!(line.get_bg(0), CM_P16 | 4);
        assert_eq!(buffer.ybase, 0);
    }

    #[test]
    fn test_tab_stops() {
        let mut buffer = Buffer::new(20, 2, 0);
        assert_eq!(buffer.next_stop(0), 8);
        assert_eq!(buffer.next_stop(16), 19);
        assert_eq!(buffer.prev_stop(10), 8);
        buffer.clear_tab_stop(8);
        assert_eq!(buffer.next_stop(0), 16);
        buffer.set_tab_stop(3);
        assert_eq!(buffer.next_stop(0), 3);
        buffer.clear_all_tab_stops();
        assert_eq!(buffer.next_stop(0), 19);
        assert_eq!(buffer.prev_stop(10), 0);
    }

    #[test]
    fn test_resize_without_reflow() {
        let mut buffer = Buffer::new(5, 3, 10);
        write(&mut buffer, 0, "abcde");
        buffer.y = 2;
        buffer.resize(3, 2);
        assert_eq!(buffer.ybase, 1);
        assert_eq!(buffer.translate_line_to_string(0, true, 0, None), "abc");
        assert_eq!(buffer.y, 1);

        buffer.resize(3, 3);
        assert_eq!(buffer.ybase, 0);
        assert_eq!(buffer.y, 2);
        assert_eq!(buffer.viewport_text()[0], "abc");
    }

    #[test]
    fn test_markers_survive_scroll() {
        let mut buffer = Buffer::new(5, 2, 1);
        let marker = buffer.add_marker(1);
        buffer.scroll(AttributeData::default(), false);
        assert_eq!(buffer.marker_line(marker), Some(1));
        buffer.scroll(AttributeData::default(), false);
        assert_eq!(buffer.marker_line(marker), Some(0));
        buffer.scroll(AttributeData::default(), false);
        assert_eq!(buffer.marker_line(marker), None);
    }

    #[test]
    fn test_link_registry() {
        let mut links = LinkRegistry::new();
        let a = links.register(Some("x"), "http://a");
        let b = links.register(None, "http://a");
        let c = links.register(Some("x"), "http://a");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(links.uri(b), Some("http://a"));
        assert_eq!(links.uri(0), None);
    }

    #[test]
    fn test_replies_drain_in_order() {
        let mut buffer = Buffer::new(5, 2, 0);
        buffer.push_reply("\x1b[1;1R");
        buffer.push_reply("x");
        assert_eq!(buffer.drain_replies(), vec!["\x1b[1;1R", "x"]);
        assert!(buffer.drain_replies().is_empty());
    }
}

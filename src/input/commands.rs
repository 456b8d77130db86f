//! Buffer commands behind the registered sequence handlers
//!
//! Every function here is a plain handler over `&mut Buffer`, registered by
//! [`super::InputHandler`]. CSI handlers take the sequence parameters and
//! report `Handled`.

use unicode_width::UnicodeWidthChar;

use crate::buffer::constants::{NULL_CELL_CODE, NULL_CELL_WIDTH};
use crate::buffer::{BgFlags, Buffer};
use crate::parser::{HandlerResult, Params};

use super::sgr;

/// Upper bound for a single REP expansion
const MAX_REPEAT: usize = 65_535;

/// Display width of a codepoint: 0 for combining marks, 2 for wide chars
pub fn char_width(code: u32) -> u32 {
    char::from_u32(code)
        .and_then(UnicodeWidthChar::width)
        .map_or(1, |w| w as u32)
}

/// First parameter as a count, at least 1
fn count(params: &Params) -> usize {
    params.param_or_default(0, 1) as usize
}

/// Write printable codepoints at the cursor
///
/// Handles wide chars (a width-0 placeholder follows the char), combining
/// marks (appended to the previous cell), insert mode and auto-wrap.
pub fn print(buf: &mut Buffer, data: &[u32]) {
    if data.is_empty() {
        return;
    }
    let cols = buf.cols();
    let attr = buf.cur_attr;
    let y = buf.y;

    let x = buf.x;
    if let Some(line) = buf.line_mut(y) {
        // printing over the right half of a wide char orphans its left half
        if x > 0 && x <= cols && line.get_width(x - 1) == 2 {
            line.set_cell_from_codepoint(x - 1, NULL_CELL_CODE, NULL_CELL_WIDTH, &attr);
        }
    }

    for &code in data {
        let width = char_width(code);

        if width == 0 {
            let x = buf.x.min(cols);
            if x > 0 {
                if let Some(line) = buf.line_mut(buf.y) {
                    let target = if line.get_width(x - 1) == 0 && x >= 2 { x - 2 } else { x - 1 };
                    line.add_codepoint_to_cell(target, code, 0);
                }
            }
            continue;
        }
        // a wide char never fits a single column grid
        if width as usize > cols {
            continue;
        }
        buf.preceding_codepoint = code;

        if buf.x + width as usize > cols {
            if buf.wraparound {
                let start = buf.x;
                if let Some(line) = buf.line_mut(buf.y) {
                    for x in start..cols {
                        line.set_cell_from_codepoint(x, NULL_CELL_CODE, NULL_CELL_WIDTH, &attr);
                    }
                }
                buf.x = 0;
                if buf.y == buf.scroll_bottom {
                    buf.scroll(buf.erase_attr(), true);
                } else {
                    buf.y = (buf.y + 1).min(buf.rows() - 1);
                    if let Some(line) = buf.line_mut(buf.y) {
                        line.is_wrapped = true;
                    }
                }
            } else {
                buf.x = cols - 1;
                if width == 2 {
                    continue;
                }
            }
        }

        let x = buf.x;
        let insert_mode = buf.insert_mode;
        let fill = buf.get_null_cell(attr);
        let Some(line) = buf.line_mut(buf.y) else {
            continue;
        };
        if insert_mode {
            line.insert_cells(x, width as usize, &fill);
            if line.get_width(cols - 1) == 2 {
                line.set_cell_from_codepoint(cols - 1, NULL_CELL_CODE, NULL_CELL_WIDTH, &attr);
            }
        }
        line.set_cell_from_codepoint(x, code, width, &attr);
        for i in 1..width as usize {
            line.set_cell_from_codepoint(x + i, 0, 0, &attr);
        }
        buf.x = x + width as usize;
    }

    let x = buf.x;
    if x < cols {
        if let Some(line) = buf.line_mut(buf.y) {
            // the placeholder of a wide char we partly overwrote
            if line.get_width(x) == 0 && !line.has_content(x) {
                line.set_cell_from_codepoint(x, NULL_CELL_CODE, NULL_CELL_WIDTH, &attr);
            }
        }
    }
}

pub fn bell(buf: &mut Buffer) {
    buf.bell_count += 1;
}

pub fn backspace(buf: &mut Buffer) {
    buf.restrict_cursor();
    buf.x = buf.x.saturating_sub(1);
}

pub fn tab(buf: &mut Buffer) {
    if buf.x >= buf.cols() {
        return;
    }
    buf.x = buf.next_stop(buf.x);
}

/// LF, VT and FF
pub fn line_feed(buf: &mut Buffer) {
    buf.index();
    if buf.x >= buf.cols() {
        buf.x -= 1;
    }
}

pub fn carriage_return(buf: &mut Buffer) {
    buf.x = 0;
}

/// NEL
pub fn next_line(buf: &mut Buffer) {
    buf.x = 0;
    buf.index();
}

/// HTS
pub fn tab_set(buf: &mut Buffer) {
    buf.set_tab_stop(buf.x);
}

pub fn reverse_index(buf: &mut Buffer) {
    buf.reverse_index();
}

/// Cursor movement relative to the current position, clamped to the grid
fn move_cursor(buf: &mut Buffer, dx: isize, dy: isize) {
    buf.restrict_cursor();
    buf.x = buf.x.saturating_add_signed(dx);
    buf.y = buf.y.saturating_add_signed(dy);
    buf.restrict_cursor();
}

/// CUU: stops at the top margin when starting below it
pub fn cursor_up(buf: &mut Buffer, params: &Params) -> HandlerResult {
    let n = count(params);
    let n = if buf.y >= buf.scroll_top {
        n.min(buf.y - buf.scroll_top)
    } else {
        n
    };
    move_cursor(buf, 0, -(n as isize));
    HandlerResult::Handled
}

/// CUD: stops at the bottom margin when starting above it
pub fn cursor_down(buf: &mut Buffer, params: &Params) -> HandlerResult {
    let n = count(params);
    let n = if buf.y <= buf.scroll_bottom {
        n.min(buf.scroll_bottom - buf.y)
    } else {
        n
    };
    move_cursor(buf, 0, n as isize);
    HandlerResult::Handled
}

pub fn cursor_forward(buf: &mut Buffer, params: &Params) -> HandlerResult {
    move_cursor(buf, count(params) as isize, 0);
    HandlerResult::Handled
}

pub fn cursor_backward(buf: &mut Buffer, params: &Params) -> HandlerResult {
    move_cursor(buf, -(count(params) as isize), 0);
    HandlerResult::Handled
}

pub fn cursor_next_line(buf: &mut Buffer, params: &Params) -> HandlerResult {
    cursor_down(buf, params);
    buf.x = 0;
    HandlerResult::Handled
}

pub fn cursor_preceding_line(buf: &mut Buffer, params: &Params) -> HandlerResult {
    cursor_up(buf, params);
    buf.x = 0;
    HandlerResult::Handled
}

/// CHA
pub fn cursor_char_absolute(buf: &mut Buffer, params: &Params) -> HandlerResult {
    buf.x = count(params) - 1;
    buf.restrict_cursor();
    HandlerResult::Handled
}

/// CUP and HVP
pub fn cursor_position(buf: &mut Buffer, params: &Params) -> HandlerResult {
    buf.y = params.param_or_default(0, 1) as usize - 1;
    buf.x = params.param_or_default(1, 1) as usize - 1;
    buf.restrict_cursor();
    HandlerResult::Handled
}

/// VPA
pub fn line_pos_absolute(buf: &mut Buffer, params: &Params) -> HandlerResult {
    buf.y = count(params) - 1;
    buf.restrict_cursor();
    HandlerResult::Handled
}

/// CHT
pub fn cursor_forward_tab(buf: &mut Buffer, params: &Params) -> HandlerResult {
    if buf.x >= buf.cols() {
        return HandlerResult::Handled;
    }
    for _ in 0..count(params).min(buf.cols()) {
        buf.x = buf.next_stop(buf.x);
    }
    HandlerResult::Handled
}

/// TBC
pub fn tab_clear(buf: &mut Buffer, params: &Params) -> HandlerResult {
    match params.get(0).unwrap_or(0) {
        0 => buf.clear_tab_stop(buf.x),
        3 => buf.clear_all_tab_stops(),
        _ => {}
    }
    HandlerResult::Handled
}

fn erase_in_buffer_line(buf: &mut Buffer, y: usize, start: usize, end: usize, clear_wrap: bool, respect_protect: bool) {
    let fill = buf.get_null_cell(buf.erase_attr());
    if let Some(line) = buf.line_mut(y) {
        line.replace_cells(start, end, &fill, respect_protect);
        if clear_wrap {
            line.is_wrapped = false;
        }
    }
}

fn reset_buffer_line(buf: &mut Buffer, y: usize, respect_protect: bool) {
    let fill = buf.get_null_cell(buf.erase_attr());
    if let Some(line) = buf.line_mut(y) {
        line.fill(&fill, respect_protect);
        line.is_wrapped = false;
    }
}

fn erase_in_display(buf: &mut Buffer, params: &Params, respect_protect: bool) -> HandlerResult {
    buf.restrict_cursor();
    let (x, y, cols, rows) = (buf.x, buf.y, buf.cols(), buf.rows());
    match params.get(0).unwrap_or(0) {
        0 => {
            erase_in_buffer_line(buf, y, x, cols, x == 0, respect_protect);
            for j in y + 1..rows {
                reset_buffer_line(buf, j, respect_protect);
            }
        }
        1 => {
            erase_in_buffer_line(buf, y, 0, x + 1, true, respect_protect);
            if x + 1 >= cols {
                if let Some(line) = buf.line_mut(y + 1) {
                    line.is_wrapped = false;
                }
            }
            for j in 0..y {
                reset_buffer_line(buf, j, respect_protect);
            }
        }
        2 => {
            for j in 0..rows {
                reset_buffer_line(buf, j, respect_protect);
            }
        }
        3 => {
            let scrollback = buf.lines.len().saturating_sub(rows);
            if scrollback > 0 {
                buf.lines.trim_start(scrollback);
                buf.ybase = buf.ybase.saturating_sub(scrollback);
                buf.ydisp = buf.ydisp.saturating_sub(scrollback);
            }
        }
        _ => {}
    }
    HandlerResult::Handled
}

/// ED
pub fn erase_display(buf: &mut Buffer, params: &Params) -> HandlerResult {
    erase_in_display(buf, params, false)
}

/// DECSED: like ED but skips protected cells
pub fn erase_display_selective(buf: &mut Buffer, params: &Params) -> HandlerResult {
    erase_in_display(buf, params, true)
}

fn erase_in_line(buf: &mut Buffer, params: &Params, respect_protect: bool) -> HandlerResult {
    buf.restrict_cursor();
    let (x, y, cols) = (buf.x, buf.y, buf.cols());
    match params.get(0).unwrap_or(0) {
        0 => erase_in_buffer_line(buf, y, x, cols, x == 0, respect_protect),
        1 => erase_in_buffer_line(buf, y, 0, x + 1, false, respect_protect),
        2 => erase_in_buffer_line(buf, y, 0, cols, true, respect_protect),
        _ => {}
    }
    HandlerResult::Handled
}

/// EL
pub fn erase_line(buf: &mut Buffer, params: &Params) -> HandlerResult {
    erase_in_line(buf, params, false)
}

/// DECSEL
pub fn erase_line_selective(buf: &mut Buffer, params: &Params) -> HandlerResult {
    erase_in_line(buf, params, true)
}

/// ICH
pub fn insert_chars(buf: &mut Buffer, params: &Params) -> HandlerResult {
    buf.restrict_cursor();
    let fill = buf.get_null_cell(buf.erase_attr());
    let x = buf.x;
    if let Some(line) = buf.cursor_line_mut() {
        line.insert_cells(x, count(params), &fill);
    }
    HandlerResult::Handled
}

/// DCH
pub fn delete_chars(buf: &mut Buffer, params: &Params) -> HandlerResult {
    buf.restrict_cursor();
    let fill = buf.get_null_cell(buf.erase_attr());
    let x = buf.x;
    if let Some(line) = buf.cursor_line_mut() {
        line.delete_cells(x, count(params), &fill);
    }
    HandlerResult::Handled
}

/// ECH
pub fn erase_chars(buf: &mut Buffer, params: &Params) -> HandlerResult {
    buf.restrict_cursor();
    let fill = buf.get_null_cell(buf.erase_attr());
    let x = buf.x;
    let end = x.saturating_add(count(params));
    if let Some(line) = buf.cursor_line_mut() {
        line.replace_cells(x, end, &fill, false);
    }
    HandlerResult::Handled
}

/// IL: only inside the scroll region
pub fn insert_lines(buf: &mut Buffer, params: &Params) -> HandlerResult {
    buf.restrict_cursor();
    if buf.y < buf.scroll_top || buf.y > buf.scroll_bottom {
        return HandlerResult::Handled;
    }
    let attr = buf.erase_attr();
    buf.scroll_region_down(buf.y, buf.scroll_bottom, count(params), attr);
    buf.x = 0;
    HandlerResult::Handled
}

/// DL: only inside the scroll region
pub fn delete_lines(buf: &mut Buffer, params: &Params) -> HandlerResult {
    buf.restrict_cursor();
    if buf.y < buf.scroll_top || buf.y > buf.scroll_bottom {
        return HandlerResult::Handled;
    }
    let attr = buf.erase_attr();
    buf.scroll_region_up(buf.y, buf.scroll_bottom, count(params), attr);
    buf.x = 0;
    HandlerResult::Handled
}

/// SU
pub fn scroll_up(buf: &mut Buffer, params: &Params) -> HandlerResult {
    let attr = buf.erase_attr();
    buf.scroll_region_up(buf.scroll_top, buf.scroll_bottom, count(params), attr);
    HandlerResult::Handled
}

/// SD
pub fn scroll_down(buf: &mut Buffer, params: &Params) -> HandlerResult {
    let attr = buf.erase_attr();
    buf.scroll_region_down(buf.scroll_top, buf.scroll_bottom, count(params), attr);
    HandlerResult::Handled
}

/// REP: print the preceding graphic char again
pub fn repeat_preceding_character(buf: &mut Buffer, params: &Params) -> HandlerResult {
    if buf.preceding_codepoint == 0 {
        return HandlerResult::Handled;
    }
    let data = vec![buf.preceding_codepoint; count(params).min(MAX_REPEAT)];
    print(buf, &data);
    HandlerResult::Handled
}

/// SGR
pub fn char_attributes(buf: &mut Buffer, params: &Params) -> HandlerResult {
    sgr::apply_sgr(&mut buf.cur_attr, params);
    HandlerResult::Handled
}

/// DECSTBM
pub fn set_scroll_region(buf: &mut Buffer, params: &Params) -> HandlerResult {
    let rows = buf.rows();
    let top = params.param_or_default(0, 1) as usize;
    let mut bottom = params.get(1).unwrap_or(0).max(0) as usize;
    if bottom == 0 || bottom > rows {
        bottom = rows;
    }
    if bottom > top {
        buf.scroll_top = top - 1;
        buf.scroll_bottom = bottom - 1;
        buf.x = 0;
        buf.y = 0;
    }
    HandlerResult::Handled
}

/// DECSCA
pub fn select_protected(buf: &mut Buffer, params: &Params) -> HandlerResult {
    let protect = params.get(0).unwrap_or(0) == 1;
    buf.cur_attr.set_bg_flag(BgFlags::PROTECTED, protect);
    HandlerResult::Handled
}

/// SM: IRM is the only ANSI mode tracked
pub fn set_mode(buf: &mut Buffer, params: &Params) -> HandlerResult {
    if params.values().contains(&4) {
        buf.insert_mode = true;
    }
    HandlerResult::Handled
}

/// RM
pub fn reset_mode(buf: &mut Buffer, params: &Params) -> HandlerResult {
    if params.values().contains(&4) {
        buf.insert_mode = false;
    }
    HandlerResult::Handled
}

/// DECSET: DECAWM is the only private mode tracked
pub fn set_private_mode(buf: &mut Buffer, params: &Params) -> HandlerResult {
    if params.values().contains(&7) {
        buf.wraparound = true;
    }
    HandlerResult::Handled
}

/// DECRST
pub fn reset_private_mode(buf: &mut Buffer, params: &Params) -> HandlerResult {
    if params.values().contains(&7) {
        buf.wraparound = false;
    }
    HandlerResult::Handled
}

/// SCOSC
pub fn save_cursor(buf: &mut Buffer, _params: &Params) -> HandlerResult {
    buf.save_cursor();
    HandlerResult::Handled
}

/// SCORC
pub fn restore_cursor(buf: &mut Buffer, _params: &Params) -> HandlerResult {
    buf.restore_cursor();
    HandlerResult::Handled
}

/// DSR: 5 reports status, 6 the cursor position
pub fn device_status(buf: &mut Buffer, params: &Params) -> HandlerResult {
    match params.get(0).unwrap_or(0) {
        5 => buf.push_reply("\x1b[0n"),
        6 => {
            let x = buf.x.min(buf.cols() - 1);
            let reply = format!("\x1b[{};{}R", buf.y + 1, x + 1);
            buf.push_reply(reply);
        }
        _ => {}
    }
    HandlerResult::Handled
}

/// RIS
pub fn full_reset(buf: &mut Buffer) {
    buf.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParamValue;

    fn params(values: &[i32]) -> Params {
        let values: Vec<ParamValue> = values.iter().map(|v| ParamValue::Value(*v)).collect();
        Params::from_array(&values).expect("valid params")
    }

    fn text(buf: &Buffer) -> Vec<String> {
        buf.viewport_text()
    }

    #[test]
    fn test_char_width() {
        assert_eq!(char_width('a' as u32), 1);
        assert_eq!(char_width(0x301), 0);
        assert_eq!(char_width('\u{4e2d}' as u32), 2);
    }

    #[test]
    fn test_print_and_wrap() {
        let mut buf = Buffer::new(4, 2, 0);
        print(&mut buf, &"abcdef".chars().map(|c| c as u32).collect::<Vec<_>>());
        assert_eq!(text(&buf), vec!["abcd", "ef"]);
        assert!(buf.line(1).expect("row").is_wrapped);
        assert_eq!((buf.x, buf.y), (2, 1));
    }

    #[test]
    fn test_print_pending_wrap() {
        let mut buf = Buffer::new(3, 2, 0);
        print(&mut buf, &['a' as u32, 'b' as u32, 'c' as u32]);
        assert_eq!(buf.x, 3);
        carriage_return(&mut buf);
        assert_eq!(buf.x, 0);
        assert_eq!(buf.y, 0);
    }

    #[test]
    fn test_wide_char_wraps_whole() {
        let mut buf = Buffer::new(3, 2, 0);
        print(&mut buf, &['a' as u32, 'b' as u32, 0x4e2d]);
        assert_eq!(text(&buf), vec!["ab", "\u{4e2d}"]);
        let line = buf.line(1).expect("row");
        assert_eq!(line.get_width(0), 2);
        assert_eq!(line.get_width(1), 0);
        assert_eq!(buf.x, 2);
    }

    #[test]
    fn test_combining_mark_joins_previous_cell() {
        let mut buf = Buffer::new(5, 1, 0);
        print(&mut buf, &['e' as u32, 0x301, 'x' as u32]);
        let line = buf.line(0).expect("row");
        assert_eq!(line.get_string(0), "e\u{301}");
        assert_eq!(line.get_string(1), "x");
    }

    #[test]
    fn test_no_wraparound() {
        let mut buf = Buffer::new(3, 2, 0);
        buf.wraparound = false;
        print(&mut buf, &"abcde".chars().map(|c| c as u32).collect::<Vec<_>>());
        assert_eq!(text(&buf), vec!["abe", ""]);
    }

    #[test]
    fn test_cursor_moves_respect_margins() {
        let mut buf = Buffer::new(10, 10, 0);
        buf.scroll_top = 2;
        buf.scroll_bottom = 5;
        buf.y = 4;
        cursor_up(&mut buf, &params(&[10]));
        assert_eq!(buf.y, 2);
        cursor_down(&mut buf, &params(&[10]));
        assert_eq!(buf.y, 5);
        buf.y = 7;
        cursor_down(&mut buf, &params(&[10]));
        assert_eq!(buf.y, 9);
        cursor_position(&mut buf, &params(&[3, 4]));
        assert_eq!((buf.x, buf.y), (3, 2));
        cursor_position(&mut buf, &params(&[0]));
        assert_eq!((buf.x, buf.y), (0, 0));
    }

    #[test]
    fn test_erase_line_modes() {
        let mut buf = Buffer::new(5, 1, 0);
        print(&mut buf, &"abcde".chars().map(|c| c as u32).collect::<Vec<_>>());
        buf.x = 2;
        erase_line(&mut buf, &params(&[0]));
        assert_eq!(text(&buf), vec!["ab"]);
        erase_line(&mut buf, &params(&[1]));
        assert_eq!(buf.line(0).expect("row").translate_to_string(false, 0, None, None), "     ");
    }

    #[test]
    fn test_selective_erase_keeps_protected() {
        let mut buf = Buffer::new(4, 1, 0);
        select_protected(&mut buf, &params(&[1]));
        print(&mut buf, &['a' as u32, 'b' as u32]);
        select_protected(&mut buf, &params(&[0]));
        print(&mut buf, &['c' as u32]);
        buf.x = 0;
        erase_line_selective(&mut buf, &params(&[2]));
        assert_eq!(text(&buf), vec!["ab"]);
        erase_line(&mut buf, &params(&[2]));
        assert_eq!(text(&buf), vec![""]);
    }

    #[test]
    fn test_insert_and_delete_lines() {
        let mut buf = Buffer::new(3, 3, 0);
        for (y, c) in ['a', 'b', 'c'].iter().enumerate() {
            buf.x = 0;
            buf.y = y;
            print(&mut buf, &[*c as u32]);
        }
        buf.y = 1;
        insert_lines(&mut buf, &params(&[1]));
        assert_eq!(text(&buf), vec!["a", "", "b"]);
        delete_lines(&mut buf, &params(&[2]));
        assert_eq!(text(&buf), vec!["a", "", ""]);
    }

    #[test]
    fn test_scroll_region_and_dsr() {
        let mut buf = Buffer::new(5, 5, 0);
        set_scroll_region(&mut buf, &params(&[2, 4]));
        assert_eq!((buf.scroll_top, buf.scroll_bottom), (1, 3));
        set_scroll_region(&mut buf, &params(&[4, 2]));
        assert_eq!((buf.scroll_top, buf.scroll_bottom), (1, 3));
        buf.x = 2;
        buf.y = 3;
        device_status(&mut buf, &params(&[6]));
        assert_eq!(buf.drain_replies(), vec!["\x1b[4;3R"]);
    }

    #[test]
    fn test_repeat_and_insert_mode() {
        let mut buf = Buffer::new(6, 1, 0);
        print(&mut buf, &['x' as u32]);
        repeat_preceding_character(&mut buf, &params(&[3]));
        assert_eq!(text(&buf), vec!["xxxx"]);
        buf.x = 0;
        set_mode(&mut buf, &params(&[4]));
        print(&mut buf, &['y' as u32]);
        assert_eq!(text(&buf), vec!["yxxxx"]);
    }

    #[test]
    fn test_tabs() {
        let mut buf = Buffer::new(20, 1, 0);
        tab(&mut buf);
        assert_eq!(buf.x, 8);
        cursor_forward_tab(&mut buf, &params(&[2]));
        assert_eq!(buf.x, 19);
        buf.x = 3;
        tab_set(&mut buf);
        buf.x = 0;
        tab(&mut buf);
        assert_eq!(buf.x, 3);
        tab_clear(&mut buf, &params(&[3]));
        buf.x = 0;
        tab(&mut buf);
        assert_eq!(buf.x, 19);
    }
}

//! Input handler
//!
//! Connects an [`EscapeSequenceParser`] to a [`Buffer`]: decoded input is
//! parsed and the registered handlers mutate the buffer. Replies the
//! terminal owes the host (DSR, DECRQSS) are queued on the buffer and
//! taken with [`InputHandler::drain_replies`].
//!
//! Further handlers can be layered on top through
//! [`InputHandler::parser_mut`]; they run before the built-in ones and may
//! bubble to them.

pub mod commands;
pub mod sgr;

use tracing::debug;

use crate::buffer::Buffer;
use crate::config::TerminalConfig;
use crate::decoder::{string_to_utf32, Utf8Decoder};
use crate::error::Result;
use crate::parser::{
    DcsStringHandler, EscapeSequenceParser, FunctionIdentifier, HandlerResult, OscStringHandler,
    ParseStatus, Params, SuspendKind,
};

type CsiCommand = fn(&mut Buffer, &Params) -> HandlerResult;
type Command = fn(&mut Buffer);

/// Parser plus buffer plus UTF-8 decoder
pub struct InputHandler {
    parser: EscapeSequenceParser<Buffer>,
    buffer: Buffer,
    decoder: Utf8Decoder,
    /// Last chunk handed to the parser, kept for `resume`
    chunk: Vec<u32>,
    /// Input that arrived while an abandoned chunk was suspended again
    queued: Vec<u32>,
}

impl std::fmt::Debug for InputHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputHandler")
            .field("state", &self.parser.current_state())
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl InputHandler {
    /// Create a handler for a `cols` x `rows` buffer with `scrollback` rows
    pub fn new(cols: usize, rows: usize, scrollback: usize) -> Result<Self> {
        let mut parser = EscapeSequenceParser::new();
        register_handlers(&mut parser)?;
        Ok(Self {
            parser,
            buffer: Buffer::new(cols, rows, scrollback),
            decoder: Utf8Decoder::new(),
            chunk: Vec::new(),
            queued: Vec::new(),
        })
    }

    pub fn from_config(config: &TerminalConfig) -> Result<Self> {
        let mut handler = Self::new(config.cols, config.rows, config.scrollback)?;
        handler.parser.set_payload_limit(config.payload_limit);
        handler
            .parser
            .set_param_limits(config.max_params, config.max_sub_params);
        Ok(handler)
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// Access the parser to register additional handlers
    pub fn parser_mut(&mut self) -> &mut EscapeSequenceParser<Buffer> {
        &mut self.parser
    }

    pub fn parser(&self) -> &EscapeSequenceParser<Buffer> {
        &self.parser
    }

    /// Parse raw bytes, decoding UTF-8 across chunk boundaries
    pub fn parse_bytes(&mut self, data: &[u8]) -> Result<ParseStatus> {
        if self.prepare()? == ParseStatus::Suspended {
            self.decoder.decode(data, &mut self.queued);
            return Ok(ParseStatus::Suspended);
        }
        self.chunk.clear();
        self.decoder.decode(data, &mut self.chunk);
        self.parser.parse(&mut self.buffer, &self.chunk)
    }

    /// Parse a chunk of codepoints
    pub fn parse(&mut self, data: &[u32]) -> Result<ParseStatus> {
        if self.prepare()? == ParseStatus::Suspended {
            self.queued.extend_from_slice(data);
            return Ok(ParseStatus::Suspended);
        }
        self.chunk.clear();
        self.chunk.extend_from_slice(data);
        self.parser.parse(&mut self.buffer, &self.chunk)
    }

    pub fn parse_str(&mut self, data: &str) -> Result<ParseStatus> {
        self.parse(&string_to_utf32(data))
    }

    /// Continue after a handler returned `Pending`
    ///
    /// `handled` is the outcome of that handler. Input queued while the
    /// chunk was suspended is parsed once it completes.
    pub fn resume(&mut self, handled: bool) -> Result<ParseStatus> {
        match self.parser.resume(&mut self.buffer, &self.chunk, handled)? {
            ParseStatus::Done => self.parse_queued(),
            status => Ok(status),
        }
    }

    /// Refuse new input while suspended and finish a chunk whose pending
    /// handler was abandoned by a reset
    ///
    /// Returns `Suspended` when that chunk suspends again; the caller then
    /// queues its input instead of replacing the chunk.
    fn prepare(&mut self) -> Result<ParseStatus> {
        if self.parser.is_suspended() {
            self.parser.parse(&mut self.buffer, &[])?;
        }
        if self.parser.resume_state().kind == SuspendKind::Reset {
            debug!("finishing chunk abandoned by reset");
            if self.parser.parse(&mut self.buffer, &self.chunk)? == ParseStatus::Suspended {
                return Ok(ParseStatus::Suspended);
            }
        }
        self.parse_queued()
    }

    fn parse_queued(&mut self) -> Result<ParseStatus> {
        if self.queued.is_empty() {
            return Ok(ParseStatus::Done);
        }
        self.chunk = std::mem::take(&mut self.queued);
        self.parser.parse(&mut self.buffer, &self.chunk)
    }

    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.buffer.resize(cols, rows);
    }

    /// Full reset: parser, decoder and buffer content
    pub fn reset(&mut self) {
        self.parser.reset(&mut self.buffer);
        self.decoder.reset();
        self.buffer.clear();
    }

    /// Take the replies queued since the last call
    pub fn drain_replies(&mut self) -> Vec<String> {
        self.buffer.drain_replies()
    }
}

fn register_handlers(parser: &mut EscapeSequenceParser<Buffer>) -> Result<()> {
    parser.set_print_handler(commands::print);

    let execute: [(u32, Command); 13] = [
        (0x07, commands::bell),
        (0x08, commands::backspace),
        (0x09, commands::tab),
        (0x0a, commands::line_feed),
        (0x0b, commands::line_feed),
        (0x0c, commands::line_feed),
        (0x0d, commands::carriage_return),
        (0x0e, |_| {}),
        (0x0f, |_| {}),
        (0x84, Buffer::index),
        (0x85, commands::next_line),
        (0x88, commands::tab_set),
        (0x8d, commands::reverse_index),
    ];
    for (code, command) in execute {
        parser.set_execute_handler(code, command);
    }

    let csi = |final_byte: u8| FunctionIdentifier::new(final_byte);
    let csi_commands: [(FunctionIdentifier, CsiCommand); 35] = [
        (csi(b'@'), commands::insert_chars),
        (csi(b'A'), commands::cursor_up),
        (csi(b'B'), commands::cursor_down),
        (csi(b'C'), commands::cursor_forward),
        (csi(b'D'), commands::cursor_backward),
        (csi(b'E'), commands::cursor_next_line),
        (csi(b'F'), commands::cursor_preceding_line),
        (csi(b'G'), commands::cursor_char_absolute),
        (csi(b'H'), commands::cursor_position),
        (csi(b'I'), commands::cursor_forward_tab),
        (csi(b'J'), commands::erase_display),
        (csi(b'J').prefix(b'?'), commands::erase_display_selective),
        (csi(b'K'), commands::erase_line),
        (csi(b'K').prefix(b'?'), commands::erase_line_selective),
        (csi(b'L'), commands::insert_lines),
        (csi(b'M'), commands::delete_lines),
        (csi(b'P'), commands::delete_chars),
        (csi(b'S'), commands::scroll_up),
        (csi(b'T'), commands::scroll_down),
        (csi(b'X'), commands::erase_chars),
        (csi(b'`'), commands::cursor_char_absolute),
        (csi(b'b'), commands::repeat_preceding_character),
        (csi(b'd'), commands::line_pos_absolute),
        (csi(b'f'), commands::cursor_position),
        (csi(b'g'), commands::tab_clear),
        (csi(b'h'), commands::set_mode),
        (csi(b'h').prefix(b'?'), commands::set_private_mode),
        (csi(b'l'), commands::reset_mode),
        (csi(b'l').prefix(b'?'), commands::reset_private_mode),
        (csi(b'm'), commands::char_attributes),
        (csi(b'n'), commands::device_status),
        (csi(b'q').intermediates(b"\""), commands::select_protected),
        (csi(b'r'), commands::set_scroll_region),
        (csi(b's'), commands::save_cursor),
        (csi(b'u'), commands::restore_cursor),
    ];
    for (id, command) in csi_commands {
        parser.register_csi_handler(&id, command)?;
    }

    let esc_commands: [(u8, Command); 7] = [
        (b'7', Buffer::save_cursor),
        (b'8', Buffer::restore_cursor),
        (b'D', Buffer::index),
        (b'E', commands::next_line),
        (b'H', commands::tab_set),
        (b'M', commands::reverse_index),
        (b'c', commands::full_reset),
    ];
    for (final_byte, command) in esc_commands {
        parser.register_esc_handler(&FunctionIdentifier::new(final_byte), move |buf| {
            command(buf);
            HandlerResult::Handled
        })?;
    }

    let set_title = |buf: &mut Buffer, data: &str| {
        buf.title = data.to_string();
        HandlerResult::Handled
    };
    parser.register_osc_handler(0, OscStringHandler::new(set_title));
    parser.register_osc_handler(2, OscStringHandler::new(set_title));
    parser.register_osc_handler(8, OscStringHandler::new(set_hyperlink));

    parser.register_dcs_handler(
        &FunctionIdentifier::new(b'q').intermediates(b"$"),
        DcsStringHandler::new(request_status_string),
    )?;
    Ok(())
}

/// OSC 8 ; params ; uri
///
/// An empty uri closes the open link. `params` is a `:`-separated list of
/// `key=value` pairs; only `id` is used.
fn set_hyperlink(buf: &mut Buffer, data: &str) -> HandlerResult {
    let Some((params, uri)) = data.split_once(';') else {
        return HandlerResult::Bubble;
    };
    let link = if uri.is_empty() {
        0
    } else {
        let id = params
            .split(':')
            .filter_map(|kv| kv.split_once('='))
            .find(|(key, _)| *key == "id")
            .map(|(_, value)| value);
        buf.links.register(id, uri)
    };
    buf.cur_attr.extended.set_url_id(link);
    buf.cur_attr.update_extended();
    HandlerResult::Handled
}

/// DECRQSS: answer with DECRPSS
fn request_status_string(buf: &mut Buffer, data: &str, _params: &Params) -> HandlerResult {
    let setting = match data {
        "m" => Some(format!("{}m", sgr::sgr_report(&buf.cur_attr))),
        "r" => Some(format!("{};{}r", buf.scroll_top + 1, buf.scroll_bottom + 1)),
        "\"q" => Some(format!("{}\"q", u8::from(buf.cur_attr.is_protected()))),
        "\"p" => Some("61;1\"p".to_string()),
        _ => None,
    };
    let reply = match setting {
        Some(setting) => format!("\x1bP1$r{setting}\x1b\\"),
        None => {
            debug!(request = data, "unknown DECRQSS request");
            "\x1bP0$r\x1b\\".to_string()
        }
    };
    buf.push_reply(reply);
    HandlerResult::Handled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(cols: usize, rows: usize) -> InputHandler {
        InputHandler::new(cols, rows, 10).expect("handlers register")
    }

    #[test]
    fn test_print_and_cursor() {
        let mut h = handler(10, 3);
        h.parse_str("hello\r\nworld").expect("parse");
        assert_eq!(h.buffer().viewport_text(), vec!["hello", "world", ""]);
        assert_eq!((h.buffer().x, h.buffer().y), (5, 1));
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut h = handler(10, 1);
        let bytes = "\u{e9}t\u{e9}".as_bytes();
        h.parse_bytes(&bytes[..1]).expect("parse");
        h.parse_bytes(&bytes[1..]).expect("parse");
        assert_eq!(h.buffer().viewport_text(), vec!["\u{e9}t\u{e9}"]);
    }

    #[test]
    fn test_title_and_hyperlink() {
        let mut h = handler(10, 1);
        h.parse_str("\x1b]2;my title\x07").expect("parse");
        assert_eq!(h.buffer().title, "my title");

        h.parse_str("\x1b]8;id=a;http://x\x1b\\ab\x1b]8;;\x1b\\c").expect("parse");
        let line = h.buffer().line(0).expect("row");
        let mut cell = crate::buffer::CellData::new();
        let id = line.load_cell(0, &mut cell).extended().url_id();
        assert_ne!(id, 0);
        assert_eq!(h.buffer().links.uri(id), Some("http://x"));
        assert_eq!(line.load_cell(1, &mut cell).extended().url_id(), id);
        assert_eq!(line.load_cell(2, &mut cell).extended().url_id(), 0);
    }

    #[test]
    fn test_decrqss() {
        let mut h = handler(10, 5);
        h.parse_str("\x1b[2;4r\x1bP$qr\x1b\\").expect("parse");
        h.parse_str("\x1b[1;31m\x1bP$qm\x1b\\").expect("parse");
        h.parse_str("\x1bP$qx\x1b\\").expect("parse");
        assert_eq!(
            h.drain_replies(),
            vec!["\x1bP1$r2;4r\x1b\\", "\x1bP1$r0;1;31m\x1b\\", "\x1bP0$r\x1b\\"]
        );
    }

    #[test]
    fn test_pending_handler_blocks_input() {
        let mut h = handler(10, 1);
        h.parser_mut()
            .register_csi_handler(&FunctionIdentifier::new(b'm'), |_, _| HandlerResult::Pending)
            .expect("register");
        assert_eq!(h.parse_str("a\x1b[1mb").expect("parse"), ParseStatus::Suspended);
        assert!(h.parse_str("c").is_err());
        h.reset();
        assert_eq!(h.parse_str("d").expect("parse"), ParseStatus::Done);
    }

    #[test]
    fn test_resume_bubbles_to_builtin() {
        let mut h = handler(10, 1);
        h.parser_mut()
            .register_csi_handler(&FunctionIdentifier::new(b'm'), |_, _| HandlerResult::Pending)
            .expect("register");
        assert_eq!(h.parse_str("\x1b[1mb").expect("parse"), ParseStatus::Suspended);
        assert_eq!(h.resume(false).expect("resume"), ParseStatus::Done);
        let line = h.buffer().line(0).expect("row");
        let mut cell = crate::buffer::CellData::new();
        assert!(line.load_cell(0, &mut cell).attr.is_bold());
    }

    #[test]
    fn test_scrollback_and_reset() {
        let mut h = handler(5, 2);
        h.parse_str("1\r\n2\r\n3\r\n4").expect("parse");
        assert_eq!(h.buffer().ybase, 2);
        assert_eq!(h.buffer().viewport_text(), vec!["3", "4"]);
        h.parse_str("\x1b[3J").expect("parse");
        assert_eq!(h.buffer().ybase, 0);
        h.parse_str("\x1bc").expect("parse");
        assert_eq!(h.buffer().viewport_text(), vec!["", ""]);
    }
}

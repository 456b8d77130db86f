//! APC (Application Program Command) sub-parser
//!
//! `APC <ident><payload> ST`. The identifier is taken from the leading
//! codepoints of the string. By default it is the first codepoint alone
//! (`G` for the kitty graphics protocol); [`ApcParser::set_ident_length`]
//! packs up to four leading printable bytes instead, see [`apc_ident`].
//! Everything after the identifier is opaque payload. An APC that ends
//! before its identifier is complete is dropped silently.

use tracing::{debug, trace};

use super::constants::{StringState, PAYLOAD_LIMIT};
use super::handler::{
    abort_chain, finish_chain, ApcHandler, ChainStack, HandlerResult, HandlerTable,
    StringEvent, StringFallback, SubParserStatus,
};
use crate::decoder::utf32_to_string;

/// Pack identifier bytes the way [`ApcParser`] computes them
///
/// A single byte is its own code; longer identifiers are packed high byte
/// first, like ESC/CSI identifiers.
pub fn apc_ident(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| acc << 8 | *b as u32)
}

/// APC sub-parser
pub struct ApcParser<C> {
    state: StringState,
    id: u32,
    ident_length: usize,
    ident_seen: usize,
    handlers: HandlerTable<Box<dyn ApcHandler<C>>>,
    fallback: Option<StringFallback<C>>,
    payload_len: usize,
    payload_limit: usize,
    limit_hit: bool,
    stack: ChainStack,
}

impl<C> Default for ApcParser<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ApcParser<C> {
    pub fn new() -> Self {
        Self::with_payload_limit(PAYLOAD_LIMIT)
    }

    pub fn with_payload_limit(payload_limit: usize) -> Self {
        Self {
            state: StringState::Start,
            id: 0,
            ident_length: 1,
            ident_seen: 0,
            handlers: HandlerTable::default(),
            fallback: None,
            payload_len: 0,
            payload_limit,
            limit_hit: false,
            stack: ChainStack::default(),
        }
    }

    pub fn set_payload_limit(&mut self, limit: usize) {
        self.payload_limit = limit;
    }

    /// Number of leading codepoints forming the identifier, 1 to 4
    pub fn set_ident_length(&mut self, length: usize) {
        self.ident_length = length.clamp(1, 4);
    }

    pub fn register_handler(&mut self, ident: u32, handler: Box<dyn ApcHandler<C>>) -> u64 {
        self.handlers.register(ident, handler)
    }

    pub fn remove_handler(&mut self, ident: u32, serial: u64) -> bool {
        self.handlers.remove(ident, serial)
    }

    pub fn clear_handler(&mut self, ident: u32) {
        self.handlers.clear(ident);
    }

    pub fn set_handler_fallback(&mut self, fallback: StringFallback<C>) {
        self.fallback = Some(fallback);
    }

    pub fn is_active(&self) -> bool {
        self.state == StringState::Payload
    }

    /// Abort the current command, ending started handlers unsuccessfully
    pub fn reset(&mut self, ctx: &mut C) {
        if self.state == StringState::Payload {
            let id = self.id;
            match self.handlers.get_mut(id) {
                Some(list) if !list.is_empty() => {
                    abort_chain(list, &mut self.stack, |h| {
                        h.end(ctx, false);
                    });
                }
                _ => self.fallback_event(ctx, id, StringEvent::End(false)),
            }
        }
        self.clear();
    }

    pub fn start(&mut self, ctx: &mut C) {
        self.reset(ctx);
        self.state = StringState::Id;
    }

    pub fn put(&mut self, ctx: &mut C, data: &[u32]) {
        let mut start = 0;
        match self.state {
            StringState::Abort | StringState::Start => return,
            StringState::Id => {
                while start < data.len() && self.ident_seen < self.ident_length {
                    let code = data[start];
                    start += 1;
                    if self.ident_length == 1 {
                        self.id = code;
                    } else if (0x20..=0x7e).contains(&code) {
                        self.id = self.id << 8 | code;
                    } else {
                        trace!(code, "malformed APC identifier");
                        self.state = StringState::Abort;
                        return;
                    }
                    self.ident_seen += 1;
                }
                if self.ident_seen < self.ident_length {
                    return;
                }
                self.announce_start(ctx);
            }
            StringState::Payload => {}
        }
        if start < data.len() {
            self.forward(ctx, &data[start..]);
        }
    }

    /// Finish the command, see [`super::OscParser::end`]
    pub fn end(&mut self, ctx: &mut C, success: bool) -> SubParserStatus {
        self.finish(ctx, success, None)
    }

    pub fn resume(&mut self, ctx: &mut C, success: bool, handled: bool) -> SubParserStatus {
        self.finish(ctx, success, Some(handled))
    }

    fn finish(&mut self, ctx: &mut C, success: bool, resumed: Option<bool>) -> SubParserStatus {
        if self.state == StringState::Payload {
            let success = success && !self.limit_hit;
            let id = self.id;
            match self.handlers.get_mut(id) {
                Some(list) if !list.is_empty() => {
                    let status = finish_chain(list, &mut self.stack, success, resumed, |h, ok| {
                        h.end(ctx, ok)
                    });
                    if status == SubParserStatus::Pending {
                        return status;
                    }
                }
                _ => self.fallback_event(ctx, id, StringEvent::End(success)),
            }
        }
        self.clear();
        SubParserStatus::Done
    }

    fn clear(&mut self) {
        self.stack = ChainStack::default();
        self.state = StringState::Start;
        self.id = 0;
        self.ident_seen = 0;
        self.payload_len = 0;
        self.limit_hit = false;
    }

    fn announce_start(&mut self, ctx: &mut C) {
        self.state = StringState::Payload;
        let id = self.id;
        match self.handlers.get_mut(id) {
            Some(list) if !list.is_empty() => {
                for entry in list.iter_mut().rev() {
                    entry.handler.start(ctx);
                }
            }
            _ => self.fallback_event(ctx, id, StringEvent::Start),
        }
    }

    fn forward(&mut self, ctx: &mut C, data: &[u32]) {
        if self.limit_hit {
            return;
        }
        self.payload_len += data.len();
        if self.payload_len > self.payload_limit {
            debug!(id = self.id, limit = self.payload_limit, "APC payload limit exceeded, aborting command");
            self.limit_hit = true;
            return;
        }
        let id = self.id;
        match self.handlers.get_mut(id) {
            Some(list) if !list.is_empty() => {
                for entry in list.iter_mut().rev() {
                    entry.handler.put(ctx, data);
                }
            }
            _ => self.fallback_event(ctx, id, StringEvent::Put(data)),
        }
    }

    fn fallback_event(&mut self, ctx: &mut C, id: u32, event: StringEvent<'_>) {
        match self.fallback.as_mut() {
            Some(fallback) => fallback(ctx, id, event),
            None => {
                if let StringEvent::End(success) = event {
                    trace!(id, success, "unhandled APC");
                }
            }
        }
    }
}

/// APC handler that buffers the payload and calls `F` once on success
pub struct ApcStringHandler<F> {
    data: String,
    callback: F,
}

impl<F> ApcStringHandler<F> {
    pub fn new(callback: F) -> Self {
        Self {
            data: String::new(),
            callback,
        }
    }
}

impl<C, F> ApcHandler<C> for ApcStringHandler<F>
where
    F: FnMut(&mut C, &str) -> HandlerResult,
{
    fn start(&mut self, _ctx: &mut C) {
        self.data.clear();
    }

    fn put(&mut self, _ctx: &mut C, data: &[u32]) {
        self.data.push_str(&utf32_to_string(data));
    }

    fn end(&mut self, ctx: &mut C, success: bool) -> HandlerResult {
        let result = if success {
            (self.callback)(ctx, &self.data)
        } else {
            HandlerResult::Bubble
        };
        self.data.clear();
        result
    }
}

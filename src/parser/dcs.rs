//! DCS (Device Control String) sub-parser
//!
//! A DCS is announced with a CSI-like header (`DCS params intermediates
//! final`). The header selects the handlers, which then receive the
//! passthrough payload in chunks until the string terminator.

use tracing::{debug, trace};

use super::constants::PAYLOAD_LIMIT;
use super::handler::{
    abort_chain, finish_chain, ChainStack, DcsEvent, DcsFallback, DcsHandler, HandlerResult,
    HandlerTable, SubParserStatus,
};
use super::params::Params;
use crate::decoder::utf32_to_string;

/// DCS sub-parser
pub struct DcsParser<C> {
    /// Identifier of the hooked sequence
    active: Option<u32>,
    handlers: HandlerTable<Box<dyn DcsHandler<C>>>,
    fallback: Option<DcsFallback<C>>,
    payload_len: usize,
    payload_limit: usize,
    limit_hit: bool,
    stack: ChainStack,
}

impl<C> Default for DcsParser<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> DcsParser<C> {
    pub fn new() -> Self {
        Self::with_payload_limit(PAYLOAD_LIMIT)
    }

    pub fn with_payload_limit(payload_limit: usize) -> Self {
        Self {
            active: None,
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

    pub fn register_handler(&mut self, ident: u32, handler: Box<dyn DcsHandler<C>>) -> u64 {
        self.handlers.register(ident, handler)
    }

    pub fn remove_handler(&mut self, ident: u32, serial: u64) -> bool {
        self.handlers.remove(ident, serial)
    }

    pub fn clear_handler(&mut self, ident: u32) {
        self.handlers.clear(ident);
    }

    pub fn set_handler_fallback(&mut self, fallback: DcsFallback<C>) {
        self.fallback = Some(fallback);
    }

    /// Whether a sequence is hooked
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Abort a hooked sequence, unhooking its handlers unsuccessfully
    pub fn reset(&mut self, ctx: &mut C) {
        if let Some(ident) = self.active.take() {
            match self.handlers.get_mut(ident) {
                Some(list) if !list.is_empty() => {
                    abort_chain(list, &mut self.stack, |h| {
                        h.unhook(ctx, false);
                    });
                }
                _ => self.fallback_event(ctx, ident, DcsEvent::Unhook(false)),
            }
        }
        self.stack = ChainStack::default();
        self.payload_len = 0;
        self.limit_hit = false;
    }

    /// Start a sequence with the collected header
    pub fn hook(&mut self, ctx: &mut C, ident: u32, params: &Params) {
        self.reset(ctx);
        self.active = Some(ident);
        match self.handlers.get_mut(ident) {
            Some(list) if !list.is_empty() => {
                for entry in list.iter_mut().rev() {
                    entry.handler.hook(ctx, params);
                }
            }
            _ => self.fallback_event(ctx, ident, DcsEvent::Hook(params)),
        }
    }

    /// Forward a payload chunk
    pub fn put(&mut self, ctx: &mut C, data: &[u32]) {
        let Some(ident) = self.active else {
            return;
        };
        if self.limit_hit || data.is_empty() {
            return;
        }
        self.payload_len += data.len();
        if self.payload_len > self.payload_limit {
            debug!(ident, limit = self.payload_limit, "DCS payload limit exceeded, aborting command");
            self.limit_hit = true;
            return;
        }
        match self.handlers.get_mut(ident) {
            Some(list) if !list.is_empty() => {
                for entry in list.iter_mut().rev() {
                    entry.handler.put(ctx, data);
                }
            }
            _ => self.fallback_event(ctx, ident, DcsEvent::Put(data)),
        }
    }

    /// Finish the hooked sequence
    pub fn unhook(&mut self, ctx: &mut C, success: bool) -> SubParserStatus {
        self.finish(ctx, success, None)
    }

    /// Continue a suspended `unhook` with the outcome of the pending handler
    pub fn resume(&mut self, ctx: &mut C, success: bool, handled: bool) -> SubParserStatus {
        self.finish(ctx, success, Some(handled))
    }

    fn finish(&mut self, ctx: &mut C, success: bool, resumed: Option<bool>) -> SubParserStatus {
        let Some(ident) = self.active else {
            return SubParserStatus::Done;
        };
        let success = success && !self.limit_hit;
        match self.handlers.get_mut(ident) {
            Some(list) if !list.is_empty() => {
                let status = finish_chain(list, &mut self.stack, success, resumed, |h, ok| {
                    h.unhook(ctx, ok)
                });
                if status == SubParserStatus::Pending {
                    return status;
                }
            }
            _ => self.fallback_event(ctx, ident, DcsEvent::Unhook(success)),
        }
        self.active = None;
        self.payload_len = 0;
        self.limit_hit = false;
        SubParserStatus::Done
    }

    fn fallback_event(&mut self, ctx: &mut C, ident: u32, event: DcsEvent<'_>) {
        match self.fallback.as_mut() {
            Some(fallback) => fallback(ctx, ident, event),
            None => {
                if let DcsEvent::Unhook(success) = event {
                    trace!(ident, success, "unhandled DCS");
                }
            }
        }
    }
}

/// DCS handler that buffers the payload and calls `F` once on success
///
/// Parameters are only borrowed during `hook`, so a copy is kept until
/// `unhook`.
pub struct DcsStringHandler<F> {
    data: String,
    params: Params,
    callback: F,
}

impl<F> DcsStringHandler<F> {
    pub fn new(callback: F) -> Self {
        Self {
            data: String::new(),
            params: Params::new(),
            callback,
        }
    }
}

impl<C, F> DcsHandler<C> for DcsStringHandler<F>
where
    F: FnMut(&mut C, &str, &Params) -> HandlerResult,
{
    fn hook(&mut self, _ctx: &mut C, params: &Params) {
        self.params.clone_from(params);
        self.data.clear();
    }

    fn put(&mut self, _ctx: &mut C, data: &[u32]) {
        self.data.push_str(&utf32_to_string(data));
    }

    fn unhook(&mut self, ctx: &mut C, success: bool) -> HandlerResult {
        let result = if success {
            (self.callback)(ctx, &self.data, &self.params)
        } else {
            HandlerResult::Bubble
        };
        self.data.clear();
        self.params.reset();
        result
    }
}

//! OSC (Operating System Command) sub-parser
//!
//! Handles `OSC <id> ; <payload> ST|BEL`. The identifier is a decimal
//! number; a non-digit before the first `;` aborts the command. Payload
//! chunks are forwarded to every handler registered for the identifier as
//! they arrive, so a command may span many `parse` calls.

use tracing::{debug, trace};

use super::constants::{StringState, PAYLOAD_LIMIT};
use super::handler::{
    abort_chain, finish_chain, ChainStack, HandlerResult, HandlerTable, OscHandler,
    StringEvent, StringFallback, SubParserStatus,
};
use crate::decoder::utf32_to_string;

/// OSC sub-parser
pub struct OscParser<C> {
    state: StringState,
    id: Option<u32>,
    handlers: HandlerTable<Box<dyn OscHandler<C>>>,
    fallback: Option<StringFallback<C>>,
    payload_len: usize,
    payload_limit: usize,
    limit_hit: bool,
    stack: ChainStack,
}

impl<C> Default for OscParser<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> OscParser<C> {
    pub fn new() -> Self {
        Self::with_payload_limit(PAYLOAD_LIMIT)
    }

    pub fn with_payload_limit(payload_limit: usize) -> Self {
        Self {
            state: StringState::Start,
            id: None,
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

    /// Register a handler for `ident`, returns its serial for removal
    pub fn register_handler(&mut self, ident: u32, handler: Box<dyn OscHandler<C>>) -> u64 {
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

    /// Whether a payload is currently being forwarded
    pub fn is_active(&self) -> bool {
        self.state == StringState::Payload
    }

    /// Abort the current command, ending started handlers unsuccessfully
    pub fn reset(&mut self, ctx: &mut C) {
        if self.state == StringState::Payload {
            let id = self.id.unwrap_or(0);
            match self.handlers.get_mut(id) {
                Some(list) if !list.is_empty() => {
                    abort_chain(list, &mut self.stack, |h| {
                        h.end(ctx, false);
                    });
                }
                _ => self.fallback_event(ctx, id, StringEvent::End(false)),
            }
        }
        self.stack = ChainStack::default();
        self.id = None;
        self.state = StringState::Start;
        self.payload_len = 0;
        self.limit_hit = false;
    }

    /// Begin a new command
    pub fn start(&mut self, ctx: &mut C) {
        self.reset(ctx);
        self.state = StringState::Id;
    }

    /// Feed a chunk of the command
    pub fn put(&mut self, ctx: &mut C, data: &[u32]) {
        let mut start = 0;
        match self.state {
            StringState::Abort | StringState::Start => return,
            StringState::Id => {
                while start < data.len() {
                    let code = data[start];
                    start += 1;
                    if code == 0x3b {
                        if self.id.is_none() {
                            trace!("OSC without identifier");
                            self.state = StringState::Abort;
                            return;
                        }
                        self.announce_start(ctx);
                        break;
                    }
                    let next = if (0x30..=0x39).contains(&code) {
                        self.id
                            .unwrap_or(0)
                            .checked_mul(10)
                            .and_then(|id| id.checked_add(code - 0x30))
                    } else {
                        None
                    };
                    match next {
                        Some(id) => self.id = Some(id),
                        None => {
                            trace!(code, "malformed OSC identifier");
                            self.state = StringState::Abort;
                            return;
                        }
                    }
                }
            }
            StringState::Payload => {}
        }
        if self.state == StringState::Payload && start < data.len() {
            self.forward(ctx, &data[start..]);
        }
    }

    /// Finish the command
    ///
    /// Returns [`SubParserStatus::Pending`] when a handler suspended; call
    /// [`OscParser::resume`] with its outcome to continue.
    pub fn end(&mut self, ctx: &mut C, success: bool) -> SubParserStatus {
        self.finish(ctx, success, None)
    }

    /// Continue a suspended `end` with the outcome of the pending handler
    pub fn resume(&mut self, ctx: &mut C, success: bool, handled: bool) -> SubParserStatus {
        self.finish(ctx, success, Some(handled))
    }

    fn finish(&mut self, ctx: &mut C, success: bool, resumed: Option<bool>) -> SubParserStatus {
        if self.state == StringState::Start {
            return SubParserStatus::Done;
        }
        let empty = self.state == StringState::Id && self.id.is_none();
        if self.state != StringState::Abort && !empty {
            // an OSC without `;` still gets a start/end cycle
            if self.state == StringState::Id {
                self.announce_start(ctx);
            }
            let success = success && !self.limit_hit;
            let id = self.id.unwrap_or(0);
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
        self.id = None;
        self.state = StringState::Start;
        self.payload_len = 0;
        self.limit_hit = false;
        SubParserStatus::Done
    }

    fn announce_start(&mut self, ctx: &mut C) {
        let id = self.id.unwrap_or(0);
        self.state = StringState::Payload;
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
            debug!(
                id = self.id.unwrap_or(0),
                limit = self.payload_limit,
                "OSC payload limit exceeded, aborting command"
            );
            self.limit_hit = true;
            return;
        }
        let id = self.id.unwrap_or(0);
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
                    trace!(id, success, "unhandled OSC");
                }
            }
        }
    }
}

/// OSC handler that buffers the whole payload and calls `F` once on success
///
/// The callback receives the payload as a string and is not called when the
/// command was cancelled or exceeded the payload limit.
pub struct OscStringHandler<F> {
    data: String,
    callback: F,
}

impl<F> OscStringHandler<F> {
    pub fn new(callback: F) -> Self {
        Self {
            data: String::new(),
            callback,
        }
    }
}

impl<C, F> OscHandler<C> for OscStringHandler<F>
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::string_to_utf32;

    type Log = Vec<String>;

    struct Recorder {
        name: &'static str,
        result: HandlerResult,
    }

    impl OscHandler<Log> for Recorder {
        fn start(&mut self, log: &mut Log) {
            log.push(format!("{} START", self.name));
        }
        fn put(&mut self, log: &mut Log, data: &[u32]) {
            log.push(format!("{} PUT {}", self.name, utf32_to_string(data)));
        }
        fn end(&mut self, log: &mut Log, success: bool) -> HandlerResult {
            log.push(format!("{} END {}", self.name, success));
            self.result
        }
    }

    fn recorder(name: &'static str, result: HandlerResult) -> Box<dyn OscHandler<Log>> {
        Box::new(Recorder { name, result })
    }

    fn put(parser: &mut OscParser<Log>, log: &mut Log, s: &str) {
        parser.put(log, &string_to_utf32(s));
    }

    fn fallback_parser() -> OscParser<Log> {
        let mut parser = OscParser::new();
        parser.set_handler_fallback(Box::new(|log: &mut Log, id: u32, event: StringEvent<'_>| {
            log.push(match event {
                StringEvent::Start => format!("fb {id} START"),
                StringEvent::Put(data) => format!("fb {id} PUT {}", utf32_to_string(data)),
                StringEvent::End(ok) => format!("fb {id} END {ok}"),
            });
        }));
        parser
    }

    #[test]
    fn test_no_start_no_dispatch() {
        let mut parser = fallback_parser();
        let mut log = Log::new();
        put(&mut parser, &mut log, "12;abc");
        parser.end(&mut log, true);
        assert!(log.is_empty());
    }

    #[test]
    fn test_fallback_cycle() {
        let mut parser = fallback_parser();
        let mut log = Log::new();
        parser.start(&mut log);
        put(&mut parser, &mut log, "1234;Here comes");
        put(&mut parser, &mut log, "the mouse!");
        parser.end(&mut log, true);
        assert_eq!(
            log,
            vec![
                "fb 1234 START",
                "fb 1234 PUT Here comes",
                "fb 1234 PUT the mouse!",
                "fb 1234 END true",
            ]
        );
    }

    #[test]
    fn test_chunked_identifier() {
        let mut parser = fallback_parser();
        let mut log = Log::new();
        parser.start(&mut log);
        for chunk in ["12", "34", ";h", "ello"] {
            put(&mut parser, &mut log, chunk);
        }
        parser.end(&mut log, true);
        assert_eq!(
            log,
            vec!["fb 1234 START", "fb 1234 PUT h", "fb 1234 PUT ello", "fb 1234 END true"]
        );
    }

    #[test]
    fn test_no_payload_still_starts() {
        let mut parser = fallback_parser();
        let mut log = Log::new();
        parser.start(&mut log);
        put(&mut parser, &mut log, "1234");
        parser.end(&mut log, true);
        assert_eq!(log, vec!["fb 1234 START", "fb 1234 END true"]);
    }

    #[test]
    fn test_missing_identifier_not_dispatched() {
        let mut parser = fallback_parser();
        let mut log = Log::new();
        parser.start(&mut log);
        put(&mut parser, &mut log, ";data");
        parser.end(&mut log, true);
        parser.start(&mut log);
        parser.end(&mut log, true);
        assert!(log.is_empty());
    }

    #[test]
    fn test_invalid_identifier_aborts() {
        let mut parser = fallback_parser();
        let mut log = Log::new();
        parser.start(&mut log);
        put(&mut parser, &mut log, "12x4;data");
        parser.end(&mut log, true);
        assert!(log.is_empty());
    }

    #[test]
    fn test_handlers_newest_first_handled_stops() {
        let mut parser = OscParser::new();
        let mut log = Log::new();
        parser.register_handler(1234, recorder("th1", HandlerResult::Handled));
        parser.register_handler(1234, recorder("th2", HandlerResult::Handled));
        parser.start(&mut log);
        put(&mut parser, &mut log, "1234;Here comes");
        parser.end(&mut log, true);
        assert_eq!(
            log,
            vec![
                "th2 START",
                "th1 START",
                "th2 PUT Here comes",
                "th1 PUT Here comes",
                "th2 END true",
                "th1 END false",
            ]
        );
    }

    #[test]
    fn test_bubble_reaches_older_handler() {
        let mut parser = OscParser::new();
        let mut log = Log::new();
        parser.register_handler(1234, recorder("th1", HandlerResult::Handled));
        parser.register_handler(1234, recorder("th2", HandlerResult::Bubble));
        parser.start(&mut log);
        put(&mut parser, &mut log, "1234;x");
        parser.end(&mut log, true);
        assert_eq!(&log[4..], &["th2 END true", "th1 END true"]);
    }

    #[test]
    fn test_removed_handler_not_called() {
        let mut parser = OscParser::new();
        let mut log = Log::new();
        parser.register_handler(1, recorder("th1", HandlerResult::Handled));
        let serial = parser.register_handler(1, recorder("th2", HandlerResult::Handled));
        assert!(parser.remove_handler(1, serial));
        parser.start(&mut log);
        put(&mut parser, &mut log, "1;x");
        parser.end(&mut log, true);
        assert_eq!(log, vec!["th1 START", "th1 PUT x", "th1 END true"]);
    }

    #[test]
    fn test_reset_ends_active_handlers() {
        let mut parser = OscParser::new();
        let mut log = Log::new();
        parser.register_handler(1, recorder("th1", HandlerResult::Handled));
        parser.start(&mut log);
        put(&mut parser, &mut log, "1;x");
        parser.reset(&mut log);
        assert_eq!(log.last().unwrap(), "th1 END false");
        assert!(!parser.is_active());
    }

    #[test]
    fn test_pending_end_resumes() {
        let mut parser = OscParser::new();
        let mut log = Log::new();
        parser.register_handler(1, recorder("th1", HandlerResult::Handled));
        parser.register_handler(1, recorder("th2", HandlerResult::Pending));
        parser.start(&mut log);
        put(&mut parser, &mut log, "1;x");
        assert_eq!(parser.end(&mut log, true), SubParserStatus::Pending);
        assert_eq!(log.last().unwrap(), "th2 END true");
        assert_eq!(parser.resume(&mut log, true, false), SubParserStatus::Done);
        assert_eq!(log.last().unwrap(), "th1 END true");
    }

    #[test]
    fn test_payload_limit() {
        let mut parser = OscParser::with_payload_limit(10);
        let mut log = Log::new();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = seen.clone();
        parser.register_handler(
            5,
            Box::new(OscStringHandler::new(move |_: &mut Log, data: &str| {
                sink.borrow_mut().push(data.to_string());
                HandlerResult::Handled
            })),
        );

        parser.start(&mut log);
        put(&mut parser, &mut log, "5;0123456789");
        parser.end(&mut log, true);
        assert_eq!(seen.borrow().as_slice(), &["0123456789".to_string()]);

        parser.start(&mut log);
        put(&mut parser, &mut log, "5;01234");
        put(&mut parser, &mut log, "567890");
        parser.end(&mut log, true);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_string_handler_not_called_on_cancel() {
        let mut parser = OscParser::new();
        let mut calls = 0usize;
        parser.register_handler(
            2,
            Box::new(OscStringHandler::new(|n: &mut usize, _: &str| {
                *n += 1;
                HandlerResult::Handled
            })),
        );
        parser.start(&mut calls);
        parser.put(&mut calls, &string_to_utf32("2;title"));
        parser.end(&mut calls, false);
        assert_eq!(calls, 0);
        parser.start(&mut calls);
        parser.put(&mut calls, &string_to_utf32("2;title"));
        parser.end(&mut calls, true);
        assert_eq!(calls, 1);
    }
}

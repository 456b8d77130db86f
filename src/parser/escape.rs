//! Escape sequence parser
//!
//! A table-driven VT500 state machine over UTF-32 codepoints. Plain text is
//! handed to the print handler in runs, C0/C1 controls to execute handlers,
//! ESC and CSI sequences to handler chains keyed by their packed identifier,
//! and OSC/DCS/APC strings to the matching sub-parser.
//!
//! Hot paths (print runs, parameter digits and string payloads) use local
//! read-ahead loops instead of a table lookup per codepoint. Their exit
//! conditions mirror the table and must be kept in sync with it.
//!
//! Handlers may return [`HandlerResult::Pending`]. The parser then stops,
//! records where it was in a [`ResumeState`] and returns
//! [`ParseStatus::Suspended`]; the caller finishes the outstanding work and
//! calls [`EscapeSequenceParser::resume`] with the same chunk.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::apc::ApcParser;
use super::constants::{ParserAction, ParserState, NON_ASCII_PRINTABLE};
use super::dcs::DcsParser;
use super::handler::{
    ident_to_string, run_chain, ApcHandler, ChainOutcome, CsiFallback, CsiHandler, DcsFallback,
    DcsHandler, ErrorAction, ErrorHandler, EscFallback, EscHandler, ExecuteFallback,
    ExecuteHandler, FunctionIdentifier, HandlerKind, HandlerResult, HandlerTable, HandlerToken,
    OscHandler, ParseStatus, ParsingState, PrintHandler, StringFallback, SubParserStatus,
};
use super::osc::OscParser;
use super::params::Params;
use super::transition::TransitionTable;
use crate::error::{Error, Result};

/// What the parser was doing when a handler suspended it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuspendKind {
    /// Not suspended
    #[default]
    None,
    /// Fed again while suspended; only `reset` recovers
    Fail,
    /// Reset while suspended; the next parse skips the pending codepoint
    Reset,
    Csi,
    Esc,
    Osc,
    Dcs,
    Apc,
}

/// Saved position of a suspended parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumeState {
    pub kind: SuspendKind,
    /// Identifier of the CSI/ESC sequence being dispatched
    pub ident: u32,
    /// Position of the pending handler in its chain
    pub handler_pos: usize,
    /// State to enter once the dispatch completes
    pub next_state: ParserState,
    /// Index of the codepoint that triggered the dispatch
    pub chunk_pos: usize,
}

/// VT500 escape sequence parser dispatching into a context `C`
pub struct EscapeSequenceParser<C> {
    initial_state: ParserState,
    current_state: ParserState,
    transitions: Arc<TransitionTable>,
    params: Params,
    collect: u32,

    print_handler: Option<PrintHandler<C>>,
    execute_handlers: HashMap<u32, ExecuteHandler<C>>,
    execute_fallback: Option<ExecuteFallback<C>>,
    csi_handlers: HandlerTable<CsiHandler<C>>,
    csi_fallback: Option<CsiFallback<C>>,
    esc_handlers: HandlerTable<EscHandler<C>>,
    esc_fallback: Option<EscFallback<C>>,
    error_handler: Option<ErrorHandler<C>>,

    osc: OscParser<C>,
    dcs: DcsParser<C>,
    apc: ApcParser<C>,

    stack: ResumeState,
}

impl<C> Default for EscapeSequenceParser<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EscapeSequenceParser<C> {
    /// Create a parser using the VT500 table
    pub fn new() -> Self {
        Self::with_transitions(TransitionTable::vt500())
    }

    /// Create a parser with a custom transition table
    pub fn with_transitions(transitions: Arc<TransitionTable>) -> Self {
        let mut parser = Self {
            initial_state: ParserState::Ground,
            current_state: ParserState::Ground,
            transitions,
            params: Params::new(),
            collect: 0,
            print_handler: None,
            execute_handlers: HashMap::new(),
            execute_fallback: None,
            csi_handlers: HandlerTable::default(),
            csi_fallback: None,
            esc_handlers: HandlerTable::default(),
            esc_fallback: None,
            error_handler: None,
            osc: OscParser::new(),
            dcs: DcsParser::new(),
            apc: ApcParser::new(),
            stack: ResumeState::default(),
        };
        parser.params.push_param(0);
        // 7-bit ST terminating a string arrives as a bare `ESC \`
        parser
            .esc_handlers
            .register(b'\\' as u32, Box::new(|_: &mut C| HandlerResult::Handled));
        parser
    }

    /// Replace the parameter storage limits
    pub fn set_param_limits(&mut self, max_params: usize, max_sub_params: usize) {
        self.params = Params::with_limits(max_params, max_sub_params);
        self.params.push_param(0);
    }

    /// Payload limit applied to OSC, DCS and APC strings
    pub fn set_payload_limit(&mut self, limit: usize) {
        self.osc.set_payload_limit(limit);
        self.dcs.set_payload_limit(limit);
        self.apc.set_payload_limit(limit);
    }

    pub fn current_state(&self) -> ParserState {
        self.current_state
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn collect(&self) -> u32 {
        self.collect
    }

    pub fn resume_state(&self) -> ResumeState {
        self.stack
    }

    /// Whether a handler is still pending
    pub fn is_suspended(&self) -> bool {
        matches!(
            self.stack.kind,
            SuspendKind::Csi
                | SuspendKind::Esc
                | SuspendKind::Osc
                | SuspendKind::Dcs
                | SuspendKind::Apc
        )
    }

    pub fn set_print_handler(&mut self, handler: impl FnMut(&mut C, &[u32]) + 'static) {
        self.print_handler = Some(Box::new(handler));
    }

    pub fn clear_print_handler(&mut self) {
        self.print_handler = None;
    }

    pub fn set_execute_handler(&mut self, code: u32, handler: impl FnMut(&mut C) + 'static) {
        self.execute_handlers.insert(code, Box::new(handler));
    }

    pub fn clear_execute_handler(&mut self, code: u32) {
        self.execute_handlers.remove(&code);
    }

    pub fn set_execute_handler_fallback(&mut self, handler: impl FnMut(&mut C, u32) + 'static) {
        self.execute_fallback = Some(Box::new(handler));
    }

    pub fn register_csi_handler(
        &mut self,
        id: &FunctionIdentifier,
        handler: impl FnMut(&mut C, &Params) -> HandlerResult + 'static,
    ) -> Result<HandlerToken> {
        let ident = id.ident(0x40..=0x7e)?;
        let serial = self.csi_handlers.register(ident, Box::new(handler));
        Ok(HandlerToken {
            kind: HandlerKind::Csi,
            ident,
            serial,
        })
    }

    pub fn clear_csi_handler(&mut self, id: &FunctionIdentifier) -> Result<()> {
        self.csi_handlers.clear(id.ident(0x40..=0x7e)?);
        Ok(())
    }

    pub fn set_csi_handler_fallback(&mut self, handler: impl FnMut(&mut C, u32, &Params) + 'static) {
        self.csi_fallback = Some(Box::new(handler));
    }

    pub fn register_esc_handler(
        &mut self,
        id: &FunctionIdentifier,
        handler: impl FnMut(&mut C) -> HandlerResult + 'static,
    ) -> Result<HandlerToken> {
        let ident = id.ident(0x30..=0x7e)?;
        let serial = self.esc_handlers.register(ident, Box::new(handler));
        Ok(HandlerToken {
            kind: HandlerKind::Esc,
            ident,
            serial,
        })
    }

    pub fn clear_esc_handler(&mut self, id: &FunctionIdentifier) -> Result<()> {
        self.esc_handlers.clear(id.ident(0x30..=0x7e)?);
        Ok(())
    }

    pub fn set_esc_handler_fallback(&mut self, handler: impl FnMut(&mut C, u32) + 'static) {
        self.esc_fallback = Some(Box::new(handler));
    }

    pub fn register_osc_handler(
        &mut self,
        ident: u32,
        handler: impl OscHandler<C> + 'static,
    ) -> HandlerToken {
        let serial = self.osc.register_handler(ident, Box::new(handler));
        HandlerToken {
            kind: HandlerKind::Osc,
            ident,
            serial,
        }
    }

    pub fn clear_osc_handler(&mut self, ident: u32) {
        self.osc.clear_handler(ident);
    }

    pub fn set_osc_handler_fallback(&mut self, handler: StringFallback<C>) {
        self.osc.set_handler_fallback(handler);
    }

    pub fn register_dcs_handler(
        &mut self,
        id: &FunctionIdentifier,
        handler: impl DcsHandler<C> + 'static,
    ) -> Result<HandlerToken> {
        let ident = id.ident(0x40..=0x7e)?;
        let serial = self.dcs.register_handler(ident, Box::new(handler));
        Ok(HandlerToken {
            kind: HandlerKind::Dcs,
            ident,
            serial,
        })
    }

    pub fn clear_dcs_handler(&mut self, id: &FunctionIdentifier) -> Result<()> {
        self.dcs.clear_handler(id.ident(0x40..=0x7e)?);
        Ok(())
    }

    pub fn set_dcs_handler_fallback(&mut self, handler: DcsFallback<C>) {
        self.dcs.set_handler_fallback(handler);
    }

    pub fn register_apc_handler(
        &mut self,
        ident: u32,
        handler: impl ApcHandler<C> + 'static,
    ) -> HandlerToken {
        let serial = self.apc.register_handler(ident, Box::new(handler));
        HandlerToken {
            kind: HandlerKind::Apc,
            ident,
            serial,
        }
    }

    pub fn clear_apc_handler(&mut self, ident: u32) {
        self.apc.clear_handler(ident);
    }

    pub fn set_apc_handler_fallback(&mut self, handler: StringFallback<C>) {
        self.apc.set_handler_fallback(handler);
    }

    /// Number of leading APC codepoints forming the identifier
    pub fn set_apc_ident_length(&mut self, length: usize) {
        self.apc.set_ident_length(length);
    }

    pub fn set_error_handler(
        &mut self,
        handler: impl FnMut(&mut C, &ParsingState<'_>) -> ErrorAction + 'static,
    ) {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn clear_error_handler(&mut self) {
        self.error_handler = None;
    }

    /// Unregister a handler, returns false if it was already gone
    pub fn remove_handler(&mut self, token: HandlerToken) -> bool {
        match token.kind {
            HandlerKind::Csi => self.csi_handlers.remove(token.ident, token.serial),
            HandlerKind::Esc => self.esc_handlers.remove(token.ident, token.serial),
            HandlerKind::Osc => self.osc.remove_handler(token.ident, token.serial),
            HandlerKind::Dcs => self.dcs.remove_handler(token.ident, token.serial),
            HandlerKind::Apc => self.apc.remove_handler(token.ident, token.serial),
        }
    }

    /// Return to the initial state, dropping any partial sequence
    ///
    /// Active OSC/DCS/APC handlers are ended unsuccessfully. Registrations
    /// are kept. Also lifts the improper continuation condition; a pending
    /// handler is abandoned and the next `parse` continues after the
    /// codepoint that triggered it.
    pub fn reset(&mut self, ctx: &mut C) {
        self.current_state = self.initial_state;
        self.osc.reset(ctx);
        self.dcs.reset(ctx);
        self.apc.reset(ctx);
        self.clear_sequence();
        if self.stack.kind != SuspendKind::None {
            debug!(kind = ?self.stack.kind, "parser reset while suspended");
            self.stack.kind = SuspendKind::Reset;
        }
    }

    /// Parse a chunk of codepoints
    ///
    /// Must not be called while suspended; resume first.
    pub fn parse(&mut self, ctx: &mut C, data: &[u32]) -> Result<ParseStatus> {
        match self.stack.kind {
            SuspendKind::None => Ok(self.run(ctx, data, 0)),
            SuspendKind::Reset => {
                self.stack.kind = SuspendKind::None;
                Ok(self.run(ctx, data, self.stack.chunk_pos + 1))
            }
            _ => {
                self.stack.kind = SuspendKind::Fail;
                Err(Error::ImproperContinuation)
            }
        }
    }

    /// Continue a suspended parse
    ///
    /// `data` must be the chunk passed to the suspended `parse`. `handled`
    /// is the outcome of the pending handler: `false` lets older handlers
    /// for the same sequence try.
    pub fn resume(&mut self, ctx: &mut C, data: &[u32], handled: bool) -> Result<ParseStatus> {
        let stack = self.stack;
        match stack.kind {
            SuspendKind::None => return Err(Error::NotSuspended),
            SuspendKind::Fail => return Err(Error::ImproperContinuation),
            SuspendKind::Reset => return self.parse(ctx, data),
            SuspendKind::Csi => {
                if !handled {
                    let params = &self.params;
                    let outcome = match self.csi_handlers.get_mut(stack.ident) {
                        Some(list) => run_chain(list, stack.handler_pos, |h| h(ctx, params)),
                        None => ChainOutcome::Exhausted,
                    };
                    match outcome {
                        ChainOutcome::Pending(pos) => {
                            self.stack.handler_pos = pos;
                            return Ok(ParseStatus::Suspended);
                        }
                        ChainOutcome::Exhausted => self.csi_unhandled(ctx, stack.ident),
                        ChainOutcome::Handled => {}
                    }
                }
            }
            SuspendKind::Esc => {
                if !handled {
                    let outcome = match self.esc_handlers.get_mut(stack.ident) {
                        Some(list) => run_chain(list, stack.handler_pos, |h| h(ctx)),
                        None => ChainOutcome::Exhausted,
                    };
                    match outcome {
                        ChainOutcome::Pending(pos) => {
                            self.stack.handler_pos = pos;
                            return Ok(ParseStatus::Suspended);
                        }
                        ChainOutcome::Exhausted => self.esc_unhandled(ctx, stack.ident),
                        ChainOutcome::Handled => {}
                    }
                }
            }
            SuspendKind::Osc | SuspendKind::Dcs | SuspendKind::Apc => {
                let code = data.get(stack.chunk_pos).copied().unwrap_or(0);
                let success = code != 0x18 && code != 0x1a;
                let status = match stack.kind {
                    SuspendKind::Osc => self.osc.resume(ctx, success, handled),
                    SuspendKind::Dcs => self.dcs.resume(ctx, success, handled),
                    _ => self.apc.resume(ctx, success, handled),
                };
                if status == SubParserStatus::Pending {
                    return Ok(ParseStatus::Suspended);
                }
                if code == 0x1b {
                    self.stack.next_state = ParserState::Escape;
                }
                self.clear_sequence();
            }
        }
        self.stack.kind = SuspendKind::None;
        self.current_state = self.stack.next_state;
        Ok(self.run(ctx, data, stack.chunk_pos + 1))
    }

    fn run(&mut self, ctx: &mut C, data: &[u32], start: usize) -> ParseStatus {
        let length = data.len();
        let mut i = start;
        while i < length {
            let mut code = data[i];
            let (action, mut next) = self.transitions.transition(self.current_state, code);
            match action {
                ParserAction::Print => {
                    let mut j = i + 1;
                    while j < length && is_print_run(data[j]) {
                        j += 1;
                    }
                    if let Some(print) = self.print_handler.as_mut() {
                        print(ctx, &data[i..j]);
                    }
                    i = j - 1;
                }
                ParserAction::Execute => match self.execute_handlers.get_mut(&code) {
                    Some(handler) => handler(ctx),
                    None => match self.execute_fallback.as_mut() {
                        Some(fallback) => fallback(ctx, code),
                        None => trace!(code, "unhandled execute"),
                    },
                },
                ParserAction::Ignore => {}
                ParserAction::Error => {
                    if let Some(handler) = self.error_handler.as_mut() {
                        let state = ParsingState {
                            position: i,
                            code,
                            current_state: self.current_state,
                            collect: self.collect,
                            params: &self.params,
                        };
                        if handler(ctx, &state) == ErrorAction::Abort {
                            return ParseStatus::Aborted;
                        }
                    }
                }
                ParserAction::CsiDispatch => {
                    let ident = self.collect << 8 | code;
                    let params = &self.params;
                    let outcome = match self.csi_handlers.get_mut(ident) {
                        Some(list) => {
                            let len = list.len();
                            run_chain(list, len, |h| h(ctx, params))
                        }
                        None => ChainOutcome::Exhausted,
                    };
                    match outcome {
                        ChainOutcome::Pending(pos) => {
                            self.suspend(SuspendKind::Csi, ident, pos, next, i);
                            return ParseStatus::Suspended;
                        }
                        ChainOutcome::Exhausted => self.csi_unhandled(ctx, ident),
                        ChainOutcome::Handled => {}
                    }
                }
                ParserAction::Param => {
                    loop {
                        match code {
                            0x3b => self.params.push_param(0),
                            0x3a => self.params.push_sub_param(-1),
                            _ => self.params.add_digit(code - 0x30),
                        }
                        i += 1;
                        if i >= length {
                            break;
                        }
                        code = data[i];
                        if !(0x30..0x3c).contains(&code) {
                            break;
                        }
                    }
                    i -= 1;
                }
                ParserAction::Collect => {
                    self.collect = self.collect << 8 | code;
                }
                ParserAction::EscDispatch => {
                    let ident = self.collect << 8 | code;
                    let outcome = match self.esc_handlers.get_mut(ident) {
                        Some(list) => {
                            let len = list.len();
                            run_chain(list, len, |h| h(ctx))
                        }
                        None => ChainOutcome::Exhausted,
                    };
                    match outcome {
                        ChainOutcome::Pending(pos) => {
                            self.suspend(SuspendKind::Esc, ident, pos, next, i);
                            return ParseStatus::Suspended;
                        }
                        ChainOutcome::Exhausted => self.esc_unhandled(ctx, ident),
                        ChainOutcome::Handled => {}
                    }
                }
                ParserAction::Clear => self.clear_sequence(),
                ParserAction::DcsHook => {
                    self.dcs.hook(ctx, self.collect << 8 | code, &self.params);
                }
                ParserAction::DcsPut => {
                    let mut j = i + 1;
                    while j < length {
                        let c = data[j];
                        if c == 0x18 || c == 0x1a || c == 0x1b || (0x80..NON_ASCII_PRINTABLE).contains(&c) {
                            break;
                        }
                        j += 1;
                    }
                    self.dcs.put(ctx, &data[i..j]);
                    i = j - 1;
                }
                ParserAction::DcsUnhook => {
                    if self.dcs.unhook(ctx, code != 0x18 && code != 0x1a) == SubParserStatus::Pending {
                        self.suspend(SuspendKind::Dcs, 0, 0, next, i);
                        return ParseStatus::Suspended;
                    }
                    if code == 0x1b {
                        next = ParserState::Escape;
                    }
                    self.clear_sequence();
                }
                ParserAction::OscStart => self.osc.start(ctx),
                ParserAction::OscPut => {
                    let j = string_run_end(data, i);
                    self.osc.put(ctx, &data[i..j]);
                    i = j - 1;
                }
                ParserAction::OscEnd => {
                    if self.osc.end(ctx, code != 0x18 && code != 0x1a) == SubParserStatus::Pending {
                        self.suspend(SuspendKind::Osc, 0, 0, next, i);
                        return ParseStatus::Suspended;
                    }
                    if code == 0x1b {
                        next = ParserState::Escape;
                    }
                    self.clear_sequence();
                }
                ParserAction::ApcStart => self.apc.start(ctx),
                ParserAction::ApcPut => {
                    let j = string_run_end(data, i);
                    self.apc.put(ctx, &data[i..j]);
                    i = j - 1;
                }
                ParserAction::ApcEnd => {
                    if self.apc.end(ctx, code != 0x18 && code != 0x1a) == SubParserStatus::Pending {
                        self.suspend(SuspendKind::Apc, 0, 0, next, i);
                        return ParseStatus::Suspended;
                    }
                    if code == 0x1b {
                        next = ParserState::Escape;
                    }
                    self.clear_sequence();
                }
            }
            self.current_state = next;
            i += 1;
        }
        ParseStatus::Done
    }

    fn suspend(&mut self, kind: SuspendKind, ident: u32, handler_pos: usize, next: ParserState, chunk_pos: usize) {
        self.stack = ResumeState {
            kind,
            ident,
            handler_pos,
            next_state: next,
            chunk_pos,
        };
    }

    fn clear_sequence(&mut self) {
        self.params.reset();
        self.params.push_param(0);
        self.collect = 0;
    }

    fn csi_unhandled(&mut self, ctx: &mut C, ident: u32) {
        match self.csi_fallback.as_mut() {
            Some(fallback) => fallback(ctx, ident, &self.params),
            None => trace!(
                ident = %ident_to_string(ident),
                params = ?self.params.to_array(),
                "unhandled CSI"
            ),
        }
    }

    fn esc_unhandled(&mut self, ctx: &mut C, ident: u32) {
        match self.esc_fallback.as_mut() {
            Some(fallback) => fallback(ctx, ident),
            None => trace!(ident = %ident_to_string(ident), "unhandled ESC"),
        }
    }
}

/// Printable codepoints continuing a print run (SP included, DEL and C1 not)
#[inline]
fn is_print_run(code: u32) -> bool {
    code >= 0x20 && !(0x7f..NON_ASCII_PRINTABLE).contains(&code)
}

/// End of an OSC/APC payload run starting at `i` (DEL included)
#[inline]
fn string_run_end(data: &[u32], i: usize) -> usize {
    let mut j = i + 1;
    while j < data.len() {
        let c = data[j];
        if c < 0x20 || (0x80..NON_ASCII_PRINTABLE).contains(&c) {
            break;
        }
        j += 1;
    }
    j
}

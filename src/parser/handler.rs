//! Handler types and registration plumbing
//!
//! Handlers receive a mutable context `C` (for the input handler this is the
//! terminal buffer) so they can act on the dispatched command without shared
//! ownership tricks. Handler results are explicit: a handler either claims
//! the sequence, lets the next older handler for the same identifier try, or
//! reports that it will finish later.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use crate::error::{Error, Result};

use super::constants::ParserState;
use super::params::Params;

/// Outcome of a single handler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// Sequence claimed, older handlers do not see it
    Handled,
    /// Not handled here, let the next older handler try
    Bubble,
    /// Work continues outside the parser, resume with the final outcome
    Pending,
}

impl From<bool> for HandlerResult {
    fn from(handled: bool) -> Self {
        if handled {
            HandlerResult::Handled
        } else {
            HandlerResult::Bubble
        }
    }
}

/// Outcome of a `parse` or `resume` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The whole chunk was consumed
    Done,
    /// A handler returned [`HandlerResult::Pending`]; call `resume` with the
    /// same chunk once its outcome is known
    Suspended,
    /// The error handler requested to stop
    Aborted,
}

/// What the error handler wants the parser to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorAction {
    #[default]
    Continue,
    Abort,
}

/// Parser state reported to the error handler
#[derive(Debug, Clone, Copy)]
pub struct ParsingState<'a> {
    /// Position of the offending codepoint in the current chunk
    pub position: usize,
    /// The offending codepoint
    pub code: u32,
    /// State the parser was in
    pub current_state: ParserState,
    /// Collected prefix and intermediate bytes
    pub collect: u32,
    /// Parameters collected so far
    pub params: &'a Params,
}

/// Sub-parser notifications passed to OSC/APC fallback handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEvent<'a> {
    Start,
    Put(&'a [u32]),
    End(bool),
}

/// Sub-parser notifications passed to the DCS fallback handler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DcsEvent<'a> {
    Hook(&'a Params),
    Put(&'a [u32]),
    Unhook(bool),
}

pub type PrintHandler<C> = Box<dyn FnMut(&mut C, &[u32])>;
pub type ExecuteHandler<C> = Box<dyn FnMut(&mut C)>;
pub type ExecuteFallback<C> = Box<dyn FnMut(&mut C, u32)>;
pub type CsiHandler<C> = Box<dyn FnMut(&mut C, &Params) -> HandlerResult>;
pub type CsiFallback<C> = Box<dyn FnMut(&mut C, u32, &Params)>;
pub type EscHandler<C> = Box<dyn FnMut(&mut C) -> HandlerResult>;
pub type EscFallback<C> = Box<dyn FnMut(&mut C, u32)>;
pub type StringFallback<C> = Box<dyn FnMut(&mut C, u32, StringEvent<'_>)>;
pub type DcsFallback<C> = Box<dyn FnMut(&mut C, u32, DcsEvent<'_>)>;
pub type ErrorHandler<C> = Box<dyn FnMut(&mut C, &ParsingState<'_>) -> ErrorAction>;

/// Handler for OSC commands of one identifier
pub trait OscHandler<C> {
    /// A new command with this identifier begins
    fn start(&mut self, ctx: &mut C);
    /// A payload chunk; may be called many times
    fn put(&mut self, ctx: &mut C, data: &[u32]);
    /// The command ended, `success` is false on cancel or abort
    fn end(&mut self, ctx: &mut C, success: bool) -> HandlerResult;
}

/// Handler for DCS commands of one identifier
pub trait DcsHandler<C> {
    fn hook(&mut self, ctx: &mut C, params: &Params);
    fn put(&mut self, ctx: &mut C, data: &[u32]);
    fn unhook(&mut self, ctx: &mut C, success: bool) -> HandlerResult;
}

/// Handler for APC commands of one identifier
pub trait ApcHandler<C> {
    fn start(&mut self, ctx: &mut C);
    fn put(&mut self, ctx: &mut C, data: &[u32]);
    fn end(&mut self, ctx: &mut C, success: bool) -> HandlerResult;
}

/// Which registry a [`HandlerToken`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Csi,
    Esc,
    Osc,
    Dcs,
    Apc,
}

/// Returned by handler registration, pass it back to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken {
    pub kind: HandlerKind,
    pub ident: u32,
    pub(crate) serial: u64,
}

/// ESC/CSI/DCS function identifier
///
/// `CSI ? 25 h` is `FunctionIdentifier::new(b'h').prefix(b'?')`, `CSI " q`
/// is `FunctionIdentifier::new(b'q').intermediates(b"\"")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionIdentifier {
    pub prefix: Option<u8>,
    pub intermediates: Vec<u8>,
    pub final_byte: u8,
}

impl FunctionIdentifier {
    pub fn new(final_byte: u8) -> Self {
        Self {
            prefix: None,
            intermediates: Vec::new(),
            final_byte,
        }
    }

    pub fn prefix(mut self, prefix: u8) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn intermediates(mut self, intermediates: &[u8]) -> Self {
        self.intermediates = intermediates.to_vec();
        self
    }

    /// Pack into the integer key used for dispatch
    ///
    /// Layout is `prefix, intermediates..., final` from high to low byte.
    pub fn ident(&self, final_range: RangeInclusive<u8>) -> Result<u32> {
        let mut res: u32 = 0;
        if let Some(prefix) = self.prefix {
            if !(0x3c..=0x3f).contains(&prefix) {
                return Err(Error::InvalidIdentifier(
                    "prefix must be in range 0x3c .. 0x3f".into(),
                ));
            }
            res = prefix as u32;
        }
        if self.intermediates.len() > 2 {
            return Err(Error::InvalidIdentifier(
                "only two bytes as intermediates are supported".into(),
            ));
        }
        for &byte in &self.intermediates {
            if !(0x20..=0x2f).contains(&byte) {
                return Err(Error::InvalidIdentifier(
                    "intermediate must be in range 0x20 .. 0x2f".into(),
                ));
            }
            res = res << 8 | byte as u32;
        }
        if !final_range.contains(&self.final_byte) {
            return Err(Error::InvalidIdentifier(format!(
                "final must be in range {:#x} .. {:#x}",
                final_range.start(),
                final_range.end()
            )));
        }
        Ok(res << 8 | self.final_byte as u32)
    }
}

/// Decode a packed identifier back into its bytes, for diagnostics
pub fn ident_to_string(mut ident: u32) -> String {
    let mut bytes = Vec::with_capacity(4);
    while ident != 0 {
        bytes.push((ident & 0xff) as u8);
        ident >>= 8;
    }
    bytes.iter().rev().map(|b| *b as char).collect()
}

/// A handler stored together with its registration serial
pub(crate) struct Registered<T> {
    pub(crate) serial: u64,
    pub(crate) handler: T,
}

/// Ordered handler lists keyed by identifier, oldest first
pub(crate) struct HandlerTable<T> {
    handlers: HashMap<u32, Vec<Registered<T>>>,
    next_serial: u64,
}

impl<T> Default for HandlerTable<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            next_serial: 0,
        }
    }
}

impl<T> HandlerTable<T> {
    pub(crate) fn register(&mut self, ident: u32, handler: T) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.handlers
            .entry(ident)
            .or_default()
            .push(Registered { serial, handler });
        serial
    }

    pub(crate) fn remove(&mut self, ident: u32, serial: u64) -> bool {
        let Some(list) = self.handlers.get_mut(&ident) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.serial == serial) else {
            return false;
        };
        list.remove(pos);
        true
    }

    pub(crate) fn clear(&mut self, ident: u32) {
        self.handlers.remove(&ident);
    }

    pub(crate) fn get_mut(&mut self, ident: u32) -> Option<&mut Vec<Registered<T>>> {
        self.handlers.get_mut(&ident)
    }

    pub(crate) fn len(&self, ident: u32) -> usize {
        self.handlers.get(&ident).map_or(0, Vec::len)
    }
}

/// Result of walking a handler chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainOutcome {
    Handled,
    Exhausted,
    /// Suspended at this position
    Pending(usize),
}

/// Call handlers below position `below`, newest first, until one claims
/// the sequence or suspends
pub(crate) fn run_chain<T>(
    entries: &mut [Registered<T>],
    below: usize,
    mut call: impl FnMut(&mut T) -> HandlerResult,
) -> ChainOutcome {
    for pos in (0..below.min(entries.len())).rev() {
        match call(&mut entries[pos].handler) {
            HandlerResult::Handled => return ChainOutcome::Handled,
            HandlerResult::Bubble => {}
            HandlerResult::Pending => return ChainOutcome::Pending(pos),
        }
    }
    ChainOutcome::Exhausted
}

/// Progress of a sub-parser `end`/`unhook`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubParserStatus {
    Done,
    /// A handler suspended; resume the sub-parser with its outcome
    Pending,
}

/// Saved position of a suspended end/unhook chain
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ChainStack {
    pub(crate) paused: bool,
    pub(crate) loop_position: usize,
    /// Suspended while closing out older handlers with `success = false`
    pub(crate) fall_through: bool,
}

/// Run the end phase of a string command over `entries`, newest first
///
/// The first handler that does not bubble claims the command; every older
/// handler is still ended with `success = false` so it can release its
/// state. `resumed` carries the outcome of a previously pending handler.
pub(crate) fn finish_chain<T>(
    entries: &mut [Registered<T>],
    stack: &mut ChainStack,
    success: bool,
    resumed: Option<bool>,
    mut end: impl FnMut(&mut T, bool) -> HandlerResult,
) -> SubParserStatus {
    let mut j = entries.len() as isize - 1;
    let mut handled = false;
    let mut fall_through = false;
    if stack.paused {
        j = (stack.loop_position as isize - 1).min(j);
        handled = resumed.unwrap_or(true);
        fall_through = stack.fall_through;
        stack.paused = false;
    }
    if !fall_through && !handled {
        while j >= 0 {
            match end(&mut entries[j as usize].handler, success) {
                HandlerResult::Handled => break,
                HandlerResult::Bubble => j -= 1,
                HandlerResult::Pending => {
                    *stack = ChainStack {
                        paused: true,
                        loop_position: j as usize,
                        fall_through: false,
                    };
                    return SubParserStatus::Pending;
                }
            }
        }
        j -= 1;
    }
    while j >= 0 {
        if end(&mut entries[j as usize].handler, false) == HandlerResult::Pending {
            *stack = ChainStack {
                paused: true,
                loop_position: j as usize,
                fall_through: true,
            };
            return SubParserStatus::Pending;
        }
        j -= 1;
    }
    SubParserStatus::Done
}

/// Close out every handler that has not been ended yet, ignoring results
pub(crate) fn abort_chain<T>(
    entries: &mut [Registered<T>],
    stack: &mut ChainStack,
    mut end: impl FnMut(&mut T),
) {
    let len = entries.len();
    let below = if stack.paused { stack.loop_position.min(len) } else { len };
    for entry in entries[..below].iter_mut().rev() {
        end(&mut entry.handler);
    }
    stack.paused = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_layout() {
        let id = FunctionIdentifier::new(b'm');
        assert_eq!(id.ident(0x40..=0x7e).unwrap(), b'm' as u32);

        let id = FunctionIdentifier::new(b'h').prefix(b'?');
        assert_eq!(id.ident(0x40..=0x7e).unwrap(), (b'?' as u32) << 8 | b'h' as u32);

        let id = FunctionIdentifier::new(b'q').prefix(b'>').intermediates(b" $");
        assert_eq!(
            id.ident(0x40..=0x7e).unwrap(),
            (b'>' as u32) << 24 | (b' ' as u32) << 16 | (b'$' as u32) << 8 | b'q' as u32
        );
    }

    #[test]
    fn test_ident_errors() {
        assert!(FunctionIdentifier::new(b'm').prefix(b'!').ident(0x40..=0x7e).is_err());
        assert!(FunctionIdentifier::new(b'm')
            .intermediates(b"!!!")
            .ident(0x40..=0x7e)
            .is_err());
        assert!(FunctionIdentifier::new(b'm')
            .intermediates(b"0")
            .ident(0x40..=0x7e)
            .is_err());
        assert!(FunctionIdentifier::new(b'0').ident(0x40..=0x7e).is_err());
        assert!(FunctionIdentifier::new(b'0').ident(0x30..=0x7e).is_ok());
    }

    #[test]
    fn test_ident_to_string() {
        let ident = FunctionIdentifier::new(b'q')
            .prefix(b'?')
            .intermediates(b"$")
            .ident(0x40..=0x7e)
            .unwrap();
        assert_eq!(ident_to_string(ident), "?$q");
        assert_eq!(ident_to_string(0), "");
    }

    #[test]
    fn test_handler_table_remove() {
        let mut table: HandlerTable<&str> = HandlerTable::default();
        let a = table.register(1, "a");
        let b = table.register(1, "b");
        assert_eq!(table.len(1), 2);
        assert!(table.remove(1, a));
        assert!(!table.remove(1, a));
        assert_eq!(table.get_mut(1).unwrap()[0].serial, b);
        table.clear(1);
        assert_eq!(table.len(1), 0);
    }

    #[test]
    fn test_run_chain_order() {
        let mut table: HandlerTable<(usize, HandlerResult)> = HandlerTable::default();
        table.register(0, (0, HandlerResult::Handled));
        table.register(0, (1, HandlerResult::Bubble));
        table.register(0, (2, HandlerResult::Bubble));
        let mut seen = Vec::new();
        let list = table.get_mut(0).unwrap();
        let len = list.len();
        let outcome = run_chain(list, len, |(id, res)| {
            seen.push(*id);
            *res
        });
        assert_eq!(outcome, ChainOutcome::Handled);
        assert_eq!(seen, vec![2, 1, 0]);
    }

    fn chain(results: &[HandlerResult]) -> HandlerTable<(usize, HandlerResult)> {
        let mut table = HandlerTable::default();
        for (i, r) in results.iter().enumerate() {
            table.register(0, (i, *r));
        }
        table
    }

    #[test]
    fn test_finish_chain_cleans_up_older_handlers() {
        use HandlerResult::*;
        let mut table = chain(&[Bubble, Handled, Bubble]);
        let mut stack = ChainStack::default();
        let mut calls = Vec::new();
        let status = finish_chain(table.get_mut(0).unwrap(), &mut stack, true, None, |(id, r), ok| {
            calls.push((*id, ok));
            *r
        });
        assert_eq!(status, SubParserStatus::Done);
        assert_eq!(calls, vec![(2, true), (1, true), (0, false)]);
    }

    #[test]
    fn test_finish_chain_resume() {
        use HandlerResult::*;
        let mut table = chain(&[Bubble, Bubble, Pending]);
        let mut stack = ChainStack::default();
        let mut calls = Vec::new();
        let mut record = |(id, r): &mut (usize, HandlerResult), ok: bool| {
            calls.push((*id, ok));
            *r
        };
        let list = table.get_mut(0).unwrap();
        assert_eq!(
            finish_chain(list, &mut stack, true, None, &mut record),
            SubParserStatus::Pending
        );
        // pending handler declined, older ones get the full end
        assert_eq!(
            finish_chain(list, &mut stack, true, Some(false), &mut record),
            SubParserStatus::Done
        );
        assert_eq!(calls, vec![(2, true), (1, true), (0, true)]);
    }

    #[test]
    fn test_finish_chain_resume_handled() {
        use HandlerResult::*;
        let mut table = chain(&[Bubble, Bubble, Pending]);
        let mut stack = ChainStack::default();
        let mut calls = Vec::new();
        let mut record = |(id, r): &mut (usize, HandlerResult), ok: bool| {
            calls.push((*id, ok));
            *r
        };
        let list = table.get_mut(0).unwrap();
        finish_chain(list, &mut stack, true, None, &mut record);
        finish_chain(list, &mut stack, true, Some(true), &mut record);
        assert_eq!(calls, vec![(2, true), (1, false), (0, false)]);
    }
}

//! VT500 transition table
//!
//! Each entry packs the action and the next state for a `(state, code)`
//! pair: `action << 4 | next_state`. The table is indexed by
//! `state << 8 | code`, with every codepoint >= 0xA0 folded onto
//! [`NON_ASCII_PRINTABLE`].
//!
//! Based on the DEC ANSI parser by Paul Williams, with a dedicated APC
//! string state.

use std::ops::Range;
use std::sync::{Arc, OnceLock};

use super::constants::{ParserAction, ParserState, NON_ASCII_PRINTABLE};

const INDEX_STATE_SHIFT: usize = 8;
const TRANSITION_ACTION_SHIFT: u16 = 4;
const TRANSITION_STATE_MASK: u16 = 15;

/// Number of entries needed for all states
pub const TABLE_SIZE: usize = 16 << INDEX_STATE_SHIFT;

/// Packed `(state, code) -> (action, next state)` lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    table: Box<[u16]>,
}

impl TransitionTable {
    /// Create a zeroed table (`Ignore` and `Ground` everywhere)
    pub fn new(length: usize) -> Self {
        Self {
            table: vec![0; length].into_boxed_slice(),
        }
    }

    /// Set every entry to `action` and `next`
    pub fn set_default(&mut self, action: ParserAction, next: ParserState) {
        self.table.fill(pack(action, next));
    }

    /// Add a transition for a single code
    pub fn add(&mut self, code: u32, state: ParserState, action: ParserAction, next: ParserState) {
        let index = (state as usize) << INDEX_STATE_SHIFT | code as usize;
        if let Some(slot) = self.table.get_mut(index) {
            *slot = pack(action, next);
        }
    }

    /// Add the same transition for many codes
    pub fn add_many<I>(&mut self, codes: I, state: ParserState, action: ParserAction, next: ParserState)
    where
        I: IntoIterator<Item = u32>,
    {
        for code in codes {
            self.add(code, state, action, next);
        }
    }

    /// Look up the action and next state for `code` in `state`
    #[inline]
    pub fn transition(&self, state: ParserState, code: u32) -> (ParserAction, ParserState) {
        let code = if code < NON_ASCII_PRINTABLE { code } else { NON_ASCII_PRINTABLE };
        let entry = self.table[(state as usize) << INDEX_STATE_SHIFT | code as usize];
        (
            ParserAction::from_u8((entry >> TRANSITION_ACTION_SHIFT) as u8),
            ParserState::from_u8((entry & TRANSITION_STATE_MASK) as u8),
        )
    }

    /// Shared instance of the default VT500 table
    pub fn vt500() -> Arc<TransitionTable> {
        static TABLE: OnceLock<Arc<TransitionTable>> = OnceLock::new();
        TABLE.get_or_init(|| Arc::new(build_vt500())).clone()
    }
}

fn pack(action: ParserAction, next: ParserState) -> u16 {
    (action as u16) << TRANSITION_ACTION_SHIFT | next as u16
}

/// C0 controls that are executed (everything except CAN, SUB and ESC)
fn executables() -> impl Iterator<Item = u32> + Clone {
    (0x00..0x18).chain([0x19]).chain(0x1c..0x20)
}

fn printables() -> Range<u32> {
    0x20..0x7f
}

fn build_vt500() -> TransitionTable {
    use ParserAction as A;
    use ParserState as S;

    let mut table = TransitionTable::new(TABLE_SIZE);
    table.set_default(A::Error, S::Ground);

    table.add_many(printables(), S::Ground, A::Print, S::Ground);

    // transitions valid from any state
    for state in ParserState::ALL {
        table.add_many([0x18, 0x1a, 0x99, 0x9a], state, A::Execute, S::Ground);
        table.add_many(0x80..0x90, state, A::Execute, S::Ground);
        table.add_many(0x90..0x98, state, A::Execute, S::Ground);
        table.add(0x9c, state, A::Ignore, S::Ground);
        table.add(0x1b, state, A::Clear, S::Escape);
        table.add(0x9d, state, A::OscStart, S::OscString);
        table.add_many([0x98, 0x9e], state, A::Ignore, S::SosPmApcString);
        table.add(0x9f, state, A::ApcStart, S::ApcString);
        table.add(0x9b, state, A::Clear, S::CsiEntry);
        table.add(0x90, state, A::Clear, S::DcsEntry);
    }

    // executables and DEL
    table.add_many(executables(), S::Ground, A::Execute, S::Ground);
    table.add_many(executables(), S::Escape, A::Execute, S::Escape);
    table.add(0x7f, S::Escape, A::Ignore, S::Escape);
    table.add_many(executables(), S::OscString, A::Ignore, S::OscString);
    for state in [S::CsiEntry, S::CsiParam, S::CsiIntermediate, S::EscapeIntermediate] {
        table.add_many(executables(), state, A::Execute, state);
        table.add(0x7f, state, A::Ignore, state);
    }
    table.add_many(executables(), S::CsiIgnore, A::Execute, S::CsiIgnore);

    // osc
    table.add(0x5d, S::Escape, A::OscStart, S::OscString);
    table.add_many(printables(), S::OscString, A::OscPut, S::OscString);
    table.add(0x7f, S::OscString, A::OscPut, S::OscString);
    table.add_many([0x9c, 0x1b, 0x18, 0x1a, 0x07], S::OscString, A::OscEnd, S::Ground);
    table.add_many(0x1c..0x20, S::OscString, A::Ignore, S::OscString);

    // sos and pm are swallowed
    table.add_many([0x58, 0x5e], S::Escape, A::Ignore, S::SosPmApcString);
    table.add_many(printables(), S::SosPmApcString, A::Ignore, S::SosPmApcString);
    table.add_many(executables(), S::SosPmApcString, A::Ignore, S::SosPmApcString);
    table.add(0x9c, S::SosPmApcString, A::Ignore, S::Ground);
    table.add(0x7f, S::SosPmApcString, A::Ignore, S::SosPmApcString);

    // apc
    table.add(0x5f, S::Escape, A::ApcStart, S::ApcString);
    table.add_many(printables(), S::ApcString, A::ApcPut, S::ApcString);
    table.add(0x7f, S::ApcString, A::ApcPut, S::ApcString);
    table.add_many(executables(), S::ApcString, A::Ignore, S::ApcString);
    table.add_many([0x9c, 0x1b, 0x18, 0x1a], S::ApcString, A::ApcEnd, S::Ground);

    // csi
    table.add(0x5b, S::Escape, A::Clear, S::CsiEntry);
    table.add_many(0x40..0x7f, S::CsiEntry, A::CsiDispatch, S::Ground);
    table.add_many(0x30..0x3c, S::CsiEntry, A::Param, S::CsiParam);
    table.add_many(0x3c..0x40, S::CsiEntry, A::Collect, S::CsiParam);
    table.add_many(0x30..0x3c, S::CsiParam, A::Param, S::CsiParam);
    table.add_many(0x40..0x7f, S::CsiParam, A::CsiDispatch, S::Ground);
    table.add_many(0x3c..0x40, S::CsiParam, A::Ignore, S::CsiIgnore);
    table.add_many(0x20..0x40, S::CsiIgnore, A::Ignore, S::CsiIgnore);
    table.add(0x7f, S::CsiIgnore, A::Ignore, S::CsiIgnore);
    table.add_many(0x40..0x7f, S::CsiIgnore, A::Ignore, S::Ground);
    table.add_many(0x20..0x30, S::CsiEntry, A::Collect, S::CsiIntermediate);
    table.add_many(0x20..0x30, S::CsiIntermediate, A::Collect, S::CsiIntermediate);
    table.add_many(0x30..0x40, S::CsiIntermediate, A::Ignore, S::CsiIgnore);
    table.add_many(0x40..0x7f, S::CsiIntermediate, A::CsiDispatch, S::Ground);
    table.add_many(0x20..0x30, S::CsiParam, A::Collect, S::CsiIntermediate);

    // esc and esc intermediates
    table.add_many(0x20..0x30, S::Escape, A::Collect, S::EscapeIntermediate);
    table.add_many(0x20..0x30, S::EscapeIntermediate, A::Collect, S::EscapeIntermediate);
    table.add_many(0x30..0x7f, S::EscapeIntermediate, A::EscDispatch, S::Ground);
    table.add_many(0x30..0x50, S::Escape, A::EscDispatch, S::Ground);
    table.add_many(0x51..0x58, S::Escape, A::EscDispatch, S::Ground);
    table.add_many([0x59, 0x5a, 0x5c], S::Escape, A::EscDispatch, S::Ground);
    table.add_many(0x60..0x7f, S::Escape, A::EscDispatch, S::Ground);

    // dcs
    table.add(0x50, S::Escape, A::Clear, S::DcsEntry);
    for state in [S::DcsEntry, S::DcsParam, S::DcsIntermediate] {
        table.add_many(executables(), state, A::Ignore, state);
        table.add(0x7f, state, A::Ignore, state);
        table.add_many(0x1c..0x20, state, A::Ignore, state);
        table.add_many(0x40..0x7f, state, A::DcsHook, S::DcsPassthrough);
    }
    table.add_many(0x20..0x30, S::DcsEntry, A::Collect, S::DcsIntermediate);
    table.add_many(0x30..0x3c, S::DcsEntry, A::Param, S::DcsParam);
    table.add_many(0x3c..0x40, S::DcsEntry, A::Collect, S::DcsParam);
    table.add_many(executables(), S::DcsIgnore, A::Ignore, S::DcsIgnore);
    table.add_many(0x20..0x80, S::DcsIgnore, A::Ignore, S::DcsIgnore);
    table.add_many(0x1c..0x20, S::DcsIgnore, A::Ignore, S::DcsIgnore);
    table.add_many(0x30..0x3c, S::DcsParam, A::Param, S::DcsParam);
    table.add_many(0x3c..0x40, S::DcsParam, A::Ignore, S::DcsIgnore);
    table.add_many(0x20..0x30, S::DcsParam, A::Collect, S::DcsIntermediate);
    table.add_many(0x20..0x30, S::DcsIntermediate, A::Collect, S::DcsIntermediate);
    table.add_many(0x30..0x40, S::DcsIntermediate, A::Ignore, S::DcsIgnore);
    table.add_many(executables(), S::DcsPassthrough, A::DcsPut, S::DcsPassthrough);
    table.add_many(printables(), S::DcsPassthrough, A::DcsPut, S::DcsPassthrough);
    table.add(0x7f, S::DcsPassthrough, A::Ignore, S::DcsPassthrough);
    table.add_many([0x1b, 0x9c, 0x18, 0x1a], S::DcsPassthrough, A::DcsUnhook, S::Ground);

    // codepoints >= 0xA0
    table.add(NON_ASCII_PRINTABLE, S::Ground, A::Print, S::Ground);
    table.add(NON_ASCII_PRINTABLE, S::OscString, A::OscPut, S::OscString);
    table.add(NON_ASCII_PRINTABLE, S::ApcString, A::ApcPut, S::ApcString);
    table.add(NON_ASCII_PRINTABLE, S::CsiIgnore, A::Ignore, S::CsiIgnore);
    table.add(NON_ASCII_PRINTABLE, S::DcsIgnore, A::Ignore, S::DcsIgnore);
    table.add(NON_ASCII_PRINTABLE, S::DcsPassthrough, A::DcsPut, S::DcsPassthrough);

    table
}

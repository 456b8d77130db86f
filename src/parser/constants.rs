//! Parser states, actions and limits

use serde::{Deserialize, Serialize};

/// Upper bound for OSC/DCS/APC payloads in codepoints
///
/// Longer payloads abort the command instead of growing without bound.
pub const PAYLOAD_LIMIT: usize = 10_000_000;

/// Marker code used in the transition table for every codepoint >= 0xA0
pub const NON_ASCII_PRINTABLE: u32 = 0xA0;

/// Parser states of the VT500 state machine
///
/// `SosPmApcString` swallows SOS and PM strings. APC strings get their own
/// state so they can be routed to the APC sub-parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ParserState {
    #[default]
    Ground = 0,
    Escape = 1,
    EscapeIntermediate = 2,
    CsiEntry = 3,
    CsiParam = 4,
    CsiIntermediate = 5,
    CsiIgnore = 6,
    SosPmApcString = 7,
    OscString = 8,
    DcsEntry = 9,
    DcsParam = 10,
    DcsIgnore = 11,
    DcsIntermediate = 12,
    DcsPassthrough = 13,
    ApcString = 14,
}

impl ParserState {
    /// All states in table order
    pub const ALL: [ParserState; 15] = [
        ParserState::Ground,
        ParserState::Escape,
        ParserState::EscapeIntermediate,
        ParserState::CsiEntry,
        ParserState::CsiParam,
        ParserState::CsiIntermediate,
        ParserState::CsiIgnore,
        ParserState::SosPmApcString,
        ParserState::OscString,
        ParserState::DcsEntry,
        ParserState::DcsParam,
        ParserState::DcsIgnore,
        ParserState::DcsIntermediate,
        ParserState::DcsPassthrough,
        ParserState::ApcString,
    ];

    /// Decode a state from its table value, falling back to ground
    pub fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(ParserState::Ground)
    }
}

/// Actions the transition table can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ParserAction {
    Ignore = 0,
    Error = 1,
    Print = 2,
    Execute = 3,
    OscStart = 4,
    OscPut = 5,
    OscEnd = 6,
    CsiDispatch = 7,
    Param = 8,
    Collect = 9,
    EscDispatch = 10,
    Clear = 11,
    DcsHook = 12,
    DcsPut = 13,
    DcsUnhook = 14,
    ApcStart = 15,
    ApcPut = 16,
    ApcEnd = 17,
}

impl ParserAction {
    const ALL: [ParserAction; 18] = [
        ParserAction::Ignore,
        ParserAction::Error,
        ParserAction::Print,
        ParserAction::Execute,
        ParserAction::OscStart,
        ParserAction::OscPut,
        ParserAction::OscEnd,
        ParserAction::CsiDispatch,
        ParserAction::Param,
        ParserAction::Collect,
        ParserAction::EscDispatch,
        ParserAction::Clear,
        ParserAction::DcsHook,
        ParserAction::DcsPut,
        ParserAction::DcsUnhook,
        ParserAction::ApcStart,
        ParserAction::ApcPut,
        ParserAction::ApcEnd,
    ];

    /// Decode an action from its table value, falling back to error
    pub fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(ParserAction::Error)
    }
}

/// Internal state of the OSC and APC string sub-parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringState {
    /// Waiting for the first payload codepoint
    #[default]
    Start,
    /// Collecting the identifier
    Id,
    /// Forwarding payload to handlers
    Payload,
    /// Command was rejected, drop everything until the end
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in ParserState::ALL {
            assert_eq!(ParserState::from_u8(state as u8), state);
        }
        assert_eq!(ParserState::from_u8(200), ParserState::Ground);
    }

    #[test]
    fn test_action_roundtrip() {
        for action in ParserAction::ALL {
            assert_eq!(ParserAction::from_u8(action as u8), action);
        }
    }
}

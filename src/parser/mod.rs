//! Terminal escape sequence parser
//!
//! A stateful parser turning UTF-32 codepoints into handler calls.
//! Based on the VT500-series parser model from <https://vt100.net/emu/dec_ansi_parser>

mod apc;
mod constants;
mod dcs;
mod escape;
mod handler;
mod osc;
mod params;
mod transition;

pub use apc::{apc_ident, ApcParser, ApcStringHandler};
pub use constants::{ParserAction, ParserState, StringState, NON_ASCII_PRINTABLE, PAYLOAD_LIMIT};
pub use dcs::{DcsParser, DcsStringHandler};
pub use escape::{EscapeSequenceParser, ResumeState, SuspendKind};
pub use handler::{
    ident_to_string, ApcHandler, DcsEvent, DcsFallback, DcsHandler, ErrorAction,
    FunctionIdentifier, HandlerKind, HandlerResult, HandlerToken, OscHandler, ParseStatus,
    ParsingState, StringEvent, StringFallback, SubParserStatus,
};
pub use osc::{OscParser, OscStringHandler};
pub use params::{ParamValue, Params, DEFAULT_MAX_PARAMS, DEFAULT_MAX_SUB_PARAMS, MAX_VALUE};
pub use transition::{TransitionTable, TABLE_SIZE};

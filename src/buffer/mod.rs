//! Buffer model
//!
//! Packed cells and lines, the ring buffer that holds them, row markers and
//! the `Buffer` that adds cursor and scroll state on top.

pub mod attributes;
#[allow(clippy::module_inception)]
pub mod buffer;
pub mod cell;
pub mod circular_list;
pub mod constants;
pub mod line;
pub mod marker;

pub use attributes::{AttributeData, ExtendedAttrs};
pub use buffer::{Buffer, LinkRegistry, SavedCursor, TAB_WIDTH};
pub use cell::{CellData, CharData};
pub use circular_list::{CircularList, SpliceEvent};
pub use constants::{BgFlags, ColorMode, ExtFlags, FgFlags, UnderlineStyle};
pub use line::{BufferLine, CELL_SIZE};
pub use marker::{MarkerId, MarkerSet};

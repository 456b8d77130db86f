//! Bit layout of packed cells
//!
//! A cell is three `u32` words: `content`, `fg` and `bg`.
//!
//! `content`: bits 1..21 codepoint, bit 22 combined flag, bits 23..24 width.
//! `fg`/`bg`: bits 1..24 color (RGB or palette index), bits 25..26 color
//! mode, bits 27..32 style flags.

use bitflags::bitflags;

pub const CODEPOINT_MASK: u32 = 0x1F_FFFF;
pub const IS_COMBINED_MASK: u32 = 0x20_0000;
/// Codepoint and combined bits; zero means the cell holds no text
pub const HAS_CONTENT_MASK: u32 = 0x3F_FFFF;
pub const WIDTH_MASK: u32 = 0xC0_0000;
pub const WIDTH_SHIFT: u32 = 22;

pub const BLUE_MASK: u32 = 0xFF;
pub const GREEN_MASK: u32 = 0xFF00;
pub const GREEN_SHIFT: u32 = 8;
pub const RED_MASK: u32 = 0xFF_0000;
pub const RED_SHIFT: u32 = 16;
pub const PCOLOR_MASK: u32 = 0xFF;
pub const RGB_MASK: u32 = 0xFF_FFFF;

pub const CM_MASK: u32 = 0x300_0000;
pub const CM_DEFAULT: u32 = 0;
pub const CM_P16: u32 = 0x100_0000;
pub const CM_P256: u32 = 0x200_0000;
pub const CM_RGB: u32 = 0x300_0000;

/// Style flag bits shared by `fg` and `bg`
pub const FLAGS_MASK: u32 = 0xFC00_0000;

pub const UNDERLINE_STYLE_SHIFT: u32 = 26;
pub const VARIANT_OFFSET_SHIFT: u32 = 29;

pub const DEFAULT_COLOR: u32 = 0;
/// Legacy packed attribute of an unstyled cell (default fg 256 in the low bits)
pub const DEFAULT_ATTR: u32 = (DEFAULT_COLOR << 9) | 256;

/// Content of a null cell: no codepoint, width 1
pub const NULL_CELL_CHAR: &str = "";
pub const NULL_CELL_WIDTH: u32 = 1;
pub const NULL_CELL_CODE: u32 = 0;

/// Whitespace cell used to pad rendered text
pub const WHITESPACE_CELL_CHAR: &str = " ";
pub const WHITESPACE_CELL_WIDTH: u32 = 1;
pub const WHITESPACE_CELL_CODE: u32 = 32;

bitflags! {
    /// Style flags stored in the `fg` word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FgFlags: u32 {
        const INVERSE = 0x0400_0000;
        const BOLD = 0x0800_0000;
        const UNDERLINE = 0x1000_0000;
        const BLINK = 0x2000_0000;
        const INVISIBLE = 0x4000_0000;
        const STRIKETHROUGH = 0x8000_0000;
    }
}

bitflags! {
    /// Style flags stored in the `bg` word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BgFlags: u32 {
        const ITALIC = 0x0400_0000;
        const DIM = 0x0800_0000;
        /// The cell has an entry in its line's extended attribute map
        const HAS_EXTENDED = 0x1000_0000;
        /// Selective erase skips the cell (DECSCA)
        const PROTECTED = 0x2000_0000;
        const OVERLINE = 0x4000_0000;
    }
}

bitflags! {
    /// Fields of the extended attribute word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExtFlags: u32 {
        const UNDERLINE_STYLE = 0x1C00_0000;
        const VARIANT_OFFSET = 0xE000_0000;
    }
}

/// Underline styles selectable with `SGR 4:n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum UnderlineStyle {
    #[default]
    None = 0,
    Single = 1,
    Double = 2,
    Curly = 3,
    Dotted = 4,
    Dashed = 5,
}

impl UnderlineStyle {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => UnderlineStyle::Single,
            2 => UnderlineStyle::Double,
            3 => UnderlineStyle::Curly,
            4 => UnderlineStyle::Dotted,
            5 => UnderlineStyle::Dashed,
            _ => UnderlineStyle::None,
        }
    }
}

/// Color mode field of a color word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ColorMode {
    #[default]
    Default,
    P16,
    P256,
    Rgb,
}

impl ColorMode {
    /// Decode the color mode bits of a packed word
    pub fn from_bits(word: u32) -> Self {
        match word & CM_MASK {
            CM_P16 => ColorMode::P16,
            CM_P256 => ColorMode::P256,
            CM_RGB => ColorMode::Rgb,
            _ => ColorMode::Default,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            ColorMode::Default => CM_DEFAULT,
            ColorMode::P16 => CM_P16,
            ColorMode::P256 => CM_P256,
            ColorMode::Rgb => CM_RGB,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_do_not_overlap() {
        assert_eq!(CODEPOINT_MASK & IS_COMBINED_MASK, 0);
        assert_eq!(HAS_CONTENT_MASK, CODEPOINT_MASK | IS_COMBINED_MASK);
        assert_eq!(WIDTH_MASK >> WIDTH_SHIFT, 3);
        assert_eq!(RGB_MASK & CM_MASK, 0);
        assert_eq!((RGB_MASK | CM_MASK) & FLAGS_MASK, 0);
        assert_eq!(FgFlags::all().bits(), FLAGS_MASK);
        assert_eq!(ExtFlags::UNDERLINE_STYLE.bits() >> UNDERLINE_STYLE_SHIFT, 7);
        assert_eq!(ExtFlags::VARIANT_OFFSET.bits() >> VARIANT_OFFSET_SHIFT, 7);
    }

    #[test]
    fn test_color_mode_bits() {
        for mode in [ColorMode::Default, ColorMode::P16, ColorMode::P256, ColorMode::Rgb] {
            assert_eq!(ColorMode::from_bits(mode.bits() | 0x12), mode);
        }
    }
}

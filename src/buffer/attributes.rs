//! Cell attributes
//!
//! `AttributeData` wraps the packed `fg`/`bg` words of a cell plus the
//! extended attributes that do not fit into them (underline style, underline
//! color and hyperlink id). The extended part is only consulted when
//! `BgFlags::HAS_EXTENDED` is set on `bg`.

use serde::{Deserialize, Serialize};

use super::constants::{
    BgFlags, ColorMode, ExtFlags, FgFlags, UnderlineStyle, CM_MASK, GREEN_MASK, GREEN_SHIFT,
    PCOLOR_MASK, RED_MASK, RED_SHIFT, RGB_MASK, UNDERLINE_STYLE_SHIFT, VARIANT_OFFSET_SHIFT,
    BLUE_MASK,
};

/// Attributes stored outside the packed words
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtendedAttrs {
    /// Underline style, variant offset and underline color
    ext: u32,
    /// Hyperlink id, 0 if none
    url_id: u32,
}

impl ExtendedAttrs {
    pub fn new(ext: u32, url_id: u32) -> Self {
        Self { ext, url_id }
    }

    pub fn ext(&self) -> u32 {
        self.ext
    }

    pub fn underline_style(&self) -> UnderlineStyle {
        UnderlineStyle::from_u32((self.ext & ExtFlags::UNDERLINE_STYLE.bits()) >> UNDERLINE_STYLE_SHIFT)
    }

    pub fn set_underline_style(&mut self, style: UnderlineStyle) {
        self.ext &= !ExtFlags::UNDERLINE_STYLE.bits();
        self.ext |= ((style as u32) << UNDERLINE_STYLE_SHIFT) & ExtFlags::UNDERLINE_STYLE.bits();
    }

    /// Underline color in color-word layout (mode and value, no flags)
    pub fn underline_color(&self) -> u32 {
        self.ext & (CM_MASK | RGB_MASK)
    }

    pub fn set_underline_color(&mut self, color: u32) {
        self.ext &= !(CM_MASK | RGB_MASK);
        self.ext |= color & (CM_MASK | RGB_MASK);
    }

    pub fn url_id(&self) -> u32 {
        self.url_id
    }

    pub fn set_url_id(&mut self, id: u32) {
        self.url_id = id;
    }

    pub fn underline_variant_offset(&self) -> u32 {
        (self.ext & ExtFlags::VARIANT_OFFSET.bits()) >> VARIANT_OFFSET_SHIFT
    }

    pub fn set_underline_variant_offset(&mut self, offset: u32) {
        self.ext &= !ExtFlags::VARIANT_OFFSET.bits();
        self.ext |= (offset << VARIANT_OFFSET_SHIFT) & ExtFlags::VARIANT_OFFSET.bits();
    }

    /// Nothing here would change how the cell renders
    pub fn is_empty(&self) -> bool {
        self.url_id == 0 && self.underline_style() == UnderlineStyle::None
    }
}

/// Packed foreground, background and extended attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeData {
    pub fg: u32,
    pub bg: u32,
    pub extended: ExtendedAttrs,
}

impl AttributeData {
    pub fn new(fg: u32, bg: u32) -> Self {
        Self {
            fg,
            bg,
            extended: ExtendedAttrs::default(),
        }
    }

    /// Split a color word into its RGB channels
    pub fn to_color_rgb(value: u32) -> [u8; 3] {
        [
            ((value & RED_MASK) >> RED_SHIFT) as u8,
            ((value & GREEN_MASK) >> GREEN_SHIFT) as u8,
            (value & BLUE_MASK) as u8,
        ]
    }

    /// Pack RGB channels into the low 24 bits of a color word
    pub fn from_color_rgb(rgb: [u8; 3]) -> u32 {
        (rgb[0] as u32) << RED_SHIFT | (rgb[1] as u32) << GREEN_SHIFT | rgb[2] as u32
    }

    pub fn fg_flags(&self) -> FgFlags {
        FgFlags::from_bits_truncate(self.fg)
    }

    pub fn bg_flags(&self) -> BgFlags {
        BgFlags::from_bits_truncate(self.bg)
    }

    pub fn set_fg_flag(&mut self, flag: FgFlags, on: bool) {
        if on {
            self.fg |= flag.bits();
        } else {
            self.fg &= !flag.bits();
        }
    }

    pub fn set_bg_flag(&mut self, flag: BgFlags, on: bool) {
        if on {
            self.bg |= flag.bits();
        } else {
            self.bg &= !flag.bits();
        }
    }

    pub fn is_inverse(&self) -> bool {
        self.fg_flags().contains(FgFlags::INVERSE)
    }

    pub fn is_bold(&self) -> bool {
        self.fg_flags().contains(FgFlags::BOLD)
    }

    pub fn is_underline(&self) -> bool {
        if self.has_extended_attrs() && self.extended.underline_style() != UnderlineStyle::None {
            return true;
        }
        self.fg_flags().contains(FgFlags::UNDERLINE)
    }

    pub fn is_blink(&self) -> bool {
        self.fg_flags().contains(FgFlags::BLINK)
    }

    pub fn is_invisible(&self) -> bool {
        self.fg_flags().contains(FgFlags::INVISIBLE)
    }

    pub fn is_strikethrough(&self) -> bool {
        self.fg_flags().contains(FgFlags::STRIKETHROUGH)
    }

    pub fn is_italic(&self) -> bool {
        self.bg_flags().contains(BgFlags::ITALIC)
    }

    pub fn is_dim(&self) -> bool {
        self.bg_flags().contains(BgFlags::DIM)
    }

    pub fn is_protected(&self) -> bool {
        self.bg_flags().contains(BgFlags::PROTECTED)
    }

    pub fn is_overline(&self) -> bool {
        self.bg_flags().contains(BgFlags::OVERLINE)
    }

    pub fn fg_color_mode(&self) -> ColorMode {
        ColorMode::from_bits(self.fg)
    }

    pub fn bg_color_mode(&self) -> ColorMode {
        ColorMode::from_bits(self.bg)
    }

    pub fn is_fg_rgb(&self) -> bool {
        self.fg_color_mode() == ColorMode::Rgb
    }

    pub fn is_bg_rgb(&self) -> bool {
        self.bg_color_mode() == ColorMode::Rgb
    }

    pub fn is_fg_palette(&self) -> bool {
        matches!(self.fg_color_mode(), ColorMode::P16 | ColorMode::P256)
    }

    pub fn is_bg_palette(&self) -> bool {
        matches!(self.bg_color_mode(), ColorMode::P16 | ColorMode::P256)
    }

    pub fn is_fg_default(&self) -> bool {
        self.fg_color_mode() == ColorMode::Default
    }

    pub fn is_bg_default(&self) -> bool {
        self.bg_color_mode() == ColorMode::Default
    }

    /// Palette index or RGB value, `None` for the default color
    pub fn fg_color(&self) -> Option<u32> {
        color_value(self.fg)
    }

    pub fn bg_color(&self) -> Option<u32> {
        color_value(self.bg)
    }

    /// Replace color mode and value of `fg`, keeping its flags
    pub fn set_fg_color(&mut self, mode: ColorMode, value: u32) {
        self.fg = set_color(self.fg, mode, value);
    }

    pub fn set_bg_color(&mut self, mode: ColorMode, value: u32) {
        self.bg = set_color(self.bg, mode, value);
    }

    pub fn has_extended_attrs(&self) -> bool {
        self.bg_flags().contains(BgFlags::HAS_EXTENDED)
    }

    /// Sync `HAS_EXTENDED` with the content of `extended`
    pub fn update_extended(&mut self) {
        let on = !self.extended.is_empty();
        self.set_bg_flag(BgFlags::HAS_EXTENDED, on);
    }

    /// Underline color word; falls back to the foreground color
    fn underline_color_word(&self) -> u32 {
        if self.has_extended_attrs() && self.extended.underline_color() != 0 {
            self.extended.underline_color()
        } else {
            self.fg
        }
    }

    pub fn underline_color(&self) -> Option<u32> {
        color_value(self.underline_color_word())
    }

    pub fn underline_color_mode(&self) -> ColorMode {
        ColorMode::from_bits(self.underline_color_word())
    }

    pub fn is_underline_color_rgb(&self) -> bool {
        self.underline_color_mode() == ColorMode::Rgb
    }

    pub fn is_underline_color_palette(&self) -> bool {
        matches!(self.underline_color_mode(), ColorMode::P16 | ColorMode::P256)
    }

    pub fn is_underline_color_default(&self) -> bool {
        self.underline_color_mode() == ColorMode::Default
    }

    pub fn underline_style(&self) -> UnderlineStyle {
        if !self.fg_flags().contains(FgFlags::UNDERLINE) {
            return UnderlineStyle::None;
        }
        if self.has_extended_attrs() {
            self.extended.underline_style()
        } else {
            UnderlineStyle::Single
        }
    }

    pub fn underline_variant_offset(&self) -> u32 {
        self.extended.underline_variant_offset()
    }
}

fn color_value(word: u32) -> Option<u32> {
    match ColorMode::from_bits(word) {
        ColorMode::P16 | ColorMode::P256 => Some(word & PCOLOR_MASK),
        ColorMode::Rgb => Some(word & RGB_MASK),
        ColorMode::Default => None,
    }
}

fn set_color(word: u32, mode: ColorMode, value: u32) -> u32 {
    let value = match mode {
        ColorMode::Default => 0,
        ColorMode::P16 | ColorMode::P256 => value & PCOLOR_MASK,
        ColorMode::Rgb => value & RGB_MASK,
    };
    (word & !(CM_MASK | RGB_MASK)) | mode.bits() | value
}

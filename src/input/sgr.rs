//! Select Graphic Rendition
//!
//! Applies `CSI ... m` to an [`AttributeData`] and renders an attribute
//! set back into SGR parameters for DECRQSS.

use crate::buffer::constants::{CM_P256, CM_RGB};
use crate::buffer::{AttributeData, BgFlags, ColorMode, FgFlags, UnderlineStyle};
use crate::parser::Params;

/// Which color an extended color sequence targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorTarget {
    Fg,
    Bg,
    Underline,
}

/// Apply every SGR parameter in `params` to `attr`
pub fn apply_sgr(attr: &mut AttributeData, params: &Params) {
    let len = params.len();
    let mut i = 0;
    while i < len {
        let p = params.get(i).unwrap_or(0);
        match p {
            30..=37 => attr.set_fg_color(ColorMode::P16, (p - 30) as u32),
            40..=47 => attr.set_bg_color(ColorMode::P16, (p - 40) as u32),
            90..=97 => attr.set_fg_color(ColorMode::P16, (p - 90) as u32 | 8),
            100..=107 => attr.set_bg_color(ColorMode::P16, (p - 100) as u32 | 8),
            0 => reset(attr),
            1 => attr.set_fg_flag(FgFlags::BOLD, true),
            2 => attr.set_bg_flag(BgFlags::DIM, true),
            3 => attr.set_bg_flag(BgFlags::ITALIC, true),
            4 => {
                let style = params
                    .get_sub_params(i)
                    .and_then(|sub| sub.first().copied())
                    .map_or(UnderlineStyle::Single, |s| UnderlineStyle::from_u32(s.max(0) as u32));
                set_underline(attr, style);
            }
            5 => attr.set_fg_flag(FgFlags::BLINK, true),
            7 => attr.set_fg_flag(FgFlags::INVERSE, true),
            8 => attr.set_fg_flag(FgFlags::INVISIBLE, true),
            9 => attr.set_fg_flag(FgFlags::STRIKETHROUGH, true),
            21 => set_underline(attr, UnderlineStyle::Double),
            22 => {
                attr.set_fg_flag(FgFlags::BOLD, false);
                attr.set_bg_flag(BgFlags::DIM, false);
            }
            23 => attr.set_bg_flag(BgFlags::ITALIC, false),
            24 => set_underline(attr, UnderlineStyle::None),
            25 => attr.set_fg_flag(FgFlags::BLINK, false),
            27 => attr.set_fg_flag(FgFlags::INVERSE, false),
            28 => attr.set_fg_flag(FgFlags::INVISIBLE, false),
            29 => attr.set_fg_flag(FgFlags::STRIKETHROUGH, false),
            39 => attr.set_fg_color(ColorMode::Default, 0),
            49 => attr.set_bg_color(ColorMode::Default, 0),
            38 => i += extract_color(attr, params, i, ColorTarget::Fg),
            48 => i += extract_color(attr, params, i, ColorTarget::Bg),
            58 => i += extract_color(attr, params, i, ColorTarget::Underline),
            53 => attr.set_bg_flag(BgFlags::OVERLINE, true),
            55 => attr.set_bg_flag(BgFlags::OVERLINE, false),
            59 => {
                attr.extended.set_underline_color(0);
                attr.update_extended();
            }
            _ => {}
        }
        i += 1;
    }
}

/// SGR 0: default colors and flags, the hyperlink stays open
fn reset(attr: &mut AttributeData) {
    let default = AttributeData::default();
    attr.fg = default.fg;
    attr.bg = default.bg;
    attr.extended.set_underline_style(UnderlineStyle::None);
    attr.extended.set_underline_color(0);
    attr.update_extended();
}

fn set_underline(attr: &mut AttributeData, style: UnderlineStyle) {
    attr.extended.set_underline_style(style);
    attr.set_fg_flag(FgFlags::UNDERLINE, style != UnderlineStyle::None);
    attr.update_extended();
}

/// Apply `38`/`48`/`58` at `pos`, returning how many extra params it used
///
/// Handles both `38;5;n` / `38;2;r;g;b` and the colon forms `38:5:n`,
/// `38:2:r:g:b` and `38:2:cs:r:g:b`. Omitted values count as 0.
fn extract_color(attr: &mut AttributeData, params: &Params, pos: usize, target: ColorTarget) -> usize {
    let value = |v: Option<i32>| v.unwrap_or(0).max(0) as u32;

    let (color, advance) = if let Some(sub) = params.get_sub_params(pos) {
        let at = |i: usize| value(sub.get(i).copied());
        let color = match sub.first() {
            Some(5) => Some(CM_P256 | (at(1) & 0xff)),
            Some(2) => {
                let skip = if sub.len() >= 5 { 2 } else { 1 };
                Some(CM_RGB | rgb(at(skip), at(skip + 1), at(skip + 2)))
            }
            _ => None,
        };
        (color, 0)
    } else {
        let remaining = params.len() - pos - 1;
        let at = |i: usize| value(params.get(pos + i));
        match params.get(pos + 1) {
            Some(5) => (Some(CM_P256 | (at(2) & 0xff)), remaining.min(2)),
            Some(2) => (Some(CM_RGB | rgb(at(2), at(3), at(4))), remaining.min(4)),
            Some(_) => (None, 1),
            None => (None, 0),
        }
    };

    if let Some(color) = color {
        let mode = ColorMode::from_bits(color);
        match target {
            ColorTarget::Fg => attr.set_fg_color(mode, color),
            ColorTarget::Bg => attr.set_bg_color(mode, color),
            ColorTarget::Underline => {
                attr.extended.set_underline_color(color);
                attr.update_extended();
            }
        }
    }
    advance
}

fn rgb(r: u32, g: u32, b: u32) -> u32 {
    AttributeData::from_color_rgb([r.min(255) as u8, g.min(255) as u8, b.min(255) as u8])
}

/// SGR parameters that recreate `attr` from a reset state, e.g. `0;1;31`
pub fn sgr_report(attr: &AttributeData) -> String {
    let mut out = vec!["0".to_string()];
    let fg = attr.fg_flags();
    let bg = attr.bg_flags();
    if fg.contains(FgFlags::BOLD) {
        out.push("1".into());
    }
    if bg.contains(BgFlags::DIM) {
        out.push("2".into());
    }
    if bg.contains(BgFlags::ITALIC) {
        out.push("3".into());
    }
    match attr.underline_style() {
        UnderlineStyle::None => {}
        UnderlineStyle::Single => out.push("4".into()),
        style => out.push(format!("4:{}", style as u8)),
    }
    if fg.contains(FgFlags::BLINK) {
        out.push("5".into());
    }
    if fg.contains(FgFlags::INVERSE) {
        out.push("7".into());
    }
    if fg.contains(FgFlags::INVISIBLE) {
        out.push("8".into());
    }
    if fg.contains(FgFlags::STRIKETHROUGH) {
        out.push("9".into());
    }
    if bg.contains(BgFlags::OVERLINE) {
        out.push("53".into());
    }
    if let Some(color) = report_color(attr.fg, 30, 90, 38) {
        out.push(color);
    }
    if let Some(color) = report_color(attr.bg, 40, 100, 48) {
        out.push(color);
    }
    if attr.has_extended_attrs() && attr.extended.underline_color() != 0 {
        if let Some(color) = report_color(attr.extended.underline_color(), 0, 0, 58) {
            out.push(color);
        }
    }
    out.join(";")
}

fn report_color(word: u32, base: u32, bright: u32, extended: u32) -> Option<String> {
    let [r, g, b] = AttributeData::to_color_rgb(word);
    match ColorMode::from_bits(word) {
        ColorMode::Default => None,
        ColorMode::P16 if base != 0 => {
            let index = word & 0xff;
            Some(if index < 8 {
                format!("{}", base + index)
            } else {
                format!("{}", bright + index - 8)
            })
        }
        ColorMode::P16 | ColorMode::P256 => Some(format!("{extended};5;{}", word & 0xff)),
        ColorMode::Rgb => Some(format!("{extended};2;{r};{g};{b}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParamValue;

    fn params(values: &[ParamValue]) -> Params {
        Params::from_array(values).expect("valid params")
    }

    fn sgr(values: &[ParamValue]) -> AttributeData {
        let mut attr = AttributeData::default();
        apply_sgr(&mut attr, &params(values));
        attr
    }

    #[test]
    fn test_basic_flags() {
        let attr = sgr(&[ParamValue::Value(1), ParamValue::Value(3), ParamValue::Value(7)]);
        assert!(attr.is_bold());
        assert!(attr.is_italic());
        assert!(attr.is_inverse());

        let mut attr = attr;
        apply_sgr(&mut attr, &params(&[ParamValue::Value(22), ParamValue::Value(27)]));
        assert!(!attr.is_bold());
        assert!(!attr.is_inverse());
        assert!(attr.is_italic());
    }

    #[test]
    fn test_palette_colors() {
        let attr = sgr(&[ParamValue::Value(31), ParamValue::Value(102)]);
        assert_eq!(attr.fg_color_mode(), ColorMode::P16);
        assert_eq!(attr.fg_color(), Some(1));
        assert_eq!(attr.bg_color(), Some(10));
        let attr = sgr(&[ParamValue::Value(38), ParamValue::Value(5), ParamValue::Value(200)]);
        assert_eq!(attr.fg_color_mode(), ColorMode::P256);
        assert_eq!(attr.fg_color(), Some(200));
    }

    #[test]
    fn test_rgb_semicolon_and_colon() {
        let attr = sgr(&[
            ParamValue::Value(48),
            ParamValue::Value(2),
            ParamValue::Value(1),
            ParamValue::Value(2),
            ParamValue::Value(3),
            ParamValue::Value(1),
        ]);
        assert!(attr.is_bg_rgb());
        assert_eq!(attr.bg_color(), Some(0x010203));
        assert!(attr.is_bold());

        let attr = sgr(&[ParamValue::Value(38), ParamValue::Sub(vec![2, -1, 10, 20, 30])]);
        assert_eq!(attr.fg_color(), Some(0x0a141e));
        let attr = sgr(&[ParamValue::Value(38), ParamValue::Sub(vec![2, 10, 20, 30])]);
        assert_eq!(attr.fg_color(), Some(0x0a141e));
    }

    #[test]
    fn test_underline_styles_and_color() {
        let attr = sgr(&[ParamValue::Value(4), ParamValue::Sub(vec![3])]);
        assert_eq!(attr.underline_style(), UnderlineStyle::Curly);
        assert!(attr.has_extended_attrs());

        let mut attr = sgr(&[
            ParamValue::Value(21),
            ParamValue::Value(58),
            ParamValue::Value(5),
            ParamValue::Value(9),
        ]);
        assert_eq!(attr.underline_style(), UnderlineStyle::Double);
        assert_eq!(attr.underline_color(), Some(9));
        apply_sgr(&mut attr, &params(&[ParamValue::Value(59)]));
        assert!(attr.is_underline_color_default());
        apply_sgr(&mut attr, &params(&[ParamValue::Value(24)]));
        assert!(!attr.is_underline());
        assert!(!attr.has_extended_attrs());
    }

    #[test]
    fn test_reset_keeps_link() {
        let mut attr = sgr(&[ParamValue::Value(1), ParamValue::Value(53)]);
        attr.extended.set_url_id(4);
        attr.update_extended();
        apply_sgr(&mut attr, &params(&[ParamValue::Value(0)]));
        assert!(!attr.is_bold());
        assert!(!attr.is_overline());
        assert_eq!(attr.extended.url_id(), 4);
    }

    #[test]
    fn test_report() {
        assert_eq!(sgr_report(&AttributeData::default()), "0");
        let attr = sgr(&[
            ParamValue::Value(1),
            ParamValue::Value(4),
            ParamValue::Sub(vec![3]),
            ParamValue::Value(91),
            ParamValue::Value(48),
            ParamValue::Value(2),
            ParamValue::Value(1),
            ParamValue::Value(2),
            ParamValue::Value(3),
        ]);
        assert_eq!(sgr_report(&attr), "0;1;4:3;91;48;2;1;2;3");
    }
}

//! Color parsing for fills, strokes and backgrounds.

use image::Rgba;
use tracing::trace;

use crate::error::{DxError, Result};

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Parse a CSS-style color.
///
/// Supports `#RGB`, `#RRGGBB`, `#RRGGBBAA`, `transparent` and a handful of
/// named colors.
pub fn parse_color(spec: &str) -> Result<Rgba<u8>> {
    trace!(spec, "Parsing color");
    let spec = spec.trim();
    if let Some(rgba) = named_color(spec) {
        return Ok(rgba);
    }

    let hex = spec.trim_start_matches('#');
    if !hex.is_ascii() {
        return Err(DxError::Other(format!("Invalid color '{spec}'")));
    }
    let component = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|_| DxError::Other(format!("Invalid color component in '{spec}'")))
    };

    match hex.len() {
        3 => {
            let expand = |i: usize| component(i..i + 1).map(|v| v * 17);
            Ok(Rgba([expand(0)?, expand(1)?, expand(2)?, 255]))
        }
        6 => Ok(Rgba([component(0..2)?, component(2..4)?, component(4..6)?, 255])),
        8 => Ok(Rgba([
            component(0..2)?,
            component(2..4)?,
            component(4..6)?,
            component(6..8)?,
        ])),
        _ => Err(DxError::Other(format!(
            "Invalid color '{spec}': expected #RGB, #RRGGBB or #RRGGBBAA"
        ))),
    }
}

fn named_color(name: &str) -> Option<Rgba<u8>> {
    let rgba = match name.to_ascii_lowercase().as_str() {
        "transparent" | "none" => TRANSPARENT,
        "white" => WHITE,
        "black" => Rgba([0, 0, 0, 255]),
        "red" => Rgba([255, 0, 0, 255]),
        "green" => Rgba([0, 128, 0, 255]),
        "blue" => Rgba([0, 0, 255, 255]),
        "yellow" => Rgba([255, 255, 0, 255]),
        "gray" | "grey" => Rgba([128, 128, 128, 255]),
        _ => return None,
    };
    Some(rgba)
}

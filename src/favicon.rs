/// Pure helpers behind the generated Topic icons. The actual bitmap is drawn
/// by the page; everything computable without a canvas lives here.
use crate::{Error, Result};

/// Invert a hex color, "#rrggbb" or shorthand "#rgb".
pub fn invert_color(color: &str) -> Result<String> {
    let hex = color
        .strip_prefix('#')
        .ok_or_else(|| Error::Validation(format!("invalid hex color: {}", color)))?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Validation(format!("invalid hex color: {}", color)));
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return Err(Error::Validation(format!("invalid hex color: {}", color))),
    };
    let mut out = String::from("#");
    for chunk in 0..3 {
        let part = &expanded[chunk * 2..chunk * 2 + 2];
        let value = u8::from_str_radix(part, 16)
            .map_err(|_| Error::Validation(format!("invalid hex color: {}", color)))?;
        out.push_str(&format!("{:02x}", 255 - value));
    }
    Ok(out)
}

/// Random "#rrggbb" color for Topics created without an explicit choice.
pub fn random_color() -> String {
    let mut bytes = [0u8; 3];
    // zeroed bytes on the (unlikely) failure path still form a valid color
    let _ = getrandom::getrandom(&mut bytes);
    format!("#{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2])
}

/// Up-to-two-letter acronym drawn onto the icon: first letter of the first
/// two words.
pub fn acronym(title: &str) -> String {
    title
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .collect()
}

/// Largest font size in `[min, max)` whose measured text width stays within
/// `desired_width`. `measure` maps a candidate size to the rendered width;
/// binary search, no drawing surface involved.
pub fn font_size_fitting<F>(measure: F, min: f64, max: f64, desired_width: f64) -> u32
where
    F: Fn(f64) -> f64,
{
    let mut lo = min;
    let mut hi = max;
    while hi - lo >= 1.0 {
        let mid = lo + (hi - lo) / 2.0;
        if measure(mid) > desired_width {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    lo as u32
}

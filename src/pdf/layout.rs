//! Fixed-coordinate drawing primitives on top of lopdf content streams.

use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat};
use rust_decimal::Decimal;

use crate::core::{FacturaError, format_amount};

pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
pub const MARGIN: f32 = 40.0;

/// Resource name of the regular font.
pub const REGULAR: &str = "F1";
/// Resource name of the bold font.
pub const BOLD: &str = "F2";
/// Resource name of the logo image.
pub const LOGO: &str = "Im1";

/// Operations for one page.
#[derive(Default)]
pub struct Canvas {
    ops: Vec<Operation>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, x: f32, y: f32, font: &str, size: f32, text: &str) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![font.into(), size.into()]));
        self.ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(win_ansi(text), StringFormat::Literal)],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    /// Draw text ending at `right` (for amount columns).
    pub fn text_right(&mut self, right: f32, y: f32, font: &str, size: f32, text: &str) {
        let x = right - text_width(text, size);
        self.text(x, y, font, size, text);
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.ops.push(Operation::new("w", vec![0.5f32.into()]));
        self.ops.push(Operation::new("m", vec![x1.into(), y1.into()]));
        self.ops.push(Operation::new("l", vec![x2.into(), y2.into()]));
        self.ops.push(Operation::new("S", vec![]));
    }

    /// Place the logo XObject scaled into `w` x `h` at `(x, y)`.
    pub fn image(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new(
            "cm",
            vec![
                w.into(),
                0f32.into(),
                0f32.into(),
                h.into(),
                x.into(),
                y.into(),
            ],
        ));
        self.ops.push(Operation::new("Do", vec![LOGO.into()]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    pub fn encode(self) -> Result<Vec<u8>, FacturaError> {
        Content {
            operations: self.ops,
        }
        .encode()
        .map_err(|e| FacturaError::Render(format!("PDF content encoding failed: {e}")))
    }
}

/// Encode text for a WinAnsiEncoding font. Characters outside Latin-1 become '?'.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => b'?',
        })
        .collect()
}

/// Approximate Helvetica advance width in points.
pub fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c {
            '0'..='9' | '$' => 556,
            '.' | ',' | ' ' => 278,
            '-' => 333,
            'A'..='Z' => 667,
            _ => 500,
        })
        .sum();
    units as f32 * size / 1000.0
}

/// Truncate to `max` characters, marking the cut with "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Split `text` into chunks of at most `width` characters, keeping at most
/// `max_lines` lines (the last one marked as truncated if needed).
pub fn wrap(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut lines: Vec<String> = chars
        .chunks(width.max(1))
        .map(|c| c.iter().collect())
        .collect();
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            let kept: String = last.chars().take(width.saturating_sub(3)).collect();
            *last = format!("{kept}...");
        }
    }
    lines
}

/// Money for display: `$1,234.56`.
pub fn money(amount: Decimal) -> String {
    let fixed = format_amount(amount);
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, "00"));
    let mut grouped = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}${grouped}.{frac}")
}

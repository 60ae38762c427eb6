//! Approximate text extents for text-bearing shapes.
//!
//! The canvas engine owns real font metrics; this estimate only has to be
//! stable so alignment anchors and placement boxes agree between runs.

use emojis::get as emoji_get;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

use crate::shape::Size;

/// Average advance of a narrow glyph as a fraction of the font size.
const GLYPH_ADVANCE: f64 = 0.6;
const LINE_HEIGHT: f64 = 1.35;
const TEXT_PADDING: f64 = 16.0;

/// Column width of one grapheme (wide CJK and emoji count as two).
pub fn grapheme_width(grapheme: &str) -> usize {
    if grapheme.is_empty() {
        return 0;
    }

    if emoji_get(grapheme).is_some() {
        return 2;
    }

    grapheme
        .chars()
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
        .sum()
}

pub fn columns(line: &str) -> usize {
    line.graphemes(true).map(grapheme_width).sum()
}

/// Returns `(width, height)` for `text` at `size` and `scale`, wrapping words
/// to `max_width` when given.
pub fn measure_text(text: &str, size: Size, scale: f64, max_width: Option<f64>) -> (f64, f64) {
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    let font_size = size.font_size() * scale;
    let advance = font_size * GLYPH_ADVANCE;
    let max_columns = max_width
        .filter(|width| width.is_finite() && *width > TEXT_PADDING)
        .map(|width| (((width - TEXT_PADDING) / advance).floor() as usize).max(1));

    let mut widest = 0usize;
    let mut line_count = 0usize;
    for line in text.split('\n') {
        for wrapped in wrap_line(line, max_columns) {
            widest = widest.max(wrapped);
            line_count += 1;
        }
    }
    let line_count = line_count.max(1);

    let width = widest as f64 * advance + TEXT_PADDING;
    let height = line_count as f64 * font_size * LINE_HEIGHT + TEXT_PADDING;
    (width, height)
}

/// Column counts of the visual lines `line` wraps into.
fn wrap_line(line: &str, max_columns: Option<usize>) -> Vec<usize> {
    let Some(limit) = max_columns else {
        return vec![columns(line)];
    };

    let mut lines = Vec::new();
    let mut current = 0usize;
    for word in line.split_word_bounds() {
        let width = columns(word);
        if current > 0 && current + width > limit {
            lines.push(current);
            current = 0;
            if word.trim().is_empty() {
                continue;
            }
        }
        current += width;
        while current > limit {
            lines.push(limit);
            current -= limit;
        }
    }
    lines.push(current);
    lines
}

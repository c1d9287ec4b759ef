//! OCR text boxes and translated items.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

lazy_static! {
    /// CJK unified ideographs, the range the Chinese filter keys on.
    static ref CHINESE: Regex = Regex::new(r"[\u{4e00}-\u{9fff}]").unwrap();
}

/// Returns true when `text` contains at least one CJK unified ideograph.
pub fn contains_chinese(text: &str) -> bool {
    CHINESE.is_match(text)
}

/// One recognized text region: a 4-point polygon in pixel space (TL, TR,
/// BR, BL reading order), the recognized text, and the OCR confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextBox {
    pub polygon: Vec<[f32; 2]>,
    pub text: String,
    pub score: f32,
}

impl TextBox {
    pub fn new(polygon: Vec<[f32; 2]>, text: impl Into<String>, score: f32) -> Self {
        Self {
            polygon,
            text: text.into(),
            score,
        }
    }

    /// Normalize a raw OCR result value to the canonical flat list.
    ///
    /// Model wrappers produce either the flat shape
    /// `[[polygon, [text, score]], ...]` or a nested single-page variant
    /// `[[[polygon, [text, score]], ...]]`. Items that do not match either
    /// shape are skipped rather than failing the whole result.
    pub fn normalize_ocr_value(raw: &Value) -> Vec<TextBox> {
        let Some(items) = raw.as_array() else {
            return Vec::new();
        };

        // Nested variant: a single inner page wrapping the real items.
        let items = match items.as_slice() {
            [only] if looks_like_page(only) => only.as_array().unwrap(),
            _ => items,
        };

        items.iter().filter_map(parse_item).collect()
    }
}

fn looks_like_page(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|inner| inner.iter().all(|item| parse_item(item).is_some()))
}

fn parse_item(item: &Value) -> Option<TextBox> {
    let pair = item.as_array()?;
    if pair.len() != 2 {
        return None;
    }
    let polygon: Vec<[f32; 2]> = pair[0]
        .as_array()?
        .iter()
        .map(|point| {
            let xy = point.as_array()?;
            Some([xy.first()?.as_f64()? as f32, xy.get(1)?.as_f64()? as f32])
        })
        .collect::<Option<_>>()?;
    if polygon.is_empty() {
        return None;
    }
    let text_score = pair[1].as_array()?;
    let text = text_score.first()?.as_str()?.to_string();
    let score = text_score.get(1).and_then(Value::as_f64).unwrap_or(0.0) as f32;
    Some(TextBox {
        polygon,
        text,
        score,
    })
}

/// Keep only boxes whose text contains at least one Chinese character.
pub fn filter_chinese(boxes: Vec<TextBox>) -> Vec<TextBox> {
    boxes
        .into_iter()
        .filter(|text_box| contains_chinese(&text_box.text))
        .collect()
}

/// A text box paired with its translation.
///
/// `translated_text` may be empty: the box is still inpainted, but nothing
/// is drawn over it (the degraded inpaint-only mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedItem {
    pub polygon: Vec<[f32; 2]>,
    pub translated_text: String,
    pub original_char_count: usize,
}

impl TranslatedItem {
    pub fn from_box(text_box: &TextBox, translated_text: String) -> Self {
        Self {
            polygon: text_box.polygon.clone(),
            translated_text,
            original_char_count: text_box.text.chars().count(),
        }
    }

    /// An item with empty text: inpaint the region but draw nothing.
    pub fn inpaint_only(text_box: &TextBox) -> Self {
        Self::from_box(text_box, String::new())
    }
}

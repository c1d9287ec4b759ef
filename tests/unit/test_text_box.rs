use image_translate_worker::domain::text_box::{
    TextBox, TranslatedItem, contains_chinese, filter_chinese,
};
use serde_json::json;

#[test]
fn chinese_detection_covers_the_unified_range() {
    assert!(contains_chinese("你好"));
    assert!(contains_chinese("mixed 价格 text"));
    assert!(!contains_chinese("Hello"));
    assert!(!contains_chinese("안녕하세요"));
    assert!(!contains_chinese(""));
}

#[test]
fn filter_keeps_only_boxes_with_chinese() {
    let boxes = vec![
        TextBox::new(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [0.0, 5.0]], "你好", 0.9),
        TextBox::new(vec![[0.0, 10.0], [10.0, 10.0], [10.0, 15.0], [0.0, 15.0]], "Hello", 0.9),
    ];
    let filtered = filter_chinese(boxes);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].text, "你好");
}

#[test]
fn normalizes_flat_ocr_shape() {
    let raw = json!([
        [[[10.0, 10.0], [50.0, 10.0], [50.0, 30.0], [10.0, 30.0]], ["你好", 0.98]],
    ]);
    let boxes = TextBox::normalize_ocr_value(&raw);
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].text, "你好");
    assert_eq!(boxes[0].polygon.len(), 4);
    assert!((boxes[0].score - 0.98).abs() < 1e-6);
}

#[test]
fn normalizes_nested_ocr_shape() {
    let raw = json!([[
        [[[10.0, 10.0], [50.0, 10.0], [50.0, 30.0], [10.0, 30.0]], ["你好", 0.98]],
        [[[10.0, 40.0], [50.0, 40.0], [50.0, 60.0], [10.0, 60.0]], ["世界", 0.9]],
    ]]);
    let boxes = TextBox::normalize_ocr_value(&raw);
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[1].text, "世界");
}

#[test]
fn malformed_items_are_skipped_not_fatal() {
    let raw = json!([
        [[[10.0, 10.0], [50.0, 10.0], [50.0, 30.0], [10.0, 30.0]], ["好", 0.9]],
        ["garbage"],
        42,
    ]);
    let boxes = TextBox::normalize_ocr_value(&raw);
    assert_eq!(boxes.len(), 1);
}

#[test]
fn translated_item_counts_source_characters() {
    let text_box = TextBox::new(
        vec![[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [0.0, 5.0]],
        "高品质产品",
        0.8,
    );
    let item = TranslatedItem::from_box(&text_box, "고품질 제품".to_string());
    assert_eq!(item.original_char_count, 5);
    assert_eq!(item.translated_text, "고품질 제품");

    let fallback = TranslatedItem::inpaint_only(&text_box);
    assert!(fallback.translated_text.is_empty());
}

use image_translate_worker::domain::envelope::{Envelope, object_key};

#[test]
fn decode_keeps_provided_request_id() {
    let payload = br#"{"request_id":"r1","image_id":"p-100","image_url":"http://img/x.jpg","is_long":false}"#;
    let accepted = Envelope::decode(payload).unwrap();
    assert_eq!(accepted.request_id, "r1");
    assert_eq!(accepted.image_id, "p-100");
    assert!(!accepted.is_long);
}

#[test]
fn decode_assigns_request_id_when_absent() {
    let payload = br#"{"image_id":"p-100","image_url":"//img/x.jpg","is_long":true}"#;
    let accepted = Envelope::decode(payload).unwrap();
    assert!(!accepted.request_id.is_empty());
    assert!(accepted.is_long);
}

#[test]
fn decode_rejects_malformed_json() {
    assert!(Envelope::decode(b"{not json").is_err());
}

#[test]
fn object_key_splits_product_and_suffix() {
    let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
    assert_eq!(
        object_key("p-100", "r1", date),
        "translated_image/2026-08-01/p/100-r1.jpg"
    );
}

#[test]
fn object_key_truncates_long_request_ids() {
    let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
    assert_eq!(
        object_key("shop-42-a", "abcdefghij", date),
        "translated_image/2026-08-01/shop/42-a-abcde.jpg"
    );
}

#[test]
fn object_key_without_dash_uses_whole_id() {
    let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
    assert_eq!(
        object_key("p100", "r1", date),
        "translated_image/2026-08-01/p100/p100-r1.jpg"
    );
}

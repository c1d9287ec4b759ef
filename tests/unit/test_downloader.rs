use image_translate_worker::infrastructure::http::image_downloader::normalize_url;

#[test]
fn protocol_relative_urls_get_https() {
    assert_eq!(
        normalize_url("//img.example.com/a.jpg"),
        "https://img.example.com/a.jpg"
    );
}

#[test]
fn absolute_urls_pass_through() {
    assert_eq!(
        normalize_url("http://img.example.com/a.jpg"),
        "http://img.example.com/a.jpg"
    );
    assert_eq!(
        normalize_url("https://img.example.com/a.jpg"),
        "https://img.example.com/a.jpg"
    );
}

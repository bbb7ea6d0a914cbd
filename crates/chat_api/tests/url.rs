use chat_api::url::{
    conversation_url, endpoint, live_url, login_redirect_url, normalize_base_url, STREAM_PATH,
};

#[test]
fn base_url_normalization_keeps_path_prefix() {
    let base = normalize_base_url("https://chat.example/api").expect("valid base");
    assert_eq!(base.as_str(), "https://chat.example/api/");
    assert_eq!(
        endpoint(&base, STREAM_PATH).expect("endpoint").as_str(),
        "https://chat.example/api/chat/stream"
    );
}

#[test]
fn base_url_normalization_rejects_empty_and_opaque_urls() {
    assert!(normalize_base_url("   ").is_err());
    assert!(normalize_base_url("mailto:someone@example.com").is_err());
}

#[test]
fn conversation_url_escapes_identifier_segment() {
    let base = normalize_base_url("https://chat.example/").expect("valid base");
    assert_eq!(
        conversation_url(&base, "a b/c").expect("conversation url").as_str(),
        "https://chat.example/conversations/a%20b%2Fc"
    );
}

#[test]
fn live_url_carries_conversation_and_interface() {
    let base = normalize_base_url("https://chat.example").expect("valid base");
    assert_eq!(
        live_url(&base, "c-1", "web").expect("live url").as_str(),
        "https://chat.example/conversations/live?conversation_id=c-1&interface_type=web"
    );
}

#[test]
fn login_redirect_url_encodes_return_location() {
    let base = normalize_base_url("https://chat.example").expect("valid base");
    assert_eq!(
        login_redirect_url(&base, Some("/c/42?tab=1"))
            .expect("login url")
            .as_str(),
        "https://chat.example/login?next=%2Fc%2F42%3Ftab%3D1"
    );
    assert_eq!(
        login_redirect_url(&base, None).expect("login url").as_str(),
        "https://chat.example/login"
    );
}

//! API utility functions
//!
//! Pure, stateless helpers for request parsing and response headers.

use axum::http::{HeaderMap, header::CONTENT_TYPE};
use chrono::{DateTime, Utc};

/// True when the request carries an `application/x-www-form-urlencoded` body
///
/// Parameters such as `charset` are ignored; malformed media types are not
/// treated as forms.
pub fn is_form_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|media_type| {
            media_type.type_() == mime::APPLICATION
                && media_type.subtype() == mime::WWW_FORM_URLENCODED
        })
}

/// RFC 7231 IMF-fixdate, as used in `Last-Modified`
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::TimeZone;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_form_content_type() {
        assert!(is_form_urlencoded(&headers("application/x-www-form-urlencoded")));
        assert!(is_form_urlencoded(&headers(
            "application/x-www-form-urlencoded; charset=utf-8"
        )));
        assert!(!is_form_urlencoded(&headers("application/json")));
        assert!(!is_form_urlencoded(&headers("multipart/form-data; boundary=x")));
        assert!(!is_form_urlencoded(&headers("invalid")));
        assert!(!is_form_urlencoded(&HeaderMap::new()));
    }

    #[test]
    fn test_http_date() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 7).unwrap();
        assert_eq!(http_date(at), "Wed, 01 May 2024 10:00:07 GMT");
    }
}

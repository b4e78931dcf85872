use crate::config::Config;
use crate::constants::GALLERY_COOKIE_PREFIX;
use axum_extra::extract::CookieJar;

pub fn gallery_cookie_name(gallery_id: i64) -> String {
    format!("{}{}", GALLERY_COOKIE_PREFIX, gallery_id)
}

/// `Set-Cookie` value carrying a gallery token. Cross-site capable in production.
pub fn build_gallery_cookie(gallery_id: i64, token: &str, max_age_secs: i64, config: &Config) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly",
        gallery_cookie_name(gallery_id),
        token,
        max_age_secs.max(0)
    );
    if config.is_production() {
        cookie.push_str("; SameSite=None; Secure");
    } else {
        cookie.push_str("; SameSite=Lax");
    }
    cookie
}

pub fn clear_gallery_cookie(gallery_id: i64, config: &Config) -> String {
    build_gallery_cookie(gallery_id, "", 0, config)
}

pub fn gallery_token_from_jar(jar: &CookieJar, gallery_id: i64) -> Option<String> {
    jar.get(&gallery_cookie_name(gallery_id))
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use axum::http::{header::COOKIE, HeaderMap, HeaderValue};

    #[test]
    fn test_development_cookie_is_lax() {
        let config = Config::default();
        let cookie = build_gallery_cookie(5, "tok", 3600, &config);
        assert_eq!(cookie, "gallery_access_5=tok; Path=/; Max-Age=3600; HttpOnly; SameSite=Lax");
    }

    #[test]
    fn test_production_cookie_is_cross_site() {
        let mut config = Config::default();
        config.server.environment = Environment::Production;
        let cookie = build_gallery_cookie(5, "tok", 60, &config);
        assert!(cookie.ends_with("SameSite=None; Secure"));
        assert!(clear_gallery_cookie(5, &config).contains("Max-Age=0"));
    }

    #[test]
    fn test_token_read_from_matching_cookie_only() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("gallery_access_5=abc; gallery_access_6=; other=1"),
        );
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(gallery_token_from_jar(&jar, 5).as_deref(), Some("abc"));
        assert_eq!(gallery_token_from_jar(&jar, 6), None);
        assert_eq!(gallery_token_from_jar(&jar, 7), None);
    }
}

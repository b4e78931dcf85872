use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AppState;
use crate::logging::request_logger;
use crate::routes::api_router;
use crate::routes::delivery::media_router;
use crate::storage::BackendKind;
use crate::VERSION;

#[derive(Serialize)]
struct HealthcheckResponse {
    status: String,
    version: String,
    storage: String,
}

async fn healthcheck(State(state): State<AppState>) -> Json<HealthcheckResponse> {
    Json(HealthcheckResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
        storage: state.storage.backend_name().to_string(),
    })
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/healthcheck", get(healthcheck))
        .merge(api_router());

    let mut app = Router::new().nest("/api", api_routes);

    // Local signed URLs point here; unsigned requests are refused
    if state.storage.backend() == BackendKind::Local {
        let prefix = normalize_prefix(&state.config.storage.media_url_prefix);
        app = app.merge(media_router(&prefix));
    }

    app.layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/media".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::cookie::gallery_cookie_name;
    use crate::storage::Storage;
    use crate::test_utils::{create_test_app, create_test_gallery, create_test_user, jpeg_bytes};
    use axum::http::{header, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::io::{Cursor, Read};

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/media/"), "/media");
        assert_eq!(normalize_prefix("files"), "/files");
        assert_eq!(normalize_prefix(""), "/media");
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let app = create_test_app();
        let server = TestServer::new(app.router).unwrap();

        let response = server.get("/api/healthcheck").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "local");
    }

    #[tokio::test]
    async fn test_upload_list_and_thumb() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "studio", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, true, None);
        let auth = app.bearer(owner, "photographer");
        let server = TestServer::new(app.router.clone()).unwrap();

        let response = server
            .post(&format!("/api/galleries/{}/photos", gallery_id))
            .add_query_param("filename", "ceremony.jpg")
            .add_header(header::AUTHORIZATION, HeaderValue::from_str(&auth).unwrap())
            .bytes(jpeg_bytes(800, 600).into())
            .await;
        response.assert_status(StatusCode::CREATED);
        let uploaded: Value = response.json();
        let photo_id = uploaded["id"].as_i64().unwrap();

        let list: Value = server
            .get(&format!("/api/galleries/{}/photos", gallery_id))
            .await
            .json();
        assert_eq!(list["photos"].as_array().unwrap().len(), 1);
        assert_eq!(list["photos"][0]["filename"], "ceremony.jpg");

        let thumb = server
            .get(&format!("/api/galleries/{}/photos/{}/thumb", gallery_id, photo_id))
            .await;
        thumb.assert_status_ok();
        let decoded = image::load_from_memory(thumb.as_bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));
    }

    #[tokio::test]
    async fn test_upload_requires_owner() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "owner", "photographer");
        let other = create_test_user(app.pool(), "other", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, true, None);
        let server = TestServer::new(app.router.clone()).unwrap();
        let path = format!("/api/galleries/{}/photos", gallery_id);

        let anonymous = server
            .post(&path)
            .add_query_param("filename", "a.jpg")
            .bytes(jpeg_bytes(10, 10).into())
            .await;
        anonymous.assert_status(StatusCode::UNAUTHORIZED);

        let foreign = server
            .post(&path)
            .add_query_param("filename", "a.jpg")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_str(&app.bearer(other, "photographer")).unwrap(),
            )
            .bytes(jpeg_bytes(10, 10).into())
            .await;
        foreign.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_password_gate_and_unlock_cookie() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "gate", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, false, Some("secret"));
        let server = TestServer::new(app.router.clone()).unwrap();
        let gallery_path = format!("/api/galleries/{}", gallery_id);

        server.get(&gallery_path).await.assert_status(StatusCode::UNAUTHORIZED);

        server
            .post(&format!("{}/unlock", gallery_path))
            .json(&json!({ "password": "wrong" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let unlocked = server
            .post(&format!("{}/unlock", gallery_path))
            .json(&json!({ "password": "secret" }))
            .await;
        unlocked.assert_status_ok();
        let cookie = unlocked
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with(&format!("{}=", gallery_cookie_name(gallery_id))));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));

        let pair = cookie.split(';').next().unwrap().to_string();
        server
            .get(&gallery_path)
            .add_header(header::COOKIE, HeaderValue::from_str(&pair).unwrap())
            .await
            .assert_status_ok();

        // a cookie for this gallery does not open another one
        let second = create_test_gallery(app.pool(), owner, false, Some("secret"));
        let foreign_pair = pair.replacen(
            &gallery_cookie_name(gallery_id),
            &gallery_cookie_name(second),
            1,
        );
        server
            .get(&format!("/api/galleries/{}", second))
            .add_header(header::COOKIE, HeaderValue::from_str(&foreign_pair).unwrap())
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_quota_exhaustion_and_reset() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "quota", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, true, None);
        crate::test_utils::set_download_limit(app.pool(), gallery_id, Some(1));
        let photo = crate::test_utils::create_test_photo(app.pool(), gallery_id, "a.jpg", 0);
        app.storage
            .write_bytes(&photo.original_key, jpeg_bytes(300, 200), "image/jpeg")
            .await
            .unwrap();
        let server = TestServer::new(app.router.clone()).unwrap();
        let path = format!("/api/galleries/{}/photos/{}", gallery_id, photo.id);

        let first = server.get(&path).add_query_param("size", "web").await;
        first.assert_status_ok();
        assert_eq!(
            first.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"a-web.jpg\""
        );

        server
            .get(&path)
            .add_query_param("size", "web")
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);

        // owners are not counted
        let auth = HeaderValue::from_str(&app.bearer(owner, "photographer")).unwrap();
        server
            .get(&path)
            .add_header(header::AUTHORIZATION, auth.clone())
            .await
            .assert_status_ok();

        server
            .post(&format!("/api/galleries/{}/quota/reset", gallery_id))
            .add_header(header::AUTHORIZATION, auth)
            .await
            .assert_status_ok();
        server
            .get(&path)
            .add_query_param("size", "web")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_exhausted_quota_renders_nothing() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "spent", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, true, None);
        crate::test_utils::set_download_limit(app.pool(), gallery_id, Some(1));
        let photo = crate::test_utils::create_test_photo(app.pool(), gallery_id, "a.jpg", 0);
        app.storage
            .write_bytes(&photo.original_key, jpeg_bytes(600, 400), "image/jpeg")
            .await
            .unwrap();
        let server = TestServer::new(app.router.clone()).unwrap();
        let path = format!("/api/galleries/{}/photos/{}", gallery_id, photo.id);

        server.get(&path).add_query_param("size", "web").await.assert_status_ok();
        let renders = app.state.resolver.render_count();

        for size in ["large", "medium"] {
            server
                .get(&path)
                .add_query_param("size", size)
                .await
                .assert_status(StatusCode::TOO_MANY_REQUESTS);
        }
        server
            .get(&format!("/api/galleries/{}/download", gallery_id))
            .add_query_param("size", "large")
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(app.state.resolver.render_count(), renders);
    }

    #[tokio::test]
    async fn test_local_media_requires_signed_link() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "vault", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, false, Some("secret"));
        let photo = crate::test_utils::create_test_photo(app.pool(), gallery_id, "a.jpg", 0);
        app.storage
            .write_bytes(&photo.original_key, jpeg_bytes(200, 150), "image/jpeg")
            .await
            .unwrap();
        let server = TestServer::new(app.router.clone()).unwrap();

        server
            .get(&format!("/media/{}", photo.original_key))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let auth = HeaderValue::from_str(&app.bearer(owner, "photographer")).unwrap();
        let link: Value = server
            .get(&format!("/api/galleries/{}/download", gallery_id))
            .add_query_param("size", "web")
            .add_query_param("mode", "cached")
            .add_query_param("linkOnly", "true")
            .add_header(header::AUTHORIZATION, auth)
            .await
            .json();
        let url = link["url"].as_str().unwrap();
        let (media_path, sig) = url.split_once("?sig=").unwrap();
        assert_eq!(
            media_path,
            format!("/media/zips/{}/gallery-{}-web.zip", gallery_id, gallery_id)
        );

        // the archive exists now, but is still closed without the token
        server.get(media_path).await.assert_status(StatusCode::UNAUTHORIZED);

        let archive = server.get(media_path).add_query_param("sig", sig).await;
        archive.assert_status_ok();
        assert_eq!(
            archive.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            &format!("attachment; filename=\"gallery-{}-web.zip\"", gallery_id)
        );
        let names = zip::ZipArchive::new(Cursor::new(archive.as_bytes().to_vec()))
            .unwrap()
            .len();
        assert_eq!(names, 1);

        // a token for the archive does not open the original
        server
            .get(&format!("/media/{}", photo.original_key))
            .add_query_param("sig", sig)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_size_is_unprocessable() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "sizes", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, true, None);
        let photo = crate::test_utils::create_test_photo(app.pool(), gallery_id, "a.jpg", 0);
        let server = TestServer::new(app.router.clone()).unwrap();

        server
            .get(&format!("/api/galleries/{}/photos/{}", gallery_id, photo.id))
            .add_query_param("size", "huge")
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_streamed_gallery_archive() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "zip", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, true, None);
        for (i, name) in ["one.jpg", "two.jpg"].iter().enumerate() {
            let photo = crate::test_utils::create_test_photo(app.pool(), gallery_id, name, i as i64);
            app.storage
                .write_bytes(&photo.original_key, jpeg_bytes(200, 150), "image/jpeg")
                .await
                .unwrap();
        }
        let server = TestServer::new(app.router.clone()).unwrap();

        let response = server
            .get(&format!("/api/galleries/{}/download", gallery_id))
            .add_query_param("size", "web")
            .await;
        response.assert_status_ok();

        let mut archive = zip::ZipArchive::new(Cursor::new(response.as_bytes().to_vec())).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["one-web.jpg", "two-web.jpg"]);

        let mut entry = Vec::new();
        archive.by_name("one-web.jpg").unwrap().read_to_end(&mut entry).unwrap();
        assert_eq!(&entry[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_favorites_and_export() {
        let app = create_test_app();
        let owner = create_test_user(app.pool(), "fav", "photographer");
        let gallery_id = create_test_gallery(app.pool(), owner, true, None);
        let photo = crate::test_utils::create_test_photo(app.pool(), gallery_id, "pick.jpg", 0);
        let server = TestServer::new(app.router.clone()).unwrap();

        let toggled: Value = server
            .put(&format!("/api/galleries/{}/favorites/{}", gallery_id, photo.id))
            .await
            .json();
        assert_eq!(toggled["favorited"], true);
        assert_eq!(toggled["count"], 1);

        let auth = HeaderValue::from_str(&app.bearer(owner, "photographer")).unwrap();
        let export = server
            .get(&format!("/api/galleries/{}/favorites/export.csv", gallery_id))
            .add_header(header::AUTHORIZATION, auth)
            .await;
        export.assert_status_ok();
        let csv = export.text();
        assert!(csv.starts_with("photo_id,filename,selector,created_at\n"));
        assert!(csv.contains(&format!("{},pick.jpg,cookie:anon,", photo.id)));
    }
}

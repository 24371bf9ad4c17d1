//! Common test utilities for grid-sync integration tests

use grid_sync::{Config, GridSync, StaticToken};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Token used by every test account
pub const TOKEN: &str = "feedbeef";

/// Owner id used by every test account
pub const OWNER_ID: u64 = 42;

/// Configuration pointing every endpoint and directory at test fixtures
pub fn test_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.http.api_base = format!("{}/ajxp", server.uri());
    config.http.site_base = server.uri();
    config.paths.meta_dir = dir.path().join("meta");
    config.paths.image_dir = dir.path().join("images");
    config
}

/// Connect a test account with a static token and known owner
pub async fn connect(config: Config, subdomain: &str) -> GridSync {
    GridSync::connect(config, subdomain, Some(OWNER_ID), &StaticToken(TOKEN.to_string()))
        .await
        .unwrap()
}

/// A raw entry whose image is served by the mock server under `/img/<id>.jpg`
pub fn raw_entry(server: &MockServer, id: &str, subdomain: &str) -> Value {
    let host = server.uri().trim_start_matches("http://").to_string();
    json!({
        "_id": id,
        "upload_date": 1500000000000i64,
        "is_featured": false,
        "height": 800,
        "width": 1200,
        "description": format!("photo {id}"),
        "tags": [],
        "permalink": format!("{}/{subdomain}/media/{id}", server.uri()),
        "responsive_url": format!("{host}/img/{id}.jpg"),
        "is_video": false,
        "grid_name": subdomain,
        "perma_subdomain": subdomain,
        "site_id": OWNER_ID,
        "image_meta": {"iso": 100, "make": "RICOH", "model": "GR II"},
        "preset": {"short_name": "A6", "color": "#b0a47e"}
    })
}

/// Mount the one-entry probe reporting `total`
pub async fn mount_probe(server: &MockServer, total: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/ajxp/{TOKEN}/2.0/medias")))
        .and(query_param("site_id", OWNER_ID.to_string()))
        .and(query_param("size", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": total,
            "media": []
        })))
        .mount(server)
        .await;
}

/// Mount one metadata page of `size` entries
pub async fn mount_page(server: &MockServer, page: u64, size: u64, media: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/ajxp/{TOKEN}/2.0/medias")))
        .and(query_param("page", page.to_string()))
        .and(query_param("size", size.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": media.len(),
            "media": media
        })))
        .mount(server)
        .await;
}

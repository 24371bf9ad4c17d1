//! Image cache pool.
//!
//! A fixed number of workers take [`Image`] jobs from a bounded queue. A job
//! whose cache file already exists completes without touching the network;
//! otherwise the image is streamed to a `.part` file in fixed-size writes and
//! renamed into place once complete.

use crate::config::{FailurePolicy, ImageConfig};
use crate::entity::Image;
use crate::error::{Error, Result};
use crate::pool::{Consumer, drain, work_queue};
use crate::types::{CacheReport, Event};
use crate::utils::{ensure_dir, partial_path};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Terminal state of one successful cache job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The file was downloaded during this call
    Downloaded,
    /// The file was already present; no request was made
    AlreadyCached,
}

/// Make sure one image exists in the cache.
pub async fn cache_image(
    client: &reqwest::Client,
    image: &Image,
    chunk_size: usize,
) -> Result<CacheOutcome> {
    if image.is_cached().await {
        return Ok(CacheOutcome::AlreadyCached);
    }

    let mut response = client.get(image.link().clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            url: image.link().to_string(),
        });
    }

    let path = image.local_path();
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }

    let tmp = partial_path(path);
    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        while let Some(chunk) = response.chunk().await? {
            for piece in chunk.chunks(chunk_size.max(1)) {
                file.write_all(piece).await?;
            }
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await?;
        Ok::<(), Error>(())
    }
    .await;

    if let Err(e) = written {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e);
    }
    Ok(CacheOutcome::Downloaded)
}

/// Run every image through the cache pool and wait for all of them.
///
/// Failed downloads leave no file behind. Under [`FailurePolicy::Surface`]
/// they turn into [`Error::ImageFailures`] after the pool has finished.
pub async fn cache_images(
    client: &reqwest::Client,
    config: &ImageConfig,
    policy: FailurePolicy,
    images: Vec<Arc<Image>>,
    event_tx: &broadcast::Sender<Event>,
) -> Result<CacheReport> {
    let total = images.len();
    let (job_tx, job_rx) = work_queue::<Arc<Image>>(config.queue_capacity);

    let mut workers = JoinSet::new();
    for worker in 0..config.workers.max(1) {
        workers.spawn(
            cache_worker(
                client.clone(),
                job_rx.clone(),
                config.chunk_size,
                event_tx.clone(),
            )
            .instrument(tracing::info_span!("image_worker", worker)),
        );
    }
    drop(job_rx);

    for image in images {
        job_tx.put(image).await?;
    }

    let report = drain(job_tx, workers)
        .await?
        .into_iter()
        .fold(CacheReport::default(), |acc, part| CacheReport {
            cached: acc.cached + part.cached,
            skipped: acc.skipped + part.skipped,
            failed: acc.failed + part.failed,
        });

    event_tx.send(Event::ImagesComplete { report }).ok();
    tracing::info!(
        cached = report.cached,
        skipped = report.skipped,
        failed = report.failed,
        "image cache complete"
    );

    if policy == FailurePolicy::Surface && report.failed > 0 {
        return Err(Error::ImageFailures {
            failed: report.failed,
            total,
        });
    }
    Ok(report)
}

async fn cache_worker(
    client: reqwest::Client,
    jobs: Consumer<Arc<Image>>,
    chunk_size: usize,
    event_tx: broadcast::Sender<Event>,
) -> CacheReport {
    let mut report = CacheReport::default();

    while let Some((image, _ack)) = jobs.take().await {
        match cache_image(&client, &image, chunk_size).await {
            Ok(CacheOutcome::AlreadyCached) => {
                report.skipped += 1;
                event_tx
                    .send(Event::ImageSkipped {
                        id: image.id().clone(),
                    })
                    .ok();
            }
            Ok(CacheOutcome::Downloaded) => {
                report.cached += 1;
                tracing::debug!(media_id = %image.id(), path = %image.local_path().display(), "Cached image");
                event_tx
                    .send(Event::ImageCached {
                        id: image.id().clone(),
                        path: image.local_path().to_path_buf(),
                    })
                    .ok();
            }
            Err(e) => {
                report.failed += 1;
                tracing::debug!(media_id = %image.id(), url = %image.link(), error = %e, "Image download failed");
                event_tx
                    .send(Event::ImageFailed {
                        id: image.id().clone(),
                        error: e.to_string(),
                    })
                    .ok();
            }
        }
    }

    report
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::MetadataEntry;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image(server: &MockServer, root: &std::path::Path, id: &str) -> Arc<Image> {
        let host = server.uri().trim_start_matches("http://").to_string();
        let entry = MetadataEntry::from_raw(&json!({
            "_id": id,
            "perma_subdomain": "demo",
            "responsive_url": format!("{host}/img/{id}.jpg"),
        }));
        Arc::new(Image::new(entry, root, "demo", "http", Some(300)).unwrap())
    }

    #[tokio::test]
    async fn test_cache_image_writes_body() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/img/a.jpg"))
            .and(query_param("w", "300"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let img = image(&server, dir.path(), "a");
        let outcome = cache_image(&reqwest::Client::new(), &img, 1024)
            .await
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Downloaded);
        assert_eq!(std::fs::read(img.local_path()).unwrap(), body);
        assert!(!partial_path(img.local_path()).exists());
    }

    #[tokio::test]
    async fn test_cache_image_skips_existing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let img = image(&server, dir.path(), "a");
        std::fs::write(img.local_path(), b"cached").unwrap();

        let outcome = cache_image(&reqwest::Client::new(), &img, 1024)
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::AlreadyCached);
        assert_eq!(std::fs::read(img.local_path()).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn test_cache_image_404_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let img = image(&server, dir.path(), "gone");
        let err = cache_image(&reqwest::Client::new(), &img, 1024)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
        assert!(!img.local_path().exists());
        assert!(!partial_path(img.local_path()).exists());
    }

    #[tokio::test]
    async fn test_pool_reports_mixed_outcomes() {
        let server = MockServer::start().await;
        for id in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/img/{id}.jpg")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(id.as_bytes().to_vec()))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/img/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let images: Vec<_> = ["a", "b", "c", "missing", "present"]
            .iter()
            .map(|id| image(&server, dir.path(), id))
            .collect();
        std::fs::write(images[4].local_path(), b"already").unwrap();

        let (event_tx, _rx) = broadcast::channel(64);
        let config = ImageConfig {
            workers: 3,
            queue_capacity: 2,
            ..Default::default()
        };
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            cache_images(
                &reqwest::Client::new(),
                &config,
                FailurePolicy::Silent,
                images.clone(),
                &event_tx,
            ),
        )
        .await
        .expect("pool must reach its barrier")
        .unwrap();

        assert_eq!(
            report,
            CacheReport {
                cached: 3,
                skipped: 1,
                failed: 1
            }
        );
        assert!(!images[3].local_path().exists());
        assert_eq!(std::fs::read(images[1].local_path()).unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_pool_surfaces_failures_under_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (event_tx, _rx) = broadcast::channel(16);
        let err = cache_images(
            &reqwest::Client::new(),
            &ImageConfig::default(),
            FailurePolicy::Surface,
            vec![image(&server, dir.path(), "x"), image(&server, dir.path(), "y")],
            &event_tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::ImageFailures { failed: 2, total: 2 }));
    }
}

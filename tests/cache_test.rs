mod common;

use bytes::Bytes;
use common::{collector, collector_with_alt, context, context_with, url, MockClient, MockResponse, Outcome};
use pagenet::base::neterror::NetError;
use pagenet::http::diskcache::{BlobStore, InMemoryBlobStore, SqliteBlobStore};
use pagenet::http::httpcache::{AltKind, AltObject};
use pagenet::urlrequest::request::RequestKind;
use pagenet::urlrequest::{
    RequestDescriptor, RequestHandler, RequestPipeline, URLRequestContext, URLRequestContextConfig,
};
use std::sync::Arc;

const PAGE: &str = "http://a.test/page";
const PAST: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

async fn load(pipeline: &RequestPipeline, kind: RequestKind) -> Outcome {
    let handler = RequestHandler::new(RequestDescriptor::get(url(PAGE)).with_kind(kind));
    let (consumer, rx) = collector();
    let _ = pipeline.inline(&handler, consumer).await;
    rx.await.unwrap()
}

fn from_cache(outcome: &Outcome) -> (bool, bool) {
    match outcome {
        Outcome::Response {
            from_cache,
            revalidated,
            ..
        } => (*from_cache, *revalidated),
        other => panic!("unexpected outcome {other:?}"),
    }
}

fn with_blobs(client: &MockClient, blobs: Arc<dyn BlobStore>) -> Arc<URLRequestContext> {
    URLRequestContext::builder()
        .http_client(Arc::new(client.clone()))
        .blob_store(blobs)
        .build()
}

#[tokio::test]
async fn test_fresh_entry_served_without_network() {
    let client = MockClient::new();
    client.on(PAGE, MockResponse::ok("hello").header("Cache-Control", "max-age=3600"));
    let pipeline = RequestPipeline::new(context(&client));

    let first = load(&pipeline, RequestKind::Programmatic).await;
    assert_eq!(from_cache(&first), (false, false));

    let second = load(&pipeline, RequestKind::LinkClick).await;
    assert_eq!(second.body_text(), "hello");
    assert_eq!(from_cache(&second), (true, false));
    assert_eq!(client.open_count(), 1);
}

#[tokio::test]
async fn test_history_serves_expired_entry() {
    let client = MockClient::new();
    client.on(PAGE, MockResponse::ok("old news").header("Expires", PAST));
    let pipeline = RequestPipeline::new(context(&client));

    load(&pipeline, RequestKind::Programmatic).await;
    assert_eq!(pipeline.context().http_cache().len(), 1);

    let back = load(&pipeline, RequestKind::History).await;
    assert_eq!(back.body_text(), "old news");
    assert_eq!(from_cache(&back), (true, false));
    assert_eq!(client.open_count(), 1);
}

#[tokio::test]
async fn test_stale_entry_revalidated_with_304() {
    let client = MockClient::new();
    client
        .on(PAGE, MockResponse::ok("cached body").header("Date", PAST).header("Expires", PAST))
        .on(PAGE, MockResponse::new(304).header("Cache-Control", "max-age=600"));
    let pipeline = RequestPipeline::new(context(&client));

    load(&pipeline, RequestKind::Programmatic).await;
    let revalidated = load(&pipeline, RequestKind::Programmatic).await;

    assert_eq!(revalidated.body_text(), "cached body");
    assert_eq!(from_cache(&revalidated), (true, true));
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].header("if-modified-since").is_none());
    assert_eq!(requests[1].header("if-modified-since"), Some(PAST));

    // The 304 refreshed the lifetime.
    let third = load(&pipeline, RequestKind::Programmatic).await;
    assert_eq!(from_cache(&third), (true, false));
    assert_eq!(client.open_count(), 2);
}

#[tokio::test]
async fn test_address_bar_always_revalidates() {
    let client = MockClient::new();
    client
        .on(PAGE, MockResponse::ok("v1").header("Cache-Control", "max-age=3600"))
        .on(PAGE, MockResponse::ok("v2").header("Cache-Control", "max-age=3600"));
    let pipeline = RequestPipeline::new(context(&client));

    load(&pipeline, RequestKind::Programmatic).await;
    let typed = load(&pipeline, RequestKind::AddressBar).await;

    assert_eq!(typed.body_text(), "v2");
    assert_eq!(from_cache(&typed), (false, false));
    assert!(client.requests()[1].header("if-modified-since").is_some());
}

#[tokio::test]
async fn test_reload_bypasses_cache_and_no_cache_evicts() {
    let client = MockClient::new();
    client
        .on(PAGE, MockResponse::ok("v1").header("Cache-Control", "max-age=3600"))
        .on(PAGE, MockResponse::ok("v2").header("Cache-Control", "no-cache"));
    let pipeline = RequestPipeline::new(context(&client));

    load(&pipeline, RequestKind::Programmatic).await;
    assert_eq!(pipeline.context().http_cache().len(), 1);

    let reloaded = load(&pipeline, RequestKind::SoftReload).await;
    assert_eq!(reloaded.body_text(), "v2");
    assert!(client.requests()[1].header("if-modified-since").is_none());
    assert!(pipeline.context().http_cache().is_empty());
}

#[tokio::test]
async fn test_error_status_evicts_entry() {
    let client = MockClient::new();
    client
        .on(PAGE, MockResponse::ok("v1").header("Expires", PAST))
        .on(PAGE, MockResponse::new(404).body("gone"));
    let pipeline = RequestPipeline::new(context(&client));

    load(&pipeline, RequestKind::Programmatic).await;
    assert_eq!(pipeline.context().http_cache().len(), 1);

    let missing = load(&pipeline, RequestKind::Programmatic).await;
    assert_eq!(missing.body_text(), "gone");
    assert!(pipeline.context().http_cache().is_empty());
}

#[tokio::test]
async fn test_error_status_keeps_entry_when_configured() {
    let client = MockClient::new();
    client
        .on(PAGE, MockResponse::ok("v1").header("Expires", PAST))
        .on(PAGE, MockResponse::new(500).body("oops"));
    let config = URLRequestContextConfig {
        evict_cache_on_error: false,
        ..Default::default()
    };
    let pipeline = RequestPipeline::new(context_with(&client, config));

    load(&pipeline, RequestKind::Programmatic).await;
    load(&pipeline, RequestKind::Programmatic).await;
    assert_eq!(pipeline.context().http_cache().len(), 1);
}

#[tokio::test]
async fn test_304_without_entry_fails() {
    let client = MockClient::new();
    client.on(PAGE, MockResponse::new(304));
    let pipeline = RequestPipeline::new(context(&client));

    let outcome = load(&pipeline, RequestKind::Programmatic).await;
    assert!(matches!(outcome, Outcome::Error(NetError::InvalidResponse)));
}

#[tokio::test]
async fn test_oversized_body_not_cached() {
    let client = MockClient::new();
    client.on(PAGE, MockResponse::ok("0123456789").header("Cache-Control", "max-age=3600"));
    let config = URLRequestContextConfig {
        max_recorded_body_bytes: 4,
        ..Default::default()
    };
    let pipeline = RequestPipeline::new(context_with(&client, config));

    let outcome = load(&pipeline, RequestKind::Programmatic).await;
    assert_eq!(outcome.body_text(), "0123456789");
    assert!(pipeline.context().http_cache().is_empty());
}

#[tokio::test]
async fn test_post_is_never_cached() {
    let client = MockClient::new();
    client.on(PAGE, MockResponse::ok("posted").header("Cache-Control", "max-age=3600"));
    let pipeline = RequestPipeline::new(context(&client));

    for _ in 0..2 {
        let handler = RequestHandler::new(RequestDescriptor::post(url(PAGE)).with_param("a", "b"));
        let (consumer, rx) = collector();
        let _ = pipeline.inline(&handler, consumer).await;
        assert_eq!(rx.await.unwrap().body_text(), "posted");
    }
    assert_eq!(client.open_count(), 2);
    assert!(pipeline.context().http_cache().is_empty());
}

#[tokio::test]
async fn test_alt_object_stored_with_response() {
    let client = MockClient::new();
    client.on(PAGE, MockResponse::ok("<p>hi</p>").header("Cache-Control", "max-age=3600"));
    let pipeline = RequestPipeline::new(context(&client));

    let handler = RequestHandler::new(RequestDescriptor::get(url(PAGE)));
    let alt = AltObject::bytes(Bytes::from_static(b"parsed"));
    let (consumer, rx) = collector_with_alt(Some(alt));
    pipeline.inline(&handler, consumer).await.unwrap();
    rx.await.unwrap();

    let again = load(&pipeline, RequestKind::Programmatic).await;
    match again {
        Outcome::Response { alt: Some(alt), .. } => match alt.kind {
            AltKind::Bytes(b) => assert_eq!(&b[..], b"parsed"),
            AltKind::Shared(_) => panic!("wrong alt kind"),
        },
        other => panic!("expected cached alt object, got {other:?}"),
    }
}

#[tokio::test]
async fn test_persistent_hit_promoted_to_memory() {
    let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());

    let origin = MockClient::new();
    origin.on(PAGE, MockResponse::ok("persisted").header("Cache-Control", "max-age=3600"));
    let first = RequestPipeline::new(with_blobs(&origin, blobs.clone()));
    load(&first, RequestKind::Programmatic).await;

    // Fresh memory tier, same blobs, no routes at all.
    let offline = MockClient::new();
    let second = RequestPipeline::new(with_blobs(&offline, blobs));
    assert!(second.context().http_cache().is_empty());

    let outcome = load(&second, RequestKind::Programmatic).await;
    assert_eq!(outcome.body_text(), "persisted");
    assert_eq!(from_cache(&outcome), (true, false));
    assert_eq!(offline.open_count(), 0);
    assert_eq!(second.context().http_cache().len(), 1);
}

#[tokio::test]
async fn test_sqlite_blob_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
        let client = MockClient::new();
        client.on(PAGE, MockResponse::ok("on disk").header("Cache-Control", "max-age=3600"));
        let blobs = Arc::new(SqliteBlobStore::open(&path, "http_cache").unwrap());
        let pipeline = RequestPipeline::new(with_blobs(&client, blobs));
        load(&pipeline, RequestKind::Programmatic).await;
    }

    let client = MockClient::new();
    let blobs = Arc::new(SqliteBlobStore::open(&path, "http_cache").unwrap());
    let pipeline = RequestPipeline::new(with_blobs(&client, blobs));
    let outcome = load(&pipeline, RequestKind::History).await;

    assert_eq!(outcome.body_text(), "on disk");
    assert_eq!(client.open_count(), 0);
}

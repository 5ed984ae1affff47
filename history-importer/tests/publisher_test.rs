mod common;

use chrono::NaiveDate;
use common::{init_tracing, FakeGhost, ScriptedTransport, GHOST_API};
use history_importer::{
    CanonicalPost, GhostAdminKey, GhostPublisher, ImageRef, ImporterError, MobiledocRenderer, PublishConfig,
    StaticAdminToken, TimeBucket,
};
use std::sync::Arc;

fn config() -> PublishConfig {
    PublishConfig {
        api_url: GHOST_API.to_string(),
        user_slug: "jane".to_string(),
        list_page_size: 2,
        ..Default::default()
    }
}

fn publisher(transport: Arc<dyn history_importer::HttpTransport>) -> GhostPublisher {
    GhostPublisher::new(
        transport,
        config(),
        Arc::new(StaticAdminToken("key-id:signed".to_string())),
        Box::new(MobiledocRenderer),
    )
}

fn bucket() -> TimeBucket {
    let created_at = NaiveDate::from_ymd_opt(2019, 3, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
    let mut post = CanonicalPost::new("1551427200", created_at);
    post.message = Some("Spring in Lisbon".to_string());
    let mut image = ImageRef::remote("https://cdn/1.jpg").with_size(2048, 1536);
    image.src = Some("https://cdn/1.jpg".to_string());
    post.images.push(image);
    TimeBucket::new(2016, vec![post])
}

#[tokio::test]
async fn publishing_twice_leaves_one_document() {
    init_tracing();
    let ghost = Arc::new(FakeGhost::new());
    let publisher = publisher(ghost.clone());

    publisher.publish(&bucket()).await.unwrap();
    publisher.publish(&bucket()).await.unwrap();

    assert_eq!(ghost.slugs(), vec!["jane_2016_2020"]);
    let stored = ghost.post_by_slug("jane_2016_2020").unwrap();
    assert_eq!(stored.title, "The Years 2016-2020, According to Facebook");

    let doc: serde_json::Value = serde_json::from_str(&stored.mobiledoc).unwrap();
    let html = doc["cards"][0][1]["html"].as_str().unwrap();
    assert!(html.contains("Spring in Lisbon"));
    assert!(html.contains("width=\"512\" height=\"384\""));

    // lookup, create, then lookup, delete, create
    let methods: Vec<String> = ghost.methods().iter().map(|m| m.to_string()).collect();
    assert_eq!(methods, vec!["GET", "POST", "GET", "DELETE", "POST"]);

    let requests = ghost.requests.lock().unwrap();
    assert!(requests.iter().all(|r| r
        .headers
        .contains(&("Authorization".to_string(), "Ghost key-id:signed".to_string()))));
}

#[tokio::test]
async fn taken_slug_is_a_conflict() {
    init_tracing();
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .on("/admin/posts/slug/jane_2016_2020/", 404, r#"{"errors": []}"#)
        .on(
            "/admin/posts/",
            201,
            r#"{"posts": [{"id": "p9", "slug": "jane_2016_2020-2"}]}"#,
        );

    let err = publisher(transport).publish(&bucket()).await.unwrap_err();
    assert!(matches!(err, ImporterError::PublishConflict { ref slug } if slug == "jane_2016_2020"));
}

#[tokio::test]
async fn create_conflict_status() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .on("/admin/posts/slug/", 404, "{}")
        .on("/admin/posts/", 409, r#"{"errors": [{"type": "ValidationError"}]}"#);

    let err = publisher(transport).publish(&bucket()).await.unwrap_err();
    assert!(matches!(err, ImporterError::PublishConflict { .. }));
}

#[tokio::test]
async fn failed_delete_keeps_the_old_document() {
    init_tracing();
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .on(
            "/admin/posts/slug/jane_2016_2020/",
            200,
            r#"{"posts": [{"id": "old1", "slug": "jane_2016_2020"}]}"#,
        )
        .on("/admin/posts/old1/", 403, r#"{"errors": [{"message": "no permission"}]}"#);

    let err = publisher(transport.clone()).publish(&bucket()).await.unwrap_err();
    match err {
        ImporterError::Publish { slug, status, body } => {
            assert_eq!(slug, "jane_2016_2020");
            assert_eq!(status, 403);
            assert!(body.contains("no permission"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    // no create after a failed delete
    let creates = transport
        .requests
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.method == reqwest::Method::POST)
        .count();
    assert_eq!(creates, 0);
}

#[tokio::test]
async fn lookup_error_is_a_publish_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.on("/admin/posts/slug/", 401, "Unauthorized");

    let err = publisher(transport).find_by_slug("jane_2016_2020").await.unwrap_err();
    assert!(matches!(err, ImporterError::Publish { status: 401, .. }));
}

#[tokio::test]
async fn lists_every_page() {
    init_tracing();
    let ghost = Arc::new(FakeGhost::new());
    ghost.seed("jane_2006_2010", "The Years 2006-2010, According to Facebook");
    ghost.seed("jane_2011_2015", "The Years 2011-2015, According to Facebook");
    ghost.seed("about", "About me");

    let listed = publisher(ghost.clone()).list_posts(0).await.unwrap();
    assert_eq!(
        listed.keys().cloned().collect::<Vec<_>>(),
        vec!["about", "jane_2006_2010", "jane_2011_2015"]
    );
    assert_eq!(listed["about"].authors[0].slug, "owner");

    // two full pages and the empty one that ends the listing
    assert_eq!(ghost.requests.lock().unwrap().len(), 3);

    let first_page = publisher(ghost.clone()).list_posts(1).await.unwrap();
    assert_eq!(first_page.len(), 2);
}

#[tokio::test]
async fn admin_key_signs_every_request() {
    init_tracing();
    let ghost = Arc::new(FakeGhost::new());
    let key = GhostAdminKey::parse("5f1a2b3c4d5e6f7a8b9c0d1e:a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90").unwrap();
    let publisher = GhostPublisher::new(ghost.clone(), config(), Arc::new(key), Box::new(MobiledocRenderer));

    publisher.publish(&bucket()).await.unwrap();

    let requests = ghost.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    for request in requests.iter() {
        let auth = request
            .headers
            .iter()
            .find(|(name, _)| name == "Authorization")
            .map(|(_, value)| value.as_str())
            .unwrap();
        let token = auth.strip_prefix("Ghost ").unwrap();
        assert_eq!(token.split('.').count(), 3);
        let header = jsonwebtoken::decode_header(token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("5f1a2b3c4d5e6f7a8b9c0d1e"));
    }
}

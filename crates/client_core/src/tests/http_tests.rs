use super::*;
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use shared::validate;
use tokio::net::TcpListener;

use crate::locator::derive_locator;

async fn report() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xFF, 0xD8, 0xFF, 0xE0])
}

async fn not_an_image() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], "<html>denied</html>")
}

async fn empty_image() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/jpeg")], Vec::<u8>::new())
}

async fn root() -> StatusCode {
    StatusCode::FORBIDDEN
}

async fn spawn_origin() -> ReportOrigin {
    let app = Router::new()
        .route("/", get(root))
        .route("/zhangsan.jpg", get(report))
        .route("/html.jpg", get(not_an_image))
        .route("/empty.jpg", get(empty_image));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    ReportOrigin::parse(&format!("http://{addr}/")).expect("origin")
}

#[tokio::test]
async fn loads_image_bytes_for_locator() {
    let origin = spawn_origin().await;
    let locator = derive_locator(&origin, &validate("zhangsan").expect("token"));

    let image = HttpImageLoader::new().load(&locator).await.expect("load");
    assert_eq!(image.bytes, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    assert_eq!(image.content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn missing_report_is_a_load_error() {
    let origin = spawn_origin().await;
    let locator = derive_locator(&origin, &validate("李四").expect("token"));

    let err = HttpImageLoader::new().load(&locator).await.expect_err("404");
    assert!(err.to_string().contains("404"), "unexpected error: {err}");
}

#[tokio::test]
async fn non_image_and_empty_bodies_are_load_errors() {
    let origin = spawn_origin().await;
    let loader = HttpImageLoader::new();

    let html = derive_locator(&origin, &validate("html").expect("token"));
    assert!(loader.load(&html).await.is_err());

    let empty = derive_locator(&origin, &validate("empty").expect("token"));
    assert!(loader.load(&empty).await.is_err());
}

#[tokio::test]
async fn probe_treats_any_status_as_reachable() {
    let origin = spawn_origin().await;
    let probe = HttpNetworkProbe::new(origin);

    assert!(probe.is_online().await);
    probe.probe_origin().await.expect("reachable despite 403");
}

#[tokio::test]
async fn probe_reports_unreachable_origin() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let origin = ReportOrigin::parse(&format!("http://{addr}/")).expect("origin");
    let probe = HttpNetworkProbe::new(origin);
    assert!(probe.probe_origin().await.is_err());
}

//! The HTTP surface: a small hyper server that routes `GET /api/analytics/<name>` to the analytics
//! endpoints and answers with JSON.

use crate::analytics::{self, Endpoint, Params, Services};
use crate::error::{Error, ErrorType, IntoResult, Result};
use anyhow::Context;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

const ANALYTICS_PREFIX: &str = "/api/analytics/";
const CACHE_CLEAN: &str = "/api/cache/clean";
const HEALTH: &str = "/health";

/// Binds to `port` on all interfaces and serves requests until the process receives Ctrl+C or
/// SIGTERM.
pub async fn serve(services: Services, port: u16) -> Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Unable to bind to {address}"))
        .pub_result(ErrorType::Config)?;
    info!("Server running on http://{address}");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        warn!("Unable to accept a connection: {e}");
                        continue;
                    }
                };
                let services = services.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |request| {
                        let services = services.clone();
                        async move { Ok::<_, Infallible>(handle(&services, request).await) }
                    });
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Connection from {peer} closed with an error: {e}");
                    }
                });
            }
            _ = &mut shutdown => break,
        }
    }
    info!("Server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal");
            }
            Err(e) => {
                error!("Unable to listen for the terminate signal: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Answers one request. The body of the request is never read.
pub(crate) async fn handle<B>(services: &Services, request: Request<B>) -> Response<String> {
    let id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!("request", %id, %method, %path);
    async move {
        debug!("Handling request");
        let result = route(services, &method, &path, request.uri().query()).await;
        match result {
            Ok((status, body)) => {
                info!("{}", status.as_u16());
                respond(status, body)
            }
            Err(e) => {
                let status = e.status();
                if status.is_server_error() {
                    error!("{}: {e}", status.as_u16());
                } else {
                    warn!("{}: {e}", status.as_u16());
                }
                respond(status, json!({ "error": e.public_message() }).to_string())
            }
        }
    }
    .instrument(span)
    .await
}

async fn route(
    services: &Services,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Result<(StatusCode, String)> {
    let path = path.trim_end_matches('/');
    let known = path == HEALTH || path == CACHE_CLEAN || path.starts_with(ANALYTICS_PREFIX);
    if known && *method != Method::GET {
        return Ok((
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "error": format!("Method {method} is not allowed") }).to_string(),
        ));
    }

    if path == HEALTH {
        return Ok((StatusCode::OK, json!({ "status": "ok" }).to_string()));
    }
    if path == CACHE_CLEAN {
        services
            .cache()
            .flush_all()
            .await
            .context("Unable to flush the cache")
            .pub_result(ErrorType::Cache)?;
        info!("Cache flushed");
        let body = json!({ "message": "Cache cleared successfully" });
        return Ok((StatusCode::OK, body.to_string()));
    }
    if let Some(name) = path.strip_prefix(ANALYTICS_PREFIX) {
        let endpoint = Endpoint::find(name)
            .ok_or_else(|| Error::not_found(format!("Unknown endpoint '{name}'")))?;
        let body = analytics::run(services, endpoint, &Params::parse(query)).await?;
        return Ok((StatusCode::OK, body));
    }
    Err(Error::not_found(format!("Nothing found at '{path}'")))
}

fn respond(status: StatusCode, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::Options;
    use crate::api::{TestSheets, DEMO_QUOTATION};
    use crate::cache::{Cache, MemoryCache, Ttl};
    use crate::error::Res;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn services() -> Services {
        Services::new(
            Arc::new(TestSheets::seeded().unwrap()),
            Arc::new(MemoryCache::new()),
            Options::default(),
        )
    }

    async fn get(services: &Services, uri: &str) -> (StatusCode, Value) {
        send(services, Method::GET, uri).await
    }

    async fn send(services: &Services, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap();
        let response = handle(services, request).await;
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let status = response.status();
        (status, serde_json::from_str(response.body()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(&services(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_analytics_route() {
        let services = services();
        let uri = format!("/api/analytics/mealCost?quotationSheet={DEMO_QUOTATION}");
        let (status, body) = get(&services, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"June 2024": 22300, "July 2024": 24200}));
    }

    #[tokio::test]
    async fn test_errors() {
        let services = services();
        let (status, body) = get(&services, "/api/analytics/mealCost").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"error": "The 'quotationSheet' query parameter is required"})
        );

        let (status, _) = get(&services, "/api/analytics/mealCost?quotationSheet=nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(&services, "/api/analytics/unknownThing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = get(&services, "/elsewhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());

        let (status, _) = send(&services, Method::POST, "/api/analytics/mealCost").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_cache_clean() {
        let services = services();
        services
            .cache()
            .set_ex("mealCost:x", "{}", Ttl::HOURS_3)
            .await
            .unwrap();
        let (status, body) = get(&services, "/api/cache/clean").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Cache cleared successfully"}));
        assert_eq!(services.cache().get("mealCost:x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_failure_is_500() {
        struct Broken;

        #[async_trait::async_trait]
        impl Cache for Broken {
            async fn get(&self, _: &str) -> Res<Option<String>> {
                anyhow::bail!("down")
            }

            async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Res<()> {
                anyhow::bail!("down")
            }

            async fn flush_all(&self) -> Res<()> {
                anyhow::bail!("down")
            }
        }

        let services = Services::new(
            Arc::new(TestSheets::seeded().unwrap()),
            Arc::new(Broken),
            Options::default(),
        );
        let (status, body) = get(&services, "/api/cache/clean").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Internal Server Error"}));
    }
}

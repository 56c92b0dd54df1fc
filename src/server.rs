use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::config::probe_config::Config;
use crate::metrics::Registry;
use crate::probe::resolve::ResolveChecker;
use crate::probe::resolver::HostResolver;

const TEXT_EXPOSITION: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Serves the landing page, the metrics exposition and the on-demand
/// resolve probe.
pub struct Server<R> {
    config: Arc<RwLock<Config>>,
    resolver: Arc<R>,
    registry: Arc<Registry>,
    metrics_path: String,
}

impl<R: HostResolver> Server<R> {
    pub fn new(
        config: Arc<RwLock<Config>>,
        resolver: Arc<R>,
        registry: Arc<Registry>,
        metrics_path: impl Into<String>,
    ) -> Self {
        Self {
            config,
            resolver,
            registry,
            metrics_path: metrics_path.into(),
        }
    }

    /// Accepts connections until the listener fails, one task per connection.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let server = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle(req).await) }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    log::debug!("Connection from {} failed: {}", peer, e);
                }
            });
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<String> {
        let path = req.uri().path();
        if path == self.metrics_path {
            return response(StatusCode::OK, TEXT_EXPOSITION, self.registry.render());
        }
        match path {
            "/" => response(
                StatusCode::OK,
                "text/html; charset=utf-8",
                landing_page(&self.metrics_path),
            ),
            "/probe" => self.probe().await,
            _ => response(
                StatusCode::NOT_FOUND,
                "text/plain; charset=utf-8",
                "404 page not found\n".to_string(),
            ),
        }
    }

    /// Resolves every configured resolve domain right away, outside the
    /// collection cycle.
    async fn probe(&self) -> Response<String> {
        let (domains, concurrency) = {
            let config = self.config.read().await;
            (config.resolve_domains.clone(), config.probe_concurrency)
        };
        let results = ResolveChecker::new(self.resolver.clone())
            .with_concurrency(concurrency)
            .check(&domains)
            .await;
        let sorted: BTreeMap<_, _> = results.into_iter().collect();

        match serde_json::to_string_pretty(&sorted) {
            Ok(body) => response(StatusCode::OK, "application/json", body),
            Err(e) => {
                log::error!("Error while generating the /probe response: {}", e);
                response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    e.to_string(),
                )
            }
        }
    }
}

fn landing_page(metrics_path: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <title>Domain Exporter</title>\n\
         <h1>Domain Exporter</h1>\n\
         <p><a href=\"{metrics_path}\">Metrics</a></p>\n"
    )
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

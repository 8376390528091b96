//! Transport adapter (spec §4.E): exposes the stealth client through
//! `reqwest_middleware`'s `Middleware` trait so a third-party crawler built
//! against `reqwest` can reuse the stealth behavior as a drop-in layer,
//! instead of depending on `StealthClient` directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::Extensions;
use reqwest::{Request, Response as ReqwestResponse};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use tokio_util::sync::CancellationToken;

use repodocs_core::{Error, RendererFallback};

use crate::stealth::StealthClient;

pub struct TransportAdapter {
    client: Arc<StealthClient>,
    renderer: Option<Arc<dyn RendererFallback>>,
}

impl TransportAdapter {
    pub fn new(client: Arc<StealthClient>) -> Self {
        Self {
            client,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn RendererFallback>) -> Self {
        self.renderer = Some(renderer);
        self
    }
}

#[async_trait]
impl Middleware for TransportAdapter {
    async fn handle(
        &self,
        req: Request,
        _extensions: &mut Extensions,
        _next: Next<'_>,
    ) -> MiddlewareResult<ReqwestResponse> {
        let url = req.url().to_string();
        let mut extra_headers = BTreeMap::new();
        for (name, value) in req.headers() {
            if let Ok(v) = value.to_str() {
                extra_headers.insert(name.as_str().to_string(), v.to_string());
            }
        }

        let result = self
            .client
            .get_with_headers(CancellationToken::new(), &url, extra_headers)
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(original @ Error::Fetch { status: Some(403), .. }) => {
                if let Some(renderer) = &self.renderer {
                    match renderer.render(&url).await {
                        Ok(html) => repodocs_core::Response {
                            status_code: 200,
                            body: html.into_bytes(),
                            headers: BTreeMap::new(),
                            content_type: "text/html; charset=utf-8".to_string(),
                            url,
                            from_cache: false,
                        },
                        // Callback failure surfaces the original fetch error, not the
                        // callback's (spec §4.E/§7) — the renderer's error is discarded.
                        Err(_) => return Err(reqwest_middleware::Error::Middleware(original.into())),
                    }
                } else {
                    return Err(reqwest_middleware::Error::Middleware(original.into()));
                }
            }
            Err(e) => return Err(reqwest_middleware::Error::Middleware(e.into())),
        };

        to_reqwest_response(response)
    }
}

fn to_reqwest_response(resp: repodocs_core::Response) -> MiddlewareResult<ReqwestResponse> {
    let mut builder = http::Response::builder().status(resp.status_code);
    for (name, values) in &resp.headers {
        // Content-Encoding is stripped: the body handed back is already
        // decoded, and forwarding a stale encoding header would make a
        // downstream consumer try to decode it a second time.
        if name.eq_ignore_ascii_case("content-encoding") {
            continue;
        }
        for value in values {
            builder = builder.header(name, value);
        }
    }
    let http_response = builder
        .body(resp.body)
        .map_err(|e| reqwest_middleware::Error::Middleware(anyhow::anyhow!(e)))?;
    Ok(ReqwestResponse::from(http_response))
}

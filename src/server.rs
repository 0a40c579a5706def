//! Embedded HTTP server exposing `/` (liveness), `/metrics` (Prometheus
//! text exposition), and `/healthz` (health check). Mirrors the
//! teacher's metrics/health server, extended with the liveness route.

use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server};
use prometheus::{Encoder, TextEncoder};
use tracing::info;

use crate::metrics;

/// Binds `addr` and serves forever. Intended to be spawned as a
/// background task alongside the periodic ingestion loop.
pub async fn serve(addr: SocketAddr) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| async move {
        Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| async move {
            let response = match (req.method(), req.uri().path()) {
                (&Method::GET, "/") => Response::builder()
                    .header("Content-Type", "text/plain; charset=utf-8")
                    .body(Body::from("osint-pipeline: ok"))
                    .expect("failed to build / response"),

                (&Method::GET, "/metrics") => {
                    let metrics_text = metrics::gather_metrics();
                    let mime = TextEncoder::new().format_type();
                    Response::builder()
                        .header("Content-Type", mime)
                        .body(Body::from(metrics_text))
                        .expect("failed to build /metrics response")
                }

                (&Method::GET, "/healthz") => Response::new(Body::from("OK")),

                _ => Response::builder()
                    .status(404)
                    .body(Body::empty())
                    .expect("failed to build 404 response"),
            };

            Ok::<Response<Body>, hyper::Error>(response)
        }))
    });

    info!(%addr, "starting liveness/metrics/health server");
    Server::bind(&addr).serve(make_svc).await
}

//! Per-connection request handling
//!
//! Each accepted socket is serviced end-to-end by one worker task: a single
//! bounded read, decode, predict, encode, write, close. Exactly one request
//! per connection; there is no keep-alive. Read and predict are both bounded
//! by timeouts, and a timed-out worker still attempts to send an error body
//! before closing.

use crate::codec;
use crate::engine::InferenceEngine;
use finserve_common::config::LimitsConfig;
use finserve_common::{FinserveError, METRICS};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Service one accepted connection to completion.
///
/// Never returns an error: per-request failures become error responses, and
/// transport failures abandon the connection without touching the caller.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    engine: InferenceEngine,
    limits: LimitsConfig,
) {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    METRICS.requests.requests_total.inc();
    METRICS.requests.active_connections.inc();

    let success = service(&mut stream, peer, request_id, engine, &limits).await;

    if success {
        METRICS.requests.requests_success.inc();
    } else {
        METRICS.requests.requests_failed.inc();
    }
    METRICS.requests.active_connections.dec();
    METRICS
        .requests
        .request_duration
        .observe(started.elapsed().as_secs_f64());
}

/// The read → decode → predict → encode → write pipeline.
///
/// Returns true only when a 200 response was written.
async fn service(
    stream: &mut TcpStream,
    peer: SocketAddr,
    request_id: Uuid,
    engine: InferenceEngine,
    limits: &LimitsConfig,
) -> bool {
    // Reading: one bounded read; a silent peer is abandoned, an idle one
    // still gets an error body.
    let mut buffer = vec![0u8; limits.max_request_bytes];
    let read_timeout = Duration::from_millis(limits.read_timeout_ms);

    let bytes = match timeout(read_timeout, stream.read(&mut buffer)).await {
        Err(_) => {
            warn!(%request_id, %peer, "read timed out");
            let e = FinserveError::timeout("waiting for request");
            respond_error(stream, request_id, &e.client_message()).await;
            return false;
        }
        Ok(Err(e)) => {
            debug!(%request_id, %peer, "read failed, abandoning connection: {}", e);
            return false;
        }
        Ok(Ok(0)) => {
            debug!(%request_id, %peer, "client disconnected before sending data");
            return false;
        }
        Ok(Ok(n)) => n,
    };

    // Decoding
    let decoded = match codec::decode_request(&buffer[..bytes]) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(%request_id, %peer, "request decode failed: {}", e);
            respond_error(stream, request_id, &e.client_message()).await;
            return false;
        }
    };
    debug!(
        %request_id,
        path = %decoded.path,
        features = decoded.features.len(),
        "request decoded"
    );

    // Predicting: the forward pass is CPU-bound, keep it off the reactor.
    let predict_timeout = Duration::from_millis(limits.predict_timeout_ms);
    let features = decoded.features;
    let predicted = timeout(
        predict_timeout,
        tokio::task::spawn_blocking(move || engine.run(&features)),
    )
    .await;

    let outputs = match predicted {
        Err(_) => {
            warn!(%request_id, %peer, "inference timed out");
            let e = FinserveError::timeout("running inference");
            respond_error(stream, request_id, &e.client_message()).await;
            return false;
        }
        Ok(Err(join_err)) => {
            error!(%request_id, "inference task failed: {}", join_err);
            respond_error(stream, request_id, "inference failed").await;
            return false;
        }
        Ok(Ok(Err(e))) => {
            warn!(%request_id, %peer, "prediction failed: {}", e);
            respond_error(stream, request_id, &e.client_message()).await;
            return false;
        }
        Ok(Ok(Ok(outputs))) => outputs,
    };

    // Encoding + Writing
    let body = codec::encode_response(&outputs);
    write_response(stream, request_id, codec::http_ok(&body)).await;
    true
}

/// Write an error body; the connection closes either way.
async fn respond_error(stream: &mut TcpStream, request_id: Uuid, message: &str) {
    write_response(stream, request_id, codec::http_error(message)).await;
}

/// Write the full response and close. Write failures are logged and
/// swallowed; the peer is usually gone already.
async fn write_response(stream: &mut TcpStream, request_id: Uuid, response: String) {
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(%request_id, "failed to write response: {}", e);
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}

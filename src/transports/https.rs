use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::signaling::{Channel, Claim, Signaler, PENDING_TTL};
use super::TransportEvent;
use crate::config::ServerConfig;

/* ------------------------------- serve() -------------------------------- */

pub async fn serve(config: ServerConfig, signaler: Arc<Signaler>) -> Result<()> {
    let addr = config.bind_addr()?;

    // Socket tuning (keepalive, reuseaddr)
    let listener = tuned_listener(addr)?;

    info!("HTTP/WS listening on http://{addr}");

    let app = router(signaler);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/* ------------------------------- router() ------------------------------- */

pub fn router(signaler: Arc<Signaler>) -> Router {
    let max_inflight: usize = num_cpus::get().max(1) * 1024;

    let middleware = tower::ServiceBuilder::new()
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
            ),
        )
        // Browsers bootstrap from any origin
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(axum::error_handling::HandleErrorLayer::new(
            |err: tower::BoxError| async move {
                if err.is::<tower::timeout::error::Elapsed>() {
                    (axum::http::StatusCode::REQUEST_TIMEOUT, "request timed out")
                } else if err.is::<tower::load_shed::error::Overloaded>() {
                    (axum::http::StatusCode::SERVICE_UNAVAILABLE, "service overloaded")
                } else {
                    tracing::warn!(error = %err, "middleware error");
                    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
                }
            },
        ))
        .timeout(Duration::from_secs(10))
        .concurrency_limit(max_inflight)
        .load_shed()
        .layer(tower_http::limit::RequestBodyLimitLayer::new(64 * 1024));

    Router::new()
        .route("/health", get(health))
        .route("/ws/{session}/data", get(data_channel))
        .route("/ws/{session}/ud", get(update_channel))
        .route("/{offer}", get(bootstrap))
        .with_state(signaler)
        .layer(middleware)
}

/* ------------------------------- Handlers ------------------------------- */

async fn health() -> impl IntoResponse {
    "OK"
}

/// `GET /<base64 offer>`: answer body on success, the literal `error` otherwise
async fn bootstrap(State(signaler): State<Arc<Signaler>>, Path(offer): Path<String>) -> String {
    match signaler.answer(&offer) {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %e, "Bootstrap failed");
            "error".into()
        }
    }
}

/* ---------------------------- WebSocket path ---------------------------- */

async fn data_channel(
    ws: WebSocketUpgrade,
    State(signaler): State<Arc<Signaler>>,
    Path(session): Path<String>,
) -> axum::response::Response {
    upgrade(ws, signaler, session, Channel::Data)
}

async fn update_channel(
    ws: WebSocketUpgrade,
    State(signaler): State<Arc<Signaler>>,
    Path(session): Path<String>,
) -> axum::response::Response {
    upgrade(ws, signaler, session, Channel::Update)
}

fn upgrade(
    ws: WebSocketUpgrade,
    signaler: Arc<Signaler>,
    session: String,
    channel: Channel,
) -> axum::response::Response {
    let Ok(session) = session.parse::<Ulid>() else {
        return (http::StatusCode::BAD_REQUEST, "error").into_response();
    };

    // Bound allocations per frame; textures are streamed in 16 KiB parts
    ws.max_message_size(1 << 20)
        .max_frame_size(1 << 20)
        .on_upgrade(move |socket| channel_loop(socket, signaler, session, channel))
}

async fn channel_loop(socket: WebSocket, signaler: Arc<Signaler>, session: Ulid, channel: Channel) {
    let Claim { peer, mut outbound, mut ready } = match signaler.claim(session, channel).await {
        Ok(claim) => claim,
        Err(e) => {
            warn!(session = %session, error = %e, "Channel rejected");
            return;
        }
    };

    // Frames sent before the other channel opens stay in the socket until the
    // peer is registered
    let opened = matches!(
        tokio::time::timeout(PENDING_TTL, ready.wait_for(|open| *open)).await,
        Ok(Ok(_))
    );
    if !opened {
        debug!(peer = %peer, ?channel, "Other channel never opened");
        signaler.close(session).await;
        return;
    }

    let (mut sink, mut stream) = socket.split();
    let mut received = 0u64;

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(data) => {
                    if let Err(e) = sink.send(Message::Binary(data)).await {
                        debug!(peer = %peer, ?channel, error = %e, "Send failed, closing channel");
                        break;
                    }
                }
                // Peer dropped by the world
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    received += 1;
                    let event = match channel {
                        Channel::Data => TransportEvent::Message { peer, data },
                        Channel::Update => TransportEvent::Update { peer, data },
                    };
                    signaler.emit(event).await;
                }
                Some(Ok(Message::Ping(p))) => {
                    if let Err(e) = sink.send(Message::Pong(p)).await {
                        debug!(peer = %peer, error = %e, "Failed to send Pong");
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(peer = %peer, ?channel, close = ?frame, "Closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(peer = %peer, ?channel, error = %e, "WebSocket error, closing channel");
                    break;
                }
                None => break,
            },
        }
    }

    let _ = sink.close().await;
    info!(peer = %peer, ?channel, frames = received, "Channel closed");
    signaler.close(session).await;
}

/* ----------------------------- Socket tuning ---------------------------- */

fn tuned_listener(addr: SocketAddr) -> Result<TcpListener> {
    use socket2::{Domain, Protocol, Socket, Type};
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_keepalive(true)?;
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use socket2::TcpKeepalive;
        let ka = TcpKeepalive::new()
            .with_time(Duration::from_secs(30))
            .with_interval(Duration::from_secs(10));
        let _ = socket.set_tcp_keepalive(&ka);
    }

    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    let std_listener = std::net::TcpListener::from(socket);
    std_listener.set_nonblocking(true)?;
    Ok(TcpListener::from_std(std_listener)?)
}

/* ----------------------------- Shutdown hook ---------------------------- */

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

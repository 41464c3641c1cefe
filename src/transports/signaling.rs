// src/transports/signaling.rs
// Offer/answer bootstrap and pairing of the two channels that make up a peer

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, PAD, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::{Peer, PeerChannels, PeerId, TransportEvent};

/// Offers arrive URL-safe encoded; accept them with or without padding
const OFFER_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Sessions whose channels never both open are forgotten after this long
pub const PENDING_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("empty offer")]
    EmptyOffer,

    #[error("offer is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("offer is not a valid session descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("unknown session {0}")]
    UnknownSession(Ulid),

    #[error("{0:?} channel already open for session {1}")]
    ChannelTaken(Channel, Ulid),
}

/// Client half of the handshake
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOffer {
    #[serde(default)]
    pub client: Option<String>,
}

/// Server half: where to open the two channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAnswer {
    pub session: Ulid,
    pub data: String,
    pub update: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Reliable request/response channel
    Data,
    /// High-frequency update channel
    Update,
}

/// Outbound queue handed to the socket writer of one channel
#[derive(Debug)]
pub enum Outbound {
    Primary(mpsc::UnboundedReceiver<Bytes>),
    Update(mpsc::Receiver<Bytes>),
}

impl Outbound {
    pub async fn recv(&mut self) -> Option<Bytes> {
        match self {
            Outbound::Primary(rx) => rx.recv().await,
            Outbound::Update(rx) => rx.recv().await,
        }
    }
}

pub struct Claim {
    pub peer: PeerId,
    pub outbound: Outbound,
    /// Becomes true once both channels are open and the peer is announced
    pub ready: watch::Receiver<bool>,
}

struct PendingSession {
    peer: Peer,
    primary: Option<mpsc::UnboundedReceiver<Bytes>>,
    update: Option<mpsc::Receiver<Bytes>>,
    connected: bool,
    ready: watch::Sender<bool>,
    created: Instant,
}

/// Tracks sessions between offer and disconnect and reports peer lifecycle
pub struct Signaler {
    sessions: DashMap<Ulid, PendingSession>,
    events: mpsc::Sender<TransportEvent>,
}

impl Signaler {
    pub fn new(events: mpsc::Sender<TransportEvent>) -> Self {
        Self { sessions: DashMap::new(), events }
    }

    /// Decode an offer and allocate a session; returns the base64 answer
    pub fn answer(&self, offer: &str) -> Result<String, SignalingError> {
        if offer.is_empty() {
            return Err(SignalingError::EmptyOffer);
        }
        let raw = OFFER_ENGINE.decode(offer)?;
        let offer: SessionOffer = serde_json::from_slice(&raw)?;

        self.sessions
            .retain(|_, s| s.connected || s.created.elapsed() < PENDING_TTL);

        let session = Ulid::new();
        let (peer, PeerChannels { primary, update }) = Peer::new(PeerId(session));
        self.sessions.insert(
            session,
            PendingSession {
                peer,
                primary: Some(primary),
                update: Some(update),
                connected: false,
                ready: watch::Sender::new(false),
                created: Instant::now(),
            },
        );

        let answer = SessionAnswer {
            session,
            data: format!("/ws/{session}/data"),
            update: format!("/ws/{session}/ud"),
        };
        info!(session = %session, client = ?offer.client, "Session offered");
        Ok(STANDARD.encode(serde_json::to_vec(&answer)?))
    }

    /// Take the outbound queue for one channel of a session. The claim that
    /// opens the second channel queues `Connected` while still holding the
    /// session entry, so a concurrent `close` always reports after it.
    pub async fn claim(&self, session: Ulid, channel: Channel) -> Result<Claim, SignalingError> {
        // Reserve first: no awaiting once the entry is held
        let permit = self.events.reserve().await.ok();
        let mut entry = self
            .sessions
            .get_mut(&session)
            .ok_or(SignalingError::UnknownSession(session))?;

        let outbound = match channel {
            Channel::Data => entry.primary.take().map(Outbound::Primary),
            Channel::Update => entry.update.take().map(Outbound::Update),
        }
        .ok_or(SignalingError::ChannelTaken(channel, session))?;

        let both_open = entry.primary.is_none() && entry.update.is_none();
        if both_open && !entry.connected {
            entry.connected = true;
            match permit {
                Some(permit) => permit.send(TransportEvent::Connected(entry.peer.clone())),
                None => warn!("Transport event receiver dropped"),
            }
            entry.ready.send_replace(true);
            info!(peer = %entry.peer.id(), "Peer connected");
        }

        debug!(session = %session, ?channel, both_open, "Channel opened");
        Ok(Claim { peer: entry.peer.id(), outbound, ready: entry.ready.subscribe() })
    }

    /// Forget a session. The first close of a connected session reports the disconnect.
    pub async fn close(&self, session: Ulid) {
        let Some((_, pending)) = self.sessions.remove(&session) else {
            return;
        };
        if pending.connected {
            self.emit(TransportEvent::Disconnected(pending.peer.id())).await;
        }
    }

    pub async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            warn!("Transport event receiver dropped");
        }
    }

    pub fn pending_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetCache, AssetCatalog, AssetStreamer};
    use crate::world::{SessionManager, World};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use std::sync::Arc;

    fn signaler() -> (Signaler, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (Signaler::new(tx), rx)
    }

    fn decode_answer(answer: &str) -> SessionAnswer {
        serde_json::from_slice(&STANDARD.decode(answer).unwrap()).unwrap()
    }

    #[test]
    fn rejects_bad_offers() {
        let (s, _rx) = signaler();
        assert!(matches!(s.answer(""), Err(SignalingError::EmptyOffer)));
        assert!(matches!(s.answer("***"), Err(SignalingError::Base64(_))));
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(matches!(s.answer(&not_json), Err(SignalingError::Descriptor(_))));
        assert_eq!(s.pending_sessions(), 0);
    }

    #[tokio::test]
    async fn second_channel_announces_peer_and_close_reports_once() {
        let (s, mut rx) = signaler();
        let offer = URL_SAFE_NO_PAD.encode(br#"{"client":"test"}"#);
        let answer = decode_answer(&s.answer(&offer).unwrap());
        assert_eq!(answer.data, format!("/ws/{}/data", answer.session));

        let first = s.claim(answer.session, Channel::Data).await.unwrap();
        assert!(!*first.ready.borrow());
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            s.claim(answer.session, Channel::Data).await,
            Err(SignalingError::ChannelTaken(Channel::Data, _))
        ));

        let second = s.claim(answer.session, Channel::Update).await.unwrap();
        assert_eq!(second.peer, first.peer);
        assert!(*first.ready.borrow());
        match rx.try_recv().unwrap() {
            TransportEvent::Connected(peer) => assert_eq!(peer.id(), first.peer),
            other => panic!("unexpected event {other:?}"),
        }

        s.close(answer.session).await;
        s.close(answer.session).await;
        match rx.recv().await.unwrap() {
            TransportEvent::Disconnected(id) => assert_eq!(id, first.peer),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closing_an_unconnected_session_is_silent() {
        let (s, mut rx) = signaler();
        let offer = URL_SAFE_NO_PAD.encode(b"{}");
        let answer = decode_answer(&s.answer(&offer).unwrap());
        let mut claim = s.claim(answer.session, Channel::Update).await.unwrap();
        s.close(answer.session).await;
        assert!(rx.try_recv().is_err());
        // Waiting channel learns the session is gone
        assert!(claim.ready.wait_for(|open| *open).await.is_err());
        assert!(matches!(
            s.claim(answer.session, Channel::Data).await,
            Err(SignalingError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn immediate_close_after_connect_leaves_no_player() {
        let (world, _registrations) = World::new(500.0);
        let world = Arc::new(world);
        let assets = Arc::new(AssetStreamer::new(
            AssetCache::new(Duration::from_secs(60)),
            Arc::new(AssetCatalog::builtin()),
            std::env::temp_dir(),
        ));
        let sessions = Arc::new(SessionManager::new(world.clone(), assets));

        let (s, rx) = signaler();
        let answer = decode_answer(&s.answer(&URL_SAFE_NO_PAD.encode(b"{}")).unwrap());
        s.claim(answer.session, Channel::Data).await.unwrap();
        s.claim(answer.session, Channel::Update).await.unwrap();
        // Both sockets drop at once
        s.close(answer.session).await;
        s.close(answer.session).await;
        drop(s);

        sessions.run(rx).await;
        assert!(world.players().is_empty());
        assert!(world.chunks().get(world.bootstrap_chunk()).unwrap().lock().players.is_empty());
    }
}

//! The socket owner: one receive loop, one serialized writer and the table of
//! requests waiting for a correlated reply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use chromecast_protocol::namespaces::Namespace;
use chromecast_protocol::protos::{CastMessage, Payload};
use chromecast_protocol::{codec, FrameError, PayloadHeader, MAX_FRAME_LENGTH};
use log::{debug, error, warn};
use rustls_pki_types::ServerName;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tokio_rustls::rustls::{self, ClientConfig};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::channels::{ChannelAction, ChannelMessage, ChannelRouter, OutgoingMessage};
use crate::config::PlayerConfig;
use crate::device::ReceiverInfo;
use crate::error::{CastError, Result};
use crate::utils;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Responder = oneshot::Sender<Result<ChannelMessage>>;

#[derive(Debug)]
struct AllCertVerifier;

impl rustls::client::danger::ServerCertVerifier for AllCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA1,
            rustls::SignatureScheme::ECDSA_SHA1_Legacy,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ED448,
        ]
    }
}

#[derive(Default)]
struct PendingRequests {
    entries: HashMap<u64, Responder>,
    closed: bool,
}

impl PendingRequests {
    fn insert(&mut self, request_id: u64, responder: Responder) -> Result<()> {
        if self.closed {
            return Err(CastError::Disconnected);
        }
        if self.entries.contains_key(&request_id) {
            return Err(CastError::protocol(format!(
                "request id {request_id} is already in flight"
            )));
        }
        self.entries.insert(request_id, responder);
        Ok(())
    }

    fn take(&mut self, request_id: u64) -> Option<Responder> {
        self.entries.remove(&request_id)
    }

    fn fail_all(&mut self) {
        self.closed = true;
        for (request_id, responder) in self.entries.drain() {
            debug!("Failing pending request {request_id}");
            let _ = responder.send(Err(CastError::Disconnected));
        }
    }
}

/// Removes a pending entry when the waiting caller goes away, whether it got
/// its answer, timed out or was dropped.
struct PendingGuard<'a> {
    transport: &'a Transport,
    request_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.transport.pending().take(self.request_id);
    }
}

/// An open connection to a receiver.
///
/// Cloning the surrounding `Arc` is how channels and the player share it; the
/// receive loop holds one clone until the connection ends.
pub struct Transport {
    sender_id: String,
    writer: Mutex<Option<Writer>>,
    pending: std::sync::Mutex<PendingRequests>,
    next_request_id: AtomicU64,
    shutdown: CancellationToken,
    disconnected: AtomicBool,
}

impl Transport {
    /// Opens a TLS connection to `receiver` and starts the receive loop.
    pub async fn connect(
        receiver: &ReceiverInfo,
        router: Arc<ChannelRouter>,
        config: &PlayerConfig,
    ) -> Result<Arc<Self>> {
        let addrs = utils::resolve_addrs(receiver).await?;
        let stream = utils::try_connect_tcp(&addrs, config.connect_timeout()).await?;
        let remote_addr = stream
            .peer_addr()
            .map_err(|err| CastError::Connection(err.to_string()))?
            .ip();

        let tls_config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|err| CastError::Connection(err.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AllCertVerifier))
        .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));
        let stream = tokio::time::timeout(
            config.connect_timeout(),
            connector.connect(ServerName::from(remote_addr), stream),
        )
        .await
        .map_err(|_| CastError::Connection(format!("TLS handshake with {remote_addr} timed out")))?
        .map_err(|err| CastError::Connection(err.to_string()))?;

        debug!("Connected to {remote_addr:?}");

        Ok(Self::start(stream, router, config))
    }

    /// Runs the protocol over an established stream.
    pub fn start<S>(stream: S, router: Arc<ChannelRouter>, config: &PlayerConfig) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let transport = Arc::new(Self {
            sender_id: config.sender_id.clone(),
            writer: Mutex::new(Some(Box::new(writer))),
            pending: std::sync::Mutex::new(PendingRequests::default()),
            next_request_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            disconnected: AtomicBool::new(false),
        });

        tokio::spawn(Arc::clone(&transport).receive_loop(reader, router));

        transport
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::Acquire)
    }

    /// Resolves once the connection has shut down, for whatever reason.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Serializes and writes `message` without waiting for any reply.
    pub async fn send<T>(&self, destination_id: &str, message: &T) -> Result<()>
    where
        T: Serialize + Namespace,
    {
        self.send_outgoing(&OutgoingMessage::new(destination_id, message)?)
            .await
    }

    /// Sends a request and waits for the reply carrying the same request id.
    ///
    /// Stop messages are written and `Ok(None)` is returned straight away, the
    /// receiver tears the session down rather than answering them.
    pub async fn send_and_await<T>(
        &self,
        destination_id: &str,
        message: &T,
        timeout: Duration,
    ) -> Result<Option<ChannelMessage>>
    where
        T: Serialize + Namespace,
    {
        if message.is_stop() {
            self.send(destination_id, message).await?;
            return Ok(None);
        }

        let request_id = message
            .request_id()
            .filter(|id| *id != 0)
            .ok_or_else(|| CastError::protocol("request carries no request id"))?;

        let (tx, rx) = oneshot::channel();
        self.pending().insert(request_id, tx)?;
        let _guard = PendingGuard {
            transport: self,
            request_id,
        };

        self.send(destination_id, message).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply.map(Some),
            Ok(Err(_)) => Err(CastError::Disconnected),
            Err(_) => Err(CastError::RequestTimeout {
                request_id,
                timeout,
            }),
        }
    }

    /// Tears the connection down and fails every pending request.
    ///
    /// Returns `false` if the transport was already disconnected.
    pub async fn disconnect(&self) -> bool {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return false;
        }

        debug!("Disconnecting...");

        self.pending().fail_all();
        self.shutdown.cancel();

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(err) = writer.shutdown().await {
                debug!("Failed to shut down writer: {err}");
            }
        }

        true
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending().entries.len()
    }

    fn pending(&self) -> MutexGuard<'_, PendingRequests> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send_outgoing(&self, outgoing: &OutgoingMessage) -> Result<()> {
        let message = CastMessage::new(
            self.sender_id.as_str(),
            outgoing.destination_id.as_str(),
            outgoing.namespace,
            Payload::Utf8(outgoing.payload.clone()),
        );

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(CastError::Disconnected)?;
        debug!(
            "Sending to {} on {}: {}",
            outgoing.destination_id, outgoing.namespace, outgoing.payload
        );
        codec::write_frame(writer, &message).await?;

        Ok(())
    }

    fn resolve(&self, request_id: u64, reply: Result<ChannelMessage>) {
        let responder = self.pending().take(request_id);
        match responder {
            Some(responder) => {
                let _ = responder.send(reply);
            }
            None => debug!("No pending request with id {request_id}"),
        }
    }

    /// Handles one incoming message. Returns `true` when the receiver closed
    /// the connection.
    async fn dispatch(&self, router: &ChannelRouter, message: CastMessage) -> bool {
        let payload = match message.payload() {
            Some(Payload::Utf8(payload)) => payload,
            Some(Payload::Binary(_)) | None => {
                warn!("Dropping non-text message on {}", message.namespace);
                return false;
            }
        };

        debug!(
            "Received from {} on {}: {payload}",
            message.source_id, message.namespace
        );

        let Some(channel) = router.route(&message.namespace) else {
            warn!("Unsupported namespace: {}", message.namespace);
            return false;
        };

        let correlation_id = PayloadHeader::peek(&payload)
            .ok()
            .and_then(|header| header.correlation_id());

        let parsed = match channel.parse(&payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Failed to parse message on {}: {err}", message.namespace);
                if let Some(request_id) = correlation_id {
                    self.resolve(request_id, Err(err));
                }
                return false;
            }
        };

        let action = channel.on_incoming(&message.source_id, &parsed);

        if let Some(request_id) = correlation_id {
            self.resolve(request_id, Ok(parsed));
        }

        match action {
            ChannelAction::None => false,
            ChannelAction::Reply(reply) => {
                if let Err(err) = self.send_outgoing(&reply).await {
                    error!("Failed to send reply on {}: {err}", reply.namespace);
                }
                false
            }
            ChannelAction::Close => true,
        }
    }

    async fn receive_loop<R>(self: Arc<Self>, mut reader: R, router: Arc<ChannelRouter>)
    where
        R: AsyncRead + Unpin,
    {
        let mut body_buf = vec![0u8; MAX_FRAME_LENGTH];

        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = codec::read_frame(&mut reader, &mut body_buf) => frame,
            };

            match frame {
                Ok(message) => {
                    if self.dispatch(&router, message).await {
                        debug!("Receiver closed the connection");
                        break;
                    }
                }
                // The frame was consumed whole, so the stream is still aligned
                Err(FrameError::Decode(err)) => warn!("Dropping undecodable frame: {err}"),
                Err(err) => {
                    if self.is_connected() {
                        error!("Error occurred while reading packet: {err}");
                    }
                    break;
                }
            }
        }

        self.disconnect().await;
        router.reset();
        debug!("Receive loop finished");
    }
}

#[cfg(test)]
mod tests {
    use chromecast_protocol::namespaces::{self, Receiver};
    use chromecast_protocol::{
        Status, Volume, VolumeStatus, CONNECTION_NAMESPACE, HEARTBEAT_NAMESPACE,
        PLATFORM_DESTINATION_ID,
    };
    use serde_json::json;

    use super::*;
    use crate::channels::{ConnectionChannel, HeartbeatChannel, ReceiverChannel};
    use crate::testing::{self, FakeReceiver};

    const LONG: Duration = Duration::from_secs(5);

    fn router() -> Arc<ChannelRouter> {
        let config = PlayerConfig::default();
        let mut router = ChannelRouter::new();
        router.register(Arc::new(ConnectionChannel::new()));
        router.register(Arc::new(HeartbeatChannel::new()));
        router.register(Arc::new(ReceiverChannel::new(&config)));
        Arc::new(router)
    }

    fn start(fake_stream: tokio::io::DuplexStream) -> Arc<Transport> {
        Transport::start(fake_stream, router(), &PlayerConfig::default())
    }

    fn status_reply(request_id: u64, level: f64) -> serde_json::Value {
        json!({
            "type": "RECEIVER_STATUS",
            "requestId": request_id,
            "status": { "volume": { "level": level, "muted": false } }
        })
    }

    fn volume_of(reply: Option<ChannelMessage>) -> (u64, f64) {
        match reply {
            Some(ChannelMessage::Receiver(Receiver::Status {
                request_id,
                status:
                    Status {
                        volume: VolumeStatus { level, .. },
                        ..
                    },
            })) => (request_id, level),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_requests_get_their_own_replies() {
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let transport = Arc::clone(&transport);
            tasks.push(tokio::spawn(async move {
                let request_id = transport.next_request_id();
                let reply = transport
                    .send_and_await(
                        PLATFORM_DESTINATION_ID,
                        &Receiver::GetStatus { request_id },
                        LONG,
                    )
                    .await
                    .unwrap();
                (request_id, reply)
            }));
        }

        let mut requests = Vec::new();
        for _ in 0..5 {
            requests.push(fake.next_request().await);
        }
        for request in requests.iter().rev() {
            let id = request.request_id();
            fake.inject(request.reply(status_reply(id, id as f64 / 10.0)));
        }

        for task in tasks {
            let (request_id, reply) = task.await.unwrap();
            let (replied_id, level) = volume_of(reply);
            assert_eq!(replied_id, request_id);
            assert_eq!(level, request_id as f64 / 10.0);
        }
        assert_eq!(transport.pending_len(), 0);
    }

    #[tokio::test]
    async fn request_ids_start_at_one() {
        let (stream, _fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);
        assert_eq!(transport.next_request_id(), 1);
        assert_eq!(transport.next_request_id(), 2);
    }

    #[tokio::test]
    async fn timed_out_request_is_removed_and_late_reply_ignored() {
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);

        let request_id = transport.next_request_id();
        let result = transport
            .send_and_await(
                PLATFORM_DESTINATION_ID,
                &Receiver::GetStatus { request_id },
                Duration::from_millis(50),
            )
            .await;
        assert!(matches!(
            result,
            Err(CastError::RequestTimeout { request_id: id, .. }) if id == request_id
        ));
        assert_eq!(transport.pending_len(), 0);

        let late = fake.next_request().await;
        fake.inject(late.reply(status_reply(request_id, 0.1)));

        // The loop is still alive and correlates the next exchange.
        let next_id = transport.next_request_id();
        let waiting = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                transport
                    .send_and_await(
                        PLATFORM_DESTINATION_ID,
                        &Receiver::GetStatus {
                            request_id: next_id,
                        },
                        LONG,
                    )
                    .await
            })
        };
        let next = fake.next_request().await;
        assert_eq!(next.request_id(), next_id);
        fake.inject(next.reply(status_reply(next_id, 0.7)));
        let (replied_id, level) = volume_of(waiting.await.unwrap().unwrap());
        assert_eq!(replied_id, next_id);
        assert_eq!(level, 0.7);
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn disconnect_fails_every_pending_request() {
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let transport = Arc::clone(&transport);
            tasks.push(tokio::spawn(async move {
                let request_id = transport.next_request_id();
                transport
                    .send_and_await(
                        PLATFORM_DESTINATION_ID,
                        &Receiver::GetStatus { request_id },
                        Duration::from_secs(60),
                    )
                    .await
            }));
        }
        for _ in 0..4 {
            fake.next_request().await;
        }

        assert!(transport.disconnect().await);
        assert!(!transport.disconnect().await);

        for task in tasks {
            let result = tokio::time::timeout(LONG, task).await.unwrap().unwrap();
            assert!(matches!(result, Err(CastError::Disconnected)));
        }
        tokio::time::timeout(LONG, transport.closed()).await.unwrap();

        let request_id = transport.next_request_id();
        assert!(matches!(
            transport
                .send_and_await(
                    PLATFORM_DESTINATION_ID,
                    &Receiver::GetStatus { request_id },
                    LONG
                )
                .await,
            Err(CastError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn stop_messages_do_not_wait() {
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);

        let request_id = transport.next_request_id();
        let reply = transport
            .send_and_await(
                PLATFORM_DESTINATION_ID,
                &Receiver::StopSession {
                    request_id,
                    session_id: "S1".to_owned(),
                },
                LONG,
            )
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert_eq!(fake.next_request().await.message_type(), "STOP");
        assert_eq!(transport.pending_len(), 0);
    }

    #[tokio::test]
    async fn answers_ping_with_pong() {
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let _transport = start(stream);

        fake.inject(testing::message(
            HEARTBEAT_NAMESPACE,
            PLATFORM_DESTINATION_ID,
            "sender-0",
            json!({ "type": "PING" }),
        ));

        let pong = fake.next_request().await;
        assert_eq!(pong.namespace, HEARTBEAT_NAMESPACE);
        assert_eq!(pong.message_type(), "PONG");
        assert_eq!(pong.source_id, "sender-0");
        assert_eq!(pong.destination_id, PLATFORM_DESTINATION_ID);
    }

    #[tokio::test]
    async fn bad_messages_do_not_stop_the_loop() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);

        fake.inject(testing::message(
            "urn:x-cast:com.example.unknown",
            PLATFORM_DESTINATION_ID,
            "sender-0",
            json!({ "type": "HELLO" }),
        ));
        fake.inject(testing::message(
            HEARTBEAT_NAMESPACE,
            PLATFORM_DESTINATION_ID,
            "sender-0",
            json!({ "type": "NOT_A_HEARTBEAT" }),
        ));
        fake.inject(CastMessage::new(
            PLATFORM_DESTINATION_ID,
            "sender-0",
            HEARTBEAT_NAMESPACE,
            Payload::Binary(vec![1, 2, 3]),
        ));
        fake.inject(testing::message(
            HEARTBEAT_NAMESPACE,
            PLATFORM_DESTINATION_ID,
            "sender-0",
            json!({ "type": "PING" }),
        ));

        assert_eq!(fake.next_request().await.message_type(), "PONG");
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn malformed_reply_fails_only_its_request() {
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);

        let request_id = transport.next_request_id();
        let waiting = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                transport
                    .send_and_await(
                        PLATFORM_DESTINATION_ID,
                        &Receiver::SetVolume {
                            volume: Volume {
                                level: Some(0.5),
                                muted: None,
                            },
                            request_id,
                        },
                        LONG,
                    )
                    .await
            })
        };
        let request = fake.next_request().await;
        fake.inject(request.reply(json!({ "type": "RECEIVER_STATUS", "requestId": request_id })));

        assert!(matches!(
            waiting.await.unwrap(),
            Err(CastError::Protocol(_))
        ));
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn receiver_close_shuts_the_transport_down() {
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);

        let request_id = transport.next_request_id();
        let waiting = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                transport
                    .send_and_await(
                        PLATFORM_DESTINATION_ID,
                        &Receiver::GetStatus { request_id },
                        LONG,
                    )
                    .await
            })
        };
        fake.next_request().await;

        fake.inject(testing::message(
            CONNECTION_NAMESPACE,
            PLATFORM_DESTINATION_ID,
            "sender-0",
            json!({ "type": "CLOSE" }),
        ));

        tokio::time::timeout(LONG, transport.closed()).await.unwrap();
        assert!(!transport.is_connected());
        assert!(matches!(
            waiting.await.unwrap(),
            Err(CastError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn stream_failure_shuts_the_transport_down() {
        let (stream, mut fake) = FakeReceiver::spawn(|_| Vec::new());
        let transport = start(stream);

        transport
            .send(
                PLATFORM_DESTINATION_ID,
                &namespaces::Connection::Connect { conn_type: 0 },
            )
            .await
            .unwrap();
        fake.next_request().await;

        fake.hang_up();

        tokio::time::timeout(LONG, transport.closed()).await.unwrap();
        assert!(!transport.disconnect().await);
        assert!(matches!(
            transport.send(PLATFORM_DESTINATION_ID, &namespaces::Heartbeat::Ping).await,
            Err(CastError::Disconnected)
        ));
    }
}

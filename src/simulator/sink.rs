//! Where simulated packets go: the relay socket, the HTTP API or the store.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{
    domain::{NewDevice, SensorPacket},
    ingest,
    relay::{ClientMessage, LocationRelay, ServerMessage},
    repo::DynStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SinkMode {
    Socket,
    Api,
    Db,
    /// socket, then API, then DB
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Existing,
    Created,
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, packet: &SensorPacket) -> Result<()>;

    fn can_register(&self) -> bool {
        false
    }

    /// Makes sure a device with this serial exists.
    async fn register(&self, serial_number: &str) -> Result<Registration> {
        bail!("{} cannot register devices ({serial_number})", self.name())
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sends `sensor_reading` frames over the relay socket and waits for the ack.
pub struct SocketSink {
    url: String,
    ack_timeout: Duration,
    conn: Mutex<Option<WsStream>>,
}

impl SocketSink {
    pub fn new(url: impl Into<String>, ack_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            ack_timeout,
            conn: Mutex::new(None),
        }
    }

    async fn exchange(&self, ws: &mut WsStream, packet: &SensorPacket) -> Result<()> {
        let frame = serde_json::to_string(&ClientMessage::SensorReading(packet.clone()))?;
        ws.send(Message::Text(frame)).await?;

        tokio::time::timeout(self.ack_timeout, read_ack(ws, &packet.serial_number))
            .await
            .context("timed out waiting for ack")?
    }
}

/// Reads frames until the relay acks `serial_number` or rejects the packet.
async fn read_ack(ws: &mut WsStream, serial_number: &str) -> Result<()> {
    while let Some(frame) = ws.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => bail!("relay closed the socket"),
            _ => continue,
        };
        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::Ack { serial_number: acked, .. }) if acked == serial_number => {
                return Ok(());
            }
            Ok(ServerMessage::Error { message }) => bail!("relay rejected packet: {message}"),
            // broadcasts from other producers
            _ => continue,
        }
    }
    bail!("relay socket ended")
}

#[async_trait]
impl TelemetrySink for SocketSink {
    fn name(&self) -> &'static str {
        "socket"
    }

    async fn send(&self, packet: &SensorPacket) -> Result<()> {
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            let (ws, _) = connect_async(self.url.as_str())
                .await
                .with_context(|| format!("connecting to {}", self.url))?;
            info!(url = %self.url, "relay socket connected");
            *conn = Some(ws);
        }
        let Some(ws) = conn.as_mut() else {
            bail!("relay socket unavailable");
        };

        let result = self.exchange(ws, packet).await;
        if result.is_err() {
            // reconnect on the next packet
            *conn = None;
        }
        result
    }
}

/// Posts packets to `/api/sensor/readings`.
pub struct ApiSink {
    client: reqwest::Client,
    base_url: String,
}

impl ApiSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TelemetrySink for ApiSink {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn send(&self, packet: &SensorPacket) -> Result<()> {
        self.client
            .post(format!("{}/api/sensor/readings", self.base_url))
            .json(packet)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn can_register(&self) -> bool {
        true
    }

    async fn register(&self, serial_number: &str) -> Result<Registration> {
        let lookup = self
            .client
            .get(format!("{}/api/devices/serial/{serial_number}", self.base_url))
            .send()
            .await?;
        if lookup.status() != StatusCode::NOT_FOUND {
            lookup.error_for_status()?;
            return Ok(Registration::Existing);
        }

        self.client
            .post(format!("{}/api/devices", self.base_url))
            .json(&NewDevice::with_serial(serial_number))
            .send()
            .await?
            .error_for_status()?;
        Ok(Registration::Created)
    }
}

/// Writes straight into the store through the ingest path.
pub struct DbSink {
    store: DynStore,
    relay: LocationRelay,
}

impl DbSink {
    pub fn new(store: DynStore) -> Self {
        Self {
            store,
            relay: LocationRelay::new(1),
        }
    }
}

#[async_trait]
impl TelemetrySink for DbSink {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn send(&self, packet: &SensorPacket) -> Result<()> {
        ingest::record_packet(self.store.as_ref(), &self.relay, packet).await?;
        Ok(())
    }

    fn can_register(&self) -> bool {
        true
    }

    async fn register(&self, serial_number: &str) -> Result<Registration> {
        if self.store.find_device_by_serial(serial_number).await?.is_some() {
            return Ok(Registration::Existing);
        }
        self.store
            .create_device(&NewDevice::with_serial(serial_number))
            .await?;
        Ok(Registration::Created)
    }
}

/// Tries each sink in order; the first success wins.
pub struct FallbackSink {
    sinks: Vec<Box<dyn TelemetrySink>>,
}

impl FallbackSink {
    pub fn new(sinks: Vec<Box<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl TelemetrySink for FallbackSink {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn send(&self, packet: &SensorPacket) -> Result<()> {
        let mut last_err = None;
        for sink in &self.sinks {
            match sink.send(packet).await {
                Ok(()) => {
                    debug!(sink = sink.name(), serial = %packet.serial_number, "packet delivered");
                    return Ok(());
                }
                Err(e) => {
                    warn!(sink = sink.name(), error = %e, "delivery failed, trying next sink");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no telemetry sinks configured")))
    }

    fn can_register(&self) -> bool {
        self.sinks.iter().any(|s| s.can_register())
    }

    async fn register(&self, serial_number: &str) -> Result<Registration> {
        let mut last_err = None;
        for sink in self.sinks.iter().filter(|s| s.can_register()) {
            match sink.register(serial_number).await {
                Ok(registration) => return Ok(registration),
                Err(e) => {
                    warn!(sink = sink.name(), serial = serial_number, error = %e, "registration failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no sink can register devices")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{MemoryStore, RecordFilter, Store};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn packet(serial: &str) -> SensorPacket {
        SensorPacket {
            serial_number: serial.to_string(),
            latitude: 13.6218,
            longitude: 123.1948,
            address: None,
            poi: None,
            battery_level: 80,
            is_charging: false,
            reflector_on: false,
            alert: None,
            activity: None,
            recorded_at: None,
        }
    }

    struct CountingSink {
        name: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TelemetrySink for CountingSink {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, _packet: &SensorPacket) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("{} is down", self.name)
            }
            Ok(())
        }
    }

    fn counting(name: &'static str, fail: bool) -> (Box<dyn TelemetrySink>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(CountingSink {
                name,
                fail,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn fallback_stops_at_first_success() {
        let (socket, socket_calls) = counting("socket", true);
        let (api, api_calls) = counting("api", false);
        let (db, db_calls) = counting("db", false);
        let chain = FallbackSink::new(vec![socket, api, db]);

        chain.send(&packet("GL-0001")).await.unwrap();

        assert_eq!(socket_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api_calls.load(Ordering::SeqCst), 1);
        assert_eq!(db_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_reports_last_error_when_all_fail() {
        let (socket, _) = counting("socket", true);
        let (api, _) = counting("api", true);
        let chain = FallbackSink::new(vec![socket, api]);

        let err = chain.send(&packet("GL-0001")).await.unwrap_err();
        assert_eq!(err.to_string(), "api is down");
    }

    #[tokio::test]
    async fn db_sink_registers_then_ingests() {
        let store = Arc::new(MemoryStore::new());
        let sink = DbSink::new(store.clone());

        assert_eq!(sink.register("GL-0001").await.unwrap(), Registration::Created);
        assert_eq!(sink.register("GL-0001").await.unwrap(), Registration::Existing);

        sink.send(&packet("GL-0001")).await.unwrap();
        let rows = store.list_locations(&RecordFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn db_sink_rejects_unknown_serial() {
        let sink = DbSink::new(Arc::new(MemoryStore::new()));
        assert!(sink.send(&packet("GL-404")).await.is_err());
    }

    #[tokio::test]
    async fn api_sink_posts_readings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sensor/readings"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sink = ApiSink::new(server.uri(), Duration::from_secs(2)).unwrap();
        sink.send(&packet("GL-0001")).await.unwrap();
    }

    #[tokio::test]
    async fn api_sink_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sensor/readings"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sink = ApiSink::new(server.uri(), Duration::from_secs(2)).unwrap();
        assert!(sink.send(&packet("GL-404")).await.is_err());
    }

    #[tokio::test]
    async fn api_sink_creates_missing_device() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/devices/serial/GL-0009"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/devices"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sink = ApiSink::new(server.uri(), Duration::from_secs(2)).unwrap();
        assert_eq!(sink.register("GL-0009").await.unwrap(), Registration::Created);
    }

    #[tokio::test]
    async fn socket_sink_fails_fast_without_relay() {
        let sink = SocketSink::new("ws://127.0.0.1:9/ws", Duration::from_millis(200));
        assert!(sink.send(&packet("GL-0001")).await.is_err());
    }
}

//! Event publishing: MQTT for deployments, an in-memory sink for tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, Incoming, MqttOptions};
use rumqttc::Outgoing;
use rumqttc::Transport;

pub const DEFAULT_TOPIC: &str = "features_message";

/// Fire-and-forget sink for serialized events.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// Where the broker lives and whether to speak TLS to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Accepts `host:port`, `[v6]:port`, or either behind `mqtt://`, `tcp://`,
/// `mqtts://` or `ssl://`.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

#[derive(Clone, Debug, Default)]
pub struct MqttCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// First wait after a failed connection poll; doubles up to `RECONNECT_MAX`.
const RECONNECT_INITIAL: Duration = Duration::from_millis(250);
const RECONNECT_MAX: Duration = Duration::from_secs(5);

/// MQTT v5 publisher. The connection is driven on a background thread that
/// keeps reconnecting until `disconnect`; publishes are queued with QoS 1 and
/// never retained. Messages queued while the broker is away go out once it
/// is reachable again.
pub struct MqttPublisher {
    client: Client,
    stopping: Arc<AtomicBool>,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttPublisher {
    pub fn connect(
        endpoint: &MqttEndpoint,
        client_id: &str,
        credentials: &MqttCredentials,
        tls_ca: Option<&Path>,
    ) -> Result<Self> {
        let mut options = MqttOptions::new(client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = credentials.username.as_deref() {
            options.set_credentials(user, credentials.password.clone().unwrap_or_default());
        }
        options.set_transport(build_transport(endpoint, tls_ca)?);

        let (client, connection) = Client::new(options, 10);
        log::info!(
            "connecting to MQTT broker {}:{} as {} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            client_id,
            endpoint.use_tls,
            credentials.username.is_some()
        );
        Ok(Self::with_connection(client, connection))
    }

    fn with_connection(client: Client, mut connection: Connection) -> Self {
        let stopping = Arc::new(AtomicBool::new(false));
        let stop = stopping.clone();
        let handle = std::thread::spawn(move || {
            let mut backoff = RECONNECT_INITIAL;
            // Each poll after an error reconnects; the iterator only ends
            // once every client handle is gone.
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        log::info!("MQTT connected");
                        backoff = RECONNECT_INITIAL;
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) if stop.load(Ordering::SeqCst) => {
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        log::warn!(
                            "MQTT connection error: {}. Reconnecting in {:?}",
                            e,
                            backoff
                        );
                        std::thread::sleep(backoff);
                        backoff = (backoff * 2).min(RECONNECT_MAX);
                    }
                }
            }
        });

        Self {
            client,
            stopping,
            connection_handle: Some(handle),
        }
    }

    /// Stop reconnecting, send DISCONNECT and wait for the connection thread.
    pub fn disconnect(mut self) -> Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        self.client
            .try_disconnect()
            .context("failed to queue MQTT disconnect")?;
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Publisher for MqttPublisher {
    /// Queues without blocking; fails when the outgoing queue is full, which
    /// happens while the broker has been unreachable for a while.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .with_context(|| format!("failed to queue publish on {}", topic))?;
        Ok(())
    }
}

fn build_transport(endpoint: &MqttEndpoint, tls_ca: Option<&Path>) -> Result<Transport> {
    if !endpoint.use_tls {
        if tls_ca.is_some() {
            return Err(anyhow!(
                "MQTT TLS CA provided but TLS is disabled (use an mqtts:// broker address)"
            ));
        }
        return Ok(Transport::tcp());
    }
    match tls_ca {
        None => Ok(Transport::tls_with_default_config()),
        Some(path) => {
            let ca = std::fs::read(path)
                .with_context(|| format!("failed to read MQTT TLS CA {}", path.display()))?;
            Ok(Transport::tls(ca, None, None))
        }
    }
}

/// Keeps every published message, in order.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| anyhow!("memory publisher poisoned"))?
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// Publisher that only logs, for dry runs without a broker.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        log::info!(
            "[dry-run] {} <- {}",
            topic,
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }
}

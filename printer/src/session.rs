//! Broker session to the printer.
//!
//! The session owns the MQTT connection and its receive loop. Every report
//! that arrives on `device/<serial>/report` is parsed into a
//! [`PrinterStatus`], cached, broadcast, and forwarded to named callbacks on
//! their own dispatcher tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use config_types::PrinterConfig;
use protocol::{
    build_request, connect_code_message, report_topic, request_topic, CommandClass, PrinterStatus,
    BROKER_PORT, BROKER_USERNAME,
};

/// Default broker connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `get_status` waits for a fresh report.
pub const STATUS_WAIT: Duration = Duration::from_millis(500);

/// Synchronous callback invoked with every parsed report.
///
/// Each callback runs on its own dispatcher task fed by an unbounded channel,
/// so it can take its time without stalling the receive loop.
pub type StatusCallback = Box<dyn Fn(PrinterStatus) + Send + 'static>;

/// Session-level errors. External faults (broker down, timeout) surface as
/// `Ok(false)` / `None` values instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Printer configuration incomplete: {0}")]
    Configuration(String),

    #[error("Not connected to printer")]
    NotConnected,

    #[error("Publish failed: {0}")]
    Publish(String),
}

struct SessionShared {
    connected: AtomicBool,
    last_error: Mutex<Option<String>>,
    latest: Mutex<Option<PrinterStatus>>,
    reports: broadcast::Sender<PrinterStatus>,
    callbacks: Mutex<HashMap<String, mpsc::UnboundedSender<PrinterStatus>>>,
}

impl SessionShared {
    fn dispatch(&self, status: PrinterStatus) {
        *self.latest.lock().expect("latest lock") = Some(status.clone());

        // Broadcast has no back-pressure; lagging receivers drop old reports
        let _ = self.reports.send(status.clone());

        let mut dead = Vec::new();
        {
            let callbacks = self.callbacks.lock().expect("callbacks lock");
            for (name, tx) in callbacks.iter() {
                if tx.send(status.clone()).is_err() {
                    dead.push(name.clone());
                }
            }
        }
        if !dead.is_empty() {
            let mut callbacks = self.callbacks.lock().expect("callbacks lock");
            for name in dead {
                callbacks.remove(&name);
            }
        }
    }
}

/// Authenticated broker session to one printer.
///
/// A session instance may not be driven by two callers concurrently; the
/// mutable receiver enforces that at compile time.
pub struct PrinterSession {
    host: String,
    access_code: String,
    serial: String,

    client: Option<AsyncClient>,
    sequence: AtomicU64,
    shared: Arc<SessionShared>,
    loop_task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl PrinterSession {
    pub fn new(config: &PrinterConfig) -> Self {
        let (reports, _) = broadcast::channel(64);
        Self {
            host: config.ip_address.clone(),
            access_code: config.access_code.clone(),
            serial: config.serial_number.clone(),
            client: None,
            sequence: AtomicU64::new(0),
            shared: Arc::new(SessionShared {
                connected: AtomicBool::new(false),
                last_error: Mutex::new(None),
                latest: Mutex::new(None),
                reports,
                callbacks: Mutex::new(HashMap::new()),
            }),
            loop_task: None,
            shutdown: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Explanation of the most recent connection failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().expect("error lock").clone()
    }

    /// Connects to the printer broker and subscribes to its report topic.
    ///
    /// Returns `Ok(false)` when the broker cannot be reached or refuses the
    /// credentials within the timeout; the reason is kept in
    /// [`last_error`](Self::last_error).
    pub async fn connect(&mut self, timeout: Duration) -> Result<bool, SessionError> {
        if self.host.is_empty() || self.access_code.is_empty() || self.serial.is_empty() {
            return Err(SessionError::Configuration(
                "printer IP, access code, and serial are required; \
                 set PRINTFORGE_PRINTER_IP, PRINTFORGE_ACCESS_CODE, PRINTFORGE_SERIAL"
                    .to_string(),
            ));
        }
        if self.is_connected() {
            return Ok(true);
        }

        let client_id = format!("printforge-{}", std::process::id());
        let mut options = MqttOptions::new(client_id, self.host.clone(), BROKER_PORT);
        options.set_credentials(BROKER_USERNAME, self.access_code.clone());
        options.set_keep_alive(Duration::from_secs(30));
        // The printer only presents a self-signed device certificate
        options.set_transport(Transport::Tls(TlsConfiguration::Rustls(Arc::new(
            insecure_tls_config(),
        ))));

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let (ready_tx, mut ready_rx) = watch::channel(false);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let shared = Arc::clone(&self.shared);
        let topic = report_topic(&self.serial);
        let loop_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            if ack.code == ConnectReturnCode::Success {
                                info!("printer broker connected");
                                shared.connected.store(true, Ordering::SeqCst);
                                let _ = ready_tx.send(true);
                            } else {
                                let message = connect_code_message(return_code_number(ack.code));
                                warn!("printer broker refused connection: {message}");
                                *shared.last_error.lock().expect("error lock") = Some(message);
                                shared.connected.store(false, Ordering::SeqCst);
                                break;
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if publish.topic == topic {
                                match serde_json::from_slice::<Value>(&publish.payload) {
                                    Ok(report) => {
                                        shared.dispatch(PrinterStatus::from_report(&report));
                                    }
                                    Err(e) => debug!("discarding unparsable report: {e}"),
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            shared.connected.store(false, Ordering::SeqCst);
                            *shared.last_error.lock().expect("error lock") =
                                Some(e.to_string());
                            debug!("broker poll error: {e}");
                            // Let rumqttc's reconnect logic breathe
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
            shared.connected.store(false, Ordering::SeqCst);
        });

        self.loop_task = Some(loop_task);
        self.shutdown = Some(shutdown_tx);
        self.client = Some(client.clone());

        let connected = tokio::time::timeout(timeout, async {
            loop {
                if *ready_rx.borrow() {
                    return true;
                }
                if ready_rx.changed().await.is_err() {
                    return false;
                }
            }
        })
        .await
        .unwrap_or(false);

        if connected {
            if let Err(e) = client.subscribe(report_topic(&self.serial), QoS::AtMostOnce).await {
                warn!("report subscription failed: {e}");
            }
        } else {
            self.teardown().await;
        }

        Ok(connected)
    }

    /// Disconnects from the broker. Safe at any time; pending status waiters
    /// observe `None`.
    pub async fn disconnect(&mut self) {
        if let Some(client) = &self.client {
            let _ = client.disconnect().await;
        }
        self.teardown().await;
        info!("printer broker disconnected");
    }

    async fn teardown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.loop_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.client = None;
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    /// Publishes a command of the given class.
    ///
    /// Payload shape: `{<class>: {sequence_id, command, <fields>...}}`,
    /// QoS at-least-once. Sequence ids are monotone per session.
    pub async fn send_command(
        &self,
        class: CommandClass,
        command: &str,
        fields: Map<String, Value>,
    ) -> Result<(), SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotConnected)?;
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }

        let sequence_id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = build_request(class, sequence_id, command, fields);
        debug!(command, sequence_id, "publishing printer command");

        client
            .publish(
                request_topic(&self.serial),
                QoS::AtLeastOnce,
                false,
                serde_json::to_vec(&payload).expect("request payload serializes"),
            )
            .await
            .map_err(|e| SessionError::Publish(e.to_string()))
    }

    /// Requests a full report and waits briefly for it.
    ///
    /// Returns the latest cached status, refreshed if a report arrived within
    /// the wait window; `None` when disconnected or nothing has been seen.
    pub async fn get_status(&self) -> Option<PrinterStatus> {
        if !self.is_connected() {
            return None;
        }

        let mut fresh = self.shared.reports.subscribe();
        if self
            .send_command(CommandClass::Pushing, "pushall", Map::new())
            .await
            .is_err()
        {
            return self.cached_status();
        }

        let _ = tokio::time::timeout(STATUS_WAIT, fresh.recv()).await;
        self.cached_status()
    }

    /// The most recent parsed status without touching the network.
    pub fn cached_status(&self) -> Option<PrinterStatus> {
        self.shared.latest.lock().expect("latest lock").clone()
    }

    /// Subscribes to the status broadcast.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<PrinterStatus> {
        self.shared.reports.subscribe()
    }

    /// Registers a named callback receiving every parsed report.
    ///
    /// The callback runs on its own task; re-registering a name replaces the
    /// previous callback.
    pub fn register_callback(&self, name: impl Into<String>, callback: StatusCallback) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PrinterStatus>();
        tokio::spawn(async move {
            while let Some(status) = rx.recv().await {
                callback(status);
            }
        });

        self.shared
            .callbacks
            .lock()
            .expect("callbacks lock")
            .insert(name.into(), tx);
    }

    /// Unregisters a named callback; its dispatcher task winds down.
    pub fn unregister_callback(&self, name: &str) {
        self.shared
            .callbacks
            .lock()
            .expect("callbacks lock")
            .remove(name);
    }
}

impl Drop for PrinterSession {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
    }
}

/// TLS client configuration that accepts any server certificate.
///
/// The printers of this family only present self-signed device certificates
/// in LAN mode; there is nothing to verify against.
fn insecure_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth()
}

#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Numeric form of a v4 connect return code, for the shared message table.
fn return_code_number(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> PrinterConfig {
        PrinterConfig {
            ip_address: "192.0.2.1".to_string(),
            access_code: "12345678".to_string(),
            serial_number: "01S00C123".to_string(),
            model: "generic".to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_requires_configuration() {
        let mut session = PrinterSession::new(&PrinterConfig::default());
        let result = session.connect(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_send_command_requires_connection() {
        let session = PrinterSession::new(&test_config());
        let result = session
            .send_command(CommandClass::Pushing, "pushall", Map::new())
            .await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_get_status_disconnected_is_none() {
        let session = PrinterSession::new(&test_config());
        assert!(session.get_status().await.is_none());
        assert!(session.cached_status().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_reaches_broadcast_and_callbacks() {
        let session = PrinterSession::new(&test_config());
        let mut reports = session.subscribe_reports();

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        session.register_callback(
            "test",
            Box::new(move |status| {
                let _ = seen_tx.send(status.progress.percentage);
            }),
        );

        let status = PrinterStatus::from_report(&json!({
            "print": {"gcode_state": "RUNNING", "mc_percent": 37}
        }));
        session.shared.dispatch(status);

        let broadcast_status = reports.recv().await.unwrap();
        assert_eq!(broadcast_status.progress.percentage, 37.0);
        assert_eq!(seen_rx.recv().await, Some(37.0));

        session.unregister_callback("test");
        assert!(session
            .shared
            .callbacks
            .lock()
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_broker_times_out_as_false() {
        // TEST-NET address: nothing is listening
        let mut session = PrinterSession::new(&test_config());
        let connected = session.connect(Duration::from_millis(200)).await.unwrap();
        assert!(!connected);
        assert!(!session.is_connected());
        // Disconnect after a failed connect is safe
        session.disconnect().await;
    }
}

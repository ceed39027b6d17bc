/// Modbus TCP server
///
/// Accepts client connections, frames requests with the MBAP header and
/// hands decoded requests to the [`ProtocolHandler`]. Each connection is
/// served by its own task; requests on one connection are answered in order.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use log::{debug, error, info, warn};

use crate::error::{ModbusError, ModbusResult};
use crate::handler::ProtocolHandler;
use crate::logging::{LoggingMode, PacketLogger};
use crate::protocol::{ModbusException, ModbusRequest, ModbusResponse, UnitId};
use crate::register_bank::{RegisterBank, RegisterBankStats};
use crate::{DEFAULT_TCP_PORT, MAX_TCP_FRAME_SIZE, MBAP_HEADER_SIZE};

/// Time client tasks get to finish after shutdown before they are aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Modbus server trait
#[async_trait]
pub trait ModbusServer: Send + Sync {
    /// Start the server
    async fn start(&mut self) -> ModbusResult<()>;

    /// Stop the server and wait for its connections to close
    async fn stop(&mut self) -> ModbusResult<()>;

    /// Check if server is running
    fn is_running(&self) -> bool;

    /// Get server statistics
    fn get_stats(&self) -> ServerStats;

    /// Get register bank reference
    fn get_register_bank(&self) -> Option<Arc<RegisterBank>>;
}

/// Server statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub connections_count: u64,
    pub rejected_connections: u64,
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Requests answered with an exception or dropped as malformed
    pub failed_requests: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub uptime_seconds: u64,
    pub register_bank_stats: Option<RegisterBankStats>,
}

/// MBAP header of a Modbus TCP frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Byte count of the unit id plus the PDU
    pub length: u16,
    pub unit_id: UnitId,
}

impl MbapHeader {
    /// Parse and check a received header
    pub fn parse(bytes: &[u8; MBAP_HEADER_SIZE]) -> ModbusResult<Self> {
        let header = Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        };

        if header.protocol_id != 0 {
            return Err(ModbusError::frame(format!("Invalid protocol ID {}", header.protocol_id)));
        }
        if header.length < 2 || header.length as usize > MAX_TCP_FRAME_SIZE - 6 {
            return Err(ModbusError::frame(format!("Invalid MBAP length {}", header.length)));
        }
        Ok(header)
    }

    /// Number of PDU bytes following the header
    pub fn pdu_len(&self) -> usize {
        self.length as usize - 1
    }

    /// Build a complete frame around `pdu`
    pub fn encode_frame(transaction_id: u16, unit_id: UnitId, pdu: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(MBAP_HEADER_SIZE + pdu.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&0u16.to_be_bytes());
        frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(pdu);
        frame
    }
}

/// Decode a request PDU and produce the reply
///
/// Unsupported functions and bad quantities are answered with an exception.
/// Only an undecodable frame is an error; the connection is then closed.
pub fn serve_pdu(
    handler: &ProtocolHandler,
    unit_id: UnitId,
    pdu: &[u8],
) -> ModbusResult<(Option<ModbusRequest>, ModbusResponse)> {
    match ModbusRequest::decode_pdu(unit_id, pdu) {
        Ok(request) => {
            let response = handler.handle(&request);
            Ok((Some(request), response))
        }
        Err(e @ ModbusError::Frame { .. }) => Err(e),
        Err(e) => {
            let function_code = pdu.first().copied().unwrap_or_default();
            debug!("Request 0x{:02X} rejected: {}", function_code, e);
            let response = ModbusResponse::new_exception(unit_id, function_code, ModbusException::from_error(&e));
            Ok((None, response))
        }
    }
}

/// Modbus TCP server configuration
#[derive(Debug, Clone)]
pub struct ModbusTcpServerConfig {
    pub bind_address: SocketAddr,
    pub max_connections: usize,
    /// Close connections that send nothing for this long; `None` waits forever
    pub idle_timeout: Option<Duration>,
    pub packet_logging: LoggingMode,
}

impl Default for ModbusTcpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_TCP_PORT)),
            max_connections: 100,
            idle_timeout: None,
            packet_logging: LoggingMode::Off,
        }
    }
}

/// Modbus TCP server implementation
pub struct ModbusTcpServer {
    config: ModbusTcpServerConfig,
    handler: ProtocolHandler,
    stats: Arc<Mutex<ServerStats>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    is_running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    start_time: Option<Instant>,
    accept_task: Option<JoinHandle<()>>,
}

fn update_stats<F: FnOnce(&mut ServerStats)>(stats: &Mutex<ServerStats>, update: F) {
    if let Ok(mut stats) = stats.lock() {
        update(&mut stats);
    }
}

impl ModbusTcpServer {
    /// Create a new TCP server with default configuration
    pub fn new(bind_address: &str, register_bank: Arc<RegisterBank>) -> ModbusResult<Self> {
        let addr = bind_address
            .parse()
            .map_err(|e| ModbusError::configuration(format!("Invalid bind address: {}", e)))?;

        let config = ModbusTcpServerConfig {
            bind_address: addr,
            ..Default::default()
        };

        Ok(Self::with_config(config, register_bank))
    }

    /// Create a new TCP server with custom configuration
    pub fn with_config(config: ModbusTcpServerConfig, register_bank: Arc<RegisterBank>) -> Self {
        Self {
            config,
            handler: ProtocolHandler::new(register_bank),
            stats: Arc::new(Mutex::new(ServerStats::default())),
            shutdown_tx: None,
            is_running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            start_time: None,
            accept_task: None,
        }
    }

    /// Address actually bound, available once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn accept_loop(
        listener: TcpListener,
        handler: ProtocolHandler,
        stats: Arc<Mutex<ServerStats>>,
        config: ModbusTcpServerConfig,
        shutdown_tx: broadcast::Sender<()>,
        mut shutdown_rx: broadcast::Receiver<()>,
        is_running: Arc<AtomicBool>,
    ) {
        let active = Arc::new(AtomicUsize::new(0));
        let logger = PacketLogger::new(config.packet_logging);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            if active.load(Ordering::SeqCst) >= config.max_connections {
                                warn!("Rejecting {}: {} connections already open", peer, config.max_connections);
                                update_stats(&stats, |s| s.rejected_connections += 1);
                                continue;
                            }

                            active.fetch_add(1, Ordering::SeqCst);
                            update_stats(&stats, |s| s.connections_count += 1);

                            let handler = handler.clone();
                            let stats = stats.clone();
                            let active = active.clone();
                            let shutdown_rx = shutdown_tx.subscribe();
                            let idle_timeout = config.idle_timeout;
                            connections.spawn(async move {
                                Self::handle_client(stream, peer, handler, stats, logger, idle_timeout, shutdown_rx).await;
                                active.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        let drained = timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Aborting {} client task(s) still open after shutdown", connections.len());
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }
        is_running.store(false, Ordering::SeqCst);
    }

    /// Read one complete frame, `None` when the client closed the connection
    async fn read_frame(stream: &mut TcpStream) -> ModbusResult<Option<(MbapHeader, Vec<u8>)>> {
        let mut header_bytes = [0u8; MBAP_HEADER_SIZE];
        match stream.read_exact(&mut header_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let header = MbapHeader::parse(&header_bytes)?;

        let mut frame = Vec::with_capacity(MBAP_HEADER_SIZE + header.pdu_len());
        frame.extend_from_slice(&header_bytes);
        frame.resize(MBAP_HEADER_SIZE + header.pdu_len(), 0);
        stream.read_exact(&mut frame[MBAP_HEADER_SIZE..]).await?;
        Ok(Some((header, frame)))
    }

    async fn next_frame(
        stream: &mut TcpStream,
        idle_timeout: Option<Duration>,
    ) -> ModbusResult<Option<(MbapHeader, Vec<u8>)>> {
        match idle_timeout {
            Some(limit) => timeout(limit, Self::read_frame(stream))
                .await
                .map_err(|_| ModbusError::connection(format!("No request within {:?}", limit)))?,
            None => Self::read_frame(stream).await,
        }
    }

    /// Handle client connection
    async fn handle_client(
        mut stream: TcpStream,
        peer: SocketAddr,
        handler: ProtocolHandler,
        stats: Arc<Mutex<ServerStats>>,
        logger: PacketLogger,
        idle_timeout: Option<Duration>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("📡 New client connected: {}", peer);

        loop {
            let frame = tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Shutdown signal received for client {}", peer);
                    break;
                }
                frame = Self::next_frame(&mut stream, idle_timeout) => frame,
            };

            let (header, frame) = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    if e.is_transport_error() {
                        debug!("Connection {} closed: {}", peer, e);
                    } else {
                        warn!("Malformed frame from {}: {}", peer, e);
                        update_stats(&stats, |s| s.failed_requests += 1);
                    }
                    break;
                }
            };
            update_stats(&stats, |s| {
                s.total_requests += 1;
                s.bytes_received += frame.len() as u64;
            });

            let (request, response) = match serve_pdu(&handler, header.unit_id, &frame[MBAP_HEADER_SIZE..]) {
                Ok(served) => served,
                Err(e) => {
                    warn!("Malformed request from {}: {}", peer, e);
                    update_stats(&stats, |s| s.failed_requests += 1);
                    break;
                }
            };
            if let Some(request) = &request {
                logger.log_request(peer, &frame, request);
            }

            let reply = MbapHeader::encode_frame(header.transaction_id, header.unit_id, &response.encode_pdu());
            logger.log_response(peer, &reply, &response);

            if let Err(e) = stream.write_all(&reply).await {
                error!("Failed to send response to {}: {}", peer, e);
                break;
            }

            let failed = response.is_exception();
            update_stats(&stats, |s| {
                s.bytes_sent += reply.len() as u64;
                if failed {
                    s.failed_requests += 1;
                } else {
                    s.successful_requests += 1;
                }
            });
        }

        info!("🔌 Client {} disconnected", peer);
    }
}

#[async_trait]
impl ModbusServer for ModbusTcpServer {
    async fn start(&mut self) -> ModbusResult<()> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(ModbusError::connection("Server is already running"));
        }

        info!("🚀 Starting Modbus TCP server on {}", self.config.bind_address);

        let listener = TcpListener::bind(self.config.bind_address).await.map_err(|e| {
            ModbusError::connection(format!("Failed to bind to {}: {}", self.config.bind_address, e))
        })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());
        self.local_addr = Some(local_addr);
        self.start_time = Some(Instant::now());
        self.is_running.store(true, Ordering::SeqCst);

        info!("✅ Modbus TCP server listening on {}", local_addr);
        info!("   - Max connections: {}", self.config.max_connections);
        info!("   - Idle timeout: {:?}", self.config.idle_timeout);
        info!("   - Packet logging: {}", self.config.packet_logging);

        self.accept_task = Some(tokio::spawn(Self::accept_loop(
            listener,
            self.handler.clone(),
            self.stats.clone(),
            self.config.clone(),
            shutdown_tx,
            shutdown_rx,
            self.is_running.clone(),
        )));

        Ok(())
    }

    async fn stop(&mut self) -> ModbusResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.accept_task.take() {
            task.await
                .map_err(|e| ModbusError::internal(format!("Server task failed: {}", e)))?;
        }
        self.is_running.store(false, Ordering::SeqCst);

        info!("⏹️  Modbus TCP server stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    fn get_stats(&self) -> ServerStats {
        let mut stats = self
            .stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default();

        if let Some(start_time) = self.start_time {
            stats.uptime_seconds = start_time.elapsed().as_secs();
        }

        stats.register_bank_stats = Some(self.handler.register_bank().get_stats());
        stats
    }

    fn get_register_bank(&self) -> Option<Arc<RegisterBank>> {
        Some(self.handler.register_bank().clone())
    }
}

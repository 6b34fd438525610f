//! Networking service.
//!
//! Owns the libp2p swarm and drives three behaviours: the fragment exchange
//! request/response protocol, a Kademlia DHT (server mode) carrying index
//! records and provider announcements, and ping for connection liveness.
//! The service runs a single event loop gated by a shutdown command;
//! callers interact through a cloneable handle whose operations complete via
//! oneshot responses. Inbound fragment requests are answered directly from
//! the shared fragment store.

use crate::exchange::{FragmentCodec, FragmentRequest, FragmentResponse, EXCHANGE_PROTOCOL};
use crate::store::FragmentStore;
use anyhow::{anyhow, Result};
use libp2p::{
    core::upgrade,
    futures::StreamExt,
    identity, kad,
    kad::store::MemoryStore,
    noise, ping,
    request_response::{self, OutboundRequestId, ProtocolSupport},
    swarm::{NetworkBehaviour, Swarm, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, StreamProtocol, Transport,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Protocol id for the Kademlia DHT.
pub const KAD_PROTOCOL: &str = "/fragnet/kad/1.0.0";

/// Configuration for ping/heartbeat behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingConfig {
    /// Interval between ping attempts (seconds)
    #[serde(default = "default_ping_interval")]
    pub interval_secs: u64,
    /// Ping timeout (seconds)
    #[serde(default = "default_ping_timeout")]
    pub timeout_secs: u64,
}

fn default_ping_interval() -> u64 {
    15
}

fn default_ping_timeout() -> u64 {
    20
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_ping_interval(),
            timeout_secs: default_ping_timeout(),
        }
    }
}

/// Bootstrap peer address in format: peer_id@multiaddr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPeer {
    pub peer_id: PeerId,
    pub multiaddr: Multiaddr,
}

impl BootstrapPeer {
    /// Parse a bootstrap peer from the format: peer_id@multiaddr
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('@').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid bootstrap peer format '{}'. Expected: peer_id@multiaddr",
                s
            ));
        }

        let peer_id = parts[0]
            .parse::<PeerId>()
            .map_err(|e| anyhow!("Invalid peer ID '{}': {}", parts[0], e))?;

        let multiaddr = parts[1]
            .parse::<Multiaddr>()
            .map_err(|e| anyhow!("Invalid multiaddr '{}': {}", parts[1], e))?;

        Ok(Self { peer_id, multiaddr })
    }
}

impl fmt::Display for BootstrapPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.peer_id, self.multiaddr)
    }
}

/// Configuration for the networking service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// The multiaddr to listen on (e.g., "/ip4/0.0.0.0/tcp/4001")
    pub listen_address: String,
    /// Bootstrap peers to connect to on startup (format: peer_id@multiaddr)
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Timeout for a single fragment exchange (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Ping/heartbeat configuration
    #[serde(default)]
    pub ping: PingConfig,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "/ip4/0.0.0.0/tcp/4001".to_string(),
            bootstrap_peers: Vec::new(),
            request_timeout_secs: default_request_timeout(),
            ping: PingConfig::default(),
        }
    }
}

/// Events emitted by the NetworkService
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// The service is listening on a new address
    NewListenAddr { address: Multiaddr },
    /// A peer connection was established
    ConnectionEstablished { peer_id: PeerId },
    /// A peer connection was closed
    ConnectionClosed { peer_id: PeerId },
    /// A ping succeeded with the given RTT
    PingSuccess { peer_id: PeerId, rtt: Duration },
    /// A ping failed to a peer
    PingFailure { peer_id: PeerId },
    /// An inbound fragment request was answered
    FragmentServed {
        peer_id: PeerId,
        hash: String,
        found: bool,
    },
    /// An error occurred in the network layer
    Error { message: String },
}

/// Commands that can be sent to the NetworkService
#[derive(Debug)]
pub enum NetworkCommand {
    /// Dial a peer at the given address
    Dial {
        address: Multiaddr,
        response: oneshot::Sender<Result<()>>,
    },
    /// Get the list of connected peers
    ListPeers {
        response: oneshot::Sender<Vec<PeerId>>,
    },
    /// Publish a record to the DHT
    PutRecord {
        key: Vec<u8>,
        value: Vec<u8>,
        response: oneshot::Sender<Result<()>>,
    },
    /// Look up a record in the DHT; `None` means the key was never published
    GetRecord {
        key: Vec<u8>,
        response: oneshot::Sender<Result<Option<Vec<u8>>>>,
    },
    /// Announce this node as a provider for a key
    StartProviding {
        key: Vec<u8>,
        response: oneshot::Sender<Result<()>>,
    },
    /// Look up providers for a key
    GetProviders {
        key: Vec<u8>,
        response: oneshot::Sender<Result<Vec<PeerId>>>,
    },
    /// Request a fragment from a specific peer
    RequestFragment {
        peer_id: PeerId,
        hash: String,
        response: oneshot::Sender<Result<FragmentResponse>>,
    },
    /// Shutdown the service
    Shutdown,
}

/// Combined behaviour: fragment exchange, DHT, ping
#[derive(NetworkBehaviour)]
pub struct FragnetBehaviour {
    exchange: request_response::Behaviour<FragmentCodec>,
    kad: kad::Behaviour<MemoryStore>,
    ping: ping::Behaviour,
}

impl FragnetBehaviour {
    fn new(local_peer_id: PeerId, config: &NetworkConfig) -> Self {
        let exchange = request_response::Behaviour::with_codec(
            FragmentCodec::default(),
            std::iter::once((StreamProtocol::new(EXCHANGE_PROTOCOL), ProtocolSupport::Full)),
            request_response::Config::default()
                .with_request_timeout(Duration::from_secs(config.request_timeout_secs)),
        );

        let mut kad = kad::Behaviour::with_config(
            local_peer_id,
            MemoryStore::new(local_peer_id),
            kad::Config::new(StreamProtocol::new(KAD_PROTOCOL)),
        );
        // Server mode: hold records and answer queries even before the
        // routing table fills, matching the always-serving role of a node.
        kad.set_mode(Some(kad::Mode::Server));

        let ping_config = ping::Config::new()
            .with_interval(Duration::from_secs(config.ping.interval_secs))
            .with_timeout(Duration::from_secs(config.ping.timeout_secs));

        Self {
            exchange,
            kad,
            ping: ping::Behaviour::new(ping_config),
        }
    }
}

/// Accumulates provider peers across partial query results
struct ProviderQuery {
    providers: HashSet<PeerId>,
    response: oneshot::Sender<Result<Vec<PeerId>>>,
}

/// The main networking service
pub struct NetworkService {
    /// The libp2p swarm
    swarm: Swarm<FragnetBehaviour>,
    /// Service configuration
    config: NetworkConfig,
    /// Store answering inbound fragment requests
    fragment_store: Arc<FragmentStore>,
    /// Channel for receiving commands
    command_rx: mpsc::UnboundedReceiver<NetworkCommand>,
    /// Channel for sending events
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    /// Set of connected peers
    connected_peers: HashSet<PeerId>,
    /// Local peer ID
    local_peer_id: PeerId,
    /// In-flight DHT record publications
    pending_put_records: HashMap<kad::QueryId, oneshot::Sender<Result<()>>>,
    /// In-flight DHT record lookups
    pending_get_records: HashMap<kad::QueryId, oneshot::Sender<Result<Option<Vec<u8>>>>>,
    /// In-flight provider announcements
    pending_provides: HashMap<kad::QueryId, oneshot::Sender<Result<()>>>,
    /// In-flight provider lookups
    pending_provider_queries: HashMap<kad::QueryId, ProviderQuery>,
    /// In-flight outbound fragment requests
    pending_fragment_requests:
        HashMap<OutboundRequestId, oneshot::Sender<Result<FragmentResponse>>>,
}

impl NetworkService {
    /// Create a new NetworkService serving fragments from `fragment_store`
    pub fn new(
        config: NetworkConfig,
        fragment_store: Arc<FragmentStore>,
    ) -> Result<(Self, NetworkServiceHandle, NetworkEvents)> {
        // Generate identity keypair
        let local_key = identity::Keypair::generate_ed25519();
        let local_peer_id = PeerId::from(local_key.public());

        info!("Local peer ID: {}", local_peer_id);

        // Build transport with TCP + Noise + Yamux
        let transport = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true))
            .upgrade(upgrade::Version::V1)
            .authenticate(noise::Config::new(&local_key)?)
            .multiplex(yamux::Config::default())
            .boxed();

        let behaviour = FragnetBehaviour::new(local_peer_id, &config);
        let swarm_config = libp2p::swarm::Config::with_tokio_executor()
            .with_idle_connection_timeout(Duration::from_secs(60));
        let swarm = Swarm::new(transport, behaviour, local_peer_id, swarm_config);

        // Create channels for communication
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let service = NetworkService {
            swarm,
            config,
            fragment_store,
            command_rx,
            event_tx,
            connected_peers: HashSet::new(),
            local_peer_id,
            pending_put_records: HashMap::new(),
            pending_get_records: HashMap::new(),
            pending_provides: HashMap::new(),
            pending_provider_queries: HashMap::new(),
            pending_fragment_requests: HashMap::new(),
        };

        let handle = NetworkServiceHandle {
            command_tx,
            local_peer_id,
        };

        Ok((service, handle, NetworkEvents { event_rx }))
    }

    /// Start listening and dial the configured bootstrap peers
    pub async fn start(&mut self) -> Result<()> {
        let listen_addr: Multiaddr = self.config.listen_address.parse().map_err(|e| {
            anyhow!(
                "Invalid listen address '{}': {}",
                self.config.listen_address,
                e
            )
        })?;

        self.swarm.listen_on(listen_addr.clone())?;
        info!("NetworkService listening on: {}", listen_addr);

        let bootstrap_peers = self.config.bootstrap_peers.clone();
        if !bootstrap_peers.is_empty() {
            info!("Connecting to {} bootstrap peers", bootstrap_peers.len());

            for peer_str in &bootstrap_peers {
                match BootstrapPeer::parse(peer_str) {
                    Ok(bootstrap_peer) => {
                        info!(
                            "Dialing bootstrap peer: {} at {}",
                            bootstrap_peer.peer_id, bootstrap_peer.multiaddr
                        );

                        self.swarm
                            .behaviour_mut()
                            .kad
                            .add_address(&bootstrap_peer.peer_id, bootstrap_peer.multiaddr.clone());

                        if let Err(e) = self.swarm.dial(bootstrap_peer.multiaddr.clone()) {
                            warn!(
                                "Failed to dial bootstrap peer {} at {}: {}",
                                bootstrap_peer.peer_id, bootstrap_peer.multiaddr, e
                            );
                        }
                    }
                    Err(e) => {
                        warn!("Invalid bootstrap peer '{}': {}", peer_str, e);
                        // Continue with other bootstrap peers
                    }
                }
            }

            match self.swarm.behaviour_mut().kad.bootstrap() {
                Ok(query_id) => debug!("DHT bootstrap started: {:?}", query_id),
                Err(e) => warn!("DHT bootstrap not started: {}", e),
            }
        }

        Ok(())
    }

    /// Run the main event loop until shutdown is requested
    pub async fn run(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                // Handle swarm events
                event = self.swarm.next() => {
                    if let Some(event) = event {
                        self.handle_swarm_event(event).await;
                    }
                }
                // Handle commands
                command = self.command_rx.recv() => {
                    match command {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                break; // Shutdown requested
                            }
                        }
                        None => {
                            warn!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        info!("NetworkService shutting down");
        Ok(())
    }

    /// Get the local peer ID
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Handle swarm events
    async fn handle_swarm_event(&mut self, event: SwarmEvent<FragnetBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on: {}", address);
                let _ = self.event_tx.send(NetworkEvent::NewListenAddr { address });
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                info!("Connection established with peer: {}", peer_id);
                self.connected_peers.insert(peer_id);
                // Feed the DHT routing table so record and provider queries
                // can reach peers we only know through a direct dial.
                self.swarm
                    .behaviour_mut()
                    .kad
                    .add_address(&peer_id, endpoint.get_remote_address().clone());
                let _ = self
                    .event_tx
                    .send(NetworkEvent::ConnectionEstablished { peer_id });
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                info!("Connection closed with peer: {}", peer_id);
                self.connected_peers.remove(&peer_id);
                let _ = self
                    .event_tx
                    .send(NetworkEvent::ConnectionClosed { peer_id });
            }
            SwarmEvent::Behaviour(FragnetBehaviourEvent::Exchange(event)) => {
                self.handle_exchange_event(event).await;
            }
            SwarmEvent::Behaviour(FragnetBehaviourEvent::Kad(event)) => {
                self.handle_kad_event(event);
            }
            SwarmEvent::Behaviour(FragnetBehaviourEvent::Ping(event)) => match event {
                ping::Event {
                    peer,
                    result: Ok(rtt),
                    ..
                } => {
                    debug!("Ping success to {}: {:?}", peer, rtt);
                    let _ = self
                        .event_tx
                        .send(NetworkEvent::PingSuccess { peer_id: peer, rtt });
                }
                ping::Event {
                    peer,
                    result: Err(err),
                    ..
                } => {
                    warn!("Ping failure to {}: {:?}", peer, err);
                    let _ = self
                        .event_tx
                        .send(NetworkEvent::PingFailure { peer_id: peer });
                }
            },
            SwarmEvent::IncomingConnection { .. } => {
                debug!("Incoming connection");
            }
            SwarmEvent::IncomingConnectionError { error, .. } => {
                warn!("Incoming connection error: {}", error);
                let _ = self.event_tx.send(NetworkEvent::Error {
                    message: format!("Incoming connection error: {}", error),
                });
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!("Outgoing connection error to {:?}: {}", peer_id, error);
                let _ = self.event_tx.send(NetworkEvent::Error {
                    message: format!("Outgoing connection error: {}", error),
                });
            }
            SwarmEvent::ListenerClosed { .. } => {
                warn!("Listener closed");
            }
            SwarmEvent::ListenerError { error, .. } => {
                error!("Listener error: {}", error);
                let _ = self.event_tx.send(NetworkEvent::Error {
                    message: format!("Listener error: {}", error),
                });
            }
            _ => {
                debug!("Unhandled swarm event: {:?}", event);
            }
        }
    }

    /// Handle fragment exchange events
    async fn handle_exchange_event(
        &mut self,
        event: request_response::Event<FragmentRequest, FragmentResponse>,
    ) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    let hash = request.hash;
                    let fragment = self.fragment_store.get(&hash).await;
                    let found = fragment.is_some();
                    debug!(
                        "Fragment request from {} for {}: found={}",
                        peer, hash, found
                    );

                    let response = match fragment {
                        Some(fragment) => FragmentResponse::found(hash.clone(), fragment.data),
                        None => FragmentResponse::not_found(hash.clone()),
                    };

                    if self
                        .swarm
                        .behaviour_mut()
                        .exchange
                        .send_response(channel, response)
                        .is_err()
                    {
                        warn!("Stream closed before fragment {} could be sent", hash);
                    }

                    let _ = self.event_tx.send(NetworkEvent::FragmentServed {
                        peer_id: peer,
                        hash,
                        found,
                    });
                }
                request_response::Message::Response {
                    request_id,
                    response,
                    ..
                } => {
                    if let Some(sender) = self.pending_fragment_requests.remove(&request_id) {
                        let _ = sender.send(Ok(response));
                    }
                }
            },
            request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                if let Some(sender) = self.pending_fragment_requests.remove(&request_id) {
                    let _ =
                        sender.send(Err(anyhow!("fragment request to {} failed: {}", peer, error)));
                }
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                // Malformed or abandoned inbound requests are dropped; one
                // bad request must not affect other handlers.
                debug!("Inbound exchange failure from {}: {}", peer, error);
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }

    /// Handle Kademlia events, completing any pending query the result belongs to
    fn handle_kad_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::OutboundQueryProgressed { id, result, .. } => match result {
                kad::QueryResult::PutRecord(Ok(_)) => {
                    if let Some(sender) = self.pending_put_records.remove(&id) {
                        let _ = sender.send(Ok(()));
                    }
                }
                kad::QueryResult::PutRecord(Err(e)) => {
                    if let Some(sender) = self.pending_put_records.remove(&id) {
                        let _ = sender.send(Err(anyhow!("record publication failed: {}", e)));
                    }
                }
                kad::QueryResult::GetRecord(Ok(kad::GetRecordOk::FoundRecord(peer_record))) => {
                    if let Some(sender) = self.pending_get_records.remove(&id) {
                        let _ = sender.send(Ok(Some(peer_record.record.value)));
                    }
                    // One record is enough; stop the remainder of the walk.
                    if let Some(mut query) = self.swarm.behaviour_mut().kad.query_mut(&id) {
                        query.finish();
                    }
                }
                kad::QueryResult::GetRecord(Ok(
                    kad::GetRecordOk::FinishedWithNoAdditionalRecord { .. },
                )) => {
                    if let Some(sender) = self.pending_get_records.remove(&id) {
                        let _ = sender.send(Ok(None));
                    }
                }
                kad::QueryResult::GetRecord(Err(kad::GetRecordError::NotFound { .. })) => {
                    if let Some(sender) = self.pending_get_records.remove(&id) {
                        let _ = sender.send(Ok(None));
                    }
                }
                kad::QueryResult::GetRecord(Err(e)) => {
                    if let Some(sender) = self.pending_get_records.remove(&id) {
                        let _ = sender.send(Err(anyhow!("record lookup failed: {}", e)));
                    }
                }
                kad::QueryResult::StartProviding(Ok(_)) => {
                    if let Some(sender) = self.pending_provides.remove(&id) {
                        let _ = sender.send(Ok(()));
                    }
                }
                kad::QueryResult::StartProviding(Err(e)) => {
                    if let Some(sender) = self.pending_provides.remove(&id) {
                        let _ = sender.send(Err(anyhow!("provider announcement failed: {}", e)));
                    }
                }
                kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders {
                    providers,
                    ..
                })) => {
                    if let Some(pending) = self.pending_provider_queries.get_mut(&id) {
                        pending.providers.extend(providers);
                    }
                }
                kad::QueryResult::GetProviders(Ok(
                    kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. },
                )) => {
                    if let Some(pending) = self.pending_provider_queries.remove(&id) {
                        let providers: Vec<PeerId> = pending.providers.into_iter().collect();
                        debug!("Provider lookup finished with {} providers", providers.len());
                        let _ = pending.response.send(Ok(providers));
                    }
                }
                kad::QueryResult::GetProviders(Err(kad::GetProvidersError::Timeout { .. })) => {
                    // Report whatever was accumulated; an empty set is a
                    // miss, not a transport failure.
                    if let Some(pending) = self.pending_provider_queries.remove(&id) {
                        let providers: Vec<PeerId> = pending.providers.into_iter().collect();
                        let _ = pending.response.send(Ok(providers));
                    }
                }
                kad::QueryResult::Bootstrap(Ok(_)) => {
                    debug!("DHT bootstrap step completed");
                }
                kad::QueryResult::Bootstrap(Err(e)) => {
                    debug!("DHT bootstrap failed: {}", e);
                }
                _ => {}
            },
            kad::Event::RoutingUpdated { peer, .. } => {
                debug!("DHT routing table updated with peer: {}", peer);
            }
            _ => {
                debug!("Unhandled Kademlia event: {:?}", event);
            }
        }
    }

    /// Handle commands, returns false if shutdown was requested
    fn handle_command(&mut self, command: NetworkCommand) -> bool {
        match command {
            NetworkCommand::Dial { address, response } => {
                debug!("Dialing peer at: {}", address);
                match self.swarm.dial(address.clone()) {
                    Ok(_) => {
                        let _ = response.send(Ok(()));
                    }
                    Err(e) => {
                        warn!("Failed to dial {}: {}", address, e);
                        let _ = response.send(Err(anyhow!("Failed to dial {}: {}", address, e)));
                    }
                }
            }
            NetworkCommand::ListPeers { response } => {
                let peers: Vec<PeerId> = self.connected_peers.iter().cloned().collect();
                let _ = response.send(peers);
            }
            NetworkCommand::PutRecord {
                key,
                value,
                response,
            } => {
                let record = kad::Record::new(key, value);
                match self
                    .swarm
                    .behaviour_mut()
                    .kad
                    .put_record(record, kad::Quorum::One)
                {
                    Ok(query_id) => {
                        self.pending_put_records.insert(query_id, response);
                    }
                    Err(e) => {
                        let _ = response.send(Err(anyhow!("failed to store record: {}", e)));
                    }
                }
            }
            NetworkCommand::GetRecord { key, response } => {
                let query_id = self
                    .swarm
                    .behaviour_mut()
                    .kad
                    .get_record(kad::RecordKey::new(&key));
                self.pending_get_records.insert(query_id, response);
            }
            NetworkCommand::StartProviding { key, response } => {
                match self
                    .swarm
                    .behaviour_mut()
                    .kad
                    .start_providing(kad::RecordKey::new(&key))
                {
                    Ok(query_id) => {
                        self.pending_provides.insert(query_id, response);
                    }
                    Err(e) => {
                        let _ =
                            response.send(Err(anyhow!("failed to store provider record: {}", e)));
                    }
                }
            }
            NetworkCommand::GetProviders { key, response } => {
                let query_id = self
                    .swarm
                    .behaviour_mut()
                    .kad
                    .get_providers(kad::RecordKey::new(&key));
                self.pending_provider_queries.insert(
                    query_id,
                    ProviderQuery {
                        providers: HashSet::new(),
                        response,
                    },
                );
            }
            NetworkCommand::RequestFragment {
                peer_id,
                hash,
                response,
            } => {
                debug!("Requesting fragment {} from {}", hash, peer_id);
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .exchange
                    .send_request(&peer_id, FragmentRequest { hash });
                self.pending_fragment_requests.insert(request_id, response);
            }
            NetworkCommand::Shutdown => {
                info!("Shutdown command received");
                return false;
            }
        }
        true
    }
}

/// Handle for interacting with the NetworkService
#[derive(Debug, Clone)]
pub struct NetworkServiceHandle {
    command_tx: mpsc::UnboundedSender<NetworkCommand>,
    local_peer_id: PeerId,
}

impl NetworkServiceHandle {
    /// Dial a peer at the given address
    pub async fn dial(&self, address: Multiaddr) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(NetworkCommand::Dial {
            address,
            response: tx,
        })?;
        rx.await?
    }

    /// Get the list of connected peers
    pub async fn list_connected_peers(&self) -> Result<Vec<PeerId>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::ListPeers { response: tx })?;
        Ok(rx.await?)
    }

    /// Publish a record to the DHT
    pub async fn put_record(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(NetworkCommand::PutRecord {
            key,
            value,
            response: tx,
        })?;
        rx.await?
    }

    /// Look up a record in the DHT; `Ok(None)` means the key is unpublished
    pub async fn get_record(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::GetRecord { key, response: tx })?;
        rx.await?
    }

    /// Announce this node as a provider for a key
    pub async fn start_providing(&self, key: Vec<u8>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::StartProviding { key, response: tx })?;
        rx.await?
    }

    /// Look up providers for a key
    pub async fn get_providers(&self, key: Vec<u8>) -> Result<Vec<PeerId>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::GetProviders { key, response: tx })?;
        rx.await?
    }

    /// Request a fragment from a specific peer
    pub async fn request_fragment(
        &self,
        peer_id: PeerId,
        hash: String,
    ) -> Result<FragmentResponse> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(NetworkCommand::RequestFragment {
            peer_id,
            hash,
            response: tx,
        })?;
        rx.await?
    }

    /// Shutdown the service
    pub fn shutdown(&self) -> Result<()> {
        self.command_tx.send(NetworkCommand::Shutdown)?;
        Ok(())
    }

    /// Get the local peer ID
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }
}

/// Event stream from the NetworkService
#[derive(Debug)]
pub struct NetworkEvents {
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl NetworkEvents {
    /// Receive the next network event
    pub async fn next(&mut self) -> Option<NetworkEvent> {
        self.event_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_creation() {
        let config = NetworkConfig::default();
        let result = NetworkService::new(config, Arc::new(FragmentStore::new()));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_listen_address() {
        let config = NetworkConfig {
            listen_address: "invalid-address".to_string(),
            ..NetworkConfig::default()
        };
        let (mut service, _handle, _events) =
            NetworkService::new(config, Arc::new(FragmentStore::new())).unwrap();
        let result = service.start().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_local_peer_id() {
        let config = NetworkConfig::default();
        let (service, handle, _events) =
            NetworkService::new(config, Arc::new(FragmentStore::new())).unwrap();

        assert_eq!(service.local_peer_id(), handle.local_peer_id());
        assert_ne!(handle.local_peer_id().to_string(), "");
    }

    #[test]
    fn test_bootstrap_peer_parse_roundtrip() {
        let peer_id = identity::Keypair::generate_ed25519().public().to_peer_id();
        let formatted = format!("{}@/ip4/127.0.0.1/tcp/4001", peer_id);

        let parsed = BootstrapPeer::parse(&formatted).unwrap();
        assert_eq!(parsed.peer_id, peer_id);
        assert_eq!(parsed.to_string(), formatted);
    }

    #[test]
    fn test_bootstrap_peer_parse_rejects_bad_input() {
        assert!(BootstrapPeer::parse("no-separator").is_err());
        assert!(BootstrapPeer::parse("not-a-peer-id@/ip4/127.0.0.1/tcp/4001").is_err());
        assert!(BootstrapPeer::parse("QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N@bad").is_err());
    }
}

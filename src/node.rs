//! Node coordinator.
//!
//! Composes the fragmenter, fragment store, file catalog, distributed index
//! client, and network service into the two user-facing operations: upload
//! (fragment, store, catalog, publish, announce) and download (resolve,
//! locate holders, fetch with per-candidate retry, verify, reassemble,
//! write, re-serve). Serving itself is the network service's run loop; the
//! coordinator only feeds the store it answers from.

use crate::catalog::{FileCatalog, FileInfo};
use crate::fragmenter::{
    assemble, content_hash, file_name_of, fragment_bytes, Fragment, FragmentError,
};
use crate::index::{fragment_key, IndexClient, IndexError};
use crate::networking::{NetworkConfig, NetworkEvents, NetworkService, NetworkServiceHandle};
use crate::store::{FragmentStore, StoreError};
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default fragment size: 256 KiB.
///
/// Large enough to bound per-fragment request overhead, small enough to
/// bound per-request payload and retry cost.
pub const DEFAULT_FRAGMENT_SIZE: usize = 256 * 1024;

/// Largest configurable fragment size; keeps an encoded fragment inside the
/// exchange protocol's frame limit.
pub const MAX_FRAGMENT_SIZE: usize = 1024 * 1024;

/// Configuration for a fragnet node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Fragment size in bytes
    #[serde(default = "default_fragment_size")]
    pub fragment_size: usize,
    /// Networking configuration
    #[serde(default)]
    pub network: NetworkConfig,
}

fn default_fragment_size() -> usize {
    DEFAULT_FRAGMENT_SIZE
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            network: NetworkConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NodeError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), NodeError> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.fragment_size == 0 {
            return Err(NodeError::InvalidConfiguration {
                reason: "fragment_size must be greater than 0".to_string(),
            });
        }

        if self.fragment_size > MAX_FRAGMENT_SIZE {
            return Err(NodeError::InvalidConfiguration {
                reason: format!(
                    "fragment_size {} exceeds maximum {}",
                    self.fragment_size, MAX_FRAGMENT_SIZE
                ),
            });
        }

        Ok(())
    }
}

/// Errors that can occur when setting up a node
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Network error: {0}")]
    Network(#[from] anyhow::Error),
}

/// Errors that can occur during upload
#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The file is fragmented and servable by hash, but peers cannot
    /// resolve it by name. Partial success, reported distinctly.
    #[error("{filename} is stored locally ({total_fragments} fragments) but could not be published: {source}")]
    Publish {
        filename: String,
        total_fragments: usize,
        #[source]
        source: IndexError,
    },
}

/// Errors that can occur during download
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    Resolve(#[from] IndexError),

    #[error("{filename} is not published in the distributed index")]
    NotPublished { filename: String },

    #[error("no reachable peer holds fragment {hash} (tried {candidates} candidates)")]
    FragmentUnavailable { hash: String, candidates: usize },

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to write output file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Summary of a completed upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub filename: String,
    pub total_fragments: usize,
    pub total_bytes: usize,
}

/// Summary of a completed download
#[derive(Debug, Clone)]
pub struct DownloadReceipt {
    pub filename: String,
    pub total_fragments: usize,
    pub total_bytes: usize,
}

/// The node coordinator
pub struct Node {
    config: NodeConfig,
    store: Arc<FragmentStore>,
    catalog: Arc<FileCatalog>,
    index: IndexClient,
    network: NetworkServiceHandle,
}

impl Node {
    /// Create a node and its (not yet started) network service.
    ///
    /// The caller starts the service and spawns its run loop; the node
    /// shares its fragment store with the service so inbound requests are
    /// answered from the same map the upload and download paths fill.
    pub fn new(config: NodeConfig) -> Result<(Self, NetworkService, NetworkEvents), NodeError> {
        config.validate()?;

        let store = Arc::new(FragmentStore::new());
        let catalog = Arc::new(FileCatalog::new());

        let (service, handle, events) =
            NetworkService::new(config.network.clone(), Arc::clone(&store))?;
        let index = IndexClient::new(handle.clone());

        info!(
            fragment_size = config.fragment_size,
            "Node initialized with peer ID: {}",
            handle.local_peer_id()
        );

        Ok((
            Node {
                config,
                store,
                catalog,
                index,
                network: handle,
            },
            service,
            events,
        ))
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.network.local_peer_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<FragmentStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<FileCatalog> {
        &self.catalog
    }

    pub fn network(&self) -> &NetworkServiceHandle {
        &self.network
    }

    /// Upload a file: fragment it, store and catalog the pieces locally,
    /// publish the reassembly record, and announce this node as holder of
    /// every fragment.
    ///
    /// If publication fails the file remains locally fragmented and
    /// servable by hash, but is invisible to name lookups; this partial
    /// success is reported as `UploadError::Publish`.
    pub async fn upload<P: AsRef<Path>>(&self, path: P) -> Result<UploadReceipt, UploadError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| FragmentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = file_name_of(path);

        let fragments = fragment_bytes(&data, &filename, self.config.fragment_size)?;
        info!(
            %filename,
            fragments = fragments.len(),
            bytes = data.len(),
            "Uploading file"
        );

        for fragment in &fragments {
            self.store.insert(fragment.clone()).await?;
        }

        let info = FileInfo::from_fragments(&filename, &fragments);
        self.catalog.insert(info.clone()).await;

        self.index
            .publish(&info)
            .await
            .map_err(|source| UploadError::Publish {
                filename: filename.clone(),
                total_fragments: info.total_fragments,
                source,
            })?;

        self.announce_fragments(&info).await;

        Ok(UploadReceipt {
            filename,
            total_fragments: info.total_fragments,
            total_bytes: data.len(),
        })
    }

    /// Download a file by name: resolve its record, collect every fragment
    /// (local store first, then providers in turn), verify, reassemble, and
    /// write the result to `output_path`.
    ///
    /// After a successful download the node catalogs and announces the
    /// file, so it serves what it fetched.
    pub async fn download<P: AsRef<Path>>(
        &self,
        filename: &str,
        output_path: P,
    ) -> Result<DownloadReceipt, DownloadError> {
        let output_path = output_path.as_ref();

        let info =
            self.index
                .resolve(filename)
                .await?
                .ok_or_else(|| DownloadError::NotPublished {
                    filename: filename.to_string(),
                })?;

        info!(
            filename,
            fragments = info.total_fragments,
            "Downloading file"
        );

        let local_peer = self.network.local_peer_id();
        let mut collected = Vec::with_capacity(info.total_fragments);

        for (index, hash) in info.fragment_hashes.iter().enumerate() {
            // Local copies are re-verified before use; the store should
            // only hold valid fragments but network-filled data earns no
            // trust from being cached.
            if let Some(fragment) = self.store.get(hash).await {
                fragment.verify()?;
                collected.push(fragment);
                continue;
            }

            let fragment = self.fetch_fragment(&info, index, hash, local_peer).await?;
            self.store.insert(fragment.clone()).await?;
            collected.push(fragment);
        }

        let data = assemble(&collected, info.total_fragments)?;

        fs::write(output_path, &data).map_err(|source| DownloadError::Write {
            path: output_path.to_path_buf(),
            source,
        })?;

        self.catalog.insert(info.clone()).await;
        self.announce_fragments(&info).await;

        info!(
            filename,
            bytes = data.len(),
            "Download complete, now serving the file"
        );

        Ok(DownloadReceipt {
            filename: info.filename,
            total_fragments: info.total_fragments,
            total_bytes: data.len(),
        })
    }

    /// Fetch one fragment from whichever provider answers with valid bytes.
    ///
    /// Candidates are tried in turn; a not-found answer, a transport
    /// failure, or corrupt bytes each move on to the next candidate. Only
    /// an exhausted candidate list is fatal.
    async fn fetch_fragment(
        &self,
        info: &FileInfo,
        index: usize,
        hash: &str,
        local_peer: PeerId,
    ) -> Result<Fragment, DownloadError> {
        let candidates = match self.network.get_providers(fragment_key(hash)).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!("Provider lookup for fragment {} failed: {}", hash, e);
                Vec::new()
            }
        };

        let candidates: Vec<PeerId> = candidates
            .into_iter()
            .filter(|peer| *peer != local_peer)
            .collect();
        let tried = candidates.len();

        for peer in candidates {
            match self.network.request_fragment(peer, hash.to_string()).await {
                Ok(response) if response.found => {
                    let computed = content_hash(&response.data);
                    if computed != hash {
                        warn!(
                            "Peer {} returned corrupt data for fragment {} (computed {})",
                            peer, hash, computed
                        );
                        continue;
                    }
                    debug!("Fetched fragment {} from {}", hash, peer);
                    return Ok(Fragment {
                        hash: hash.to_string(),
                        data: response.data,
                        index,
                        total_fragments: info.total_fragments,
                        filename: info.filename.clone(),
                    });
                }
                Ok(_) => {
                    debug!("Peer {} does not hold fragment {}", peer, hash);
                }
                Err(e) => {
                    warn!("Fragment request to {} failed: {}", peer, e);
                }
            }
        }

        Err(DownloadError::FragmentUnavailable {
            hash: hash.to_string(),
            candidates: tried,
        })
    }

    async fn announce_fragments(&self, info: &FileInfo) {
        for hash in &info.fragment_hashes {
            if let Err(e) = self.network.start_providing(fragment_key(hash)).await {
                // Peers that learn the hash out-of-band can still fetch it;
                // only name-based discovery of this holder degrades.
                warn!("Provider announcement for fragment {} failed: {}", hash, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fragment_size, 256 * 1024);
    }

    #[test]
    fn test_zero_fragment_size_rejected() {
        let config = NodeConfig {
            fragment_size: 0,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(NodeError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_oversized_fragment_size_rejected() {
        let config = NodeConfig {
            fragment_size: MAX_FRAGMENT_SIZE + 1,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(NodeError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("node.yaml");

        let mut config = NodeConfig::default();
        config.fragment_size = 64 * 1024;
        config.network.listen_address = "/ip4/127.0.0.1/tcp/0".to_string();

        config.save_to_file(&config_path).unwrap();
        let loaded = NodeConfig::from_file(&config_path).unwrap();

        assert_eq!(loaded.fragment_size, 64 * 1024);
        assert_eq!(loaded.network.listen_address, "/ip4/127.0.0.1/tcp/0");
    }

    #[tokio::test]
    async fn test_node_creation() {
        let config = NodeConfig {
            network: NetworkConfig {
                listen_address: "/ip4/127.0.0.1/tcp/0".to_string(),
                ..NetworkConfig::default()
            },
            ..NodeConfig::default()
        };

        let (node, service, _events) = Node::new(config).unwrap();
        assert_eq!(node.local_peer_id(), service.local_peer_id());
        assert!(node.catalog().is_empty().await);
        assert!(node.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_node_creation_rejects_invalid_config() {
        let config = NodeConfig {
            fragment_size: 0,
            ..NodeConfig::default()
        };
        assert!(Node::new(config).is_err());
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::certificate::QuorumCertificate;
use crate::db::QuorumConfig;
use crate::types::{GraphError, ReplicaId, Result, SnapshotId};

/// What a delivered signature did to its certificate.
#[derive(Debug, Clone)]
pub enum SignatureOutcome {
    /// No certificate is open for that id.
    Unknown,
    /// Still short of the threshold.
    Pending {
        /// Distinct signers so far.
        collected: usize,
        /// Signers needed.
        required: usize,
    },
    /// This signature completed the quorum. Returned once per certificate.
    Finalize(Arc<QuorumCertificate>),
    /// The quorum was already complete and acted on.
    AlreadyFinalized,
    /// The id is at or below the eviction watermark.
    Evicted,
}

/// Open quorum certificates keyed by the sequence id they certify.
///
/// Eviction is final: once [`CertificateCache::evict_through`] has passed an
/// id, that id can neither be reopened nor signed, so it finalizes at most
/// once over the cache's lifetime.
pub struct CertificateCache {
    required: usize,
    state: RwLock<CacheState>,
}

#[derive(Default)]
struct CacheState {
    certificates: BTreeMap<SnapshotId, Arc<QuorumCertificate>>,
    watermark: Option<SnapshotId>,
}

impl CacheState {
    fn is_evicted(&self, id: SnapshotId) -> bool {
        self.watermark.is_some_and(|watermark| id <= watermark)
    }
}

impl CertificateCache {
    /// Creates an empty cache whose certificates need `required` signers.
    pub fn new(required: usize) -> Result<Self> {
        if required == 0 {
            return Err(GraphError::Config(
                "quorum.required_signatures must be positive".into(),
            ));
        }
        Ok(Self {
            required,
            state: RwLock::new(CacheState::default()),
        })
    }

    /// Creates a cache from the quorum section of the configuration.
    pub fn from_config(config: &QuorumConfig) -> Result<Self> {
        Self::new(config.required_signatures)
    }

    /// Opens the certificate for `id`, or returns the one already open.
    ///
    /// Fails with [`GraphError::CertificateEvicted`] once `id` has been evicted.
    pub fn open(
        &self,
        id: SnapshotId,
        message: impl Into<Vec<u8>>,
        decision: impl Into<String>,
    ) -> Result<Arc<QuorumCertificate>> {
        if let Some(existing) = self.state.read().certificates.get(&id) {
            return Ok(Arc::clone(existing));
        }
        let mut state = self.state.write();
        if let Some(existing) = state.certificates.get(&id) {
            return Ok(Arc::clone(existing));
        }
        if let Some(watermark) = state.watermark.filter(|watermark| id <= *watermark) {
            debug!(%id, %watermark, "certificate.open.evicted");
            return Err(GraphError::CertificateEvicted { id, watermark });
        }
        let certificate = Arc::new(QuorumCertificate::new(self.required, message, decision)?);
        state.certificates.insert(id, Arc::clone(&certificate));
        debug!(%id, required = self.required, "certificate.open");
        Ok(certificate)
    }

    /// The certificate open for `id`.
    pub fn get(&self, id: SnapshotId) -> Option<Arc<QuorumCertificate>> {
        self.state.read().certificates.get(&id).cloned()
    }

    /// Adds a replica's signature to the certificate for `id`.
    pub fn record_signature(
        &self,
        id: SnapshotId,
        replica: ReplicaId,
        signature: impl Into<Vec<u8>>,
    ) -> SignatureOutcome {
        let certificate = {
            let state = self.state.read();
            match state.certificates.get(&id) {
                Some(certificate) => Arc::clone(certificate),
                None if state.is_evicted(id) => {
                    debug!(%id, %replica, "certificate.signature.evicted");
                    return SignatureOutcome::Evicted;
                }
                None => {
                    debug!(%id, %replica, "certificate.signature.unknown");
                    return SignatureOutcome::Unknown;
                }
            }
        };
        let collected = certificate.add_signature(replica, signature);
        if !certificate.has_enough() {
            return SignatureOutcome::Pending {
                collected,
                required: certificate.required(),
            };
        }
        if certificate.mark_processed() {
            info!(
                %id,
                %replica,
                decision = certificate.decision(),
                signers = collected,
                "certificate.finalized"
            );
            SignatureOutcome::Finalize(certificate)
        } else {
            SignatureOutcome::AlreadyFinalized
        }
    }

    /// Drops every certificate with an id up to and including `id`, finalized
    /// or not, and raises the eviction watermark to `id`. Returns how many
    /// were dropped.
    pub fn evict_through(&self, id: SnapshotId) -> usize {
        let mut state = self.state.write();
        let kept = match id.0.checked_add(1) {
            Some(next) => state.certificates.split_off(&SnapshotId(next)),
            None => BTreeMap::new(),
        };
        let dropped = std::mem::replace(&mut state.certificates, kept);
        let unfinished = dropped.values().filter(|c| !c.is_processed()).count();
        state.watermark = state.watermark.max(Some(id));
        if !dropped.is_empty() {
            debug!(%id, dropped = dropped.len(), unfinished, "certificate.evicted");
        }
        dropped.len()
    }

    /// Highest id evicted so far.
    pub fn watermark(&self) -> Option<SnapshotId> {
        self.state.read().watermark
    }

    /// Number of open certificates.
    pub fn len(&self) -> usize {
        self.state.read().certificates.len()
    }

    /// `true` when no certificate is open.
    pub fn is_empty(&self) -> bool {
        self.state.read().certificates.is_empty()
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::types::{GraphError, ReplicaId, Result};

/// Signatures collected from distinct replicas over one proposed decision.
///
/// A replica may sign again at any time; its new signature replaces the old
/// one, so the count only ever reflects distinct signers. Once
/// [`QuorumCertificate::has_enough`] holds it stays true, since signatures are
/// never removed.
///
/// The certificate is shared between the threads delivering signatures;
/// [`QuorumCertificate::mark_processed`] lets exactly one of them act on the
/// decision.
pub struct QuorumCertificate {
    message: Vec<u8>,
    decision: String,
    required: usize,
    signatures: RwLock<BTreeMap<ReplicaId, Vec<u8>>>,
    processed: AtomicBool,
}

impl QuorumCertificate {
    /// Creates an empty certificate for `message` needing `required` signers.
    pub fn new(required: usize, message: impl Into<Vec<u8>>, decision: impl Into<String>) -> Result<Self> {
        if required == 0 {
            return Err(GraphError::Config(
                "a certificate needs at least one signature".into(),
            ));
        }
        Ok(Self {
            message: message.into(),
            decision: decision.into(),
            required,
            signatures: RwLock::new(BTreeMap::new()),
            processed: AtomicBool::new(false),
        })
    }

    /// Stores `signature` for `replica`, replacing any earlier one. Returns the
    /// number of distinct signers afterwards.
    pub fn add_signature(&self, replica: ReplicaId, signature: impl Into<Vec<u8>>) -> usize {
        let mut signatures = self.signatures.write();
        signatures.insert(replica, signature.into());
        signatures.len()
    }

    /// `true` once at least `required` distinct replicas have signed.
    pub fn has_enough(&self) -> bool {
        self.signature_count() >= self.required
    }

    /// Number of distinct signers.
    pub fn signature_count(&self) -> usize {
        self.signatures.read().len()
    }

    /// Copy of the collected signatures, ordered by replica id.
    pub fn signatures(&self) -> BTreeMap<ReplicaId, Vec<u8>> {
        self.signatures.read().clone()
    }

    /// Whether `replica` has signed.
    pub fn has_signed(&self, replica: ReplicaId) -> bool {
        self.signatures.read().contains_key(&replica)
    }

    /// The message being certified.
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// The decision label the signers agreed on.
    pub fn decision(&self) -> &str {
        &self.decision
    }

    /// Threshold of distinct signers.
    pub fn required(&self) -> usize {
        self.required
    }

    /// Sets the processed latch. Returns `true` only for the call that
    /// actually flipped it.
    pub fn mark_processed(&self) -> bool {
        self.processed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the decision has been acted on.
    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for QuorumCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuorumCertificate")
            .field("decision", &self.decision)
            .field("message", &hex::encode(&self.message))
            .field("signatures", &self.signature_count())
            .field("required", &self.required)
            .field("processed", &self.is_processed())
            .finish()
    }
}

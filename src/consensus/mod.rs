//! Quorum certificates over replica decisions.
//!
//! A decision is safe to act on once enough distinct replicas have signed
//! it. [`QuorumCertificate`] collects the signatures for one decision and
//! [`CertificateCache`] tracks the certificates open on a replica, handing
//! each completed one to exactly one caller.

mod cache;
mod certificate;

pub use cache::{CertificateCache, SignatureOutcome};
pub use certificate::QuorumCertificate;

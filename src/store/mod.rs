//! Trust-chain store seam.
//!
//! Durable trust-chain state is owned by an external collaborator. The
//! engine reads it through [`TrustChainStore`]; implementations are
//! responsible for handing back a consistent snapshot per call.
//! [`InMemoryTrustStore`] backs tests and the operator CLI and can be
//! loaded from a JSON document.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::delegation::chain::{ChainLink, MAX_CHAIN_HOPS};
use crate::delegation::{Envelope, PrincipalId};
use crate::governance::UsageSnapshot;

/// Errors from a trust-chain store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No envelope is recorded for the principal.
    #[error("no envelope recorded for principal {0}")]
    UnknownPrincipal(PrincipalId),

    /// No usage snapshot is available for the principal.
    #[error("no usage snapshot for principal {0}")]
    NoUsage(PrincipalId),

    /// Walking delegators revisited a principal or exceeded the hop limit.
    #[error("delegation chain for {0} is cyclic or too long")]
    ChainCycle(PrincipalId),

    /// The backing document could not be read.
    #[error("failed to read trust store document: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document is not valid.
    #[error("invalid trust store document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read access to trust-chain state, keyed by principal.
#[async_trait]
pub trait TrustChainStore: Send + Sync {
    /// Current envelope held by `principal`.
    async fn get_envelope(&self, principal: &PrincipalId) -> Result<Envelope, StoreError>;

    /// Current usage counters and limits for `principal`.
    async fn get_usage_snapshot(
        &self,
        principal: &PrincipalId,
    ) -> Result<UsageSnapshot, StoreError>;

    /// Stored links from the root authority down to `principal`.
    async fn get_chain(&self, principal: &PrincipalId) -> Result<Vec<ChainLink>, StoreError>;
}

/// One principal as recorded in a trust store document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalRecord {
    /// Principal id.
    pub id: PrincipalId,
    /// Who delegated to this principal; `None` for a root authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_by: Option<PrincipalId>,
    /// Envelope held.
    pub envelope: Envelope,
    /// Latest usage snapshot, if metered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

/// JSON document accepted by [`InMemoryTrustStore::from_json`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustStoreDocument {
    /// Every known principal.
    #[serde(default)]
    pub principals: Vec<PrincipalRecord>,
}

/// In-memory [`TrustChainStore`].
#[derive(Debug, Default)]
pub struct InMemoryTrustStore {
    records: RwLock<HashMap<PrincipalId, PrincipalRecord>>,
}

impl InMemoryTrustStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a parsed document. Later records replace earlier
    /// ones with the same id.
    pub fn from_document(document: TrustStoreDocument) -> Self {
        let records = document
            .principals
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] if the JSON is invalid, including any
    /// envelope that violates the terminal-depth invariant.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let document: TrustStoreDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(document))
    }

    /// Load a JSON document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Parse`].
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let store = Self::from_json(&contents)?;
        debug!(path = %path.display(), "trust store loaded");
        Ok(store)
    }

    /// Insert or replace a principal record.
    pub async fn insert(&self, record: PrincipalRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    /// Number of principals held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TrustChainStore for InMemoryTrustStore {
    async fn get_envelope(&self, principal: &PrincipalId) -> Result<Envelope, StoreError> {
        self.records
            .read()
            .await
            .get(principal)
            .map(|record| record.envelope.clone())
            .ok_or_else(|| StoreError::UnknownPrincipal(principal.clone()))
    }

    async fn get_usage_snapshot(
        &self,
        principal: &PrincipalId,
    ) -> Result<UsageSnapshot, StoreError> {
        let records = self.records.read().await;
        let record = records
            .get(principal)
            .ok_or_else(|| StoreError::UnknownPrincipal(principal.clone()))?;
        record
            .usage
            .clone()
            .ok_or_else(|| StoreError::NoUsage(principal.clone()))
    }

    async fn get_chain(&self, principal: &PrincipalId) -> Result<Vec<ChainLink>, StoreError> {
        // Single read guard so the whole walk sees one snapshot.
        let records = self.records.read().await;
        let mut links = Vec::new();
        let mut current = Some(principal.clone());

        while let Some(id) = current {
            if links.len() >= MAX_CHAIN_HOPS
                || links.iter().any(|l: &ChainLink| l.principal == id)
            {
                return Err(StoreError::ChainCycle(principal.clone()));
            }
            let record = records
                .get(&id)
                .ok_or_else(|| StoreError::UnknownPrincipal(id.clone()))?;
            current = record.delegated_by.clone();
            links.push(ChainLink {
                principal: id,
                delegated_by: record.delegated_by.clone(),
                envelope: record.envelope.clone(),
            });
        }

        links.reverse();
        Ok(links)
    }
}

//! Partition/sort-keyed records with optimistic versioning and expiry.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record {pk}/{sk} not found")]
    NotFound { pk: String, sk: String },

    #[error("record {pk}/{sk} was modified concurrently")]
    Conflict { pk: String, sk: String },
}

/// Fields every stored record carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    pub pk: String,
    pub sk: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<DateTime<Utc>>,
}

impl Base {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            pk: pk.into(),
            sk: sk.into(),
            created: now,
            updated: now,
            version: 1,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: DateTime<Utc>) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| ttl <= now)
    }
}

/// `<namespace>:<time-ordered id>`, so sort keys list in creation order.
pub fn namespaced_id(namespace: &str) -> String {
    format!("{namespace}:{}", Uuid::now_v7())
}

/// A storable record.
pub trait Record: Clone + Send + Sync + 'static {
    fn base(&self) -> &Base;
    fn base_mut(&mut self) -> &mut Base;
}

/// Record storage keyed by partition and sort key.
#[async_trait]
pub trait Store<T: Record>: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if the key already exists.
    async fn create(&self, record: T) -> Result<T, StoreError>;

    /// Load a record. Expired records are reported as not found.
    async fn get(&self, pk: &str, sk: &str) -> Result<T, StoreError>;

    /// Replace a record if its stored version still equals `expected_version`.
    /// Bumps the version and the updated timestamp.
    async fn update(&self, record: T, expected_version: u64) -> Result<T, StoreError>;

    /// All unexpired records in a partition, in sort-key order.
    async fn list(&self, pk: &str) -> Result<Vec<T>, StoreError>;
}

/// In-memory store.
pub struct MemoryStore<T> {
    partitions: DashMap<String, BTreeMap<String, T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MemoryStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

fn not_found(pk: &str, sk: &str) -> StoreError {
    StoreError::NotFound {
        pk: pk.to_string(),
        sk: sk.to_string(),
    }
}

#[async_trait]
impl<T: Record> Store<T> for MemoryStore<T> {
    async fn create(&self, record: T) -> Result<T, StoreError> {
        let base = record.base();
        let mut partition = self.partitions.entry(base.pk.clone()).or_default();
        if let Some(existing) = partition.get(&base.sk)
            && !existing.base().is_expired(Utc::now())
        {
            return Err(StoreError::Conflict {
                pk: base.pk.clone(),
                sk: base.sk.clone(),
            });
        }
        partition.insert(base.sk.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, pk: &str, sk: &str) -> Result<T, StoreError> {
        let now = Utc::now();
        self.partitions
            .get(pk)
            .and_then(|partition| partition.get(sk).cloned())
            .filter(|record| !record.base().is_expired(now))
            .ok_or_else(|| not_found(pk, sk))
    }

    async fn update(&self, mut record: T, expected_version: u64) -> Result<T, StoreError> {
        let (pk, sk) = (record.base().pk.clone(), record.base().sk.clone());
        let mut partition = self
            .partitions
            .get_mut(&pk)
            .ok_or_else(|| not_found(&pk, &sk))?;
        let stored = partition.get(&sk).ok_or_else(|| not_found(&pk, &sk))?;

        if stored.base().version != expected_version {
            return Err(StoreError::Conflict { pk, sk });
        }

        let created = stored.base().created;
        let base = record.base_mut();
        base.created = created;
        base.updated = Utc::now();
        base.version = expected_version + 1;
        partition.insert(sk, record.clone());
        Ok(record)
    }

    async fn list(&self, pk: &str) -> Result<Vec<T>, StoreError> {
        let now = Utc::now();
        Ok(self
            .partitions
            .get(pk)
            .map(|partition| {
                partition
                    .values()
                    .filter(|record| !record.base().is_expired(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

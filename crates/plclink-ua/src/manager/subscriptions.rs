// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription Registry.
//!
//! Each subscription is one publish cycle with one monitored item, keyed by
//! a locally generated [`SubscriptionHandle`]. The registry caches the most
//! recent value per subscription so `get_subscription_value` never touches
//! the network.
//!
//! # Handle format
//!
//! ```text
//! sub-<epoch ms>-<manager tag>-<sequence>
//! ```
//!
//! The manager tag is random per manager and the sequence is a monotonic
//! counter, so handles stay unique within one millisecond and across
//! managers in the same process.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{UaError, UaResult};
use crate::session::{
    MonitorParameters, ProtocolSession, PublishParameters, ReadResult, Variant,
};
use crate::types::{DataType, NodeId, StatusCode, SubscriptionTiming};

use super::nodes::RegisteredHandle;
use super::{ConnectionManager, Inner};

// =============================================================================
// SubscriptionHandle
// =============================================================================

/// Locally generated subscription handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionHandle(String);

impl SubscriptionHandle {
    /// Returns the handle text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubscriptionHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Produces unique [`SubscriptionHandle`]s for one manager.
#[derive(Debug)]
pub(crate) struct HandleGenerator {
    tag: String,
    sequence: AtomicU64,
}

impl HandleGenerator {
    pub(crate) fn new() -> Self {
        let tag = Uuid::new_v4().simple().to_string();
        Self {
            tag: tag[..8].to_string(),
            sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn next(&self) -> SubscriptionHandle {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        SubscriptionHandle(format!(
            "sub-{}-{}-{}",
            Utc::now().timestamp_millis(),
            self.tag,
            sequence
        ))
    }
}

// =============================================================================
// SubscriptionTarget
// =============================================================================

/// What a subscription monitors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubscriptionTarget {
    /// A node addressed by its original identifier.
    Node(NodeId),
    /// A node addressed through a registered handle.
    Registered(RegisteredHandle),
}

impl SubscriptionTarget {
    /// Returns `true` if the target is a registered handle.
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }

    /// Returns the node id sent to the server.
    pub fn wire_node_id(&self) -> &NodeId {
        match self {
            Self::Node(node_id) => node_id,
            Self::Registered(handle) => handle.node_id(),
        }
    }
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node_id) => write!(f, "{node_id}"),
            Self::Registered(handle) => write!(f, "registered:{handle}"),
        }
    }
}

impl From<NodeId> for SubscriptionTarget {
    fn from(node_id: NodeId) -> Self {
        Self::Node(node_id)
    }
}

impl From<RegisteredHandle> for SubscriptionTarget {
    fn from(handle: RegisteredHandle) -> Self {
        Self::Registered(handle)
    }
}

// =============================================================================
// ValueSnapshot
// =============================================================================

/// An immutable value snapshot: value, declared type, quality and timestamp.
///
/// Returned by `read` and cached per subscription. Change notifications
/// replace the cached snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSnapshot {
    /// Value payload.
    pub value: Variant,
    /// Declared data type.
    pub data_type: DataType,
    /// Quality reported by the server.
    pub status: StatusCode,
    /// Server timestamp, or the source timestamp when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<&ReadResult> for ValueSnapshot {
    fn from(read: &ReadResult) -> Self {
        let value = read.value.clone().unwrap_or(Variant::Null);
        Self {
            data_type: value.data_type(),
            value,
            status: read.status,
            timestamp: read.timestamp(),
        }
    }
}

impl From<ReadResult> for ValueSnapshot {
    fn from(read: ReadResult) -> Self {
        Self::from(&read)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// One live subscription.
#[derive(Debug, Clone)]
pub(crate) struct Subscription {
    pub(crate) handle: SubscriptionHandle,
    pub(crate) target: SubscriptionTarget,
    pub(crate) timing: SubscriptionTiming,
    pub(crate) session_subscription_id: u32,
    pub(crate) monitored_item_id: u32,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) latest: Option<ValueSnapshot>,
}

impl Subscription {
    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            handle: self.handle.clone(),
            target: self.target.clone(),
            is_registered_target: self.target.is_registered(),
            has_cached_value: self.latest.is_some(),
            timing: self.timing,
            created_at: self.created_at,
        }
    }
}

/// Read-only view of a subscription for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    /// Subscription handle.
    pub handle: SubscriptionHandle,
    /// What is monitored.
    pub target: SubscriptionTarget,
    /// `true` if the target is a registered handle.
    pub is_registered_target: bool,
    /// `true` once a value has been cached.
    pub has_cached_value: bool,
    /// Derived publish-cycle timing.
    pub timing: SubscriptionTiming,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A cached value change, as broadcast by [`ConnectionManager::watch_values`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueUpdate {
    /// Subscription that received the change.
    pub handle: SubscriptionHandle,
    /// What the subscription monitors.
    pub target: SubscriptionTarget,
    /// The new value.
    pub value: ValueSnapshot,
}

// =============================================================================
// SubscriptionRegistry
// =============================================================================

/// Subscription bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    entries: HashMap<SubscriptionHandle, Subscription>,
    by_session_id: HashMap<u32, SubscriptionHandle>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, subscription: Subscription) {
        self.by_session_id.insert(
            subscription.session_subscription_id,
            subscription.handle.clone(),
        );
        self.entries.insert(subscription.handle.clone(), subscription);
    }

    pub(crate) fn remove(&mut self, handle: &SubscriptionHandle) -> Option<Subscription> {
        let removed = self.entries.remove(handle)?;
        self.by_session_id.remove(&removed.session_subscription_id);
        Some(removed)
    }

    /// Removes and returns every subscription targeting `handle`.
    pub(crate) fn remove_targeting(&mut self, handle: &RegisteredHandle) -> Vec<Subscription> {
        let targeting: Vec<SubscriptionHandle> = self
            .entries
            .values()
            .filter(|s| matches!(&s.target, SubscriptionTarget::Registered(h) if h == handle))
            .map(|s| s.handle.clone())
            .collect();

        targeting.iter().filter_map(|h| self.remove(h)).collect()
    }

    pub(crate) fn count_targeting(&self, handle: &RegisteredHandle) -> usize {
        self.entries
            .values()
            .filter(|s| matches!(&s.target, SubscriptionTarget::Registered(h) if h == handle))
            .count()
    }

    pub(crate) fn session_id(&self, handle: &SubscriptionHandle) -> Option<u32> {
        self.entries.get(handle).map(|s| s.session_subscription_id)
    }

    pub(crate) fn latest(&self, handle: &SubscriptionHandle) -> Option<Option<ValueSnapshot>> {
        self.entries.get(handle).map(|s| s.latest.clone())
    }

    /// Overwrites the cached value of the subscription with `session_subscription_id`.
    pub(crate) fn apply_change(
        &mut self,
        session_subscription_id: u32,
        value: ValueSnapshot,
    ) -> Option<ValueUpdate> {
        let handle = self.by_session_id.get(&session_subscription_id)?;
        let subscription = self.entries.get_mut(handle)?;
        subscription.latest = Some(value.clone());
        Some(ValueUpdate {
            handle: subscription.handle.clone(),
            target: subscription.target.clone(),
            value,
        })
    }

    pub(crate) fn session_ids(&self) -> Vec<(SubscriptionHandle, u32)> {
        self.entries
            .values()
            .map(|s| (s.handle.clone(), s.session_subscription_id))
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> = self.entries.values().map(Subscription::info).collect();
        infos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.handle.cmp(&b.handle))
        });
        infos
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.by_session_id.clear();
    }
}

// =============================================================================
// Subscription operations
// =============================================================================

impl<S: ProtocolSession> ConnectionManager<S> {
    /// Subscribes to value changes of `target` at `interval_ms`.
    ///
    /// Keep-alive and lifetime counts are derived from the interval. When
    /// seeding is enabled, a good initial read is cached immediately.
    pub async fn subscribe(
        &self,
        target: SubscriptionTarget,
        interval_ms: u32,
    ) -> UaResult<SubscriptionHandle> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        let generation = inner.require_connected()?;

        let timing = SubscriptionTiming::derive(interval_ms)?;

        if let SubscriptionTarget::Registered(handle) = &target {
            if !inner.nodes.read().await.contains(handle) {
                return Err(UaError::registered_node_not_found(handle.to_string()));
            }
        }

        let node_id = target.wire_node_id().clone();
        let session = inner.session.read().await;

        let session_subscription_id = match session
            .create_subscription(PublishParameters::from(timing))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                Inner::check_connection_loss(inner, generation, &e);
                return Err(e);
            }
        };

        let monitored_item_id = match session
            .create_monitored_item(
                session_subscription_id,
                &node_id,
                MonitorParameters::from(timing),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = session.delete_subscription(session_subscription_id).await {
                    debug!(error = %cleanup, "Could not delete orphaned publish cycle");
                }
                Inner::check_connection_loss(inner, generation, &e);
                return Err(e);
            }
        };

        let latest = if inner.settings.seed_initial_value {
            match session.read_value(&node_id).await {
                Ok(read) if read.is_good() => Some(ValueSnapshot::from(read)),
                Ok(read) => {
                    debug!(node_id = %node_id, status = %read.status, "Seed read not good, waiting for first notification");
                    None
                }
                Err(e) => {
                    debug!(node_id = %node_id, error = %e, "Seed read failed, waiting for first notification");
                    None
                }
            }
        } else {
            None
        };
        drop(session);

        let handle = inner.handles.next();
        inner.subscriptions.write().await.insert(Subscription {
            handle: handle.clone(),
            target: target.clone(),
            timing,
            session_subscription_id,
            monitored_item_id,
            created_at: Utc::now(),
            latest,
        });

        info!(
            handle = %handle,
            target = %target,
            monitored_item_id,
            interval_ms,
            keep_alive_count = timing.keep_alive_count,
            lifetime_count = timing.lifetime_count,
            "Subscribed"
        );
        Ok(handle)
    }

    /// Cancels a subscription.
    ///
    /// Unknown handles, including ones already cancelled, fail with
    /// `SubscriptionNotFound`. The local entry is dropped once the server
    /// confirms. If the server refuses, the entry stays so the call can be
    /// retried and the next cleanup still deletes the server-side cycle.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> UaResult<()> {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        let generation = inner.require_connected()?;

        let session_subscription_id = inner
            .subscriptions
            .read()
            .await
            .session_id(handle)
            .ok_or_else(|| UaError::subscription_not_found(handle.to_string()))?;

        let deleted = inner
            .session
            .read()
            .await
            .delete_subscription(session_subscription_id)
            .await;

        match deleted {
            Ok(()) => {
                inner.subscriptions.write().await.remove(handle);
                info!(handle = %handle, "Unsubscribed");
                Ok(())
            }
            Err(e) => {
                warn!(handle = %handle, error = %e, "Server-side cancel failed, keeping subscription");
                Inner::check_connection_loss(inner, generation, &e);
                Err(e)
            }
        }
    }

    /// Returns the cached value of a subscription without a network call.
    ///
    /// `Ok(None)` means no value has arrived yet.
    pub async fn get_subscription_value(
        &self,
        handle: &SubscriptionHandle,
    ) -> UaResult<Option<ValueSnapshot>> {
        self.inner
            .subscriptions
            .read()
            .await
            .latest(handle)
            .ok_or_else(|| UaError::subscription_not_found(handle.to_string()))
    }

    /// Returns every live subscription ordered by creation time.
    pub async fn list_active_subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner.subscriptions.read().await.snapshot()
    }

    /// Returns how many live subscriptions target a registered handle.
    pub async fn subscriptions_targeting(&self, handle: &RegisteredHandle) -> usize {
        self.inner.subscriptions.read().await.count_targeting(handle)
    }
}

impl<S: ProtocolSession> Inner<S> {
    /// Applies a change notification and broadcasts it.
    pub(crate) async fn apply_value_change(&self, session_subscription_id: u32, read: ReadResult) {
        let update = self
            .subscriptions
            .write()
            .await
            .apply_change(session_subscription_id, ValueSnapshot::from(read));

        match update {
            Some(update) => {
                self.stats.record_notification();
                trace!(handle = %update.handle, value = %update.value.value, "Value changed");
                let _ = self.values.send(update);
            }
            None => trace!(session_subscription_id, "Change for unknown subscription ignored"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

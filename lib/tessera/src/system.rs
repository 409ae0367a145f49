// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Tessera Member
//!
//! [`Tessera`] is the per-member distribution manager. It owns the backend that moves
//! frames between members, the live member view, the reply registry that correlates
//! replies with in-flight operations, and the region cache that inbound requests are
//! answered from.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use tessera_backend::{Backend, BackendError, MemberId, Transport, TransportErrorHandler};

use crate::config::TesseraConfig;
use crate::lookup::{self, LookupOutcome};
use crate::membership::Membership;
use crate::messages::{DistributionMessage, EncodeError, Envelope, ReplyMessage};
use crate::region::{Region, RegionCache};
use crate::replies::{ProcessorId, ReplyRegistry};
use crate::server;
use crate::version::{EventId, VersionTag};

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Distribution is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Builder for a [`Tessera`] member.
pub struct TesseraBuilder {
    transports: Vec<Arc<dyn Transport>>,
    member_id: Option<MemberId>,
    config: Option<TesseraConfig>,
}

impl TesseraBuilder {
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
            member_id: None,
            config: None,
        }
    }

    pub fn add_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Use a fixed identity instead of a random one.
    pub fn member_id(mut self, member_id: MemberId) -> Self {
        self.member_id = Some(member_id);
        self
    }

    /// Use `config` instead of loading it from the environment.
    pub fn config(mut self, config: TesseraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the member and start its server loops. Must be called within a tokio runtime.
    pub async fn build(self) -> anyhow::Result<Arc<Tessera>> {
        let config = match self.config {
            Some(config) => config,
            None => TesseraConfig::from_env()?,
        };
        let member_id = self.member_id.unwrap_or_else(MemberId::new_v4);
        Tessera::new(member_id, self.transports, config).await
    }
}

impl Default for TesseraBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Tessera {
    member_id: MemberId,
    backend: Arc<Backend>,
    membership: Membership,
    replies: Arc<ReplyRegistry>,
    cache: RwLock<Option<Arc<RegionCache>>>,
    config: TesseraConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Tessera {
    /// Create a builder for configuring a member with transports and configuration.
    ///
    /// # Example
    /// ```ignore
    /// let network = MemoryNetwork::new();
    /// let member = Tessera::builder()
    ///     .add_transport(network.transport())
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> TesseraBuilder {
        TesseraBuilder::new()
    }

    pub async fn new(
        member_id: MemberId,
        transports: Vec<Arc<dyn Transport>>,
        config: TesseraConfig,
    ) -> anyhow::Result<Arc<Self>> {
        let (backend, data_streams) = Backend::new(member_id, transports)?;
        let shutdown = CancellationToken::new();
        let replies = ReplyRegistry::with_ack_wait_threshold(
            shutdown.clone(),
            config.replies.ack_wait_threshold(),
        );
        let membership = Membership::new(member_id, replies.clone());

        let system = Arc::new(Self {
            member_id,
            backend: Arc::new(backend),
            membership,
            replies,
            cache: RwLock::new(None),
            config,
            shutdown,
            tracker: TaskTracker::new(),
        });

        server::start(&system, data_streams);
        debug!(member = %member_id, "member started");

        Ok(system)
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn replies(&self) -> &Arc<ReplyRegistry> {
        &self.replies
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Route frames to `peer` and count it as a live member.
    pub fn register_peer(&self, peer: MemberId) -> Result<(), BackendError> {
        self.backend.register_peer(peer)?;
        self.membership.join(peer);
        Ok(())
    }

    /// Forget `peer`; operations waiting on it stop waiting.
    pub fn member_departed(&self, peer: MemberId) {
        self.backend.unregister_peer(peer);
        self.membership.depart(peer);
    }

    /// Host `cache` on this member, replacing any cache installed earlier.
    pub fn install_cache(&self, cache: Arc<RegionCache>) {
        *self.cache.write() = Some(cache);
    }

    /// The cache hosted by this member, if one is running.
    pub fn cache(&self) -> Option<Arc<RegionCache>> {
        self.cache.read().clone()
    }

    /// Send `message` to every member of `recipients`.
    ///
    /// Sending is fire-and-forget. Returns the recipients the message could not be routed
    /// to; callers waiting on replies must treat those members as departed. When the
    /// message opens a reply wait, asynchronous delivery failures are reported to that
    /// operation as departures.
    pub fn put_outgoing(
        &self,
        recipients: impl IntoIterator<Item = MemberId>,
        message: &DistributionMessage,
    ) -> Result<HashSet<MemberId>, SendError> {
        if self.is_shutting_down() {
            return Err(SendError::ShuttingDown);
        }

        let (header, payload, message_type) =
            Envelope::new(self.member_id, message.clone()).encode()?;
        let awaiting = awaiting_processor(message);

        let mut unroutable = HashSet::new();
        for target in recipients {
            let on_error = Arc::new(SendFailureHandler {
                replies: self.replies.clone(),
                awaiting,
                target,
            });

            match self.backend.send_message(
                target,
                header.clone(),
                payload.clone(),
                message_type,
                on_error,
            ) {
                Ok(()) => {}
                Err(BackendError::ShuttingDown) => return Err(SendError::ShuttingDown),
                Err(e) => {
                    debug!(%target, error = %e, %message, "message not routed");
                    unroutable.insert(target);
                }
            }
        }

        Ok(unroutable)
    }

    /// Send a reply to the member that asked.
    pub fn reply_to(&self, target: MemberId, reply: ReplyMessage) -> Result<(), SendError> {
        let unroutable = self.put_outgoing([target], &DistributionMessage::Reply(reply))?;
        if !unroutable.is_empty() {
            debug!(%target, "reply not routed; requester no longer reachable");
        }
        Ok(())
    }

    /// Ask the cluster whether any member recorded a version tag for `event_id`.
    ///
    /// Interruption is not possible through this call; see
    /// [`Tessera::find_version_tag_interruptible`].
    pub async fn find_version_tag(
        &self,
        region: &dyn Region,
        event_id: &EventId,
        is_bulk_op: bool,
    ) -> Option<VersionTag> {
        let interrupt = CancellationToken::new();
        lookup::find_version_tag(self, region, event_id, is_bulk_op, &interrupt)
            .await
            .into_version_tag()
    }

    /// Like [`Tessera::find_version_tag`], but cancelling `interrupt` abandons the wait
    /// and yields [`LookupOutcome::Undetermined`].
    pub async fn find_version_tag_interruptible(
        &self,
        region: &dyn Region,
        event_id: &EventId,
        is_bulk_op: bool,
        interrupt: &CancellationToken,
    ) -> LookupOutcome {
        lookup::find_version_tag(self, region, event_id, is_bulk_op, interrupt).await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop sending, release every waiting operation and close the hosted cache. Idempotent.
    pub fn shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }
        debug!(member = %self.member_id, in_flight = self.replies.in_flight(), "member shutting down");

        if let Some(cache) = self.cache() {
            cache.close();
        }
        self.replies.shutdown();
        self.backend.shutdown();
        self.tracker.close();
    }

    /// Shut down and wait for spawned handlers to finish.
    pub async fn shutdown_and_wait(&self) {
        self.shutdown();
        self.tracker.wait().await;
    }
}

impl std::fmt::Debug for Tessera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tessera")
            .field("member_id", &self.member_id)
            .field("replies", &self.replies)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

/// The operation a message opens a reply wait for, if any.
fn awaiting_processor(message: &DistributionMessage) -> Option<ProcessorId> {
    match message {
        DistributionMessage::FindVersionTag(request) => Some(request.processor_id()),
        DistributionMessage::Reply(_) => None,
    }
}

/// Turns a failed delivery into a departure for the operation awaiting the target's reply.
struct SendFailureHandler {
    replies: Arc<ReplyRegistry>,
    awaiting: Option<ProcessorId>,
    target: MemberId,
}

impl TransportErrorHandler for SendFailureHandler {
    fn on_error(&self, _header: Bytes, _payload: Bytes, error: String) {
        warn!(target_member = %self.target, %error, "message delivery failed");
        if let Some(processor_id) = self.awaiting {
            self.replies.deliver_departure(processor_id, self.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{FindVersionTagMessage, ReplyBody};
    use crate::replies::{ReplyAggregator, ReplyCoordinator, ReplySink, WaitOutcome};
    use parking_lot::Mutex;
    use std::sync::Weak;
    use tessera_backend::MemoryNetwork;

    struct Count(usize);

    impl ReplyAggregator for Count {
        type Output = usize;

        fn accept(&mut self, _sender: MemberId, _body: ReplyBody) -> bool {
            self.0 += 1;
            false
        }

        fn take_result(&mut self) -> usize {
            self.0
        }
    }

    async fn member(network: &MemoryNetwork) -> Arc<Tessera> {
        Tessera::builder()
            .add_transport(network.transport())
            .config(TesseraConfig::default())
            .build()
            .await
            .unwrap()
    }

    fn request(processor_id: ProcessorId) -> DistributionMessage {
        DistributionMessage::FindVersionTag(FindVersionTagMessage::new(
            processor_id,
            "/r",
            EventId::new(b"p".to_vec(), 1, 1),
            false,
        ))
    }

    #[tokio::test]
    async fn builder_uses_fixed_member_id() {
        let network = MemoryNetwork::new();
        let id = MemberId::new_v4();
        let system = Tessera::builder()
            .add_transport(network.transport())
            .member_id(id)
            .config(TesseraConfig::default())
            .build()
            .await
            .unwrap();
        assert_eq!(system.member_id(), id);
        assert!(system.membership().is_live(id));
    }

    #[tokio::test]
    async fn builder_requires_a_transport() {
        let result = Tessera::builder()
            .config(TesseraConfig::default())
            .build()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unregistered_recipients_are_reported() {
        let network = MemoryNetwork::new();
        let a = member(&network).await;
        let b = member(&network).await;
        let stranger = MemberId::new_v4();
        a.register_peer(b.member_id()).unwrap();

        let unroutable = a
            .put_outgoing([b.member_id(), stranger], &request(ProcessorId::new(1)))
            .unwrap();
        assert_eq!(unroutable, HashSet::from([stranger]));
    }

    #[tokio::test]
    async fn delivery_failure_counts_as_departure() {
        let network = MemoryNetwork::new();
        let a = member(&network).await;
        let b = member(&network).await;
        a.register_peer(b.member_id()).unwrap();
        b.shutdown();

        let coordinator = ReplyCoordinator::open(a.replies(), [b.member_id()], Count(0));
        let unroutable = a
            .put_outgoing([b.member_id()], &request(coordinator.processor_id()))
            .unwrap();
        assert!(unroutable.is_empty());

        assert_eq!(
            coordinator.wait(&CancellationToken::new()).await,
            WaitOutcome::Exhausted(0)
        );
    }

    #[tokio::test]
    async fn sending_after_shutdown_fails() {
        let network = MemoryNetwork::new();
        let a = member(&network).await;
        let cache = Arc::new(RegionCache::new());
        a.install_cache(cache.clone());

        a.shutdown_and_wait().await;
        assert!(a.is_shutting_down());
        assert!(cache.is_closed());
        assert!(matches!(
            a.put_outgoing([MemberId::new_v4()], &request(ProcessorId::new(1))),
            Err(SendError::ShuttingDown)
        ));
        // second call is a no-op
        a.shutdown();
    }

    #[tokio::test]
    async fn departed_peer_is_unrouted() {
        let network = MemoryNetwork::new();
        let a = member(&network).await;
        let b = member(&network).await;
        a.register_peer(b.member_id()).unwrap();

        a.member_departed(b.member_id());
        assert!(!a.membership().is_live(b.member_id()));
        let unroutable = a
            .put_outgoing([b.member_id()], &request(ProcessorId::new(1)))
            .unwrap();
        assert_eq!(unroutable, HashSet::from([b.member_id()]));
    }

    /// Records whether the departed member was still routable when the departure arrived.
    struct RouteOnDeparture {
        system: Weak<Tessera>,
        routed: Mutex<Option<bool>>,
    }

    impl ReplySink for RouteOnDeparture {
        fn on_reply(&self, _sender: MemberId, _body: ReplyBody) {}

        fn on_departure(&self, member: MemberId) {
            let system = self.system.upgrade().unwrap();
            let unroutable = system
                .put_outgoing([member], &request(ProcessorId::new(1)))
                .unwrap();
            *self.routed.lock() = Some(!unroutable.contains(&member));
        }
    }

    #[tokio::test]
    async fn route_is_removed_before_waiters_are_released() {
        let network = MemoryNetwork::new();
        let a = member(&network).await;
        let b = member(&network).await;
        a.register_peer(b.member_id()).unwrap();

        let sink = Arc::new(RouteOnDeparture {
            system: Arc::downgrade(&a),
            routed: Mutex::new(None),
        });
        let processor_id = a.replies().register(sink.clone());
        a.member_departed(b.member_id());

        assert_eq!(*sink.routed.lock(), Some(false));
        a.replies().remove(processor_id);
    }
}

// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use tessera_backend::MemberId;

use crate::messages::{FindVersionTagMessage, ReplyMessage};
use crate::region::{RegionCache, RegionError};
use crate::system::{SendError, Tessera};
use crate::version::VersionTag;

/// Look up the tag this member recorded for the requested event.
///
/// A missing cache or an unknown region is not an error: this member simply has no
/// record. A tag that is found is stamped with the region's version member before it
/// is returned.
pub fn find_local_version_tag(
    cache: Option<&RegionCache>,
    request: &FindVersionTagMessage,
) -> Result<Option<VersionTag>, RegionError> {
    let Some(cache) = cache else {
        return Ok(None);
    };
    let Some(region) = cache.region_by_path_for_processing(request.region_path())? else {
        return Ok(None);
    };

    let tag = if request.is_bulk_op() {
        region.find_version_tag_for_client_bulk_op(request.event_id())?
    } else {
        region.find_version_tag_for_client_event(request.event_id())?
    };

    Ok(tag.map(|mut tag| {
        tag.replace_null_ids(region.version_member());
        tag
    }))
}

/// Answer a lookup request from `sender`.
///
/// Every outcome produces a reply; failures and panics in region code degrade to an empty
/// tag. The reply is only skipped when this member is itself shutting down, in which case
/// the requester sees this member depart.
pub(crate) fn process_find_version_tag(
    system: &Tessera,
    sender: MemberId,
    request: FindVersionTagMessage,
) {
    let cache = system.cache();

    let tag = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        find_local_version_tag(cache.as_deref(), &request)
    })) {
        Ok(Ok(tag)) => tag,
        Ok(Err(RegionError::CacheClosed)) => {
            tracing::debug!(%request, "cache closing; answering without a tag");
            None
        }
        Ok(Err(e)) => {
            tracing::warn!(%request, error = %e, "version tag lookup failed; answering without a tag");
            None
        }
        Err(panic) => {
            tracing::error!(%request, panic = panic_message(panic.as_ref()), "version tag lookup panicked; answering without a tag");
            None
        }
    };

    let reply = ReplyMessage::version_tag(request.processor_id(), tag);
    tracing::trace!(%sender, %reply, "answering version tag lookup");

    match system.reply_to(sender, reply) {
        Ok(()) => {}
        Err(SendError::ShuttingDown) => {
            tracing::debug!(%sender, %request, "not answering version tag lookup: shutting down");
        }
        Err(e) => {
            tracing::warn!(%sender, %request, error = %e, "failed to answer version tag lookup");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TesseraConfig;
    use crate::lookup::VersionTagAggregator;
    use crate::region::{LocalRegion, Region, RegionTopology};
    use crate::replies::{ProcessorId, WaitOutcome};
    use crate::version::EventId;
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;
    use tessera_backend::MemoryNetwork;
    use tokio_util::sync::CancellationToken;

    fn event() -> EventId {
        EventId::new(b"client-1".to_vec(), 3, 17)
    }

    fn request(path: &str, is_bulk_op: bool) -> FindVersionTagMessage {
        FindVersionTagMessage::new(ProcessorId::new(9), path, event(), is_bulk_op)
    }

    fn cache_with_region() -> (Arc<RegionCache>, Arc<LocalRegion>, MemberId) {
        let local = MemberId::new_v4();
        let region = Arc::new(LocalRegion::replicated("/orders", local));
        region
            .history()
            .record_client_event(event(), VersionTag::new(7, 70));
        region
            .history()
            .record_client_bulk_op(event(), VersionTag::new(8, 80));

        let cache = Arc::new(RegionCache::new());
        cache.add_region(region.clone());
        (cache, region, local)
    }

    #[rstest]
    #[case(false, 7)]
    #[case(true, 8)]
    fn bulk_flag_selects_ledger(#[case] is_bulk_op: bool, #[case] expected: u32) {
        let (cache, _, local) = cache_with_region();
        let tag = find_local_version_tag(Some(&*cache), &request("/orders", is_bulk_op))
            .unwrap()
            .unwrap();
        assert_eq!(tag.entry_version(), expected);
        assert_eq!(tag.member_id(), Some(local));
        assert!(tag.is_canonical());
    }

    #[test]
    fn missing_cache_or_region_is_not_an_error() {
        let (cache, _, _) = cache_with_region();
        assert_eq!(find_local_version_tag(None, &request("/orders", false)).unwrap(), None);
        assert_eq!(
            find_local_version_tag(Some(&*cache), &request("/unknown", false)).unwrap(),
            None
        );
    }

    #[test]
    fn unrecorded_event_is_absent() {
        let (cache, _, _) = cache_with_region();
        let other = FindVersionTagMessage::new(
            ProcessorId::new(1),
            "/orders",
            EventId::new(b"client-2".to_vec(), 0, 0),
            false,
        );
        assert_eq!(find_local_version_tag(Some(&*cache), &other).unwrap(), None);
    }

    #[test]
    fn region_failures_surface_as_errors() {
        let (cache, region, _) = cache_with_region();
        region.destroy();
        assert!(matches!(
            find_local_version_tag(Some(&*cache), &request("/orders", false)),
            Err(RegionError::Destroyed(_))
        ));

        cache.close();
        assert!(matches!(
            find_local_version_tag(Some(&*cache), &request("/orders", false)),
            Err(RegionError::CacheClosed)
        ));
    }

    struct PanickingRegion(MemberId);

    impl Region for PanickingRegion {
        fn full_path(&self) -> &str {
            "/boom"
        }

        fn topology(&self) -> RegionTopology<'_> {
            unimplemented!("not used by the handler")
        }

        fn version_member(&self) -> MemberId {
            self.0
        }

        fn find_version_tag_for_client_event(
            &self,
            _event_id: &EventId,
        ) -> Result<Option<VersionTag>, RegionError> {
            panic!("ledger corrupted")
        }

        fn find_version_tag_for_client_bulk_op(
            &self,
            _event_id: &EventId,
        ) -> Result<Option<VersionTag>, RegionError> {
            Err(RegionError::Other(anyhow::anyhow!("ledger unavailable")))
        }
    }

    #[test]
    fn panic_message_is_extracted() {
        let result = std::panic::catch_unwind(|| {
            let region = PanickingRegion(MemberId::new_v4());
            let _ = region.find_version_tag_for_client_event(&event());
        });
        let panic = result.unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "ledger corrupted");
    }

    fn panicking_cache() -> Arc<RegionCache> {
        let cache = Arc::new(RegionCache::new());
        cache.add_region(Arc::new(PanickingRegion(MemberId::new_v4())));
        cache
    }

    async fn member(network: &MemoryNetwork) -> Arc<Tessera> {
        Tessera::new(MemberId::new_v4(), vec![network.transport()], TesseraConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn handler_answers_even_when_region_panics() {
        let network = MemoryNetwork::new();
        let requester = member(&network).await;
        let responder = member(&network).await;
        requester.register_peer(responder.member_id()).unwrap();
        responder.register_peer(requester.member_id()).unwrap();
        responder.install_cache(panicking_cache());

        for is_bulk_op in [false, true] {
            let coordinator = requester
                .membership()
                .open_coordinator([responder.member_id()], VersionTagAggregator::default());
            let request = FindVersionTagMessage::new(
                coordinator.processor_id(),
                "/boom",
                event(),
                is_bulk_op,
            );
            process_find_version_tag(&responder, requester.member_id(), request);

            let outcome = tokio::time::timeout(
                Duration::from_secs(1),
                coordinator.wait(&CancellationToken::new()),
            )
            .await
            .unwrap();
            assert_eq!(outcome, WaitOutcome::Exhausted(None));
        }
    }

    #[tokio::test]
    async fn responder_stopping_before_answer_resolves_through_departure() {
        let network = MemoryNetwork::new();
        let requester = member(&network).await;
        let responder = member(&network).await;
        requester.register_peer(responder.member_id()).unwrap();
        responder.register_peer(requester.member_id()).unwrap();
        let (cache, _, _) = cache_with_region();
        responder.install_cache(cache);

        let coordinator = requester
            .membership()
            .open_coordinator([responder.member_id()], VersionTagAggregator::default());
        let request =
            FindVersionTagMessage::new(coordinator.processor_id(), "/orders", event(), false);

        // received, then the responder stops before it can answer
        responder.shutdown();
        process_find_version_tag(&responder, requester.member_id(), request);

        let interrupt = CancellationToken::new();
        let waiter = tokio::spawn(async move { coordinator.wait(&interrupt).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "a stopped responder sends no answer");
        assert_eq!(requester.replies().in_flight(), 1);

        requester.member_departed(responder.member_id());
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Exhausted(None));
        assert_eq!(requester.replies().in_flight(), 0);
    }
}

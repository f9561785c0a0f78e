//! Vote ledger and score aggregation
//!
//! The store applies each vote and reconciles the target's counters from the
//! ledger in one atomic unit; this layer owns authorization, ban checks,
//! metrics and change notification.

use super::propagation::{tables, ChangeNotifier};
use super::{ensure_not_banned, locate_target};
use crate::domain::{
    CastVoteRequest, RecomputeCountersRequest, Viewer, VoteCounters, VoteDirection, VoteOutcome,
};
use crate::error::{ForumError, Result};
use crate::metrics::VOTES_TOTAL;
use crate::repository::ForumStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub struct VoteService {
    store: Arc<dyn ForumStore>,
    notifier: ChangeNotifier,
}

impl VoteService {
    pub fn new(store: Arc<dyn ForumStore>, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    /// Insert, retract or flip the caller's vote and return the new score
    pub async fn cast_vote(&self, viewer: &Viewer, request: CastVoteRequest) -> Result<VoteOutcome> {
        let voter_id = viewer.require_user("vote")?;
        let direction =
            VoteDirection::try_from(request.direction).map_err(ForumError::Validation)?;
        ensure_not_banned(self.store.as_ref(), viewer, "voting").await?;

        let result = self
            .store
            .cast_vote(voter_id, request.target_id, request.target_kind, direction)
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let label = if e.is_retryable() { "conflict" } else { "rejected" };
                VOTES_TOTAL.with_label_values(&[label]).inc();
                warn!(
                    voter_id = %voter_id,
                    target_id = %request.target_id,
                    error = %e,
                    "Vote refused"
                );
                return Err(e);
            }
        };

        VOTES_TOTAL
            .with_label_values(&[outcome.transition.label()])
            .inc();
        info!(
            voter_id = %voter_id,
            target_id = %request.target_id,
            target_kind = %request.target_kind,
            transition = outcome.transition.label(),
            net_score = outcome.net_score,
            "Vote recorded"
        );

        let (post_id, community_id) =
            locate_target(self.store.as_ref(), request.target_id, request.target_kind).await;
        self.notifier
            .vote_changed(
                voter_id,
                request.target_id,
                request.target_kind,
                post_id,
                community_id,
                outcome.net_score,
            )
            .await;

        Ok(outcome)
    }

    /// Moderator-only reconciliation of a target's counters with its ledger
    pub async fn recompute_counters(
        &self,
        viewer: &Viewer,
        request: RecomputeCountersRequest,
    ) -> Result<VoteCounters> {
        let moderator_id = viewer.require_moderator()?;
        let counters = self
            .store
            .recompute_counters(request.target_id, request.target_kind)
            .await?;

        info!(
            moderator_id = %moderator_id,
            target_id = %request.target_id,
            upvotes = counters.upvotes,
            downvotes = counters.downvotes,
            "Counters recomputed"
        );

        let (post_id, community_id) =
            locate_target(self.store.as_ref(), request.target_id, request.target_kind).await;
        self.notifier
            .row_changed(
                tables::VOTES,
                request.target_id,
                json!({
                    "target_kind": request.target_kind,
                    "post_id": post_id,
                    "community_id": community_id,
                }),
            )
            .await;

        Ok(counters)
    }
}

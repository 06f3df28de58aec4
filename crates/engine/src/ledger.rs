//! Engagement ledger: per (user, content) vote, save and report state.
//!
//! Every mutation is read, transition, conditional write. The write is
//! checked against the record version read at the start, and a lost race
//! re-reads and re-runs the transition a bounded number of times. A
//! transition that changes nothing surfaces as [`EngineError::NoOp`].

use std::collections::HashMap;

use hive_auth::Caller;
use hive_core::validation::{validate_batch_ids, validate_report_reason};
use hive_core::{
    ContentId, CounterDelta, EngagementRecord, ReportAction, ScopeId, Transition, VoteAction,
};
use hive_storage::StorageError;

use crate::notify::{dispatch, Notification};
use crate::{Engine, EngineError, EngineResult, Target};

/// One of the four vote operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRequest {
    pub up: bool,
    pub increment: bool,
}

impl VoteRequest {
    pub const ADD_UP: Self = Self {
        up: true,
        increment: true,
    };
    pub const ADD_DOWN: Self = Self {
        up: false,
        increment: true,
    };
    pub const TAKE_UP: Self = Self {
        up: true,
        increment: false,
    };
    pub const TAKE_DOWN: Self = Self {
        up: false,
        increment: false,
    };

    #[must_use]
    pub fn action(&self) -> VoteAction {
        VoteAction::from_up(self.up)
    }
}

impl Engine {
    /// The caller's record for one item. `NotFound` when they never engaged.
    pub async fn get_engagement(
        &self,
        caller: &Caller,
        target: Target,
    ) -> EngineResult<EngagementRecord> {
        self.authorize(caller, target.hive_id).await?;
        let record = self
            .call(
                self.storage
                    .get_engagement(&caller.user_id, target.content.content_id),
            )
            .await?;
        if record.hive_id != target.hive_id {
            return Err(EngineError::NotFound);
        }
        Ok(record)
    }

    /// The caller's records for up to 100 items of one hive. Items without a
    /// record are missing from the map.
    pub async fn batch_get_engagement(
        &self,
        caller: &Caller,
        hive_id: ScopeId,
        content_ids: &[ContentId],
    ) -> EngineResult<HashMap<ContentId, EngagementRecord>> {
        self.authorize(caller, hive_id).await?;
        validate_batch_ids(content_ids)?;
        let mut records = self
            .call(
                self.storage
                    .batch_get_engagement(&caller.user_id, content_ids),
            )
            .await?;
        records.retain(|_, record| record.hive_id == hive_id);
        Ok(records)
    }

    /// Applies a vote. The record and the item's counters commit together,
    /// so a failed vote leaves both untouched and can be retried.
    pub async fn apply_vote(
        &self,
        caller: &Caller,
        target: Target,
        vote: VoteRequest,
    ) -> EngineResult<EngagementRecord> {
        self.authorize(caller, target.hive_id).await?;
        let item = self.load_target(target).await?;
        let at = self.clock.now();

        let mut conflicts = 0;
        let record = loop {
            let mut record = self.current_record(caller, target).await?;
            let delta = match record.apply_vote(vote.action(), vote.increment, at) {
                Transition::Apply(delta) => delta,
                Transition::NoOp => return Err(EngineError::NoOp),
            };

            match self
                .call(self.storage.commit_vote(
                    &record,
                    target.content,
                    &CounterDelta::from(delta),
                ))
                .await
            {
                Ok((stored, item)) => {
                    tracing::debug!(
                        user = %caller.user_id,
                        content = %target.content.content_id,
                        up = delta.up,
                        down = delta.down,
                        up_votes = item.up_vote_count,
                        down_votes = item.down_vote_count,
                        "vote applied"
                    );
                    break stored;
                }
                Err(StorageError::VersionConflict)
                    if conflicts < self.config.write_conflict_retries =>
                {
                    conflicts += 1;
                    tracing::debug!(user = %caller.user_id, conflicts, "vote write conflict");
                }
                Err(error) => return Err(error.into()),
            }
        };

        if vote == VoteRequest::ADD_UP && item.author_id != caller.user_id {
            dispatch(
                &self.notifier,
                Notification::UpVoted {
                    hive_id: target.hive_id,
                    content: target.content,
                    voter_id: caller.user_id.clone(),
                    content_author_id: item.author_id,
                },
            );
        }
        Ok(record)
    }

    pub async fn save(&self, caller: &Caller, target: Target) -> EngineResult<EngagementRecord> {
        self.set_saved(caller, target, true).await
    }

    pub async fn unsave(&self, caller: &Caller, target: Target) -> EngineResult<EngagementRecord> {
        self.set_saved(caller, target, false).await
    }

    pub async fn report(
        &self,
        caller: &Caller,
        target: Target,
        reason: Option<String>,
    ) -> EngineResult<EngagementRecord> {
        validate_report_reason(reason.as_deref())?;
        self.apply_report(caller, target, ReportAction::Report { reason })
            .await
    }

    pub async fn unreport(&self, caller: &Caller, target: Target) -> EngineResult<EngagementRecord> {
        self.apply_report(caller, target, ReportAction::Unreport)
            .await
    }

    async fn set_saved(
        &self,
        caller: &Caller,
        target: Target,
        saved: bool,
    ) -> EngineResult<EngagementRecord> {
        self.authorize(caller, target.hive_id).await?;
        self.load_target(target).await?;
        let (record, ()) = self
            .write_engagement(caller, target, |record| record.apply_save(saved))
            .await?;
        tracing::debug!(
            user = %caller.user_id,
            content = %target.content.content_id,
            saved,
            "save state changed"
        );
        Ok(record)
    }

    /// Report transitions commit the record and the item's report counter
    /// together, so the review check and the write see the same item.
    async fn apply_report(
        &self,
        caller: &Caller,
        target: Target,
        action: ReportAction,
    ) -> EngineResult<EngagementRecord> {
        self.authorize(caller, target.hive_id).await?;
        let mut conflicts = 0;
        loop {
            let item = self.load_target(target).await?;
            let mut record = self.current_record(caller, target).await?;
            let outcome = match record.apply_report(action.clone(), item.reviewed)? {
                Transition::Apply(outcome) => outcome,
                Transition::NoOp => return Err(EngineError::NoOp),
            };

            match self
                .call(
                    self.storage
                        .commit_report(&record, target.content, outcome),
                )
                .await
            {
                Ok((stored, item)) => {
                    tracing::debug!(
                        user = %caller.user_id,
                        content = %target.content.content_id,
                        ?outcome,
                        reported = item.reported_count,
                        obfuscated = item.obfuscated,
                        "report applied"
                    );
                    return Ok(stored);
                }
                Err(StorageError::VersionConflict)
                    if conflicts < self.config.write_conflict_retries =>
                {
                    conflicts += 1;
                    tracing::debug!(user = %caller.user_id, conflicts, "report write conflict");
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Runs `transition` against the current record and writes the result
    /// conditionally, re-reading on version conflicts.
    async fn write_engagement<T, F>(
        &self,
        caller: &Caller,
        target: Target,
        mut transition: F,
    ) -> EngineResult<(EngagementRecord, T)>
    where
        F: FnMut(&mut EngagementRecord) -> Transition<T>,
    {
        let mut conflicts = 0;
        loop {
            let mut record = self.current_record(caller, target).await?;
            let change = match transition(&mut record) {
                Transition::Apply(change) => change,
                Transition::NoOp => return Err(EngineError::NoOp),
            };

            match self.call(self.storage.put_engagement(&record)).await {
                Ok(stored) => return Ok((stored, change)),
                Err(StorageError::VersionConflict)
                    if conflicts < self.config.write_conflict_retries =>
                {
                    conflicts += 1;
                    tracing::debug!(user = %caller.user_id, conflicts, "engagement write conflict");
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// The stored record, or a fresh neutral one for a first engagement.
    async fn current_record(
        &self,
        caller: &Caller,
        target: Target,
    ) -> EngineResult<EngagementRecord> {
        match self
            .call(
                self.storage
                    .get_engagement(&caller.user_id, target.content.content_id),
            )
            .await
        {
            Ok(record) => Ok(record),
            Err(error) if error.is_not_found() => Ok(EngagementRecord::neutral(
                caller.user_id.clone(),
                target.content,
                target.hive_id,
            )),
            Err(error) => Err(error.into()),
        }
    }
}

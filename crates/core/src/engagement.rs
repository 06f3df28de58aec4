//! Per-user engagement state and the transition rules applied to it.
//!
//! Everything in here is pure: the engine reads a record, runs one of the
//! transitions below, and persists the result together with the counter
//! delta it produced.

use serde::{Deserialize, Serialize};

use crate::{ContentId, ContentItem, ContentKey, ScopeId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngagementKey {
    pub user_id: UserId,
    pub content_id: ContentId,
}

/// Vote/save/report state of one user on one content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub user_id: UserId,
    pub content_id: ContentId,
    pub scope_id: ScopeId,
    pub hive_id: ScopeId,
    pub up_voted: bool,
    pub down_voted: bool,
    pub saved: bool,
    pub reported: bool,
    pub voted_at: Option<i64>,
    pub reported_reason: Option<String>,
    /// Write version; 0 for a record that has never been stored.
    pub version: i64,
}

impl EngagementRecord {
    #[must_use]
    pub fn neutral(user_id: UserId, content: ContentKey, hive_id: ScopeId) -> Self {
        Self {
            user_id,
            content_id: content.content_id,
            scope_id: content.scope_id,
            hive_id,
            up_voted: false,
            down_voted: false,
            saved: false,
            reported: false,
            voted_at: None,
            reported_reason: None,
            version: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> EngagementKey {
        EngagementKey {
            user_id: self.user_id.clone(),
            content_id: self.content_id,
        }
    }

    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.version > 0
    }

    /// A record with every flag cleared is equivalent to no record at all.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        !(self.up_voted || self.down_voted || self.saved || self.reported)
    }

    #[must_use]
    pub fn vote_state(&self) -> VoteState {
        match (self.up_voted, self.down_voted) {
            (true, _) => VoteState::UpVoted,
            (false, true) => VoteState::DownVoted,
            (false, false) if self.is_stored() => VoteState::Neutral,
            (false, false) => VoteState::Absent,
        }
    }

    /// Runs the vote transition and, unless it is a no-op, updates the flags
    /// and the vote timestamp.
    pub fn apply_vote(
        &mut self,
        action: VoteAction,
        increment: bool,
        at: i64,
    ) -> Transition<VoteDelta> {
        let transition = vote_transition(self.up_voted, self.down_voted, action, increment);
        if let Transition::Apply(_) = transition {
            match (action, increment) {
                (VoteAction::Up, true) => {
                    self.up_voted = true;
                    self.down_voted = false;
                }
                (VoteAction::Down, true) => {
                    self.down_voted = true;
                    self.up_voted = false;
                }
                (VoteAction::Up, false) => self.up_voted = false,
                (VoteAction::Down, false) => self.down_voted = false,
            }
            self.voted_at = Some(at);
        }
        transition
    }

    pub fn apply_save(&mut self, saved: bool) -> Transition<()> {
        if self.saved == saved {
            return Transition::NoOp;
        }
        self.saved = saved;
        Transition::Apply(())
    }

    /// Runs the report transition against the target's review state.
    pub fn apply_report(
        &mut self,
        action: ReportAction,
        content_reviewed: bool,
    ) -> Result<Transition<ReportOutcome>, ReportRejected> {
        let transition = report_transition(self.reported, &action, content_reviewed)?;
        if let Transition::Apply(outcome) = transition {
            match outcome {
                ReportOutcome::Added => {
                    self.reported = true;
                    self.reported_reason = match action {
                        ReportAction::Report { reason } => reason,
                        ReportAction::Unreport => None,
                    };
                }
                ReportOutcome::Removed => {
                    self.reported = false;
                    self.reported_reason = None;
                }
            }
        }
        Ok(transition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteState {
    Absent,
    Neutral,
    UpVoted,
    DownVoted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteAction {
    Up,
    Down,
}

impl VoteAction {
    #[must_use]
    pub fn from_up(up: bool) -> Self {
        if up {
            Self::Up
        } else {
            Self::Down
        }
    }
}

/// Result of a transition: either a change to apply or "already in this state".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<T> {
    Apply(T),
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteDelta {
    pub up: i64,
    pub down: i64,
}

/// Vote delta table. Never leaves both flags set; redundant actions are no-ops.
#[must_use]
pub fn vote_transition(
    up_voted: bool,
    down_voted: bool,
    action: VoteAction,
    increment: bool,
) -> Transition<VoteDelta> {
    let (current, opposite) = match action {
        VoteAction::Up => (up_voted, down_voted),
        VoteAction::Down => (down_voted, up_voted),
    };
    let (same, other) = match (increment, current, opposite) {
        (true, true, _) => return Transition::NoOp,
        (true, false, false) => (1, 0),
        (true, false, true) => (1, -1),
        (false, true, _) => (-1, 0),
        (false, false, _) => return Transition::NoOp,
    };
    Transition::Apply(match action {
        VoteAction::Up => VoteDelta {
            up: same,
            down: other,
        },
        VoteAction::Down => VoteDelta {
            up: other,
            down: same,
        },
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportAction {
    Report { reason: Option<String> },
    Unreport,
}

/// Content-side effect of an applied report transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportOutcome {
    Added,
    Removed,
}

impl ReportOutcome {
    /// Applies the report counter and obfuscation rules to the target item.
    pub fn apply_to(self, item: &mut ContentItem) {
        match self {
            Self::Added => {
                item.reported_count = item.reported_count.saturating_add(1);
                if !item.reviewed {
                    item.obfuscated = true;
                }
            }
            Self::Removed => {
                item.reported_count = item.reported_count.saturating_sub(1).max(0);
                if item.reported_count == 0 && !item.reviewed {
                    item.obfuscated = false;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("content has already been reviewed")]
pub struct ReportRejected;

pub fn report_transition(
    reported: bool,
    action: &ReportAction,
    content_reviewed: bool,
) -> Result<Transition<ReportOutcome>, ReportRejected> {
    match action {
        ReportAction::Report { .. } if content_reviewed => Err(ReportRejected),
        ReportAction::Report { .. } if reported => Ok(Transition::NoOp),
        ReportAction::Report { .. } => Ok(Transition::Apply(ReportOutcome::Added)),
        ReportAction::Unreport if reported => Ok(Transition::Apply(ReportOutcome::Removed)),
        ReportAction::Unreport => Ok(Transition::NoOp),
    }
}

/// Signed change to the aggregate counters of one content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterDelta {
    pub up_votes: i64,
    pub down_votes: i64,
    pub comments: i64,
    pub reports: i64,
}

impl CounterDelta {
    #[must_use]
    pub fn comments(delta: i64) -> Self {
        Self {
            comments: delta,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the delta with a floor of zero on every counter.
    pub fn apply_to(&self, item: &mut ContentItem) {
        item.up_vote_count = floor_add(item.up_vote_count, self.up_votes);
        item.down_vote_count = floor_add(item.down_vote_count, self.down_votes);
        item.comment_count = floor_add(item.comment_count, self.comments);
        item.reported_count = floor_add(item.reported_count, self.reports);
    }
}

impl From<VoteDelta> for CounterDelta {
    fn from(value: VoteDelta) -> Self {
        Self {
            up_votes: value.up,
            down_votes: value.down,
            ..Self::default()
        }
    }
}

fn floor_add(count: i64, delta: i64) -> i64 {
    count.saturating_add(delta).max(0)
}

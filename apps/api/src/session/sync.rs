//! Live Synchronization Engine: the per-session decision logic applied to
//! every inbound snapshot of the subscribed record.
//!
//! Per snapshot, in order:
//! 1. Projection: normalize the record and decide, per `ConflictPolicy`,
//!    whether it replaces the form wholesale (never field-by-field).
//! 2. Outcome classification: success / failure / pending / idle.
//! 3. Notification de-duplication: one terminal notification per attempt.
//! 4. Progress coupling: what the estimator should do.
//!
//! The engine is synchronous and owns no timers; the session actor executes
//! the returned `SnapshotEffects`. Re-applying an identical snapshot is a
//! no-op apart from the projection, which is a pure function of the record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::resume::ResumeRecord;
use crate::models::user::Identity;
use crate::resume::{normalize, FormState};
use crate::session::events::{messages, Notification, SyncStatus};

/// Pipeline outcome as seen in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
    /// A document is attached and no terminal write has landed yet.
    Pending,
    /// Manual draft; nothing to track.
    Idle,
}

impl Outcome {
    pub fn status(&self) -> SyncStatus {
        match self {
            Outcome::Success => SyncStatus::Done,
            Outcome::Failure(_) => SyncStatus::Errored,
            Outcome::Pending => SyncStatus::Pending,
            Outcome::Idle => SyncStatus::Idle,
        }
    }
}

pub fn classify(record: &ResumeRecord) -> Outcome {
    if record.parsing_done && record.parsing_error.is_none() {
        Outcome::Success
    } else if let Some(error) = &record.parsing_error {
        Outcome::Failure(error.clone())
    } else if record.storage_path.is_some() {
        Outcome::Pending
    } else {
        Outcome::Idle
    }
}

/// What to do with a snapshot that arrives while the form has unsaved edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The snapshot replaces the form; unsaved edits are lost.
    DiscardLocal,
    /// The snapshot is dropped; unsaved edits stay.
    KeepLocal,
    /// The snapshot is held until the client accepts or rejects it.
    #[default]
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// The form was replaced by the snapshot.
    Apply,
    /// The snapshot matches what is already persisted; nothing new arrived.
    Ignore,
    /// Local edits were kept; the snapshot was dropped.
    Reject,
    /// The snapshot is held pending a client decision.
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    Start,
    Finish { success: bool },
    Halt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEffects {
    pub decision: MergeDecision,
    pub outcome: Outcome,
    pub notification: Option<Notification>,
    pub progress: ProgressAction,
}

pub struct SyncEngine {
    identity: Identity,
    policy: ConflictPolicy,
    form: FormState,
    /// Projection of the last snapshot seen, i.e. what is persisted.
    baseline: Option<FormState>,
    held: Option<FormState>,
    dirty: bool,
    /// Attempt (record, storage path) whose terminal outcome was announced.
    notified: Option<(Uuid, Option<String>)>,
    /// Storage path of the pending attempt last observed.
    attempt: Option<String>,
}

impl SyncEngine {
    pub fn new(identity: Identity, policy: ConflictPolicy) -> Self {
        let form = normalize(None, &identity);
        Self {
            identity,
            policy,
            form,
            baseline: None,
            held: None,
            dirty: false,
            notified: None,
            attempt: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn baseline(&self) -> Option<&FormState> {
        self.baseline.as_ref()
    }

    pub fn held(&self) -> Option<&FormState> {
        self.held.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Targets a different record. Everything tied to the previous one goes.
    pub fn attach(&mut self, record_id: Uuid) {
        self.detach();
        self.dirty = false;
        self.baseline = None;
        self.form.record_id = Some(record_id);
    }

    /// Unsubscribed: the notification marker and any held snapshot are
    /// dropped. The form itself stays.
    pub fn detach(&mut self) {
        self.notified = None;
        self.attempt = None;
        self.held = None;
    }

    pub fn apply(&mut self, record: &ResumeRecord) -> SnapshotEffects {
        let incoming = normalize(Some(record), &self.identity);
        let decision = self.merge(incoming);

        let outcome = classify(record);
        let mut notification = None;
        match &outcome {
            Outcome::Pending => {
                if self.attempt != record.storage_path {
                    self.attempt = record.storage_path.clone();
                    self.notified = None;
                }
            }
            Outcome::Success | Outcome::Failure(_) => {
                let key = (record.id, record.storage_path.clone());
                // Manual records are "done" without any attempt to announce.
                if record.storage_path.is_some() && self.notified.as_ref() != Some(&key) {
                    notification = Some(match &outcome {
                        Outcome::Success => Notification::success(messages::PARSE_SUCCEEDED),
                        _ => Notification::error(messages::PARSE_FAILED),
                    });
                    self.notified = Some(key);
                }
            }
            Outcome::Idle => {}
        }

        let progress = match &outcome {
            Outcome::Pending => ProgressAction::Start,
            Outcome::Success => ProgressAction::Finish { success: true },
            Outcome::Failure(_) => ProgressAction::Finish { success: false },
            Outcome::Idle => ProgressAction::Halt,
        };

        SnapshotEffects {
            decision,
            outcome,
            notification,
            progress,
        }
    }

    fn merge(&mut self, incoming: FormState) -> MergeDecision {
        let decision = if !self.dirty {
            MergeDecision::Apply
        } else if self.baseline.as_ref() == Some(&incoming) {
            MergeDecision::Ignore
        } else {
            match self.policy {
                ConflictPolicy::DiscardLocal => MergeDecision::Apply,
                ConflictPolicy::KeepLocal => MergeDecision::Reject,
                ConflictPolicy::Prompt => MergeDecision::Hold,
            }
        };

        match decision {
            MergeDecision::Apply => {
                self.form = incoming.clone();
                self.dirty = false;
                self.held = None;
            }
            MergeDecision::Hold => self.held = Some(incoming.clone()),
            MergeDecision::Ignore | MergeDecision::Reject => {}
        }
        self.baseline = Some(incoming);
        decision
    }

    /// Replaces the local form with the client's edited copy.
    pub fn edit(&mut self, mut form: FormState) {
        // The session, not the client, decides which record is being edited.
        form.record_id = self.form.record_id;
        self.form = form;
        self.dirty = true;
    }

    /// Settles a held snapshot. Returns the new form when it was accepted.
    pub fn resolve_conflict(&mut self, accept: bool) -> Option<&FormState> {
        let held = self.held.take()?;
        if !accept {
            return None;
        }
        self.form = held;
        self.dirty = false;
        Some(&self.form)
    }

    /// The current form was persisted as `record_id`.
    pub fn mark_saved(&mut self, record_id: Uuid) {
        self.form.record_id = Some(record_id);
        self.baseline = Some(self.form.clone());
        self.dirty = false;
    }
}

//! One editing session per signed-in client, run as a single task.
//!
//! The actor owns the `SyncEngine`, the `ProgressEstimator` and the one live
//! record subscription. Commands arrive over an mpsc channel; everything the
//! client should see goes out on a broadcast channel as `SessionEvent`s.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::Identity;
use crate::resume::FormState;
use crate::session::events::{messages, Notification, SessionEvent, SessionPhase, SyncStatus};
use crate::session::progress::ProgressEstimator;
use crate::session::resolve::resolve_active_record;
use crate::session::save::{save_form, SaveReceipt};
use crate::session::sync::{ConflictPolicy, MergeDecision, ProgressAction, SyncEngine};
use crate::store::{ResumeStore, SnapshotEvent, StoreError, Subscription};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

pub enum SessionCommand {
    Edit(FormState),
    ResolveConflict {
        accept: bool,
    },
    Save {
        reply: oneshot::Sender<Result<SaveReceipt, AppError>>,
    },
    Switch {
        resume_id: Uuid,
        reply: oneshot::Sender<Result<(), AppError>>,
    },
    Resubscribe,
    View {
        reply: oneshot::Sender<SessionView>,
    },
    Shutdown,
}

/// Point-in-time view of a session, as returned by `GET /sessions/:id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub phase: SessionPhase,
    pub form: FormState,
    pub dirty: bool,
    pub conflict: Option<FormState>,
    pub policy: ConflictPolicy,
    pub progress: u8,
}

struct SessionActor {
    id: Uuid,
    store: Arc<dyn ResumeStore>,
    engine: SyncEngine,
    estimator: ProgressEstimator,
    phase: SessionPhase,
    subscription: Option<Subscription>,
    events: broadcast::Sender<SessionEvent>,
    commands: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        self.publish(SessionEvent::Phase {
            phase: self.phase.clone(),
        });
        self.resolve().await;

        let mut progress = self.estimator.subscribe();
        loop {
            tokio::select! {
                // Store state and progress are published before any queued command
                // observes the session.
                biased;

                event = next_snapshot(&mut self.subscription) => self.on_snapshot(event).await,
                Ok(()) = progress.changed() => {
                    let percent = *progress.borrow_and_update();
                    self.publish(SessionEvent::Progress { percent });
                }
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
            }
        }

        self.teardown();
    }

    async fn resolve(&mut self) {
        self.set_phase(SessionPhase::ResolvingRecord);
        match resolve_active_record(self.store.as_ref(), self.engine.identity()).await {
            Ok(resolution) => {
                info!("Session {} resolved {:?}", self.id, resolution);
                self.switch_to(resolution.id()).await;
            }
            Err(e) => {
                warn!("Session {} could not resolve a résumé: {e}", self.id);
                self.set_phase(SessionPhase::Unresolved);
                self.notify(Notification::error(messages::LOAD_FAILED));
            }
        }
    }

    /// Tears down the current subscription, then targets `record_id`.
    async fn switch_to(&mut self, record_id: Uuid) {
        self.unsubscribe();
        self.engine.attach(record_id);
        self.open_feed(record_id).await;
    }

    async fn open_feed(&mut self, record_id: Uuid) {
        let user_id = self.engine.identity().user_id;
        match self.store.subscribe(user_id, record_id).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.set_phase(SessionPhase::Subscribed {
                    record_id,
                    status: SyncStatus::Idle,
                });
            }
            Err(e) => {
                warn!("Session {} could not subscribe to {record_id}: {e}", self.id);
                self.set_phase(SessionPhase::Detached { record_id });
                self.notify(Notification::error(messages::CONNECTION_LOST));
            }
        }
    }

    fn unsubscribe(&mut self) {
        self.subscription = None;
        self.engine.detach();
        self.estimator.stop(false);
    }

    async fn on_snapshot(&mut self, event: Option<Result<SnapshotEvent, StoreError>>) {
        match event {
            Some(Ok(SnapshotEvent::Updated(record))) => {
                let effects = self.engine.apply(&record);
                match effects.decision {
                    MergeDecision::Apply => self.publish(SessionEvent::FormReplaced {
                        form: self.engine.form().clone(),
                    }),
                    MergeDecision::Hold => {
                        if let Some(incoming) = self.engine.held().cloned() {
                            self.publish(SessionEvent::ConflictDetected { incoming });
                        }
                    }
                    MergeDecision::Reject => {
                        debug!("Session {} kept local edits over {}", self.id, record.id)
                    }
                    MergeDecision::Ignore => {}
                }

                self.set_phase(SessionPhase::Subscribed {
                    record_id: record.id,
                    status: effects.outcome.status(),
                });
                if let Some(notification) = effects.notification {
                    self.notify(notification);
                }

                match effects.progress {
                    ProgressAction::Start => self.estimator.start(),
                    ProgressAction::Finish { success } if self.estimator.is_running() => {
                        self.estimator.stop(success)
                    }
                    ProgressAction::Halt if self.estimator.is_running() => {
                        self.estimator.stop(false)
                    }
                    _ => {}
                }
            }
            Some(Ok(SnapshotEvent::Missing)) => {
                info!("Session {}: subscribed résumé vanished, re-resolving", self.id);
                self.unsubscribe();
                self.notify(Notification::info(messages::RECORD_VANISHED));
                self.resolve().await;
            }
            Some(Err(e)) => self.lose_feed(&e.to_string()),
            None => self.lose_feed("feed ended"),
        }
    }

    /// Transport failure. The form stays as it was; the notification marker
    /// is kept so a resubscribe does not announce the same outcome twice.
    fn lose_feed(&mut self, reason: &str) {
        warn!("Session {} lost its live feed: {reason}", self.id);
        self.subscription = None;
        self.estimator.stop(false);
        match self.phase.record_id() {
            Some(record_id) => self.set_phase(SessionPhase::Detached { record_id }),
            None => self.set_phase(SessionPhase::Unresolved),
        }
        self.notify(Notification::error(messages::CONNECTION_LOST));
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Edit(form) => self.engine.edit(form),
            SessionCommand::ResolveConflict { accept } => {
                if let Some(form) = self.engine.resolve_conflict(accept).cloned() {
                    self.publish(SessionEvent::FormReplaced { form });
                }
            }
            SessionCommand::Save { reply } => {
                let result = self.save().await;
                let _ = reply.send(result);
            }
            SessionCommand::Switch { resume_id, reply } => {
                let result = self.switch(resume_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::Resubscribe => match &self.phase {
                SessionPhase::Detached { record_id } => {
                    let record_id = *record_id;
                    self.open_feed(record_id).await;
                }
                SessionPhase::Unresolved => self.resolve().await,
                _ => debug!("Session {}: already subscribed", self.id),
            },
            SessionCommand::View { reply } => {
                let _ = reply.send(self.view());
            }
            // Handled by the run loop.
            SessionCommand::Shutdown => {}
        }
    }

    async fn save(&mut self) -> Result<SaveReceipt, AppError> {
        let result = save_form(
            self.store.as_ref(),
            self.engine.identity(),
            self.engine.form(),
            self.engine.baseline(),
        )
        .await;

        match &result {
            Ok(receipt) => {
                self.engine.mark_saved(receipt.record_id);
                self.notify(Notification::success(messages::SAVED));
                if receipt.created {
                    self.switch_to(receipt.record_id).await;
                }
            }
            Err(e) => {
                warn!("Session {} save failed: {e}", self.id);
                self.notify(Notification::error(messages::SAVE_FAILED));
            }
        }
        result
    }

    async fn switch(&mut self, resume_id: Uuid) -> Result<(), AppError> {
        let user_id = self.engine.identity().user_id;
        if self.store.get_resume(user_id, resume_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Résumé {resume_id} not found")));
        }
        self.store.set_latest_resume(user_id, resume_id).await?;
        self.switch_to(resume_id).await;
        Ok(())
    }

    fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id,
            user_id: self.engine.identity().user_id,
            phase: self.phase.clone(),
            form: self.engine.form().clone(),
            dirty: self.engine.is_dirty(),
            conflict: self.engine.held().cloned(),
            policy: self.engine.policy(),
            progress: self.estimator.value(),
        }
    }

    fn teardown(&mut self) {
        self.unsubscribe();
        self.set_phase(SessionPhase::Closed);
        info!("Session {} closed", self.id);
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            self.phase = phase.clone();
            self.publish(SessionEvent::Phase { phase });
        }
    }

    fn notify(&self, notification: Notification) {
        self.publish(SessionEvent::Notification { notification });
    }

    fn publish(&self, event: SessionEvent) {
        // No listeners is fine; the client may not be streaming yet.
        let _ = self.events.send(event);
    }
}

async fn next_snapshot(
    subscription: &mut Option<Subscription>,
) -> Option<Result<SnapshotEvent, StoreError>> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Cheap, cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    /// Shared by every clone of the handle.
    last_active: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    pub fn spawn(
        store: Arc<dyn ResumeStore>,
        identity: Identity,
        policy: ConflictPolicy,
    ) -> Self {
        let id = Uuid::new_v4();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let actor = SessionActor {
            id,
            store,
            engine: SyncEngine::new(identity, policy),
            estimator: ProgressEstimator::new(),
            phase: SessionPhase::ResolvingRecord,
            subscription: None,
            events: event_tx.clone(),
            commands: command_rx,
        };
        tokio::spawn(actor.run());

        Self {
            id,
            commands: command_tx,
            events: event_tx,
            last_active: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Records client activity on the session.
    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the last command, published event or lookup.
    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Whether any client is streaming the session's events.
    pub fn has_listeners(&self) -> bool {
        self.events.receiver_count() > 0
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Emits an event on the session's stream from outside the actor.
    pub fn publish(&self, event: SessionEvent) {
        self.touch();
        let _ = self.events.send(event);
    }

    pub async fn edit(&self, form: FormState) -> Result<(), AppError> {
        self.send(SessionCommand::Edit(form)).await
    }

    pub async fn resolve_conflict(&self, accept: bool) -> Result<(), AppError> {
        self.send(SessionCommand::ResolveConflict { accept }).await
    }

    pub async fn save(&self) -> Result<SaveReceipt, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Save { reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    pub async fn switch(&self, resume_id: Uuid) -> Result<(), AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Switch { resume_id, reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    pub async fn resubscribe(&self) -> Result<(), AppError> {
        self.send(SessionCommand::Resubscribe).await
    }

    pub async fn view(&self) -> Result<SessionView, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::View { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, command: SessionCommand) -> Result<(), AppError> {
        self.touch();
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> AppError {
        AppError::NotFound(format!("Session {} is closed", self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resume::{IngestionResult, ResumeRecord};
    use crate::session::events::NotificationLevel;
    use crate::store::memory::MemoryResumeStore;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::broadcast::error::RecvError;

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            display_name: Some("ليلى حداد".to_string()),
            email: Some("layla@example.com".to_string()),
        }
    }

    fn record(user_id: Uuid, path: Option<&str>, done: bool) -> ResumeRecord {
        let now = Utc::now();
        ResumeRecord {
            id: Uuid::new_v4(),
            user_id,
            data: json!({ "personalInfo": { "fullName": "ليلى حداد" } }),
            parsing_done: done,
            parsing_error: None,
            storage_path: path.map(String::from),
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> (Arc<MemoryResumeStore>, Identity) {
        let store = Arc::new(MemoryResumeStore::new());
        let who = identity();
        store.upsert_user(&who).await.unwrap();
        (store, who)
    }

    fn spawn(store: &Arc<MemoryResumeStore>, who: &Identity, policy: ConflictPolicy) -> SessionHandle {
        SessionHandle::spawn(store.clone(), who.clone(), policy)
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<SessionEvent>,
        matches: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(event) if matches(&event) => return event,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => panic!("event stream closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn notifications(events: &[SessionEvent]) -> Vec<Notification> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Notification { notification } => Some(notification.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_session_loads_pointer_record_into_form() {
        let (store, who) = setup().await;
        let existing = record(who.user_id, None, true);
        store.seed(existing.clone());
        store.set_latest_resume(who.user_id, existing.id).await.unwrap();

        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        let view = session.view().await.unwrap();
        assert_eq!(
            view.phase,
            SessionPhase::Subscribed {
                record_id: existing.id,
                status: SyncStatus::Done,
            }
        );
        assert_eq!(view.form.record_id, Some(existing.id));
        assert_eq!(view.form.personal_info.full_name, "ليلى حداد");
        assert!(!view.dirty);
    }

    #[tokio::test]
    async fn test_pending_then_done_notifies_once_and_completes_progress() {
        let (store, who) = setup().await;
        let pending = record(who.user_id, Some("resumes/u/cv.pdf"), false);
        store.seed(pending.clone());

        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        let mut rx = session.subscribe_events();
        let view = session.view().await.unwrap();
        assert_eq!(view.phase.record_id(), Some(pending.id));

        let parsed = IngestionResult::Parsed(json!({ "skills": [{ "name": "SQL" }] }));
        assert!(store
            .complete_ingestion(pending.id, "resumes/u/cv.pdf", &parsed, Utc::now())
            .await
            .unwrap());
        // Duplicate delivery of the same terminal state.
        store.seed(store.resume(pending.id).unwrap());

        let view = session.view().await.unwrap();
        assert_eq!(view.form.skills, vec!["SQL".to_string()]);

        let events = drain(&mut rx);
        let notes = notifications(&events);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Success);
        assert!(events.contains(&SessionEvent::Progress { percent: 100 }));
    }

    #[tokio::test]
    async fn test_vanished_record_triggers_re_resolution() {
        let (store, who) = setup().await;
        let older = record(who.user_id, None, true);
        let current = record(who.user_id, None, true);
        store.seed(older.clone());
        store.seed(current.clone());
        store.set_latest_resume(who.user_id, current.id).await.unwrap();

        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        assert_eq!(session.view().await.unwrap().phase.record_id(), Some(current.id));

        store.delete(current.id);
        let view = session.view().await.unwrap();
        assert_eq!(view.phase.record_id(), Some(older.id));
        assert_eq!(view.form.record_id, Some(older.id));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_form_and_resubscribe_does_not_renotify() {
        let (store, who) = setup().await;
        let mut done = record(who.user_id, Some("resumes/u/cv.pdf"), true);
        done.data = json!({ "personalInfo": { "fullName": "ليلى حداد" }, "hobbies": ["القراءة"] });
        store.seed(done.clone());

        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        let mut rx = session.subscribe_events();
        session.view().await.unwrap();

        store.break_subscriptions(done.id);
        let view = session.view().await.unwrap();
        assert_eq!(view.phase, SessionPhase::Detached { record_id: done.id });
        assert_eq!(view.form.hobbies, vec!["القراءة".to_string()]);
        assert_eq!(view.progress, 0);

        session.resubscribe().await.unwrap();
        let view = session.view().await.unwrap();
        assert!(matches!(view.phase, SessionPhase::Subscribed { .. }));

        let notes = notifications(&drain(&mut rx));
        assert_eq!(notes.len(), 2, "parse success + connection lost: {notes:?}");
        assert_eq!(notes[1].message, messages::CONNECTION_LOST);
    }

    #[tokio::test]
    async fn test_unresolved_session_can_still_save_manually() {
        let (store, who) = setup().await;
        store.fail_reads(true);
        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        assert_eq!(session.view().await.unwrap().phase, SessionPhase::Unresolved);

        store.fail_reads(false);
        let mut form = FormState::default();
        form.personal_info.full_name = "ليلى".to_string();
        session.edit(form).await.unwrap();
        let receipt = session.save().await.unwrap();
        assert!(receipt.created);

        let view = session.view().await.unwrap();
        assert_eq!(view.phase.record_id(), Some(receipt.record_id));
        assert_eq!(view.form.personal_info.full_name, "ليلى");
        assert!(store.resume(receipt.record_id).unwrap().parsing_done);
    }

    #[tokio::test]
    async fn test_prompt_policy_emits_conflict_and_accepting_replaces_form() {
        let (store, who) = setup().await;
        let pending = record(who.user_id, Some("resumes/u/cv.pdf"), false);
        store.seed(pending.clone());

        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        let mut rx = session.subscribe_events();
        let mut form = session.view().await.unwrap().form;
        form.summary = "مسودة لم تحفظ".to_string();
        session.edit(form).await.unwrap();

        let parsed = IngestionResult::Parsed(json!({ "summary": "ملخص مستخرج" }));
        store
            .complete_ingestion(pending.id, "resumes/u/cv.pdf", &parsed, Utc::now())
            .await
            .unwrap();

        let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::ConflictDetected { .. })).await;
        let SessionEvent::ConflictDetected { incoming } = event else {
            unreachable!()
        };
        assert_eq!(incoming.summary, "ملخص مستخرج");
        assert_eq!(session.view().await.unwrap().form.summary, "مسودة لم تحفظ");

        session.resolve_conflict(true).await.unwrap();
        let view = session.view().await.unwrap();
        assert_eq!(view.form.summary, "ملخص مستخرج");
        assert!(view.conflict.is_none());
        assert!(!view.dirty);
    }

    #[tokio::test]
    async fn test_switch_rejects_unknown_record() {
        let (store, who) = setup().await;
        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        let err = session.switch(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_switch_moves_subscription_and_pointer() {
        let (store, who) = setup().await;
        let first = record(who.user_id, Some("resumes/u/a.pdf"), false);
        let second = record(who.user_id, None, true);
        store.seed(first.clone());
        store.seed(second.clone());
        store.set_latest_resume(who.user_id, first.id).await.unwrap();

        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        assert_eq!(session.view().await.unwrap().phase.record_id(), Some(first.id));

        session.switch(second.id).await.unwrap();
        let view = session.view().await.unwrap();
        assert_eq!(view.phase.record_id(), Some(second.id));
        assert_eq!(view.progress, 0);
        assert_eq!(store.user(who.user_id).unwrap().latest_resume_id, Some(second.id));

        // Writes to the old record no longer reach the session.
        let mut rx = session.subscribe_events();
        let failed = IngestionResult::Failed("timeout".to_string());
        store
            .complete_ingestion(first.id, "resumes/u/a.pdf", &failed, Utc::now())
            .await
            .unwrap();
        session.view().await.unwrap();
        assert!(notifications(&drain(&mut rx)).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let (store, who) = setup().await;
        let session = spawn(&store, &who, ConflictPolicy::Prompt);
        let mut rx = session.subscribe_events();
        session.shutdown().await.unwrap();

        wait_for(&mut rx, |e| {
            matches!(e, SessionEvent::Phase { phase: SessionPhase::Closed })
        })
        .await;
        assert!(matches!(session.view().await, Err(AppError::NotFound(_))));
    }
}

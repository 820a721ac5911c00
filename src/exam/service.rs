// src/exam/service.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use super::{
    ExamError, ExamPart, ExamSession, SessionStatus, Transition, Trigger,
    catalog::get_config,
    events::{EventBus, ExamEvent, Subscription},
    intro::IntroPage,
    session::{IntroOutcome, SessionView},
    sourcing::{QuestionBank, fetch_essays, fetch_mcqs},
    store::{HistoryEntry, SessionStore, StoreError},
    timer::PhaseTimer,
};

pub const PERSISTENCE_WARNING: &str =
    "Your progress could not be saved and may not be recoverable after a reload.";

/// User id recorded for sessions started without signing in.
pub const ANONYMOUS: &str = "anonymous";

/// How long attempts stay in memory once nobody needs them there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// After reaching COMPLETED or ESSAY_LOCKED.
    pub finished: Duration,
    /// Since the last request to an attempt still on the tutorial.
    pub idle: Duration,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            finished: Duration::from_secs(15 * 60),
            idle: Duration::from_secs(2 * 60 * 60),
        }
    }
}

struct LiveSession {
    session: ExamSession,
    timer: Option<PhaseTimer>,
    /// Pending eviction, if the attempt is finished or not started.
    reaper: Option<PhaseTimer>,
    last_activity: Instant,
    degraded: Arc<AtomicBool>,
}

/// Runs exam attempts in memory and mirrors them to the session store.
///
/// Store failures never interrupt an attempt: the session keeps running in
/// memory and its views carry a persistence warning until a later save
/// succeeds.
#[derive(Clone)]
pub struct ExamService {
    bank: Arc<dyn QuestionBank>,
    store: Arc<dyn SessionStore>,
    events: EventBus,
    retention: Retention,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Mutex<LiveSession>>>>>,
}

impl ExamService {
    pub fn new(bank: Arc<dyn QuestionBank>, store: Arc<dyn SessionStore>, events: EventBus) -> Self {
        Self {
            bank,
            store,
            events,
            retention: Retention::default(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Resolves the exam, sources its questions and registers a new attempt.
    ///
    /// An unknown key fails before anything is created. With `with_tutorial`
    /// the attempt waits on page 1 of the tutorial; otherwise it starts now.
    pub async fn create_session(
        &self,
        key: &str,
        user_id: &str,
        part: Option<ExamPart>,
        with_tutorial: bool,
    ) -> Result<SessionView, ExamError> {
        let config = get_config(key)?;
        let part = part.unwrap_or(config.part);

        let mcqs = fetch_mcqs(self.bank.as_ref(), config.mcq_count, config.hybrid_ratio, part).await;
        let essays = fetch_essays(self.bank.as_ref(), config.essay_count, part).await;

        let mut session = ExamSession::new(config, user_id, part, mcqs, essays, with_tutorial)?;
        let now = Utc::now();
        let started = if with_tutorial {
            Transition::Unchanged
        } else {
            session.start(now)
        };
        let id = session.id();

        let degraded = Arc::new(AtomicBool::new(false));
        if let Err(e) = self.store.save(&session.to_record()).await {
            tracing::warn!(session_id = %id, error = %e, "initial save failed, continuing in memory");
            degraded.store(true, Ordering::SeqCst);
            self.events.publish(ExamEvent::PersistenceDegraded { session_id: id });
        }

        tracing::info!(session_id = %id, exam = config.key, user_id, "exam session created");
        self.events.publish(ExamEvent::SessionCreated {
            session_id: id,
            config_key: config.key,
            user_id: user_id.to_string(),
        });

        let mut live = LiveSession {
            session,
            timer: None,
            reaper: None,
            last_activity: Instant::now(),
            degraded,
        };
        if let Transition::Advanced { from, to } = started {
            self.after_transition(&mut live, from, to, Trigger::User);
        } else {
            self.schedule_eviction(&mut live);
        }
        let view = Self::render(&live);

        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(live)));
        Ok(view)
    }

    async fn lookup(&self, id: Uuid, user_id: &str) -> Result<Arc<Mutex<LiveSession>>, ExamError> {
        let entry = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ExamError::SessionNotFound(id))?;

        // Sessions owned by a signed-in user are invisible to everyone else.
        let owner_matches = {
            let live = entry.lock().await;
            let owner = live.session.user_id();
            owner == ANONYMOUS || owner == user_id
        };
        if owner_matches {
            Ok(entry)
        } else {
            Err(ExamError::SessionNotFound(id))
        }
    }

    fn render(live: &LiveSession) -> SessionView {
        let mut view = live.session.view(Utc::now());
        if live.degraded.load(Ordering::SeqCst) {
            view.persistence_warning = Some(PERSISTENCE_WARNING.to_string());
        }
        view
    }

    /// Applies pending expiry, then `action`, then persists and re-arms
    /// timers if anything changed. A degraded session is saved on every
    /// request until a save succeeds.
    async fn apply<T, F>(&self, id: Uuid, user_id: &str, action: F) -> Result<(T, SessionView), ExamError>
    where
        F: FnOnce(&mut ExamSession) -> Result<T, ExamError>,
    {
        let entry = self.lookup(id, user_id).await?;
        let mut live = entry.lock().await;
        live.last_activity = Instant::now();

        let revision = live.session.revision();
        let expired = live.session.expire_if_due(Utc::now());
        if let Transition::Advanced { from, to } = expired {
            self.after_transition(&mut live, from, to, Trigger::Timer);
        }

        let before = live.session.status();
        let result = action(&mut live.session);
        let after = live.session.status();
        if before != after {
            self.after_transition(&mut live, before, after, Trigger::User);
        }

        if live.session.revision() != revision || live.degraded.load(Ordering::SeqCst) {
            self.persist(&live);
        }
        if live.session.status() == SessionStatus::NotStarted {
            self.schedule_eviction(&mut live);
        }

        let value = result?;
        Ok((value, Self::render(&live)))
    }

    fn after_transition(
        &self,
        live: &mut LiveSession,
        from: SessionStatus,
        to: SessionStatus,
        trigger: Trigger,
    ) {
        let id = live.session.id();
        self.events.publish(ExamEvent::PhaseChanged {
            session_id: id,
            from,
            to,
            trigger,
        });
        self.rearm(live);
        self.schedule_eviction(live);
    }

    /// Replaces the countdown with one for the session's current phase, if any.
    fn rearm(&self, live: &mut LiveSession) {
        live.timer = None;
        let (Some(phase), Some(deadline)) = (live.session.status().active_phase(), live.session.phase_deadline())
        else {
            return;
        };
        let after = (deadline - Utc::now()).to_std().unwrap_or_default();
        let service = self.clone();
        let id = live.session.id();
        live.timer = Some(PhaseTimer::arm(after, move || async move {
            service.on_timer(id, phase).await;
        }));
    }

    async fn on_timer(&self, id: Uuid, phase: super::Phase) {
        let Some(entry) = self.sessions.read().await.get(&id).cloned() else {
            return;
        };
        let mut live = entry.lock().await;
        // Stamped at the deadline, as a lazily observed expiry would be.
        let at = live.session.phase_deadline().unwrap_or_else(Utc::now);
        let transition = live.session.finish_phase(phase, at, Trigger::Timer);
        if let Transition::Advanced { from, to } = transition {
            tracing::info!(session_id = %id, ?phase, "phase countdown expired");
            self.after_transition(&mut live, from, to, Trigger::Timer);
            self.persist(&live);
        }
    }

    /// Arms the reaper for finished and not-yet-started attempts and clears
    /// it for running ones, whose countdown guarantees they end.
    fn schedule_eviction(&self, live: &mut LiveSession) {
        let status = live.session.status();
        let after = if status.is_terminal() {
            self.retention.finished
        } else if status == SessionStatus::NotStarted {
            self.retention.idle
        } else {
            live.reaper = None;
            return;
        };
        let service = self.clone();
        let id = live.session.id();
        live.reaper = Some(PhaseTimer::arm(after, move || async move {
            service.evict(id).await;
        }));
    }

    async fn evict(&self, id: Uuid) {
        let Some(entry) = self.sessions.read().await.get(&id).cloned() else {
            return;
        };
        let mut live = entry.lock().await;
        let status = live.session.status();
        let due = if status.is_terminal() {
            true
        } else {
            status == SessionStatus::NotStarted
                && live.last_activity.elapsed() >= self.retention.idle
        };
        if !due {
            return;
        }

        if live.degraded.load(Ordering::SeqCst) {
            if let Err(e) = self.store.save(&live.session.to_record()).await {
                tracing::warn!(session_id = %id, error = %e, "final save before eviction failed");
            }
        }
        live.timer = None;
        self.sessions.write().await.remove(&id);

        tracing::info!(session_id = %id, status = status.as_str(), "exam session evicted from memory");
        self.events.publish(ExamEvent::SessionEvicted { session_id: id });
    }

    /// Saves a snapshot in the background. The caller never waits on it.
    fn persist(&self, live: &LiveSession) {
        let record = live.session.to_record();
        let store = self.store.clone();
        let events = self.events.clone();
        let degraded = live.degraded.clone();
        tokio::spawn(async move {
            match store.save(&record).await {
                Ok(()) => {
                    if degraded.swap(false, Ordering::SeqCst) {
                        tracing::info!(session_id = %record.id, "session persistence recovered");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %record.id,
                        error = %e,
                        "failed to persist exam session, continuing in memory"
                    );
                    if !degraded.swap(true, Ordering::SeqCst) {
                        events.publish(ExamEvent::PersistenceDegraded {
                            session_id: record.id,
                        });
                    }
                }
            }
        });
    }

    pub async fn view(&self, id: Uuid, user_id: &str) -> Result<SessionView, ExamError> {
        let ((), view) = self.apply(id, user_id, |_| Ok(())).await?;
        Ok(view)
    }

    pub async fn intro_page(&self, id: Uuid, user_id: &str) -> Result<IntroPage, ExamError> {
        let (page, _) = self.apply(id, user_id, |s| s.intro_page()).await?;
        Ok(page)
    }

    pub async fn intro_next(&self, id: Uuid, user_id: &str) -> Result<SessionView, ExamError> {
        let (outcome, view) = self
            .apply(id, user_id, |s| s.intro_next(Utc::now()))
            .await?;
        if let IntroOutcome::Started(_) = outcome {
            tracing::info!(session_id = %id, "tutorial finished, exam started");
        }
        Ok(view)
    }

    pub async fn intro_back(&self, id: Uuid, user_id: &str) -> Result<SessionView, ExamError> {
        let (_, view) = self.apply(id, user_id, |s| s.intro_back()).await?;
        Ok(view)
    }

    /// Records (`Some`) or clears (`None`) the selected option.
    pub async fn answer_mcq(
        &self,
        id: Uuid,
        user_id: &str,
        question_id: &str,
        option: Option<usize>,
    ) -> Result<SessionView, ExamError> {
        let (_, view) = self
            .apply(id, user_id, |s| match option {
                Some(option) => s.answer_mcq(question_id, option),
                None => s.clear_mcq(question_id),
            })
            .await?;
        Ok(view)
    }

    pub async fn flag_mcq(
        &self,
        id: Uuid,
        user_id: &str,
        question_id: &str,
        flagged: bool,
    ) -> Result<SessionView, ExamError> {
        let (_, view) = self
            .apply(id, user_id, |s| s.set_flag(question_id, flagged))
            .await?;
        Ok(view)
    }

    pub async fn finish_mcq(&self, id: Uuid, user_id: &str) -> Result<SessionView, ExamError> {
        let (_, view) = self
            .apply(id, user_id, |s| Ok(s.finish_mcq(Utc::now(), Trigger::User)))
            .await?;
        Ok(view)
    }

    pub async fn answer_essay(
        &self,
        id: Uuid,
        user_id: &str,
        question_id: &str,
        text: String,
    ) -> Result<SessionView, ExamError> {
        let (_, view) = self
            .apply(id, user_id, |s| s.answer_essay(question_id, text))
            .await?;
        Ok(view)
    }

    pub async fn finish_essay(&self, id: Uuid, user_id: &str) -> Result<SessionView, ExamError> {
        let (_, view) = self
            .apply(id, user_id, |s| Ok(s.finish_essay(Utc::now(), Trigger::User)))
            .await?;
        Ok(view)
    }

    /// Leaves the exam: stops the countdown and forgets the in-memory attempt.
    /// Whatever the store already holds is kept as is.
    pub async fn exit(&self, id: Uuid, user_id: &str) -> Result<(), ExamError> {
        self.lookup(id, user_id).await?;
        let removed = self.sessions.write().await.remove(&id);
        if let Some(entry) = removed {
            let mut live = entry.lock().await;
            if let Some(timer) = live.timer.take() {
                timer.cancel();
            }
            live.reaper = None;
            let status = live.session.status();
            if status.is_terminal() {
                tracing::info!(session_id = %id, status = status.as_str(), "exam session exited");
            } else {
                tracing::info!(session_id = %id, status = status.as_str(), "exam abandoned before completion");
            }
            self.events.publish(ExamEvent::SessionExited { session_id: id });
        }
        Ok(())
    }

    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        self.store.history(user_id, limit.clamp(1, 100)).await
    }
}

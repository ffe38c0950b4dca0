use std::{
    sync::{Arc, Mutex as StdMutex, Weak},
    time::Duration,
};

use shared::{
    domain::User,
    query::{FilterState, PaginationState, UserQuery, LIMIT_OPTIONS},
    validation::{validate, Field, ValidationError},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

pub mod debounce;
pub mod source;

pub use debounce::Debouncer;
pub use source::{
    sample_users, HttpUserSource, MissingUserSource, StaticUserSource, UserSource,
};

/// Outcome of the most recently committed query. Exactly one state is active
/// at a time: a stale error can never coexist with a fresh loading spinner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Pending,
    Success(Vec<User>),
    Failure(String),
}

impl RequestOutcome {
    pub fn is_loading(&self) -> bool {
        matches!(self, RequestOutcome::Pending)
    }

    pub fn users(&self) -> &[User] {
        match self {
            RequestOutcome::Success(users) => users,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RequestOutcome::Failure(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    /// A query was committed and its fetch is in flight.
    Loading { generation: u64 },
    /// The current commit resolved with a page of users.
    Loaded { generation: u64, count: usize },
    /// The current commit resolved with a fetch failure.
    Failed { generation: u64, message: String },
    /// A superseded commit resolved after a newer one; its outcome was
    /// dropped without touching visible state.
    StaleDiscarded { generation: u64 },
}

/// Everything the rendering surface needs, projected from one lock of the
/// controller state.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub users: Vec<User>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub filters: FilterState,
    pub name_error: Option<ValidationError>,
    pub age_error: Option<ValidationError>,
    pub pagination: PaginationState,
    pub page_number: u32,
    pub can_prev: bool,
    pub can_next: bool,
}

struct ControllerState {
    /// Raw field text as typed, including invalid values.
    filters: FilterState,
    name_error: Option<ValidationError>,
    age_error: Option<ValidationError>,
    /// Filters as of the last settled (debounced) emission; what commits use.
    committed_filters: FilterState,
    pagination: PaginationState,
    outcome: RequestOutcome,
    /// Monotonically increasing commit identity. A completing fetch only
    /// applies its outcome while this still equals the generation it was
    /// spawned with.
    generation: u64,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            filters: FilterState::default(),
            name_error: None,
            age_error: None,
            committed_filters: FilterState::default(),
            pagination: PaginationState::default(),
            outcome: RequestOutcome::Pending,
            generation: 0,
        }
    }

    fn can_next(&self) -> bool {
        match &self.outcome {
            RequestOutcome::Success(users) => users.len() == self.pagination.limit as usize,
            _ => false,
        }
    }
}

/// Debounced, stale-response-safe fetch coordinator for the user directory.
///
/// Filter keystrokes are validated, stored, and fed through a trailing-edge
/// debouncer; pagination actions commit immediately. Every commit bumps a
/// generation counter, and a completing fetch that no longer matches the
/// latest generation is discarded without mutating visible state, so the
/// last committed query always wins regardless of completion order.
pub struct DirectoryController {
    source: Arc<dyn UserSource>,
    inner: Mutex<ControllerState>,
    debouncer: Debouncer<FilterState>,
    settle_task: StdMutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<DirectoryEvent>,
}

impl DirectoryController {
    pub fn new(source: Arc<dyn UserSource>, quiet_period: Duration) -> Arc<Self> {
        let (debouncer, mut settled_rx) = Debouncer::new(quiet_period);
        let (events, _) = broadcast::channel(256);
        let controller = Arc::new(Self {
            source,
            inner: Mutex::new(ControllerState::new()),
            debouncer,
            settle_task: StdMutex::new(None),
            events,
        });

        // Holding only a Weak here lets dropping the controller tear the
        // pipeline down: the debouncer's sender goes away and recv ends.
        let weak: Weak<Self> = Arc::downgrade(&controller);
        let task = tokio::spawn(async move {
            while let Some(filters) = settled_rx.recv().await {
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.apply_settled_filters(filters).await;
            }
        });
        *controller
            .settle_task
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(task);

        controller
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.events.subscribe()
    }

    /// Stores a keystroke for `field`, returning its validation verdict.
    ///
    /// Invalid values are stored too, so the field keeps reflecting what the
    /// user typed; the error is carried alongside for inline display. Any
    /// filter edit rewinds pagination to the first page. No fetch is issued
    /// here: the updated filters are handed to the debouncer and commit once
    /// the input settles.
    pub async fn set_filter(
        self: &Arc<Self>,
        field: Field,
        raw: impl Into<String>,
    ) -> Option<ValidationError> {
        let raw = raw.into();
        let error = validate(field, &raw);
        let filters = {
            let mut inner = self.inner.lock().await;
            inner.filters.set(field, raw);
            match field {
                Field::Name => inner.name_error = error,
                Field::Age => inner.age_error = error,
            }
            inner.pagination.reset_offset();
            inner.filters.clone()
        };
        self.debouncer.feed(filters);
        error
    }

    async fn apply_settled_filters(self: &Arc<Self>, filters: FilterState) {
        let mut inner = self.inner.lock().await;
        inner.committed_filters = filters;
        self.commit_locked(&mut inner);
    }

    /// Steps back one page and commits. No-op while a request is in flight
    /// or when already on the first page.
    pub async fn prev_page(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.outcome.is_loading() || !inner.pagination.prev() {
            return false;
        }
        self.commit_locked(&mut inner);
        true
    }

    /// Advances one page and commits. No-op while a request is in flight or
    /// when the latest page came back short (end-of-list heuristic; there is
    /// no total-count endpoint).
    pub async fn next_page(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.outcome.is_loading() || !inner.can_next() {
            return false;
        }
        inner.pagination.next();
        self.commit_locked(&mut inner);
        true
    }

    /// Replaces the page size, rewinds to the first page, and commits.
    /// Values outside [`LIMIT_OPTIONS`] are rejected.
    pub async fn set_limit(self: &Arc<Self>, limit: u32) -> bool {
        if !LIMIT_OPTIONS.contains(&limit) {
            warn!(limit, "rejecting page limit outside the offered options");
            return false;
        }
        let mut inner = self.inner.lock().await;
        inner.pagination.set_limit(limit);
        self.commit_locked(&mut inner);
        true
    }

    /// Commits the current effective query. Used for the initial load and
    /// for manual retries after a failure.
    pub async fn refresh(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        self.commit_locked(&mut inner);
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        let inner = self.inner.lock().await;
        let is_loading = inner.outcome.is_loading();
        ViewSnapshot {
            users: inner.outcome.users().to_vec(),
            is_loading,
            error: inner.outcome.error().map(str::to_string),
            filters: inner.filters.clone(),
            name_error: inner.name_error,
            age_error: inner.age_error,
            pagination: inner.pagination,
            page_number: inner.pagination.page_number(),
            can_prev: !is_loading && inner.pagination.offset > 0,
            can_next: !is_loading && inner.can_next(),
        }
    }

    /// Cancels the pending debounce emission and stops the settle task. No
    /// commit fires after this returns.
    pub fn shutdown(&self) {
        self.debouncer.cancel();
        let mut task = self
            .settle_task
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(task) = task.take() {
            task.abort();
        }
    }

    /// Finalizes the effective query under the lock and races its fetch
    /// against any newer commit. The completing task re-checks the
    /// generation before touching state, so a slow older response can never
    /// overwrite a newer one or flip the loading flag off early.
    fn commit_locked(self: &Arc<Self>, inner: &mut ControllerState) {
        inner.generation += 1;
        let generation = inner.generation;
        let query = UserQuery::merge(&inner.committed_filters, inner.pagination);
        inner.outcome = RequestOutcome::Pending;
        debug!(generation, ?query, "committing user query");
        let _ = self.events.send(DirectoryEvent::Loading { generation });

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let result = controller.source.fetch_users(&query).await;
            let mut inner = controller.inner.lock().await;
            if inner.generation != generation {
                debug!(
                    generation,
                    latest = inner.generation,
                    "discarding superseded response"
                );
                let _ = controller
                    .events
                    .send(DirectoryEvent::StaleDiscarded { generation });
                return;
            }
            match result {
                Ok(users) => {
                    let count = users.len();
                    inner.outcome = RequestOutcome::Success(users);
                    let _ = controller
                        .events
                        .send(DirectoryEvent::Loaded { generation, count });
                }
                Err(err) => {
                    let message = err.to_string();
                    inner.outcome = RequestOutcome::Failure(message.clone());
                    let _ = controller
                        .events
                        .send(DirectoryEvent::Failed { generation, message });
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

use std::collections::HashMap;

use async_trait::async_trait;
use shared::error::{ErrorCode, SourceError};
use tokio::time::timeout;

use super::*;

const QUIET: Duration = Duration::from_millis(40);
const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Pages out of a fixed user list, with per-limit scripted latency and
/// failures so response races and error paths are reproducible regardless of
/// task scheduling order.
struct ScriptedUserSource {
    users: Vec<User>,
    delays: HashMap<u32, Duration>,
    failures: HashMap<u32, SourceError>,
    queries: Mutex<Vec<UserQuery>>,
}

impl ScriptedUserSource {
    fn new(users: Vec<User>) -> Self {
        Self {
            users,
            delays: HashMap::new(),
            failures: HashMap::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn delay_for_limit(mut self, limit: u32, delay: Duration) -> Self {
        self.delays.insert(limit, delay);
        self
    }

    fn failure_for_limit(mut self, limit: u32, error: SourceError) -> Self {
        self.failures.insert(limit, error);
        self
    }
}

#[async_trait]
impl UserSource for ScriptedUserSource {
    async fn fetch_users(&self, query: &UserQuery) -> Result<Vec<User>, SourceError> {
        self.queries.lock().await.push(query.clone());
        if let Some(delay) = self.delays.get(&query.limit) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(&query.limit) {
            return Err(error.clone());
        }
        Ok(self
            .users
            .iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }
}

async fn await_event<F>(
    rx: &mut broadcast::Receiver<DirectoryEvent>,
    mut matches: F,
) -> DirectoryEvent
where
    F: FnMut(&DirectoryEvent) -> bool,
{
    timeout(EVENT_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn await_loaded(rx: &mut broadcast::Receiver<DirectoryEvent>, generation: u64) {
    await_event(rx, |event| {
        matches!(event, DirectoryEvent::Loaded { generation: g, .. } if *g == generation)
    })
    .await;
}

#[tokio::test]
async fn initial_refresh_loads_first_page() {
    let source = Arc::new(StaticUserSource::new(sample_users(10)));
    let controller = DirectoryController::new(source, QUIET);
    let mut rx = controller.subscribe_events();

    controller.refresh().await;
    await_loaded(&mut rx, 1).await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.users.len(), 4);
    assert_eq!(snapshot.error, None);
    assert!(!snapshot.is_loading);
    assert_eq!(snapshot.page_number, 1);
    assert!(!snapshot.can_prev);
    assert!(snapshot.can_next);
}

#[tokio::test]
async fn burst_of_keystrokes_commits_once_with_final_value() {
    let source = Arc::new(ScriptedUserSource::new(sample_users(10)));
    let controller = DirectoryController::new(source.clone(), QUIET);
    let mut rx = controller.subscribe_events();

    for typed in ["a", "ab", "abc"] {
        assert_eq!(controller.set_filter(Field::Name, typed).await, None);
    }
    // Keystrokes alone never issue a fetch.
    assert!(source.queries.lock().await.is_empty());

    await_loaded(&mut rx, 1).await;

    let queries = source.queries.lock().await.clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].name, "abc");
    assert_eq!(queries[0].offset, 0);
}

#[tokio::test]
async fn invalid_age_keystroke_is_stored_with_error_and_still_settles() {
    let source = Arc::new(ScriptedUserSource::new(sample_users(10)));
    let controller = DirectoryController::new(source.clone(), QUIET);
    let mut rx = controller.subscribe_events();

    let verdict = controller.set_filter(Field::Age, "abc123").await;
    assert_eq!(verdict, Some(ValidationError::AgeNotNumeric));
    assert!(source.queries.lock().await.is_empty());

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.filters.age, "abc123");
    assert_eq!(
        snapshot.age_error.map(|e| e.to_string()),
        Some("Only numeric characters are allowed!".to_string())
    );

    await_loaded(&mut rx, 1).await;
    let queries = source.queries.lock().await.clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].age, "abc123");
}

#[tokio::test]
async fn slow_stale_response_never_overwrites_newer_result() {
    let source = Arc::new(
        ScriptedUserSource::new(sample_users(10))
            .delay_for_limit(4, Duration::from_millis(250)),
    );
    let controller = DirectoryController::new(source, QUIET);
    let mut rx = controller.subscribe_events();

    // Commit A (limit 4) is slow; commit B (limit 8) supersedes it and
    // resolves first.
    controller.refresh().await;
    assert!(controller.set_limit(8).await);
    await_loaded(&mut rx, 2).await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.users.len(), 8);
    assert!(!snapshot.is_loading);

    // A's late completion is discarded without touching visible state.
    await_event(&mut rx, |event| {
        matches!(event, DirectoryEvent::StaleDiscarded { generation: 1 })
    })
    .await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.users.len(), 8);
    assert_eq!(snapshot.error, None);
    assert!(!snapshot.is_loading);
}

#[tokio::test]
async fn stale_failure_is_discarded_silently() {
    let source = Arc::new(
        ScriptedUserSource::new(sample_users(10))
            .delay_for_limit(4, Duration::from_millis(250))
            .failure_for_limit(4, SourceError::unavailable("slow backend fell over")),
    );
    let controller = DirectoryController::new(source, QUIET);
    let mut rx = controller.subscribe_events();

    controller.refresh().await;
    assert!(controller.set_limit(8).await);
    await_loaded(&mut rx, 2).await;
    await_event(&mut rx, |event| {
        matches!(event, DirectoryEvent::StaleDiscarded { generation: 1 })
    })
    .await;

    // The superseded failure must not become the visible error.
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.users.len(), 8);
}

#[tokio::test]
async fn fetch_failure_shows_message_and_recovers_on_next_commit() {
    let source = Arc::new(
        ScriptedUserSource::new(sample_users(10))
            .failure_for_limit(4, SourceError::new(ErrorCode::Internal, "boom")),
    );
    let controller = DirectoryController::new(source, QUIET);
    let mut rx = controller.subscribe_events();

    controller.refresh().await;
    await_event(&mut rx, |event| {
        matches!(event, DirectoryEvent::Failed { generation: 1, .. })
    })
    .await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.error.as_deref(), Some("Internal: boom"));
    assert!(snapshot.users.is_empty());
    assert!(!snapshot.can_next);

    // The next commit retries and clears the error.
    assert!(controller.set_limit(8).await);
    await_loaded(&mut rx, 2).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.users.len(), 8);
}

#[tokio::test]
async fn pagination_walks_pages_and_respects_bounds() {
    let source = Arc::new(StaticUserSource::new(sample_users(10)));
    let controller = DirectoryController::new(source, QUIET);
    let mut rx = controller.subscribe_events();

    controller.refresh().await;
    await_loaded(&mut rx, 1).await;

    assert!(controller.next_page().await);
    await_loaded(&mut rx, 2).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.pagination.offset, 4);
    assert_eq!(snapshot.page_number, 2);
    assert_eq!(snapshot.users.len(), 4);

    assert!(controller.next_page().await);
    await_loaded(&mut rx, 3).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.pagination.offset, 8);
    assert_eq!(snapshot.users.len(), 2);
    // Short page means end of list: next is disabled and a no-op.
    assert!(!snapshot.can_next);
    assert!(!controller.next_page().await);

    assert!(controller.prev_page().await);
    await_loaded(&mut rx, 4).await;
    assert!(controller.prev_page().await);
    await_loaded(&mut rx, 5).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.pagination.offset, 0);
    assert!(!controller.prev_page().await);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.pagination.offset % snapshot.pagination.limit, 0);
}

#[tokio::test]
async fn filter_edit_rewinds_to_first_page() {
    let source = Arc::new(StaticUserSource::new(sample_users(10)));
    let controller = DirectoryController::new(source, QUIET);
    let mut rx = controller.subscribe_events();

    controller.refresh().await;
    await_loaded(&mut rx, 1).await;
    assert!(controller.next_page().await);
    await_loaded(&mut rx, 2).await;
    assert_eq!(controller.snapshot().await.pagination.offset, 4);

    controller.set_filter(Field::Name, "bob").await;
    assert_eq!(controller.snapshot().await.pagination.offset, 0);
}

#[tokio::test]
async fn pagination_is_inert_while_a_request_is_in_flight() {
    let source = Arc::new(
        ScriptedUserSource::new(sample_users(10))
            .delay_for_limit(4, Duration::from_millis(250)),
    );
    let controller = DirectoryController::new(source, QUIET);
    let mut rx = controller.subscribe_events();

    controller.refresh().await;
    await_event(&mut rx, |event| {
        matches!(event, DirectoryEvent::Loading { generation: 1 })
    })
    .await;

    assert!(!controller.next_page().await);
    assert!(!controller.prev_page().await);
    let snapshot = controller.snapshot().await;
    assert!(snapshot.is_loading);
    assert!(!snapshot.can_prev);
    assert!(!snapshot.can_next);
}

#[tokio::test]
async fn set_limit_rejects_unoffered_values() {
    let source = Arc::new(ScriptedUserSource::new(sample_users(10)));
    let controller = DirectoryController::new(source.clone(), QUIET);

    assert!(!controller.set_limit(5).await);
    assert!(!controller.set_limit(0).await);
    assert!(source.queries.lock().await.is_empty());
    assert_eq!(controller.snapshot().await.pagination.limit, 4);
}

#[tokio::test]
async fn shutdown_cancels_the_pending_settle() {
    let source = Arc::new(ScriptedUserSource::new(sample_users(10)));
    let controller = DirectoryController::new(source.clone(), QUIET);

    controller.set_filter(Field::Name, "abandoned").await;
    controller.shutdown();

    tokio::time::sleep(QUIET * 4).await;
    assert!(source.queries.lock().await.is_empty());
}

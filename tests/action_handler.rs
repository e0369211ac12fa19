//! Integration tests for action handlers: discovery, interface round-trips,
//! synchronous and queued launches, and event hub routing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::time::timeout;

use action_handler::action::{
    Action, ActionContext, ActionDescriptor, ActionEvent, ActionHandler, LaunchReply,
    LaunchResponse, LaunchResult, LocalEventHub,
};
use action_handler::actions::FindAndReplace;
use action_handler::config::{HandlerConfig, SessionCredentials};
use action_handler::error::{ConfigError, Error, TaskError};
use action_handler::job::{COMPONENT_KIND, JOB_KIND, Job, JobStatus};
use action_handler::session::{Fields, MemorySession, MemoryStore, Session};
use action_handler::worker::{WorkerPool, WorkerState};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const DISCOVER: &str = "ftrack.action.discover";
const LAUNCH: &str = "ftrack.action.launch";

/// What [`Scripted`] does after writing its note.
#[derive(Clone)]
enum Outcome {
    Report(LaunchResult),
    Json(Value),
    Fail(&'static str),
}

/// Writes a `Note` entity, then returns a fixed outcome.
struct Scripted {
    outcome: Outcome,
}

impl Scripted {
    const IDENTIFIER: &'static str = "scripted";

    fn handler(outcome: Outcome, session: Arc<dyn Session>) -> ActionHandler {
        ActionHandler::new(
            ActionDescriptor::new("Scripted", Self::IDENTIFIER),
            Arc::new(Scripted { outcome }),
            session,
        )
        .unwrap()
    }
}

#[async_trait]
impl Action for Scripted {
    async fn discover(&self, _session: &dyn Session, _ctx: &ActionContext) -> Result<bool, Error> {
        Ok(true)
    }

    async fn launch(
        &self,
        session: &dyn Session,
        _ctx: &ActionContext,
    ) -> Result<LaunchReply, Error> {
        let mut fields = Fields::new();
        fields.insert("text".into(), json!("written by launch"));
        session.create("Note", fields).await?;

        match self.outcome.clone() {
            Outcome::Report(result) => Ok(result.into()),
            Outcome::Json(value) => Ok(value.into()),
            Outcome::Fail(reason) => Err(Error::Task(TaskError::Failed {
                identifier: Self::IDENTIFIER.into(),
                reason: reason.into(),
            })),
        }
    }
}

/// Waits for its gate to open, then writes a note and succeeds.
struct Gated {
    gate: Arc<Notify>,
}

impl Gated {
    const IDENTIFIER: &'static str = "gated";
}

#[async_trait]
impl Action for Gated {
    async fn discover(&self, _session: &dyn Session, _ctx: &ActionContext) -> Result<bool, Error> {
        Ok(true)
    }

    async fn launch(
        &self,
        session: &dyn Session,
        _ctx: &ActionContext,
    ) -> Result<LaunchReply, Error> {
        self.gate.notified().await;
        let mut fields = Fields::new();
        fields.insert("text".into(), json!("written after gate"));
        session.create("Note", fields).await?;
        Ok(LaunchResult::success("Gated ran").into())
    }
}

/// Panics on launch.
struct Exploding;

#[async_trait]
impl Action for Exploding {
    async fn discover(&self, _session: &dyn Session, _ctx: &ActionContext) -> Result<bool, Error> {
        Ok(true)
    }

    async fn launch(
        &self,
        _session: &dyn Session,
        _ctx: &ActionContext,
    ) -> Result<LaunchReply, Error> {
        panic!("kaboom")
    }
}

fn setup() -> (Arc<MemoryStore>, Arc<dyn Session>) {
    let store = MemoryStore::new();
    let session: Arc<dyn Session> = Arc::new(MemorySession::new(
        SessionCredentials::new("https://tracker.example", "alice", "secret"),
        Arc::clone(&store),
    ));
    (store, session)
}

fn pool() -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(&HandlerConfig {
        worker_count: 2,
        poll_interval: Duration::from_millis(10),
        ..HandlerConfig::default()
    }))
}

fn launch_event(identifier: &str) -> ActionEvent {
    ActionEvent::new(LAUNCH, "src-1", "user-1")
        .with_identifier(identifier)
        .with_selection("Shot", "sh010")
}

async fn jobs(store: &MemoryStore) -> Vec<Job> {
    store
        .scan(JOB_KIND)
        .await
        .iter()
        .map(|entity| Job::from_entity(entity).unwrap())
        .collect()
}

#[tokio::test]
async fn descriptor_without_label_is_rejected() {
    let (_store, session) = setup();
    let result = ActionHandler::new(
        ActionDescriptor::new("", "no.label"),
        Arc::new(FindAndReplace),
        session,
    );
    assert!(matches!(result, Err(ConfigError::MissingLabel)));
}

#[tokio::test]
async fn discover_reply_carries_descriptor() {
    let (_store, session) = setup();
    let handler = ActionHandler::new(
        ActionDescriptor::new("Publish", "publish")
            .with_description("Publish the selection")
            .with_variant("v2"),
        Arc::new(Scripted {
            outcome: Outcome::Report(LaunchResult::success("ok")),
        }),
        session,
    )
    .unwrap();

    let event = ActionEvent::new(DISCOVER, "src-1", "user-1").with_selection("Shot", "sh010");
    let response = handler.handle_discover(&event).await.unwrap();
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({"items": [{
            "label": "Publish",
            "description": "Publish the selection",
            "actionIdentifier": "publish",
            "variant": "v2",
        }]})
    );
}

#[tokio::test]
async fn discover_filters_on_entity_type_and_bad_events() {
    let (_store, session) = setup();
    let handler = ActionHandler::new(
        FindAndReplace::descriptor().with_allowed_entity_types(["Shot"]),
        Arc::new(FindAndReplace),
        session,
    )
    .unwrap();

    let shot = ActionEvent::new(DISCOVER, "src-1", "user-1").with_selection("shot", "sh010");
    assert!(handler.handle_discover(&shot).await.is_some());

    let task = ActionEvent::new(DISCOVER, "src-1", "user-1").with_selection("Task", "t1");
    assert!(handler.handle_discover(&task).await.is_none());

    let anonymous = ActionEvent::new(DISCOVER, "src-1", "").with_selection("Shot", "sh010");
    assert!(handler.handle_discover(&anonymous).await.is_none());
}

#[tokio::test]
async fn launch_without_values_returns_form() {
    let (_store, session) = setup();
    let handler =
        ActionHandler::new(FindAndReplace::descriptor(), Arc::new(FindAndReplace), session)
            .unwrap();

    let response = handler
        .handle_launch(&launch_event(FindAndReplace::IDENTIFIER))
        .await;
    assert_eq!(response.success(), None);

    let value = serde_json::to_value(&response).unwrap();
    let items = value["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["type"], "enumerator");
    assert_eq!(items[1]["name"], "find");
}

#[tokio::test]
async fn synchronous_launch_commits_changes() {
    let (store, session) = setup();
    let mut fields = Fields::new();
    fields.insert("name".into(), json!("sh010_wip"));
    let shot = session.create("Shot", fields).await.unwrap();
    session.commit().await.unwrap();

    let handler = ActionHandler::new(
        FindAndReplace::descriptor(),
        Arc::new(FindAndReplace),
        Arc::clone(&session),
    )
    .unwrap();

    let event = ActionEvent::new(LAUNCH, "src-1", "user-1")
        .with_identifier(FindAndReplace::IDENTIFIER)
        .with_selection("Shot", shot.id.to_string())
        .with_value("attribute", "name")
        .with_value("find", "_wip")
        .with_value("replace", "_final");

    let response = handler.handle_launch(&event).await;
    assert_eq!(response.success(), Some(true), "{response:?}");
    assert!(response.message().unwrap().contains("(1 updated)"));

    let stored = store.fetch("Shot", shot.id).await.unwrap();
    assert_eq!(stored.get_str("name"), Some("sh010_final"));
    assert_eq!(session.pending_changes().await, 0);
    assert!(jobs(&store).await.is_empty());
}

#[tokio::test]
async fn result_contract_violation_fails_and_rolls_back() {
    let (store, session) = setup();
    let handler = Scripted::handler(
        Outcome::Json(json!({"message": "no flag"})),
        Arc::clone(&session),
    );

    let response = handler.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;
    assert_eq!(response.success(), Some(false));
    assert!(response.message().unwrap().contains("success"), "{response:?}");

    assert!(store.scan("Note").await.is_empty());
    assert_eq!(session.pending_changes().await, 0);
}

#[tokio::test]
async fn json_reply_with_flag_and_message_is_accepted() {
    let (store, session) = setup();
    let handler = Scripted::handler(
        Outcome::Json(json!({"success": true, "message": "Notes written"})),
        session,
    );

    let response = handler.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;
    assert_eq!(
        response,
        LaunchResponse::Result {
            success: true,
            message: "Notes written".into(),
            artifact_path: None,
        }
    );
    assert_eq!(store.scan("Note").await.len(), 1);
}

#[tokio::test]
async fn failed_commit_is_reported_and_rolled_back() {
    let (store, session) = setup();
    store.reject_commits(Some("backend offline".into())).await;
    let handler = Scripted::handler(
        Outcome::Report(LaunchResult::success("ok")),
        Arc::clone(&session),
    );

    let response = handler.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;
    assert_eq!(response.success(), Some(false));
    assert_eq!(session.pending_changes().await, 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn empty_message_gets_default_on_synchronous_launch() {
    let (_store, session) = setup();
    let handler = Scripted::handler(Outcome::Report(LaunchResult::success("")), session);

    let response = handler.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;
    assert_eq!(response.success(), Some(true));
    assert_eq!(response.message(), Some("Action 'Scripted' completed"));

    let flagged = Scripted::handler(
        Outcome::Json(json!({"success": false, "message": "  "})),
        setup().1,
    );
    let response = flagged.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;
    assert_eq!(response.message(), Some("Action 'Scripted' failed"));
}

#[tokio::test]
async fn mismatched_identifier_is_refused() {
    let (_store, session) = setup();
    let handler = Scripted::handler(Outcome::Report(LaunchResult::success("ok")), session);

    let response = handler.handle_launch(&launch_event("someone.else")).await;
    assert_eq!(response.success(), Some(false));
}

#[tokio::test]
async fn queued_launch_tracks_job_until_done() {
    let (store, session) = setup();
    let pool = pool();
    let handler = Scripted::handler(
        Outcome::Report(LaunchResult::success("Published").with_artifact("/renders/sh010.exr")),
        Arc::clone(&session),
    )
    .queued(Arc::clone(&pool));

    let response = handler.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;
    assert_eq!(response.success(), Some(true));
    assert_eq!(response.message(), Some("Launched action 'Scripted'"));

    timeout(TEST_TIMEOUT, pool.wait_idle()).await.unwrap();

    let jobs = jobs(&store).await;
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.user_id, "user-1");
    assert_eq!(job.description, "Published");
    assert!(job.artifact_id.is_some());

    let components = store.scan(COMPONENT_KIND).await;
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].get_str("name"), Some("sh010.exr"));

    // The launch wrote through its own session, never the handler's.
    assert_eq!(store.scan("Note").await.len(), 1);
    assert_eq!(session.pending_changes().await, 0);

    pool.shutdown().await;
}

#[tokio::test]
async fn queued_launch_error_fails_job() {
    let (store, session) = setup();
    let pool = pool();
    let handler =
        Scripted::handler(Outcome::Fail("disk full"), session).queued(Arc::clone(&pool));

    let response = handler.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;
    assert_eq!(response.success(), Some(true));

    timeout(TEST_TIMEOUT, pool.wait_idle()).await.unwrap();

    let jobs = jobs(&store).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(jobs[0].description.contains("disk full"), "{}", jobs[0].description);
    assert!(jobs[0].finished_at.is_some());

    // The failed launch's note was rolled back.
    assert!(store.scan("Note").await.is_empty());
    pool.shutdown().await;
}

#[tokio::test]
async fn queued_launch_panic_fails_job() {
    let (store, session) = setup();
    let pool = pool();
    let exploding = ActionHandler::new(
        ActionDescriptor::new("Exploding", "exploding"),
        Arc::new(Exploding),
        Arc::clone(&session),
    )
    .unwrap()
    .queued(Arc::clone(&pool));

    let response = exploding.handle_launch(&launch_event("exploding")).await;
    assert_eq!(response.success(), Some(true));
    timeout(TEST_TIMEOUT, pool.wait_idle()).await.unwrap();

    let failed = jobs(&store).await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, JobStatus::Failed);
    assert!(failed[0].description.contains("kaboom"), "{}", failed[0].description);

    // Workers keep serving launches afterwards.
    let next = Scripted::handler(Outcome::Report(LaunchResult::success("ok")), session)
        .queued(Arc::clone(&pool));
    next.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;
    timeout(TEST_TIMEOUT, pool.wait_idle()).await.unwrap();

    let jobs = jobs(&store).await;
    assert_eq!(jobs.len(), 2);
    assert_eq!(
        jobs.iter().filter(|job| job.status == JobStatus::Done).count(),
        1
    );
    pool.shutdown().await;
}

#[tokio::test]
async fn rejected_job_commit_leaves_worker_serving() {
    let (store, session) = setup();
    let pool = Arc::new(WorkerPool::new(&HandlerConfig {
        worker_count: 1,
        poll_interval: Duration::from_millis(10),
        ..HandlerConfig::default()
    }));
    let gate = Arc::new(Notify::new());
    let handler = ActionHandler::new(
        ActionDescriptor::new("Gated", Gated::IDENTIFIER),
        Arc::new(Gated {
            gate: Arc::clone(&gate),
        }),
        session,
    )
    .unwrap()
    .queued(Arc::clone(&pool));

    let response = handler.handle_launch(&launch_event(Gated::IDENTIFIER)).await;
    assert_eq!(response.success(), Some(true));

    // The job record exists; saving its outcome will fail.
    store.reject_commits(Some("backend offline".into())).await;
    gate.notify_one();
    timeout(TEST_TIMEOUT, pool.wait_idle()).await.unwrap();

    assert_eq!(pool.worker_states(), vec![WorkerState::Idle]);
    let stuck = jobs(&store).await;
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].status, JobStatus::Running);
    assert!(store.scan("Note").await.is_empty());

    store.reject_commits(None).await;
    handler.handle_launch(&launch_event(Gated::IDENTIFIER)).await;
    gate.notify_one();
    timeout(TEST_TIMEOUT, pool.wait_idle()).await.unwrap();

    let jobs = jobs(&store).await;
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        let expected = if job.id == stuck[0].id {
            JobStatus::Running
        } else {
            JobStatus::Done
        };
        assert_eq!(job.status, expected, "{job:?}");
    }
    assert_eq!(store.scan("Note").await.len(), 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn queued_job_stays_running_until_picked_up() {
    let (store, session) = setup();
    let pool = pool();
    pool.stop();

    let handler = Scripted::handler(Outcome::Report(LaunchResult::success("ok")), session)
        .queued(Arc::clone(&pool));
    handler.handle_launch(&launch_event(Scripted::IDENTIFIER)).await;

    let jobs = jobs(&store).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[0].description, "Running 'Scripted'");

    let report = timeout(TEST_TIMEOUT, pool.shutdown()).await.unwrap();
    assert_eq!(report.unprocessed.len(), 1);
    assert_eq!(report.unprocessed[0].job_id, Some(jobs[0].id));
    assert_eq!(report.unprocessed[0].action, Scripted::IDENTIFIER);
}

#[tokio::test]
async fn registered_handlers_receive_routed_events() {
    let (_store, session) = setup();
    let hub = LocalEventHub::new();
    let config = HandlerConfig::default();

    let find_replace = ActionHandler::new(
        FindAndReplace::descriptor(),
        Arc::new(FindAndReplace),
        Arc::clone(&session),
    )
    .unwrap();
    Arc::new(find_replace).register(&hub, &config).await;
    Arc::new(Scripted::handler(
        Outcome::Report(LaunchResult::success("Scripted ran")),
        Arc::clone(&session),
    ))
    .register(&hub, &config)
    .await;
    assert_eq!(hub.subscriber_count().await, 4);

    let discover = ActionEvent::new(DISCOVER, "src-1", "user-1").with_selection("Shot", "sh010");
    let replies = hub.publish(discover).await;
    let identifiers: Vec<&str> = replies
        .iter()
        .map(|reply| reply["items"][0]["actionIdentifier"].as_str().unwrap())
        .collect();
    assert_eq!(identifiers, [FindAndReplace::IDENTIFIER, Scripted::IDENTIFIER]);

    let replies = hub.publish(launch_event(Scripted::IDENTIFIER)).await;
    assert_eq!(replies, vec![json!({"success": true, "message": "Scripted ran"})]);

    assert!(hub.publish(launch_event("unknown")).await.is_empty());
}

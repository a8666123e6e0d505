//! Turn submission: ids, persistence, hydration and per-conversation
//! serialization.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{FakeLauncher, ScriptedOracle, connected_registry, test_config};
use pretty_assertions::assert_eq;
use switchboard_engine::{
    ConversationSession, ConversationStore, HistoryConfig, JsonlStore, MemoryStore, Message,
    Oracle, OracleError, OracleReply, OracleRequest, OrchestrationLoop, Role, StoreError,
    StoredMessage, TurnError, TurnRequest, TurnService,
};
use tokio_test::assert_ok;

async fn service(oracle: Arc<dyn Oracle>, store: Arc<dyn ConversationStore>) -> TurnService {
    let (registry, _) = connected_registry(FakeLauncher::new(), &[]).await;
    TurnService::new(
        OrchestrationLoop::new(registry, oracle, &test_config()),
        Arc::new(ConversationSession::new(&HistoryConfig::default())),
        store,
    )
}

fn texts(messages: &[StoredMessage]) -> Vec<(Role, String)> {
    messages.iter().map(|m| (m.role, m.content.clone())).collect()
}

#[tokio::test]
async fn test_new_conversation_gets_an_id_and_is_stored() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::replies(vec![OracleReply::Text("hi there".into())]));
    let service = service(oracle, store.clone()).await;

    let response = service.submit(TurnRequest::new("  hello  ", "alice")).await.unwrap();

    assert_eq!(response.response, "hi there");
    assert!(uuid::Uuid::parse_str(&response.conversation_id).is_ok());
    assert_eq!(
        texts(&store.load(&response.conversation_id).await.unwrap()),
        vec![(Role::User, "hello".to_string()), (Role::Model, "hi there".to_string())]
    );
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let oracle = Arc::new(ScriptedOracle::default());
    let service = service(oracle.clone(), Arc::new(MemoryStore::new())).await;

    let err = service.submit(TurnRequest::new(" \n\t", "alice")).await.unwrap_err();
    assert!(matches!(err, TurnError::EmptyMessage));
    assert_eq!(oracle.call_count(), 0);
}

#[tokio::test]
async fn test_existing_conversation_continues() {
    let oracle = Arc::new(ScriptedOracle::replies(vec![
        OracleReply::Text("one".into()),
        OracleReply::Text("two".into()),
    ]));
    let service = service(oracle.clone(), Arc::new(MemoryStore::new())).await;

    let first = service.submit(TurnRequest::new("a", "u")).await.unwrap();
    let second = service
        .submit(TurnRequest::new("b", "u").in_conversation(&first.conversation_id))
        .await
        .unwrap();

    assert_eq!(second.conversation_id, first.conversation_id);
    assert_eq!(
        oracle.request(1).messages,
        vec![Message::user("a"), Message::model("one"), Message::user("b")]
    );
}

#[tokio::test]
async fn test_history_is_hydrated_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first_oracle = Arc::new(ScriptedOracle::replies(vec![OracleReply::Text("noted".into())]));
    let first = service(first_oracle, Arc::new(JsonlStore::new(dir.path()).unwrap())).await;
    let response = first
        .submit(TurnRequest::new("remember 42", "u").in_conversation("conv-1"))
        .await
        .unwrap();
    assert_eq!(response.conversation_id, "conv-1");
    drop(first);

    let second_oracle = Arc::new(ScriptedOracle::replies(vec![OracleReply::Text("42".into())]));
    let second = service(
        second_oracle.clone(),
        Arc::new(JsonlStore::new(dir.path()).unwrap()),
    )
    .await;
    second
        .submit(TurnRequest::new("what number?", "u").in_conversation("conv-1"))
        .await
        .unwrap();

    assert_eq!(
        second_oracle.request(0).messages,
        vec![
            Message::user("remember 42"),
            Message::model("noted"),
            Message::user("what number?"),
        ]
    );
}

#[tokio::test]
async fn test_failed_turn_keeps_user_message_only() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::new(vec![Err(OracleError::RateLimited)]));
    let service = service(oracle, store.clone()).await;

    let err = service
        .submit(TurnRequest::new("hello", "u").in_conversation("c"))
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::Oracle(OracleError::RateLimited)));

    assert_eq!(
        texts(&store.load("c").await.unwrap()),
        vec![(Role::User, "hello".to_string())]
    );
    assert_eq!(service.session().get("c"), vec![Message::user("hello")]);
}

/// Store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl ConversationStore for BrokenStore {
    async fn save(&self, _id: &str, _role: Role, _content: &str) -> Result<(), StoreError> {
        Err(std::io::Error::other("disk full").into())
    }

    async fn load(&self, _id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(Vec::new())
    }

    async fn clear(&self, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_store_failure_stops_turn_before_oracle() {
    let oracle = Arc::new(ScriptedOracle::replies(vec![OracleReply::Text("unused".into())]));
    let service = service(oracle.clone(), Arc::new(BrokenStore)).await;

    let err = service.submit(TurnRequest::new("hello", "u")).await.unwrap_err();
    assert!(matches!(err, TurnError::Store(StoreError::Io(_))));
    assert_eq!(oracle.call_count(), 0);
}

#[tokio::test]
async fn test_clear_forgets_conversation() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::replies(vec![
        OracleReply::Text("one".into()),
        OracleReply::Text("fresh".into()),
    ]));
    let service = service(oracle.clone(), store.clone()).await;

    service
        .submit(TurnRequest::new("a", "u").in_conversation("c"))
        .await
        .unwrap();
    assert_ok!(service.clear("c").await);

    assert!(service.session().get("c").is_empty());
    assert!(store.load("c").await.unwrap().is_empty());

    service
        .submit(TurnRequest::new("b", "u").in_conversation("c"))
        .await
        .unwrap();
    assert_eq!(oracle.request(1).messages, vec![Message::user("b")]);
}

/// Tracks how many oracle calls overlap.
#[derive(Default)]
struct OverlapOracle {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Oracle for OverlapOracle {
    async fn respond(&self, _request: &OracleRequest) -> Result<OracleReply, OracleError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(OracleReply::Text("ok".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_same_conversation_turns_are_serialized() {
    let oracle = Arc::new(OverlapOracle::default());
    let service = service(oracle.clone(), Arc::new(MemoryStore::new())).await;

    let (a, b) = tokio::join!(
        service.submit(TurnRequest::new("first", "u").in_conversation("c")),
        service.submit(TurnRequest::new("second", "u").in_conversation("c")),
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_eq!(oracle.peak.load(Ordering::SeqCst), 1);

    // Each turn completed before the next began.
    let roles: Vec<Role> = service.session().get("c").iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::User, Role::Model]);
}

#[tokio::test(start_paused = true)]
async fn test_different_conversations_run_concurrently() {
    let oracle = Arc::new(OverlapOracle::default());
    let service = service(oracle.clone(), Arc::new(MemoryStore::new())).await;

    let (a, b) = tokio::join!(
        service.submit(TurnRequest::new("first", "u").in_conversation("c1")),
        service.submit(TurnRequest::new("second", "u").in_conversation("c2")),
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_eq!(oracle.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_evict_idle_drops_memory_but_not_store() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::replies(vec![
        OracleReply::Text("one".into()),
        OracleReply::Text("two".into()),
    ]));
    let service = service(oracle.clone(), store).await;

    service
        .submit(TurnRequest::new("a", "u").in_conversation("c"))
        .await
        .unwrap();
    assert_eq!(service.evict_idle(Duration::ZERO), 1);
    assert!(service.session().is_empty());

    service
        .submit(TurnRequest::new("b", "u").in_conversation("c"))
        .await
        .unwrap();
    assert_eq!(
        oracle.request(1).messages,
        vec![Message::user("a"), Message::model("one"), Message::user("b")]
    );
}

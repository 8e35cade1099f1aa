//! Session coordinator behaviour under realistic play and contention

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talebound_core::{
    CharacterId, CharacterSnapshot, Event, EventDraft, EventId, NewEvent, Reducer, Reduction,
    SessionId, State,
};
use talebound_hub::hash::fingerprint;
use talebound_hub::{Error, HubConfig, SessionCoordinator};
use talebound_journal::{
    FlakyStore, LogStore, MemoryStore, SessionDocument, SessionMeta, StoreError,
};

fn create(id: &str, extra: Value) -> NewEvent {
    let mut character = json!({"id": id, "name": id, "hp": {"max": 20, "current": 20}});
    if let (Some(target), Value::Object(fields)) = (character.as_object_mut(), extra) {
        target.extend(fields);
    }
    NewEvent::new("create_char").data(json!({ "character": character }))
}

async fn hub_with_session(config: HubConfig) -> (SessionCoordinator, SessionId) {
    let hub = SessionCoordinator::in_memory(config);
    let session = SessionId::new("2024-01-15-0001");
    hub.create_session(&session, "bastards-blood").await.unwrap();
    (hub, session)
}

fn character<'a>(state: &'a State, id: &str) -> &'a CharacterSnapshot {
    &state.characters[&CharacterId::new(id)]
}

async fn append_all(hub: &SessionCoordinator, session: &SessionId, events: Vec<NewEvent>) {
    for event in events {
        hub.append(session, event).await.unwrap();
    }
}

#[tokio::test]
async fn test_damage_then_overheal_is_clamped() {
    let (hub, session) = hub_with_session(HubConfig::default()).await;
    append_all(
        &hub,
        &session,
        vec![
            NewEvent::new("create_char").data(json!({
                "character": {"id": "a", "name": "Ayla", "hp": {"max": 50, "current": 50}}
            })),
            NewEvent::new("damage").target("a").data(json!({"amount": 30})),
            NewEvent::new("heal").target("a").data(json!({"amount": 100})),
        ],
    )
    .await;

    let (state, unresolved) = hub.get_state(&session).await.unwrap();
    assert_eq!(character(&state, "a").hp.current, 50);
    assert!(unresolved.is_empty());
    assert_eq!(state.events_seen, 3);
}

#[tokio::test]
async fn test_damage_floors_at_zero() {
    let (hub, session) = hub_with_session(HubConfig::default()).await;
    append_all(
        &hub,
        &session,
        vec![
            create("a", json!({})),
            NewEvent::new("damage").target("a").data(json!({"amount": 500})),
        ],
    )
    .await;
    let (state, _) = hub.get_state(&session).await.unwrap();
    assert_eq!(character(&state, "a").hp.current, 0);
}

fn campaign() -> Vec<NewEvent> {
    vec![
        create(
            "kara",
            json!({
                "inventory": [{"id": "gem", "quantity": 2}, "sword"],
                "resources": {"stamina": {"max": 20, "current": 20}},
                "location": {"x": 0.0, "y": 0.0}
            }),
        ),
        create("merchant", json!({"currency": {"gold": 40}})),
        NewEvent::new("equip_item")
            .actor("kara")
            .data(json!({"item_id": "sword", "slot": "main_hand"})),
        NewEvent::new("gain_xp")
            .actor("kara")
            .data(json!({"skill": "mining", "amount": 1154})),
        NewEvent::new("trade_item")
            .actor("kara")
            .target("merchant")
            .data(json!({"item_id": "gem", "quantity": 3, "price": {"gold": 10}})),
        NewEvent::new("trade_item")
            .actor("kara")
            .target("merchant")
            .data(json!({"item_id": "gem", "quantity": 1, "price": {"gold": 10}})),
        NewEvent::new("status_apply")
            .target("kara")
            .data(json!({"effect": {"id": "bleed", "duration": 2}})),
        NewEvent::new("character_move")
            .actor("kara")
            .data(json!({"to": {"x": 30.0, "y": 40.0}})),
        NewEvent::new("advance_turn"),
        NewEvent::new("attack")
            .actor("kara")
            .target("merchant")
            .result(json!({"hit": false})),
        NewEvent::new("custom").data(json!({"omen": "a raven circles"})),
    ]
}

#[tokio::test]
async fn test_campaign_reduces_as_expected() {
    let (hub, session) = hub_with_session(HubConfig::default()).await;
    append_all(&hub, &session, campaign()).await;

    let (state, unresolved) = hub.get_state(&session).await.unwrap();
    let kara = character(&state, "kara");
    let merchant = character(&state, "merchant");

    // equip: out of inventory, into the slot
    assert_eq!(kara.held("sword"), 0);
    assert_eq!(kara.equipment["main_hand"].id, "sword");
    // xp
    assert_eq!(kara.skills["mining"].level, 10);
    // first trade asked for more gems than held: nothing moved
    assert_eq!(unresolved, vec![EventId::new(5)]);
    assert_eq!(kara.held("gem"), 1);
    assert_eq!(merchant.held("gem"), 1);
    assert_eq!(kara.balance("gold"), 10);
    assert_eq!(merchant.balance("gold"), 30);
    // 50 units walked at 0.1 stamina per unit
    assert_eq!(kara.resources["stamina"].current, 15);
    assert_eq!(kara.status("bleed").unwrap().duration, Some(1));
    assert_eq!(state.action_log.len(), 1);
}

#[tokio::test]
async fn test_unequip_returns_item_and_empties_slot() {
    let (hub, session) = hub_with_session(HubConfig::default()).await;
    append_all(
        &hub,
        &session,
        vec![
            create("a", json!({"inventory": ["helm"]})),
            NewEvent::new("equip_item")
                .actor("a")
                .data(json!({"item_id": "helm", "slot": "head"})),
        ],
    )
    .await;
    let (state, _) = hub.get_state(&session).await.unwrap();
    assert_eq!(character(&state, "a").held("helm"), 0);

    hub.append(
        &session,
        NewEvent::new("unequip_item").actor("a").data(json!({"slot": "head"})),
    )
    .await
    .unwrap();
    let (state, _) = hub.get_state(&session).await.unwrap();
    let a = character(&state, "a");
    assert!(!a.equipment.contains_key("head"));
    assert_eq!(a.held("helm"), 1);
}

#[tokio::test]
async fn test_incremental_cache_matches_full_replay() {
    let (hub, session) = hub_with_session(HubConfig::default()).await;
    // prime the cache so every append folds incrementally
    hub.get_state(&session).await.unwrap();

    for event in campaign() {
        hub.append(&session, event).await.unwrap();
        let cached = hub.reduce(&session).await.unwrap();
        let events = hub.list(&session, EventId::new(0)).unwrap();
        let full = Reducer::default().replay(session.clone(), &events);
        assert_eq!(cached, full);
        assert_eq!(hub.cached_head(&session).await, events.last().map(|e| e.id));
    }
}

#[tokio::test]
async fn test_replays_are_byte_identical() {
    let (hub, session) = hub_with_session(HubConfig::default()).await;
    append_all(&hub, &session, campaign()).await;
    let events = hub.list(&session, EventId::new(0)).unwrap();

    let first = Reducer::default().replay(session.clone(), &events);
    let second = Reducer::default().replay(session.clone(), &events);
    assert_eq!(first.state_bytes().unwrap(), second.state_bytes().unwrap());
    assert_eq!(
        fingerprint(&first.state).unwrap(),
        fingerprint(&second.state).unwrap()
    );

    let (served, _) = hub.get_state(&session).await.unwrap();
    assert_eq!(fingerprint(&served).unwrap(), fingerprint(&first.state).unwrap());
}

#[tokio::test]
async fn test_verified_cache_agrees_with_replay() {
    let config = HubConfig::default().with_cache_verification(true);
    let (hub, session) = hub_with_session(config).await;
    hub.get_state(&session).await.unwrap();
    append_all(&hub, &session, campaign()).await;

    let events = hub.list(&session, EventId::new(0)).unwrap();
    let full = Reducer::default().replay(session.clone(), &events);
    assert_eq!(hub.reduce(&session).await.unwrap(), full);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_keep_a_total_order() {
    let (hub, session) = hub_with_session(HubConfig::default()).await;
    let hub = Arc::new(hub);
    hub.append(&session, create("a", json!({}))).await.unwrap();
    hub.get_state(&session).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..32 {
        let hub = Arc::clone(&hub);
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            let event = NewEvent::new("gain_item")
                .actor("a")
                .data(json!({"item": {"id": format!("pebble-{}", i % 4), "quantity": 1}}));
            hub.append(&session, event).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let events = hub.list(&session, EventId::new(0)).unwrap();
    let ids: Vec<u64> = events.iter().map(|e| e.id.raw()).collect();
    assert_eq!(ids, (1..=33).collect::<Vec<u64>>());

    let (state, unresolved) = hub.get_state(&session).await.unwrap();
    assert!(unresolved.is_empty());
    let a = character(&state, "a");
    assert_eq!((0..4).map(|n| a.held(&format!("pebble-{}", n))).sum::<u32>(), 32);
    assert_eq!(
        hub.reduce(&session).await.unwrap(),
        Reducer::default().replay(session.clone(), &events)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_proceed_independently() {
    let hub = Arc::new(SessionCoordinator::in_memory(HubConfig::default()));
    let mut tasks = Vec::new();
    for n in 0..6 {
        let hub = Arc::clone(&hub);
        tasks.push(tokio::spawn(async move {
            let session = SessionId::new(format!("2024-01-15-{:04}", n + 1));
            hub.create_session(&session, "c").await?;
            hub.append(&session, create("a", json!({}))).await?;
            for _ in 0..n {
                hub.append(&session, NewEvent::new("damage").target("a").data(json!({"amount": 1})))
                    .await?;
            }
            let (state, _) = hub.get_state(&session).await?;
            Ok::<_, Error>((n, state))
        }));
    }
    for task in tasks {
        let (n, state) = task.await.unwrap().unwrap();
        assert_eq!(character(&state, "a").hp.current, 20 - n as i64);
    }
    assert_eq!(hub.sessions().unwrap().len(), 6);
}

/// Blocks every append for `delay` while holding the session's write lock
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
    entered: AtomicBool,
}

impl LogStore for SlowStore {
    fn create_session(&self, id: &SessionId, campaign: &str) -> talebound_journal::Result<SessionMeta> {
        self.inner.create_session(id, campaign)
    }

    fn import_session(
        &self,
        id: &SessionId,
        campaign: &str,
        created_at: chrono::DateTime<chrono::Utc>,
        events: Vec<Event>,
    ) -> talebound_journal::Result<SessionMeta> {
        self.inner.import_session(id, campaign, created_at, events)
    }

    fn append_draft(&self, session: &SessionId, draft: EventDraft) -> talebound_journal::Result<Event> {
        self.entered.store(true, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.append_draft(session, draft)
    }

    fn list(&self, session: &SessionId, from: EventId) -> talebound_journal::Result<Vec<Event>> {
        self.inner.list(session, from)
    }

    fn session_meta(&self, session: &SessionId) -> talebound_journal::Result<SessionMeta> {
        self.inner.session_meta(session)
    }

    fn list_sessions(&self) -> talebound_journal::Result<Vec<SessionMeta>> {
        self.inner.list_sessions()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_append_gives_up_when_session_is_busy() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(300),
        entered: AtomicBool::new(false),
    });
    let config = HubConfig::default().with_lock_timeout(Duration::from_millis(20));
    let hub = Arc::new(SessionCoordinator::new(store.clone(), config));
    let session = SessionId::new("s");
    hub.create_session(&session, "c").await.unwrap();

    let slow = {
        let hub = Arc::clone(&hub);
        let session = session.clone();
        tokio::spawn(async move { hub.append(&session, create("a", json!({}))).await })
    };
    while !store.entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let err = hub
        .append(&session, NewEvent::new("note").data(json!({"text": "too soon"})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Busy { .. }));
    assert!(err.is_retryable());

    assert_eq!(slow.await.unwrap().unwrap(), EventId::new(1));
    // the busy append left nothing behind
    assert_eq!(hub.list(&session, EventId::new(0)).unwrap().len(), 1);
}

#[tokio::test]
async fn test_unavailable_store_can_be_retried() {
    let store = Arc::new(FlakyStore::new(MemoryStore::new()));
    let hub = SessionCoordinator::new(store.clone(), HubConfig::default());
    let session = SessionId::new("s");
    hub.create_session(&session, "c").await.unwrap();
    hub.get_state(&session).await.unwrap();
    store.fail_next_appends(2);

    let mut attempts = 0;
    let id = loop {
        attempts += 1;
        match hub.append(&session, create("a", json!({}))).await {
            Ok(id) => break id,
            Err(e) if e.is_retryable() => continue,
            Err(e) => panic!("unexpected error: {}", e),
        }
    };
    assert_eq!(attempts, 3);
    assert_eq!(id, EventId::new(1));

    let (state, _) = hub.get_state(&session).await.unwrap();
    assert_eq!(state.characters.len(), 1);
    assert_eq!(state.events_seen, 1);
}

#[tokio::test]
async fn test_sessions_created_on_the_store_are_adopted() {
    let store = Arc::new(MemoryStore::new());
    let session = SessionId::new("s");
    store.create_session(&session, "c").unwrap();
    store.append(&session, create("a", json!({}))).unwrap();

    let hub = SessionCoordinator::new(store, HubConfig::default());
    let (state, _) = hub.get_state(&session).await.unwrap();
    assert_eq!(state.characters.len(), 1);
}

#[tokio::test]
async fn test_imported_document_continues_numbering() {
    let hub = SessionCoordinator::in_memory(HubConfig::default());
    let document = SessionDocument::from_json(
        r#"{"id": "2024-01-15-0002", "campaign": "bastards-blood", "events": [
            {"id": "e_x1", "ts": "2024-01-15T18:30:00Z", "t": "create_char",
             "data": {"character": {"id": "kara", "name": "Kara", "hp": {"max": 20}}}},
            {"id": "e_x2", "ts": "2024-01-15T18:31:00Z", "t": "lose_item",
             "actor": "kara", "data": {"item_id": "rope"}}
        ]}"#,
    )
    .unwrap();
    hub.import(&document).await.unwrap();

    let id = hub
        .append(
            &document.id,
            NewEvent::new("gain_item").actor("kara").data(json!({"item": "rope"})),
        )
        .await
        .unwrap();
    assert_eq!(id, EventId::new(3));

    let (state, unresolved) = hub.get_state(&document.id).await.unwrap();
    assert_eq!(unresolved, vec![EventId::new(2)]);
    assert_eq!(character(&state, "kara").held("rope"), 1);

    assert!(matches!(
        hub.import(&document).await,
        Err(Error::Store(StoreError::SessionExists(_)))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_during_appends_see_a_prefix_of_the_log() {
    let (hub, session) = hub_with_session(HubConfig::default()).await;
    let hub = Arc::new(hub);
    hub.append(&session, create("a", json!({"hp": {"max": 1000, "current": 1000}})))
        .await
        .unwrap();
    hub.get_state(&session).await.unwrap();

    let mut writers = Vec::new();
    for _ in 0..4 {
        let hub = Arc::clone(&hub);
        let session = session.clone();
        writers.push(tokio::spawn(async move {
            for _ in 0..25 {
                let event = NewEvent::new("damage").target("a").data(json!({"amount": 1}));
                hub.append(&session, event).await.unwrap();
            }
        }));
    }
    let mut readers = Vec::new();
    for _ in 0..4 {
        let hub = Arc::clone(&hub);
        let session = session.clone();
        readers.push(tokio::spawn(async move {
            let mut seen: Vec<Reduction> = Vec::new();
            for _ in 0..25 {
                seen.push(hub.reduce(&session).await.unwrap());
                tokio::task::yield_now().await;
            }
            seen
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let events = hub.list(&session, EventId::new(0)).unwrap();
    assert_eq!(events.len(), 101);
    for reader in readers {
        for read in reader.await.unwrap() {
            let prefix = read.state.last_event_id.map(|id| id.raw()).unwrap_or(0) as usize;
            assert!(prefix >= 1);
            let expected = Reducer::default().replay(session.clone(), &events[..prefix]);
            assert_eq!(read, expected);
            assert_eq!(
                character(&read.state, "a").hp.current,
                1000 - (prefix as i64 - 1)
            );
        }
    }

    let (state, _) = hub.get_state(&session).await.unwrap();
    assert_eq!(character(&state, "a").hp.current, 900);
}

/// Records where every listing starts
struct RecordingStore {
    inner: MemoryStore,
    listed_from: Mutex<Vec<EventId>>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            listed_from: Mutex::new(Vec::new()),
        }
    }

    fn take_listings(&self) -> Vec<EventId> {
        std::mem::take(&mut *self.listed_from.lock().unwrap())
    }
}

impl LogStore for RecordingStore {
    fn create_session(&self, id: &SessionId, campaign: &str) -> talebound_journal::Result<SessionMeta> {
        self.inner.create_session(id, campaign)
    }

    fn import_session(
        &self,
        id: &SessionId,
        campaign: &str,
        created_at: chrono::DateTime<chrono::Utc>,
        events: Vec<Event>,
    ) -> talebound_journal::Result<SessionMeta> {
        self.inner.import_session(id, campaign, created_at, events)
    }

    fn append_draft(&self, session: &SessionId, draft: EventDraft) -> talebound_journal::Result<Event> {
        self.inner.append_draft(session, draft)
    }

    fn list(&self, session: &SessionId, from: EventId) -> talebound_journal::Result<Vec<Event>> {
        self.listed_from.lock().unwrap().push(from);
        self.inner.list(session, from)
    }

    fn session_meta(&self, session: &SessionId) -> talebound_journal::Result<SessionMeta> {
        self.inner.session_meta(session)
    }

    fn list_sessions(&self) -> talebound_journal::Result<Vec<SessionMeta>> {
        self.inner.list_sessions()
    }
}

#[tokio::test]
async fn test_read_catches_up_a_cache_behind_the_log() {
    let store = Arc::new(RecordingStore::new());
    let hub = SessionCoordinator::new(store.clone(), HubConfig::default());
    let session = SessionId::new("s");
    hub.create_session(&session, "c").await.unwrap();
    append_all(
        &hub,
        &session,
        vec![
            create("a", json!({})),
            NewEvent::new("damage").target("a").data(json!({"amount": 2})),
        ],
    )
    .await;
    hub.get_state(&session).await.unwrap();
    assert_eq!(hub.cached_head(&session).await, Some(EventId::new(2)));

    // appended behind the coordinator's back, as a crashed append would leave it
    for amount in [3, 4] {
        store
            .append(
                &session,
                NewEvent::new("damage").target("a").data(json!({"amount": amount})),
            )
            .unwrap();
    }
    store.take_listings();

    let (state, unresolved) = hub.get_state(&session).await.unwrap();
    assert_eq!(character(&state, "a").hp.current, 11);
    assert!(unresolved.is_empty());
    assert_eq!(hub.cached_head(&session).await, Some(EventId::new(4)));
    // folded from the cached head on, no full replay
    assert_eq!(store.take_listings(), vec![EventId::new(2)]);

    let events = hub.list(&session, EventId::new(0)).unwrap();
    assert_eq!(
        hub.reduce(&session).await.unwrap(),
        Reducer::default().replay(session.clone(), &events)
    );
}

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use tally_core::event::{NewPlaceholder, RowAddPayload, RowChange, RowInsertPayload, TableEvent};
use tally_core::model::{Group, ServerModel, TableResponse};
use tally_core::reducer::Reducer;
use tally_core::rows::{GroupId, PlaceholderId, RowCollection, RowData, RowId};
use tally_core::Store;
use tally_sync::{ApiCall, ApiError, InMemoryApi, Orchestrator, Settled, SyncError};

const LATENCY: Duration = Duration::from_millis(100);

fn fields(value: Value) -> RowData {
    serde_json::from_value(value).expect("fields")
}

fn pid(token: &str) -> PlaceholderId {
    PlaceholderId::new(token).expect("placeholder id")
}

fn new_placeholder(token: &str, data: Value) -> NewPlaceholder {
    NewPlaceholder {
        id: pid(token),
        data: fields(data),
    }
}

fn row_add(tokens: &[&str], group: Option<u64>) -> TableEvent {
    TableEvent::RowAdd(RowAddPayload {
        placeholders: tokens.iter().map(|t| new_placeholder(t, json!({}))).collect(),
        group: group.map(GroupId),
    })
}

/// Seed the server with models and build the matching collection.
async fn seeded(api: &InMemoryApi, ids: &[u64], groups: Vec<Group>) -> RowCollection {
    let mut models = Vec::new();
    for &id in ids {
        let model = ServerModel {
            id,
            children: vec![],
            fields: fields(json!({"rate": 1, "quantity": 1})),
        };
        api.insert(model.clone()).await;
        models.push(model);
    }
    RowCollection::from_response(&TableResponse {
        models,
        groups,
        markups: vec![],
    })
    .expect("collection")
}

fn orchestrator(api: &Arc<InMemoryApi>, rows: RowCollection) -> Orchestrator {
    Orchestrator::new(api.clone(), Store::new(rows, Reducer::default()))
}

fn ids(sync: &Orchestrator) -> Vec<String> {
    sync.rows().iter().map(|row| row.id().to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn created_placeholder_is_activated_in_place() {
    let api = Arc::new(InMemoryApi::new(LATENCY).with_first_id(10));
    let rows = seeded(&api, &[1, 2], vec![]).await;
    let mut sync = orchestrator(&api, rows);

    sync.submit(&TableEvent::RowInsert(RowInsertPayload {
        previous: RowId::Model(1),
        placeholder: new_placeholder("a", json!({"rate": 5})),
    }))
    .expect("submit");
    assert_eq!(ids(&sync), ["1", "placeholder-a", "2"]);
    assert_eq!(sync.in_flight(), 1);

    let settled = sync.settle_all().await.expect("settle");
    assert_eq!(
        settled,
        vec![Settled::Activated {
            placeholder: pid("a"),
            model: 10
        }]
    );
    assert_eq!(ids(&sync), ["1", "10", "2"]);
    assert_eq!(api.model(10).await.expect("model").fields["rate"], 5);
    assert_eq!(sync.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn create_carries_group_and_activation_keeps_it() {
    let api = Arc::new(InMemoryApi::new(LATENCY).with_first_id(20));
    let crew = Group {
        id: 3,
        name: "Crew".into(),
        color: None,
        children: vec![1],
    };
    let rows = seeded(&api, &[1, 2], vec![crew]).await;
    let mut sync = orchestrator(&api, rows);

    sync.submit(&row_add(&["a"], Some(3))).expect("submit");
    sync.settle_all().await.expect("settle");

    assert_eq!(
        api.calls().await,
        vec![ApiCall::Create {
            data: RowData::new(),
            group: Some(GroupId(3)),
        }]
    );
    assert_eq!(ids(&sync), ["1", "20", "group-3", "2"]);
    let added = sync.rows().get(&RowId::Model(20)).expect("row");
    assert_eq!(added.group(), Some(GroupId(3)));
}

#[tokio::test(start_paused = true)]
async fn edits_made_during_create_are_resent_and_kept() {
    let api = Arc::new(InMemoryApi::new(LATENCY));
    let mut sync = orchestrator(&api, RowCollection::default());

    sync.submit(&row_add(&["a"], None)).expect("add");
    sync.submit(&TableEvent::data_change(vec![
        RowChange::new(RowId::Placeholder(pid("a"))).with("description", (), "Dolly"),
    ]))
    .expect("edit");

    let settled = sync.settle_all().await.expect("settle");
    assert_eq!(
        settled,
        vec![
            Settled::Activated {
                placeholder: pid("a"),
                model: 1
            },
            Settled::Confirmed { id: 1 },
        ]
    );
    assert_eq!(
        api.calls().await,
        vec![
            ApiCall::Create {
                data: RowData::new(),
                group: None,
            },
            ApiCall::Update {
                id: 1,
                patch: fields(json!({"description": "Dolly"})),
            },
        ]
    );
    let row = sync.rows().get(&RowId::Model(1)).expect("row");
    assert_eq!(row.data().expect("data")["description"], "Dolly");
}

#[tokio::test(start_paused = true)]
async fn failed_create_rolls_back_placeholder() {
    let api = Arc::new(InMemoryApi::new(LATENCY));
    let rows = seeded(&api, &[1], vec![]).await;
    let mut sync = orchestrator(&api, rows);
    api.reject_creates(true);

    sync.submit(&row_add(&["a", "b"], None)).expect("submit");
    assert_eq!(sync.rows().len(), 3);

    let settled = sync.settle_all().await.expect("settle");
    assert_eq!(settled.len(), 2);
    assert!(settled.iter().all(|s| matches!(
        s,
        Settled::RolledBack {
            error: ApiError::Rejected { status: 400, .. },
            ..
        }
    )));
    assert_eq!(ids(&sync), ["1"]);
}

#[tokio::test(start_paused = true)]
async fn newer_update_supersedes_and_carries_older_fields() {
    let api = Arc::new(InMemoryApi::new(LATENCY));
    let rows = seeded(&api, &[5], vec![]).await;
    let mut sync = orchestrator(&api, rows);

    sync.submit(&TableEvent::data_change(vec![
        RowChange::new(5).with("description", (), "A"),
    ]))
    .expect("first");
    sync.submit(&TableEvent::data_change(vec![RowChange::new(5).with("rate", 1, 9)]))
        .expect("second");
    assert_eq!(sync.in_flight(), 1);
    assert_eq!(sync.outstanding(), 2);

    let settled = sync.settle_all().await.expect("settle");
    assert_eq!(
        settled,
        vec![
            Settled::Superseded {
                id: RowId::Model(5)
            },
            Settled::Confirmed { id: 5 },
        ]
    );
    assert_eq!(
        api.calls().await,
        vec![ApiCall::Update {
            id: 5,
            patch: fields(json!({"description": "A", "rate": 9})),
        }]
    );
    let data = sync.rows().get(&RowId::Model(5)).expect("row").data().expect("data").clone();
    assert_eq!(data["description"], "A");
    assert_eq!(data["rate"], 9);
}

#[tokio::test(start_paused = true)]
async fn delete_cancels_pending_update() {
    let api = Arc::new(InMemoryApi::new(LATENCY));
    let rows = seeded(&api, &[5, 6], vec![]).await;
    let mut sync = orchestrator(&api, rows);

    sync.submit(&TableEvent::data_change(vec![RowChange::new(5).with("rate", 1, 2)]))
        .expect("edit");
    sync.submit(&TableEvent::row_delete(vec![RowId::Model(5)]))
        .expect("delete");

    let settled = sync.settle_all().await.expect("settle");
    assert_eq!(
        settled,
        vec![
            Settled::Superseded {
                id: RowId::Model(5)
            },
            Settled::Deleted { id: 5 },
        ]
    );
    assert_eq!(api.calls().await, vec![ApiCall::Delete { id: 5 }]);
    assert!(api.model(5).await.is_none());
    assert_eq!(ids(&sync), ["6"]);
}

#[tokio::test(start_paused = true)]
async fn confirmation_racing_local_delete_removes_server_model() {
    let api = Arc::new(InMemoryApi::new(LATENCY));
    let mut sync = orchestrator(&api, RowCollection::default());

    sync.submit(&row_add(&["a"], None)).expect("add");
    // Let the create reach the server before the user deletes the row.
    tokio::time::sleep(LATENCY * 2).await;
    assert!(api.model(1).await.is_some());
    sync.submit(&TableEvent::row_delete(vec![RowId::Placeholder(pid("a"))]))
        .expect("delete");

    let settled = sync.settle_all().await.expect("settle");
    assert_eq!(
        settled,
        vec![
            Settled::Superseded {
                id: RowId::Placeholder(pid("a"))
            },
            Settled::Deleted { id: 1 },
        ]
    );
    assert!(sync.rows().is_empty());
    assert!(api.model(1).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_edit_sends_nothing() {
    let api = Arc::new(InMemoryApi::new(LATENCY));
    let rows = seeded(&api, &[1], vec![]).await;
    let mut sync = orchestrator(&api, rows);

    let stale = sync
        .submit(&TableEvent::data_change(vec![RowChange::new(99).with("rate", 1, 3)]))
        .expect("submit");
    assert_eq!(stale.len(), 1);
    assert_eq!(sync.outstanding(), 0);
    assert_eq!(sync.settle_next().await.expect("settle"), None);
    assert!(api.calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_event_starts_no_writes() {
    let api = Arc::new(InMemoryApi::new(LATENCY));
    let mut sync = orchestrator(&api, RowCollection::default());
    sync.submit(&row_add(&["a"], None)).expect("add");

    let err = sync.submit(&row_add(&["a"], None)).expect_err("duplicate");
    assert!(matches!(err, SyncError::Reduce(_)));
    assert_eq!(sync.outstanding(), 1);
    assert_eq!(sync.rows().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn local_only_events_start_no_writes() {
    let api = Arc::new(InMemoryApi::new(LATENCY));
    let rows = seeded(&api, &[1, 2], vec![]).await;
    let mut sync = orchestrator(&api, rows);

    sync.submit(&TableEvent::GroupAdd(Group {
        id: 4,
        name: "Props".into(),
        color: None,
        children: vec![1, 2],
    }))
    .expect("group");
    assert_eq!(sync.outstanding(), 0);
    assert_eq!(ids(&sync), ["1", "2", "group-4"]);
}

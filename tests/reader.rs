//! Reader loops against scripted sources: backlog membership filtering and
//! the live tail's dedup + idle-flush behavior.

mod common;

use std::time::Duration;
use tokio::sync::watch;

use common::{raw_item, MemoryDedup, RecordingSink, ScriptedSource};
use vigil::app::dispatch::BatchDispatcher;
use vigil::app::reader;
use vigil::domain::stream::Priority;

#[tokio::test]
async fn backlog_drops_already_seen_ids_per_page() {
    let source = ScriptedSource::new(
        vec![ScriptedSource::page(
            vec![
                raw_item("ModAction_a", Some("t3_aaa")),
                raw_item("ModAction_b", Some("t1_bbb")),
            ],
            None,
        )],
        vec![],
    );
    let dedup = MemoryDedup::seeded(&["ModAction_a"]);
    let sink = RecordingSink::new();
    let dispatcher = BatchDispatcher::new(&sink, false, 500, 10);

    reader::run_backlog(&source, &dedup, &dispatcher).await.unwrap();

    let units = sink.units();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].actions.len(), 1);
    assert_eq!(units[0].actions[0].id, "ModAction_b");
    assert_eq!(units[0].priority, Priority::BacklogOrdinary);
    // Survivors are marked seen after dispatch.
    assert!(dedup.contains("ModAction_b"));
}

#[tokio::test]
async fn backlog_follows_the_cursor_across_pages() {
    let source = ScriptedSource::new(
        vec![
            ScriptedSource::page(vec![raw_item("ModAction_1", None)], Some("cursor_1")),
            ScriptedSource::page(vec![raw_item("ModAction_2", None)], None),
        ],
        vec![],
    );
    let dedup = MemoryDedup::new();
    let sink = RecordingSink::new();
    let dispatcher = BatchDispatcher::new(&sink, false, 500, 10);

    reader::run_backlog(&source, &dedup, &dispatcher).await.unwrap();

    let units = sink.units();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].actions[0].id, "ModAction_1");
    assert_eq!(units[1].actions[0].id, "ModAction_2");
}

#[tokio::test]
async fn stream_emits_in_source_order_and_flushes_on_idle() {
    // The source delivers newest first; the reader re-emits oldest first.
    let source = ScriptedSource::new(
        vec![],
        vec![ScriptedSource::page(
            vec![
                raw_item("ModAction_new", None),
                raw_item("ModAction_old", None),
            ],
            None,
        )],
    );
    let dedup = MemoryDedup::new();
    let sink = RecordingSink::new();
    let mut dispatcher = BatchDispatcher::new(&sink, false, 500, 10);

    let (tx, rx) = watch::channel(false);
    source.shutdown_when_drained(tx);

    reader::run_stream(&source, &dedup, &mut dispatcher, Duration::from_millis(5), rx)
        .await
        .unwrap();

    let units = sink.units();
    assert_eq!(units.len(), 1);
    let ids: Vec<&str> = units[0].actions.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["ModAction_old", "ModAction_new"]);
    assert!(units[0].live);
}

#[tokio::test]
async fn stream_skips_ids_the_cache_already_saw() {
    let source = ScriptedSource::new(
        vec![],
        vec![ScriptedSource::page(
            vec![
                raw_item("ModAction_b", None),
                raw_item("ModAction_a", None),
            ],
            None,
        )],
    );
    let dedup = MemoryDedup::seeded(&["ModAction_a"]);
    let sink = RecordingSink::new();
    let mut dispatcher = BatchDispatcher::new(&sink, false, 500, 10);

    let (tx, rx) = watch::channel(false);
    source.shutdown_when_drained(tx);

    reader::run_stream(&source, &dedup, &mut dispatcher, Duration::from_millis(5), rx)
        .await
        .unwrap();

    let units = sink.units();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].actions.len(), 1);
    assert_eq!(units[0].actions[0].id, "ModAction_b");
}

#[tokio::test]
async fn admin_stream_dispatches_each_record_unbatched() {
    let source = ScriptedSource::new(
        vec![],
        vec![ScriptedSource::page(
            vec![
                raw_item("ModAction_2", None),
                raw_item("ModAction_1", None),
            ],
            None,
        )],
    );
    let dedup = MemoryDedup::new();
    let sink = RecordingSink::new();
    let mut dispatcher = BatchDispatcher::new(&sink, true, 500, 10);

    let (tx, rx) = watch::channel(false);
    source.shutdown_when_drained(tx);

    reader::run_stream(&source, &dedup, &mut dispatcher, Duration::from_millis(5), rx)
        .await
        .unwrap();

    let units = sink.units();
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|unit| unit.actions.len() == 1));
    assert!(units.iter().all(|unit| unit.priority == Priority::LiveAdmin));
}

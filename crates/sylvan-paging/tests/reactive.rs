mod common;

use std::sync::Arc;

use common::{at, attached_within, config, manager, sorted, Behaviour, TestLoader};
use sylvan_core::CellCoord;
use sylvan_paging::{
    Executor, PageEvent, PageStatus, PagingManager, RecordingScene, ReactiveManager,
};

fn mirror(
    source: &mut dyn sylvan_paging::PageEventSource,
    cache_time: Option<f32>,
) -> (ReactiveManager, Arc<TestLoader>, RecordingScene) {
    let loader = Arc::new(TestLoader::new("Mirror"));
    let scene = RecordingScene::new();
    let reactive = ReactiveManager::new(
        loader.clone(),
        Arc::new(Executor::inline()),
        Box::new(scene.clone()),
        sylvan_paging::PagingConfig {
            cache_time,
            ..config(0)
        },
        source,
    )
    .unwrap();
    (reactive, loader, scene)
}

fn loaded_cells(active: &PagingManager) -> Vec<CellCoord> {
    sorted(
        active
            .cells()
            .into_iter()
            .filter(|&c| active.page_status(c) == Some(PageStatus::Loaded))
            .collect(),
    )
}

#[test]
fn mirrors_loaded_source_pages() {
    let (mut active, active_loader, _) = manager(1, None);
    active_loader.set_behaviour(CellCoord::new(1, 1), Behaviour::Empty);
    let (mut reactive, _, scene) = mirror(&mut active, None);

    active.update(at(0, 0), 0.016);
    reactive.update(at(0, 0), 0.016);

    assert_eq!(sorted(reactive.cells()), loaded_cells(&active));
    assert!(reactive.page(CellCoord::new(1, 1)).is_none());
    assert_eq!(reactive.stats().loaded, 8);

    for (x, z) in [(1, 0), (2, 1), (6, 6)] {
        active.update(at(x, z), 0.016);
        reactive.update(at(x, z), 0.016);
        assert_eq!(sorted(reactive.cells()), loaded_cells(&active));
        assert!(attached_within(&scene, &reactive.cells()));
    }
}

#[test]
fn reactive_managers_chain() {
    let (mut active, _, _) = manager(1, None);
    let (mut first, _, _) = mirror(&mut active, None);
    let (mut second, _, _) = mirror(&mut first, None);

    for (x, z) in [(0, 0), (0, 1), (-4, 2)] {
        active.update(at(x, z), 0.016);
        first.update(at(x, z), 0.016);
        second.update(at(x, z), 0.016);
    }
    assert_eq!(sorted(second.cells()), sorted(active.cells()));
}

#[test]
fn late_subscriber_catches_up() {
    let (mut active, _, _) = manager(1, None);
    active.update(at(0, 0), 0.016);

    let (mut reactive, _, _) = mirror(&mut active, None);
    reactive.update(at(0, 0), 0.016);
    assert_eq!(reactive.stats().loaded, 9);
}

#[test]
fn source_reload_is_mirrored() {
    let (mut active, _, _) = manager(1, None);
    let (mut reactive, loader, _) = mirror(&mut active, None);
    active.update(at(0, 0), 0.016);
    reactive.update(at(0, 0), 0.016);

    let cell = CellCoord::new(0, -1);
    active.reload_page(cell);
    active.update(at(0, 0), 0.016);
    reactive.update(at(0, 0), 0.016);

    assert_eq!(loader.loads(cell), 2);
    assert_eq!(reactive.page_status(cell), Some(PageStatus::Loaded));
}

#[test]
fn reactive_cache_recycles_pages() {
    let (mut active, _, _) = manager(1, None);
    let (mut reactive, loader, _) = mirror(&mut active, Some(5.0));

    for (x, z) in [(0, 0), (1, 0), (0, 0)] {
        active.update(at(x, z), 0.1);
        reactive.update(at(x, z), 0.1);
    }
    assert_eq!(loader.loads(CellCoord::new(-1, 0)), 1);
    assert_eq!(reactive.stats().cached, 3);
}

#[test]
fn explicit_event_stream() {
    let (tx, rx) = crossbeam::channel::unbounded();
    let loader = Arc::new(TestLoader::new("Mirror"));
    let mut reactive = ReactiveManager::from_receiver(
        loader,
        Arc::new(Executor::inline()),
        Box::new(RecordingScene::new()),
        config(0),
        rx,
    )
    .unwrap();

    let cell = CellCoord::new(4, -2);
    tx.send(PageEvent::Loaded(cell)).unwrap();
    tx.send(PageEvent::Loaded(cell)).unwrap();
    tx.send(PageEvent::Unloaded(CellCoord::new(9, 9))).unwrap();
    reactive.update(at(4, -2), 0.016);
    assert_eq!(reactive.cells(), vec![cell]);

    tx.send(PageEvent::Unloaded(cell)).unwrap();
    drop(tx);
    reactive.update(at(4, -2), 0.016);
    reactive.update(at(4, -2), 0.016);
    assert!(reactive.cells().is_empty());
}

#[test]
fn page_size_must_match_source() {
    let (mut active, _, _) = manager(1, None);
    let result = ReactiveManager::new(
        Arc::new(TestLoader::new("Mirror").with_page_size(128.0)),
        Arc::new(Executor::inline()),
        Box::new(RecordingScene::new()),
        config(0),
        &mut active,
    );
    assert!(result.is_err());
}

use std::cell::RefCell;
use std::rc::Rc;

use fetch_image_core::Duration;
use fetch_image_foundation::{
    CoordinatorOptions, ImagePrefetcher, PrefetchCoordinator, PrefetchStrategy, PrefetchWindow,
    StorageReference, Url,
};
use fetch_image_testing::prelude::*;

fn url(index: usize) -> Url {
    Url::parse(&format!("https://cdn.example.com/photos/{index}.jpg")).unwrap()
}

fn urls(range: std::ops::Range<usize>) -> Vec<Url> {
    range.map(url).collect()
}

fn reference(index: usize) -> StorageReference {
    StorageReference::new("photos", format!("{index}.jpg"))
}

fn announcements(coordinator: &PrefetchCoordinator) -> Rc<RefCell<Vec<usize>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    coordinator.on_universe_changed(move |count| sink.borrow_mut().push(count));
    seen
}

#[test]
fn direct_urls_are_prefetched_ahead_of_visible_items() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let coordinator =
        PrefetchCoordinator::with_urls(ui.executor(), prefetcher.clone(), urls(0..30));
    assert_eq!(coordinator.len(), 30);

    for index in 0..5 {
        coordinator.on_appear(index);
    }
    ui.advance_millis(100);

    assert_eq!(prefetcher.events(), vec![PrefetchEvent::Begin(urls(5..17))]);
}

#[test]
fn end_of_list_clips_prefetch_requests() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let coordinator =
        PrefetchCoordinator::with_urls(ui.executor(), prefetcher.clone(), urls(0..10));

    for index in 0..5 {
        coordinator.on_appear(index);
    }
    ui.advance_millis(100);

    assert_eq!(prefetcher.events(), vec![PrefetchEvent::Begin(urls(5..10))]);
}

#[test]
fn scrolling_forwards_start_and_stop_to_the_client() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let options = CoordinatorOptions {
        strategy: PrefetchStrategy::new(3),
        ..CoordinatorOptions::default()
    };
    let coordinator = PrefetchCoordinator::new(ui.executor(), prefetcher.clone(), options);
    coordinator.set_urls(urls(0..50));

    for index in 0..10 {
        coordinator.on_appear(index);
    }
    ui.advance_millis(100);
    prefetcher.take_events();

    for index in 0..5 {
        coordinator.on_disappear(index);
    }
    for index in 10..15 {
        coordinator.on_appear(index);
    }
    ui.advance_millis(100);

    assert_eq!(
        prefetcher.events(),
        vec![
            PrefetchEvent::Begin(urls(15..18)),
            PrefetchEvent::End(urls(10..13)),
        ]
    );
    assert_eq!(prefetcher.active(), urls(15..18));
}

#[test]
fn resolution_batch_announces_once_after_every_reference_completes() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let resolver = ScriptedResolver::new()
        .with_cached(&reference(0), url(0))
        .with_cached(&reference(3), url(3));
    let references: Vec<_> = (0..6).map(reference).collect();

    let coordinator = PrefetchCoordinator::new(
        ui.executor(),
        prefetcher.clone(),
        CoordinatorOptions::default(),
    );
    let seen = announcements(&coordinator);
    coordinator.resolve_references(&resolver, &references);

    assert_eq!(resolver.resolve_calls(), 4);
    assert!(coordinator.is_resolving());
    assert!(coordinator.is_valid_index(0));
    assert!(!coordinator.is_valid_index(1));
    assert!(coordinator.is_valid_index(3));
    ui.run_until_stalled();

    // Completion order differs from input order.
    assert!(resolver.succeed(&reference(2), url(2)));
    assert!(resolver.fail_not_found(&reference(1)));
    ui.run_until_stalled();
    assert!(seen.borrow().is_empty());
    assert!(coordinator.is_valid_index(2));
    assert!(!coordinator.is_valid_index(1));

    assert!(resolver.succeed(&reference(5), url(5)));
    ui.run_until_stalled();
    assert!(seen.borrow().is_empty());

    assert!(resolver.fail_not_found(&reference(4)));
    ui.run_until_stalled();
    assert_eq!(*seen.borrow(), vec![4]);
    assert!(!coordinator.is_resolving());

    assert_eq!(
        coordinator.urls(),
        vec![Some(url(0)), None, Some(url(2)), Some(url(3)), None, Some(url(5))]
    );
    let valid: Vec<usize> = (0..8).filter(|&i| coordinator.is_valid_index(i)).collect();
    assert_eq!(valid, vec![0, 2, 3, 5]);

    // Failed references are never requested.
    coordinator.on_appear(0);
    ui.advance_millis(100);
    assert_eq!(
        prefetcher.events(),
        vec![PrefetchEvent::Begin(vec![url(2), url(3), url(5)])]
    );
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn all_cache_hits_announce_synchronously() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let resolver = (0..3).fold(ScriptedResolver::new(), |resolver, index| {
        resolver.with_cached(&reference(index), url(index))
    });
    let references: Vec<_> = (0..3).map(reference).collect();

    let coordinator = PrefetchCoordinator::new(
        ui.executor(),
        prefetcher,
        CoordinatorOptions::default(),
    );
    let seen = announcements(&coordinator);
    coordinator.resolve_references(&resolver, &references);

    assert_eq!(resolver.resolve_calls(), 0);
    assert_eq!(*seen.borrow(), vec![3]);
    assert!(!coordinator.is_resolving());
    assert_eq!(coordinator.resolved_count(), 3);
}

#[test]
fn stalled_resolution_times_out() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let resolver = ScriptedResolver::new();
    let options = CoordinatorOptions {
        resolution_timeout: Some(Duration::from_secs(1)),
        ..CoordinatorOptions::default()
    };
    let coordinator = PrefetchCoordinator::new(ui.executor(), prefetcher, options);
    let seen = announcements(&coordinator);
    coordinator.resolve_references(&resolver, &[reference(0), reference(1)]);

    assert!(resolver.succeed(&reference(1), url(1)));
    ui.advance_millis(999);
    assert!(seen.borrow().is_empty());

    ui.advance_millis(1);
    assert_eq!(*seen.borrow(), vec![1]);
    assert!(!coordinator.is_valid_index(0));
    assert!(coordinator.is_valid_index(1));
}

#[test]
fn disabled_timeout_waits_indefinitely() {
    let ui = TestUiLoop::new();
    let resolver = ScriptedResolver::new();
    let options = CoordinatorOptions {
        resolution_timeout: None,
        ..CoordinatorOptions::default()
    };
    let coordinator =
        PrefetchCoordinator::new(ui.executor(), Rc::new(RecordingPrefetcher::new()), options);
    let seen = announcements(&coordinator);
    coordinator.resolve_references(&resolver, &[reference(0)]);

    ui.advance(Duration::from_secs(600));
    assert!(seen.borrow().is_empty());
    assert!(coordinator.is_resolving());
    assert_eq!(resolver.pending_references(), vec!["gs://photos/0.jpg".to_string()]);
}

#[test]
fn replacing_items_discards_stale_resolutions() {
    let ui = TestUiLoop::new();
    let resolver = ScriptedResolver::new();
    let coordinator = PrefetchCoordinator::new(
        ui.executor(),
        Rc::new(RecordingPrefetcher::new()),
        CoordinatorOptions::default(),
    );
    let seen = announcements(&coordinator);
    coordinator.resolve_references(&resolver, &[reference(0), reference(1)]);
    ui.run_until_stalled();

    coordinator.set_urls(urls(10..12));
    assert_eq!(*seen.borrow(), vec![2]);

    resolver.succeed(&reference(0), url(0));
    resolver.succeed(&reference(1), url(1));
    ui.run_until_stalled();

    assert_eq!(*seen.borrow(), vec![2]);
    assert_eq!(coordinator.urls(), vec![Some(url(10)), Some(url(11))]);
}

#[test]
fn stop_all_ends_live_prefetches() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let coordinator =
        PrefetchCoordinator::with_urls(ui.executor(), prefetcher.clone(), urls(0..30));
    coordinator.on_appear(0);
    ui.advance_millis(100);
    assert_eq!(prefetcher.active(), urls(1..13));

    coordinator.stop_all();
    assert!(prefetcher.active().is_empty());
    assert_eq!(coordinator.scheduler().prefetch_window(), PrefetchWindow::EMPTY);
}

#[test]
fn prefetcher_trait_forwards_through_rc() {
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let shared: Rc<dyn ImagePrefetcher> = prefetcher.clone();
    shared.begin_prefetch(&urls(0..1));
    Rc::clone(&shared).end_prefetch(&urls(0..1));
    assert_eq!(
        prefetcher.events(),
        vec![
            PrefetchEvent::Begin(urls(0..1)),
            PrefetchEvent::End(urls(0..1)),
        ]
    );
}

#[test]
fn items_on_screen_are_prefetched_once_resolution_completes() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let resolver = ScriptedResolver::new();
    let references: Vec<_> = (0..20).map(reference).collect();
    let coordinator = PrefetchCoordinator::with_references(
        ui.executor(),
        prefetcher.clone(),
        &resolver,
        &references,
        CoordinatorOptions::default(),
    );

    for index in 0..3 {
        coordinator.on_appear(index);
    }
    ui.advance_millis(100);
    assert_eq!(coordinator.scheduler().prefetch_window(), PrefetchWindow::new(3, 15));
    assert!(prefetcher.events().is_empty());

    for index in 0..20 {
        assert!(resolver.succeed(&reference(index), url(index)));
    }
    ui.run_until_stalled();
    ui.advance_millis(100);

    assert_eq!(prefetcher.events(), vec![PrefetchEvent::Begin(urls(3..15))]);
    assert_eq!(coordinator.scheduler().prefetch_window(), PrefetchWindow::new(3, 15));
}

#[test]
fn window_keeps_its_place_when_items_resolve_mid_list() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let resolver = ScriptedResolver::new();
    let references: Vec<_> = (0..40).map(reference).collect();
    let options = CoordinatorOptions {
        strategy: PrefetchStrategy::new(3),
        ..CoordinatorOptions::default()
    };
    let coordinator = PrefetchCoordinator::new(ui.executor(), prefetcher.clone(), options);
    coordinator.resolve_references(&resolver, &references);

    for index in 20..23 {
        coordinator.on_appear(index);
    }
    ui.advance_millis(100);
    assert_eq!(coordinator.scheduler().prefetch_window(), PrefetchWindow::new(23, 26));

    for index in 0..40 {
        resolver.succeed(&reference(index), url(index));
    }
    ui.run_until_stalled();
    ui.advance_millis(100);

    assert_eq!(coordinator.scheduler().prefetch_window(), PrefetchWindow::new(23, 26));
    assert_eq!(prefetcher.events(), vec![PrefetchEvent::Begin(urls(23..26))]);
}

#[test]
fn replacing_urls_under_a_live_window_ends_and_restarts_changed_items() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let coordinator =
        PrefetchCoordinator::with_urls(ui.executor(), prefetcher.clone(), urls(0..50));
    for index in 10..13 {
        coordinator.on_appear(index);
    }
    ui.advance_millis(100);
    assert_eq!(prefetcher.take_events(), vec![PrefetchEvent::Begin(urls(13..25))]);

    let replaced: Vec<Url> = (0..50)
        .map(|index| if index < 20 { url(index) } else { url(100 + index) })
        .collect();
    coordinator.set_urls(replaced);
    assert_eq!(prefetcher.take_events(), vec![PrefetchEvent::End(urls(20..25))]);

    ui.advance_millis(100);
    assert_eq!(prefetcher.events(), vec![PrefetchEvent::Begin(urls(120..125))]);
    assert_eq!(coordinator.scheduler().prefetch_window(), PrefetchWindow::new(13, 25));
}

#[test]
fn shrinking_the_list_ends_prefetches_past_its_end() {
    let ui = TestUiLoop::new();
    let prefetcher = Rc::new(RecordingPrefetcher::new());
    let coordinator =
        PrefetchCoordinator::with_urls(ui.executor(), prefetcher.clone(), urls(0..30));
    coordinator.on_appear(0);
    ui.advance_millis(100);
    prefetcher.take_events();

    coordinator.set_urls(urls(0..5));
    assert_eq!(prefetcher.take_events(), vec![PrefetchEvent::End(urls(5..13))]);

    ui.advance_millis(100);
    assert!(prefetcher.events().is_empty());
    assert_eq!(prefetcher.active(), Vec::<Url>::new());
}

#[test]
fn listeners_may_register_listeners() {
    let ui = TestUiLoop::new();
    let coordinator = PrefetchCoordinator::new(
        ui.executor(),
        Rc::new(RecordingPrefetcher::new()),
        CoordinatorOptions::default(),
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let registrar = coordinator.clone();
    coordinator.on_universe_changed(move |count| {
        sink.borrow_mut().push(("outer", count));
        let nested = Rc::clone(&sink);
        registrar.on_universe_changed(move |count| nested.borrow_mut().push(("nested", count)));
    });

    coordinator.set_urls(urls(0..2));
    coordinator.set_urls(urls(0..3));

    assert_eq!(*seen.borrow(), vec![("outer", 2), ("outer", 3), ("nested", 3)]);
}

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mirror_fs::hooks::{Event, EventData, HookRegistry, Phase, WILDCARD};

use common::RecordingHook;

fn read_all_event() -> Event {
    Event::start(EventData::ReadAll {
        path: PathBuf::from("/tmp/x"),
        bytes: None,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn all_subscribers_invoked_exactly_once() {
    let registry = HookRegistry::new();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let counter = Arc::clone(&counter);
        registry.register("ReadAll:start", move |_ev| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    registry.dispatch(read_all_event()).await;
    assert_eq!(counter.load(Ordering::SeqCst), 5);

    registry.dispatch(read_all_event()).await;
    assert_eq!(counter.load(Ordering::SeqCst), 10, "second dispatch invokes each again");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatch_waits_for_every_subscriber() {
    let registry = HookRegistry::new();
    let slow_done = Arc::new(AtomicBool::new(false));
    let fast_done = Arc::new(AtomicBool::new(false));

    {
        let slow_done = Arc::clone(&slow_done);
        registry.register("ReadAll:start", move |_ev| {
            let slow_done = Arc::clone(&slow_done);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                slow_done.store(true, Ordering::SeqCst);
            }
        });
    }
    {
        let fast_done = Arc::clone(&fast_done);
        registry.register("ReadAll:start", move |_ev| {
            let fast_done = Arc::clone(&fast_done);
            async move {
                fast_done.store(true, Ordering::SeqCst);
            }
        });
    }

    registry.dispatch(read_all_event()).await;

    assert!(
        slow_done.load(Ordering::SeqCst),
        "dispatch returned before the sleeping subscriber completed"
    );
    assert!(fast_done.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wildcard_receives_every_event_name() {
    let registry = HookRegistry::new();
    let wildcard = RecordingHook::new();
    wildcard.attach(&registry, WILDCARD);

    registry.dispatch(read_all_event()).await;
    registry
        .dispatch(Event::start(EventData::Mkdir {
            path: PathBuf::from("/tmp/x"),
            name: "d".into(),
            mode: 0o755,
        }))
        .await;
    registry
        .dispatch(Event::end_of::<(), std::io::Error>(
            EventData::DirAttr {
                path: PathBuf::from("/tmp/x"),
            },
            &Ok(()),
        ))
        .await;

    assert_eq!(
        wildcard.names(),
        vec!["ReadAll:start", "Mkdir:start", "attr:end"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn named_and_wildcard_subscribers_both_invoked() {
    let registry = HookRegistry::new();
    let named = RecordingHook::new();
    let wildcard = RecordingHook::new();
    named.attach(&registry, "ReadAll:start");
    wildcard.attach(&registry, WILDCARD);

    registry.dispatch(read_all_event()).await;

    assert_eq!(named.count_of("ReadAll:start"), 1);
    assert_eq!(wildcard.count_of("ReadAll:start"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_subscribers_is_a_noop() {
    let registry = HookRegistry::new();
    // Nothing registered; dispatch must return immediately without error.
    registry.dispatch(read_all_event()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_subscriber_does_not_disturb_the_others() {
    let registry = HookRegistry::new();
    let counter = Arc::new(AtomicUsize::new(0));

    registry.register("ReadAll:start", |_ev| async move {
        panic!("subscriber exploded");
    });
    for _ in 0..3 {
        let counter = Arc::clone(&counter);
        registry.register("ReadAll:start", move |_ev| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    // Must not panic or hang.
    registry.dispatch(read_all_event()).await;
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_detaches_stragglers() {
    let registry = HookRegistry::new().with_timeout(Duration::from_millis(100));
    let fast_done = Arc::new(AtomicBool::new(false));

    registry.register("ReadAll:start", |_ev| async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    {
        let fast_done = Arc::clone(&fast_done);
        registry.register("ReadAll:start", move |_ev| {
            let fast_done = Arc::clone(&fast_done);
            async move {
                fast_done.store(true, Ordering::SeqCst);
            }
        });
    }

    let started = std::time::Instant::now();
    registry.dispatch(read_all_event()).await;

    assert!(
        started.elapsed() < Duration::from_secs(10),
        "dispatch did not respect the configured timeout"
    );
    assert!(fast_done.load(Ordering::SeqCst));
}

#[test]
fn event_names_are_compat_exact() {
    let path = PathBuf::from("/p");
    let cases: Vec<(EventData, &str)> = vec![
        (EventData::DirAttr { path: path.clone() }, "attr"),
        (
            EventData::Lookup {
                path: path.clone(),
                name: "c".into(),
            },
            "Lookup",
        ),
        (
            EventData::ReadDirAll {
                path: path.clone(),
                entries: None,
            },
            "ReadDirAll",
        ),
        (
            EventData::Setattr {
                path: path.clone(),
                mode: None,
                size: None,
            },
            "Setattr",
        ),
        (
            EventData::Create {
                path: path.clone(),
                name: "c".into(),
                mode: 0o644,
            },
            "Create",
        ),
        (
            EventData::Remove {
                path: path.clone(),
                name: "c".into(),
            },
            "Remove",
        ),
        (
            EventData::Mkdir {
                path: path.clone(),
                name: "c".into(),
                mode: 0o755,
            },
            "Mkdir",
        ),
        (
            EventData::Rename {
                path: path.clone(),
                old_name: "a".into(),
                new_dir: path.clone(),
                new_name: "b".into(),
            },
            "Rename",
        ),
        (EventData::FileAttr { path: path.clone() }, "Attr"),
        (
            EventData::ReadAll {
                path: path.clone(),
                bytes: None,
            },
            "ReadAll",
        ),
        (
            EventData::Write {
                path,
                offset: 0,
                len: 0,
                end_offset: None,
            },
            "Write",
        ),
    ];

    for (data, op) in cases {
        let start = Event::start(data.clone());
        assert_eq!(start.name(), format!("{op}:start"));
        assert_eq!(start.phase, Phase::Start);

        let end = Event::end_of::<(), std::io::Error>(data, &Ok(()));
        assert_eq!(end.name(), format!("{op}:end"));
        assert!(end.error.is_none());
    }
}

#[test]
fn end_event_carries_the_error() {
    let err: Result<(), std::io::Error> = Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "gone",
    ));
    let event = Event::end_of(
        EventData::DirAttr {
            path: PathBuf::from("/p"),
        },
        &err,
    );
    assert_eq!(event.error.as_deref(), Some("gone"));
}

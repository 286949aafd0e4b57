//! End-to-end tests driving the host bridge through tick loops

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use system2_core::{
    CallbackHandle, CallbackRegistry, Delivery, Settings, System2, TaskId, TransferCounters,
    UserToken,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Progress {
        task_id: TaskId,
        counters: TransferCounters,
        token: i64,
    },
    Completed {
        task_id: TaskId,
        result: String,
        error: String,
        status: i32,
        token: i64,
    },
}

type Events = Rc<RefCell<Vec<Event>>>;

fn recording_callback(registry: &mut CallbackRegistry) -> (CallbackHandle, Events) {
    let events: Events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let handle = registry.register(move |delivery| {
        let event = match delivery {
            Delivery::Progress {
                task_id,
                counters,
                token,
                ..
            } => Event::Progress {
                task_id,
                counters,
                token: token.0,
            },
            Delivery::Completed {
                task_id,
                result,
                error,
                status,
                token,
                ..
            } => Event::Completed {
                task_id,
                result: result.to_string(),
                error: error.to_string(),
                status,
                token: token.0,
            },
        };
        sink.borrow_mut().push(event);
        Ok(())
    });
    (handle, events)
}

fn completions(events: &Events) -> usize {
    events
        .borrow()
        .iter()
        .filter(|e| matches!(e, Event::Completed { .. }))
        .count()
}

/// Tick like a host frame loop until `expected` completions arrived
async fn tick_until(
    system: &System2,
    registry: &mut CallbackRegistry,
    events: &Events,
    expected: usize,
) {
    let deadline = Instant::now() + Duration::from_secs(20);
    while completions(events) < expected {
        assert!(Instant::now() < deadline, "timed out waiting for callbacks");
        system.tick(registry);
        tokio::time::sleep(Duration::from_millis(16)).await;
    }
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn test_settings() -> Settings {
    Settings {
        connect_timeout_secs: 5,
        transfer_timeout_secs: 10,
        progress_interval_ms: 0,
        ..Default::default()
    }
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_run_command_echo() {
    let mut system = System2::start(test_settings()).unwrap();
    let mut registry = CallbackRegistry::new();
    let (callback, events) = recording_callback(&mut registry);

    let id = system
        .run_command_with_callback("echo hello", callback, UserToken(11))
        .unwrap();
    tick_until(&system, &mut registry, &events, 1).await;

    assert_eq!(
        events.borrow()[0],
        Event::Completed {
            task_id: id,
            result: "hello\n".into(),
            error: String::new(),
            status: 0,
            token: 11,
        }
    );
    system.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_unreachable_host() {
    let mut system = System2::start(test_settings()).unwrap();
    let mut registry = CallbackRegistry::new();
    let (callback, events) = recording_callback(&mut registry);
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("file.bin");

    system
        .download_file(
            &format!("http://127.0.0.1:{}/file.bin", closed_port()),
            &local,
            callback,
            UserToken(3),
            None,
        )
        .unwrap();
    tick_until(&system, &mut registry, &events, 1).await;

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Completed {
            result,
            error,
            status,
            token,
            ..
        } => {
            assert!(result.is_empty());
            assert!(!error.is_empty());
            assert!(error.len() <= system.settings().error_capacity);
            assert_ne!(*status, 0);
            assert_eq!(*token, 3);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(!local.exists());
    system.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_downloads_keep_their_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![1u8; 2048])
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fast"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 512]))
        .mount(&server)
        .await;

    let mut system = System2::start(test_settings()).unwrap();
    let mut registry = CallbackRegistry::new();
    let (callback, events) = recording_callback(&mut registry);
    let dir = tempfile::tempdir().unwrap();

    let slow = system
        .download_file(
            &format!("{}/slow", server.uri()),
            &dir.path().join("slow.bin"),
            callback,
            UserToken(100),
            None,
        )
        .unwrap();
    let fast = system
        .download_file(
            &format!("{}/fast", server.uri()),
            &dir.path().join("fast.bin"),
            callback,
            UserToken(200),
            None,
        )
        .unwrap();
    tick_until(&system, &mut registry, &events, 2).await;

    for event in events.borrow().iter() {
        match event {
            Event::Completed {
                task_id,
                status,
                token,
                ..
            } => {
                assert_eq!(*status, 0);
                if *task_id == slow {
                    assert_eq!(*token, 100);
                } else {
                    assert_eq!(*task_id, fast);
                    assert_eq!(*token, 200);
                }
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(std::fs::read(dir.path().join("slow.bin")).unwrap().len(), 2048);
    assert_eq!(std::fs::read(dir.path().join("fast.bin")).unwrap().len(), 512);
    system.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_progress_precedes_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 256 * 1024]))
        .mount(&server)
        .await;

    let mut system = System2::start(test_settings()).unwrap();
    let mut registry = CallbackRegistry::new();
    let (callback, events) = recording_callback(&mut registry);
    let dir = tempfile::tempdir().unwrap();

    system
        .download_file(
            &server.uri(),
            &dir.path().join("big.bin"),
            callback,
            UserToken(8),
            Some(callback),
        )
        .unwrap();
    tick_until(&system, &mut registry, &events, 1).await;

    let events = events.borrow();
    assert!(events.len() >= 2, "expected progress before completion");
    assert!(matches!(events.last(), Some(Event::Completed { status: 0, .. })));

    let mut last_now = 0;
    for event in &events[..events.len() - 1] {
        match event {
            Event::Progress {
                counters, token, ..
            } => {
                assert_eq!(*token, 8);
                assert!(counters.download_now >= last_now);
                last_now = counters.download_now;
            }
            other => panic!("completion delivered before progress: {:?}", other),
        }
    }
    assert_eq!(last_now, 256 * 1024);
    system.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_page_fetch_truncated_but_finished() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("y".repeat(5000)))
        .mount(&server)
        .await;

    let settings = Settings {
        result_capacity: 100,
        ..test_settings()
    };
    let mut system = System2::start(settings).unwrap();
    let mut registry = CallbackRegistry::new();
    let (callback, events) = recording_callback(&mut registry);

    system
        .get_page(&server.uri(), "", "agent/1", callback, UserToken(1))
        .unwrap();
    tick_until(&system, &mut registry, &events, 1).await;

    match &events.borrow()[0] {
        Event::Completed { result, status, .. } => {
            assert_eq!(result.len(), 100);
            assert_eq!(*status, 0);
        }
        other => panic!("unexpected event {:?}", other),
    }
    system.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unregistered_callback_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("src.txt");
    std::fs::write(&source, "data").unwrap();

    let mut system = System2::start(test_settings()).unwrap();
    let mut registry = CallbackRegistry::new();
    let (gone, gone_events) = recording_callback(&mut registry);
    let (kept, kept_events) = recording_callback(&mut registry);

    system
        .copy_file(&source, &dir.path().join("a/one.txt"), gone, UserToken(1))
        .unwrap();
    registry.unregister(gone);
    system
        .copy_file(&source, &dir.path().join("b/two.txt"), kept, UserToken(2))
        .unwrap();

    // Let both tasks finish before the first tick drains them.
    system.shutdown();
    let summary = system.tick(&mut registry);

    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.delivered, 1);
    assert!(gone_events.borrow().is_empty());
    assert_eq!(completions(&kept_events), 1);
    assert!(dir.path().join("a/one.txt").exists());
    assert!(dir.path().join("b/two.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_fire_and_forget_command_is_discarded() {
    let mut system = System2::start(test_settings()).unwrap();
    let mut registry = CallbackRegistry::new();

    system.run_command("true", UserToken(0)).unwrap();
    system.shutdown();

    let summary = system.tick(&mut registry);
    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.delivered, 0);
}

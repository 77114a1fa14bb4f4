use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ctxrunner::{Completion, Config, Context, Engine, Event, EventKind, Subscribe};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Event>>,
}

impl Recorder {
    fn kinds(&self) -> Vec<EventKind> {
        self.seen.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.seen.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

struct Exploding;

#[async_trait]
impl Subscribe for Exploding {
    async fn on_event(&self, event: &Event) {
        if event.kind == EventKind::FanOutStarted {
            panic!("subscriber exploded");
        }
    }

    fn name(&self) -> &'static str {
        "exploding"
    }
}

fn config(pool_size: usize) -> Config {
    Config {
        pool_size,
        grace: Duration::from_secs(5),
        thread_prefix: "sub-test".into(),
        ..Config::default()
    }
}

#[test]
fn subscriber_observes_loop_and_fan_out_lifecycle() {
    let recorder = Arc::new(Recorder::default());
    let engine = Engine::builder(config(2))
        .with_subscriber(recorder.clone())
        .build()
        .unwrap();

    let got = engine
        .context_runner()
        .execute_blocking(
            3,
            |_: &Context, done: Completion<u8>| done.succeed(1),
            Duration::from_secs(5),
        )
        .unwrap();
    assert_eq!(got, vec![1, 1, 1]);
    engine.shutdown().unwrap();

    assert_eq!(recorder.count(EventKind::ContextStarted), 2);
    assert_eq!(recorder.count(EventKind::ContextStopped), 2);
    assert_eq!(recorder.count(EventKind::FanOutStarted), 1);
    assert_eq!(recorder.count(EventKind::InstanceSubmitted), 3);
    assert_eq!(recorder.count(EventKind::InstanceSucceeded), 3);
    assert_eq!(recorder.count(EventKind::FanOutCompleted), 1);

    let kinds = recorder.kinds();
    let requested = kinds.iter().position(|k| *k == EventKind::ShutdownRequested);
    let stopped = kinds.iter().position(|k| *k == EventKind::AllStoppedWithin);
    assert!(requested.is_some() && stopped.is_some());
    assert!(requested < stopped);
    assert_eq!(kinds.last(), Some(&EventKind::AllStoppedWithin));
}

#[test]
fn rejected_and_failed_operations_are_published() {
    let recorder = Arc::new(Recorder::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![recorder.clone()];
    let engine = Engine::builder(config(1))
        .with_subscribers(subs)
        .build()
        .unwrap();
    let runner = engine.context_runner();

    assert!(
        runner
            .execute(0, |_: &Context, done: Completion<u8>| done.succeed(1), |_| {})
            .is_err()
    );
    let got = runner
        .execute_blocking(
            2,
            |_: &Context, done: Completion<u8>| {
                done.succeed(1);
                done.fail("twice");
            },
            Duration::from_secs(5),
        )
        .unwrap();
    assert_eq!(got, vec![1, 1]);
    // The trailing duplicate may still be queued behind the deciding value.
    std::thread::sleep(Duration::from_millis(50));
    engine.shutdown().unwrap();

    let rejected: Vec<Event> = recorder
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == EventKind::FanOutRejected)
        .cloned()
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].reason.as_deref(), Some("runner_no_instances"));
    assert_eq!(recorder.count(EventKind::ExtraResultDiscarded), 2);
}

#[test]
fn panicking_subscriber_is_isolated() {
    let recorder = Arc::new(Recorder::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Exploding), recorder.clone()];
    let engine = Engine::builder(config(1))
        .with_subscribers(subs)
        .build()
        .unwrap();

    let got = engine
        .context_runner()
        .execute_blocking(
            1,
            |_: &Context, done: Completion<u8>| done.succeed(9),
            Duration::from_secs(5),
        )
        .unwrap();
    assert_eq!(got, vec![9]);
    // Let the panic report reach the bus before the listener stops.
    std::thread::sleep(Duration::from_millis(100));
    engine.shutdown().unwrap();

    let panicked: Vec<Event> = recorder
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == EventKind::SubscriberPanicked)
        .cloned()
        .collect();
    assert_eq!(panicked.len(), 1);
    assert_eq!(panicked[0].subscriber.as_deref(), Some("exploding"));
    assert_eq!(recorder.count(EventKind::FanOutCompleted), 1);
}

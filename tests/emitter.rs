use std::cell::{Cell, RefCell};
use std::rc::Rc;

use uvrx::{Emitter, EventEmitter};

#[derive(Default)]
struct TestEmitter {
    emitter: Emitter<TestEmitter>,
}

impl EventEmitter for TestEmitter {
    fn emitter(&self) -> &Emitter<Self> {
        &self.emitter
    }
}

impl TestEmitter {
    fn emit<E: 'static>(&self, event: E) {
        self.emitter.publish(event, self);
    }
}

#[derive(Debug, Default)]
struct FakeEvent;

#[derive(Debug, Default)]
struct OtherEvent(usize);

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

#[test]
fn test_empty_and_clear() {
    let emitter = TestEmitter::default();
    assert!(emitter.is_empty_all());

    emitter.on(|_: &FakeEvent, _: &TestEmitter| {});
    assert!(!emitter.is_empty_all());
    assert!(!emitter.is_empty::<FakeEvent>());
    assert!(emitter.is_empty::<OtherEvent>());

    emitter.clear::<OtherEvent>();
    assert!(!emitter.is_empty::<FakeEvent>());

    emitter.clear::<FakeEvent>();
    assert!(emitter.is_empty::<FakeEvent>());
    assert!(emitter.is_empty_all());

    emitter.on(|_: &FakeEvent, _: &TestEmitter| {});
    emitter.once(|_: &OtherEvent, _: &TestEmitter| {});
    emitter.clear_all();
    assert!(emitter.is_empty_all());
}

#[test]
fn test_on() {
    let emitter = TestEmitter::default();
    let hits = counter();

    let h = hits.clone();
    let conn = emitter.on(move |_: &FakeEvent, _: &TestEmitter| h.set(h.get() + 1));
    emitter.emit(FakeEvent);
    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 2);
    assert!(!conn.is_removed());
    assert!(!emitter.is_empty::<FakeEvent>());

    emitter.erase(conn.clone());
    assert!(conn.is_removed());
    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 2);
    assert!(emitter.is_empty::<FakeEvent>());
}

#[test]
fn test_once() {
    let emitter = TestEmitter::default();
    let hits = counter();

    let h = hits.clone();
    let conn = emitter.once(move |_: &FakeEvent, _: &TestEmitter| h.set(h.get() + 1));
    assert!(!emitter.is_empty::<FakeEvent>());

    emitter.emit(FakeEvent);
    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 1);
    assert!(conn.is_removed());
    assert!(emitter.is_empty::<FakeEvent>());

    // erasing a consumed listener does nothing
    emitter.erase(conn);
    assert!(emitter.is_empty_all());
}

#[test]
fn test_once_and_erase() {
    let emitter = TestEmitter::default();
    let hits = counter();

    let h = hits.clone();
    let conn = emitter.once(move |_: &FakeEvent, _: &TestEmitter| h.set(h.get() + 1));
    emitter.erase(conn);
    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 0);
    assert!(emitter.is_empty::<FakeEvent>());
}

#[test]
fn test_event_payload_and_owner() {
    let emitter = TestEmitter::default();
    let seen = Rc::new(Cell::new((0, std::ptr::null::<TestEmitter>())));

    let s = seen.clone();
    emitter.on(move |e: &OtherEvent, owner: &TestEmitter| {
        s.set((e.0, owner as *const TestEmitter));
    });
    emitter.emit(OtherEvent(42));
    assert_eq!(seen.get(), (42, &emitter as *const TestEmitter));
}

#[test]
fn test_types_are_independent() {
    let emitter = TestEmitter::default();
    let fake = counter();
    let other = counter();

    let f = fake.clone();
    emitter.on(move |_: &FakeEvent, _: &TestEmitter| f.set(f.get() + 1));
    let o = other.clone();
    emitter.on(move |_: &OtherEvent, _: &TestEmitter| o.set(o.get() + 1));

    emitter.emit(FakeEvent);
    assert_eq!((fake.get(), other.get()), (1, 0));
    emitter.emit(OtherEvent(0));
    assert_eq!((fake.get(), other.get()), (1, 1));

    emitter.clear::<FakeEvent>();
    assert!(emitter.is_empty::<FakeEvent>());
    assert!(!emitter.is_empty::<OtherEvent>());
}

#[test]
fn test_dispatch_order() {
    let emitter = TestEmitter::default();
    let order = Rc::new(RefCell::new(Vec::new()));

    let o = order.clone();
    emitter.once(move |_: &FakeEvent, _: &TestEmitter| o.borrow_mut().push("o1"));
    for name in vec!["f1", "f2", "f3"] {
        let o = order.clone();
        emitter.on(move |_: &FakeEvent, _: &TestEmitter| o.borrow_mut().push(name));
    }
    let o = order.clone();
    emitter.once(move |_: &FakeEvent, _: &TestEmitter| o.borrow_mut().push("o2"));

    emitter.emit(FakeEvent);
    assert_eq!(*order.borrow(), vec!["f3", "f2", "f1", "o2", "o1"]);

    order.borrow_mut().clear();
    emitter.emit(FakeEvent);
    assert_eq!(*order.borrow(), vec!["f3", "f2", "f1"]);
}

#[test]
fn test_on_while_dispatching() {
    let emitter = TestEmitter::default();
    let hits = counter();
    let added = Rc::new(Cell::new(false));

    let h = hits.clone();
    emitter.on(move |_: &FakeEvent, owner: &TestEmitter| {
        if !added.replace(true) {
            let h = h.clone();
            owner.on(move |_: &FakeEvent, _: &TestEmitter| h.set(h.get() + 1));
        }
    });

    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 1);
    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 2);
}

#[test]
fn test_clear_while_dispatching() {
    let emitter = TestEmitter::default();
    let hits = counter();

    let h = hits.clone();
    emitter.on(move |_: &FakeEvent, _: &TestEmitter| h.set(h.get() + 1));
    emitter.on(|_: &FakeEvent, owner: &TestEmitter| owner.clear::<FakeEvent>());

    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 0);
    assert!(emitter.is_empty::<FakeEvent>());
}

#[test]
fn test_erase_while_dispatching() {
    let emitter = TestEmitter::default();
    let hits = counter();

    let h = hits.clone();
    let conn = emitter.on(move |_: &FakeEvent, _: &TestEmitter| h.set(h.get() + 1));
    let conn = RefCell::new(Some(conn));
    emitter.on(move |_: &FakeEvent, owner: &TestEmitter| {
        if let Some(conn) = conn.borrow_mut().take() {
            owner.erase(conn);
        }
    });

    emitter.emit(FakeEvent);
    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 0);
    assert!(!emitter.is_empty::<FakeEvent>());
}

#[test]
fn test_once_registered_while_dispatching() {
    let emitter = TestEmitter::default();
    let hits = counter();

    let h = hits.clone();
    emitter.once(move |_: &FakeEvent, owner: &TestEmitter| {
        let h = h.clone();
        owner.once(move |_: &FakeEvent, _: &TestEmitter| h.set(h.get() + 1));
    });

    // the listener added during the first dispatch waits for the next one
    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 0);
    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 1);
    assert!(emitter.is_empty::<FakeEvent>());
}

#[test]
fn test_nested_publish() {
    let emitter = TestEmitter::default();
    let depth = counter();
    let hits = counter();

    let h = hits.clone();
    emitter.on(move |_: &FakeEvent, owner: &TestEmitter| {
        h.set(h.get() + 1);
        if depth.get() == 0 {
            depth.set(1);
            owner.emit(FakeEvent);
        }
    });

    emitter.emit(FakeEvent);
    assert_eq!(hits.get(), 2);
}

#[test]
fn test_callback_clear_all() {
    let emitter = TestEmitter::default();
    let hits = counter();

    let h = hits.clone();
    emitter.on(move |_: &OtherEvent, _: &TestEmitter| h.set(h.get() + 1));
    emitter.on(|_: &FakeEvent, owner: &TestEmitter| owner.clear_all());

    emitter.emit(FakeEvent);
    emitter.emit(OtherEvent(1));
    assert_eq!(hits.get(), 0);
    assert!(emitter.is_empty_all());
}

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use uvrx::sys::UV_EINVAL;
use uvrx::{
    CloseEvent, ErrorEvent, EventEmitter, Handle, HandleCategory, IdleEvent, IdleHandle, Loop,
    RunMode, TimerEvent, TimerHandle,
};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

#[test]
fn test_idle_stop_and_close() {
    let lp = Loop::new().unwrap();
    let idle = lp.resource::<IdleHandle>();
    let ticks = counter();
    let closed = counter();

    let t = ticks.clone();
    idle.on(move |_: &IdleEvent, handle: &IdleHandle| {
        t.set(t.get() + 1);
        if t.get() == 3 {
            handle.stop();
            assert!(!handle.active());
            handle.close();
            assert!(handle.closing());
        }
    });
    let c = closed.clone();
    idle.on(move |_: &CloseEvent, _: &IdleHandle| c.set(c.get() + 1));

    assert!(idle.init());
    assert_eq!(idle.category(), HandleCategory::Idle);
    idle.start();
    assert!(idle.active());

    assert!(lp.run(RunMode::Default));
    assert_eq!(ticks.get(), 3);
    assert_eq!(closed.get(), 1);
    assert!(!lp.alive());
}

#[test]
fn test_handle_owns_itself_until_closed() {
    let lp = Loop::new().unwrap();
    let idle = IdleHandle::new(&lp);
    let ticks = counter();
    let closed = counter();

    let t = ticks.clone();
    idle.on(move |_: &IdleEvent, handle: &IdleHandle| {
        t.set(t.get() + 1);
        if t.get() == 3 {
            handle.close();
        }
    });
    let c = closed.clone();
    idle.on(move |_: &CloseEvent, _: &IdleHandle| c.set(c.get() + 1));

    idle.init();
    idle.start();
    let weak = Rc::downgrade(&idle);
    drop(idle);
    assert!(weak.upgrade().is_some());

    lp.run(RunMode::Default);
    assert_eq!(ticks.get(), 3);
    assert_eq!(closed.get(), 1);
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_uninitialized_handle() {
    let lp = Loop::new().unwrap();
    let idle = IdleHandle::new(&lp);
    let code = Rc::new(Cell::new(0));
    let closed = counter();

    let e = code.clone();
    idle.on(move |err: &ErrorEvent, _: &IdleHandle| e.set(err.code()));
    let c = closed.clone();
    idle.on(move |_: &CloseEvent, _: &IdleHandle| c.set(c.get() + 1));

    assert_eq!(idle.category(), HandleCategory::Unknown);
    idle.start();
    assert_eq!(code.get(), UV_EINVAL);

    idle.close();
    assert!(lp.run(RunMode::Default));
    assert_eq!(closed.get(), 0);
    assert_eq!(Rc::strong_count(&idle), 1);
}

#[test]
fn test_init_twice() {
    let lp = Loop::new().unwrap();
    let idle = IdleHandle::new(&lp);

    assert!(idle.init());
    assert!(idle.init());
    assert_eq!(Rc::strong_count(&idle), 2);
    assert!(idle.size() > 0);

    idle.close();
    idle.close();
    lp.run(RunMode::Default);
    assert_eq!(Rc::strong_count(&idle), 1);
    assert!(idle.closing());
}

#[test]
fn test_reference() {
    let lp = Loop::new().unwrap();
    let idle = IdleHandle::new(&lp);
    idle.init();
    assert!(idle.referenced());

    idle.unreference();
    assert!(!idle.referenced());
    idle.start();
    assert!(!lp.alive());
    assert!(lp.run(RunMode::Default));

    idle.reference();
    assert!(lp.alive());
    idle.close();
    lp.run(RunMode::Default);
    assert!(!lp.alive());
}

#[test]
fn test_timer_once() {
    let lp = Loop::new().unwrap();
    let timer = TimerHandle::new(&lp);
    let fired = counter();
    let closed = counter();

    let f = fired.clone();
    timer.on(move |_: &TimerEvent, timer: &TimerHandle| {
        f.set(f.get() + 1);
        timer.close();
    });
    let c = closed.clone();
    timer.on(move |_: &CloseEvent, _: &TimerHandle| c.set(c.get() + 1));

    assert!(timer.init());
    assert_eq!(timer.category(), HandleCategory::Timer);
    let start = lp.now();
    timer.start(Duration::from_millis(20), Duration::from_millis(0));
    lp.run(RunMode::Default);

    assert_eq!(fired.get(), 1);
    assert_eq!(closed.get(), 1);
    assert!(lp.now() - start >= Duration::from_millis(20));
}

#[test]
fn test_timer_repeat() {
    let lp = Loop::new().unwrap();
    let timer = TimerHandle::new(&lp);
    let fired = counter();

    let f = fired.clone();
    timer.on(move |_: &TimerEvent, timer: &TimerHandle| {
        f.set(f.get() + 1);
        if f.get() == 3 {
            timer.stop();
            timer.close();
        }
    });

    timer.init();
    timer.start(Duration::from_millis(5), Duration::from_millis(5));
    assert_eq!(timer.repeat(), Duration::from_millis(5));
    timer.set_repeat(Duration::from_millis(2));
    timer.again();
    assert!(timer.active());
    assert_eq!(timer.repeat(), Duration::from_millis(2));
    lp.run(RunMode::Default);

    assert_eq!(fired.get(), 3);
    assert!(timer.closing());
}

#[test]
fn test_timer_again_before_start() {
    let lp = Loop::new().unwrap();
    let timer = TimerHandle::new(&lp);
    timer.init();
    let code = Rc::new(Cell::new(0));
    let closed = counter();

    let e = code.clone();
    timer.on(move |err: &ErrorEvent, _: &TimerHandle| e.set(err.code()));
    let c = closed.clone();
    timer.on(move |_: &CloseEvent, _: &TimerHandle| c.set(c.get() + 1));
    timer.again();
    assert_eq!(code.get(), UV_EINVAL);
    assert!(!timer.active());

    timer.close();
    lp.run(RunMode::Default);
    assert_eq!(closed.get(), 1);
}

#[test]
fn test_unreferenced_timer() {
    let lp = Loop::new().unwrap();
    let timer = TimerHandle::new(&lp);
    let fired = counter();

    let f = fired.clone();
    timer.on(move |_: &TimerEvent, _: &TimerHandle| f.set(f.get() + 1));
    timer.init();
    timer.start(Duration::from_secs(60), Duration::from_millis(0));
    timer.unreference();

    assert!(lp.run(RunMode::Default));
    assert_eq!(fired.get(), 0);

    timer.close();
    lp.run(RunMode::Default);
    assert_eq!(Rc::strong_count(&timer), 1);
}

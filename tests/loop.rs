use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use uvrx::sys::{self, UV_EBUSY, UV_EINVAL};
use uvrx::{
    ErrorEvent, EventEmitter, Handle, IdleEvent, IdleHandle, Loop, LoopOption, RunMode, TcpHandle,
    TimerHandle, WorkReq,
};

#[test]
fn test_empty_loop() {
    let lp = Loop::new().unwrap();
    assert!(!lp.alive());
    assert!(lp.run(RunMode::Default));
    assert!(lp.run(RunMode::Once));
    assert!(lp.run(RunMode::NoWait));
    assert_eq!(lp.name(), "uvrx");

    lp.close();
    assert!(lp.is_closed());
}

#[test]
fn test_default_loop() {
    let first = Loop::get_default().unwrap();
    let second = Loop::get_default().unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(first.name(), "default");

    let other = Loop::new().unwrap();
    assert!(!Rc::ptr_eq(&first, &other));
}

#[test]
fn test_builder() {
    let lp = Loop::builder().name("worker").block_signal(true).build().unwrap();
    assert_eq!(lp.name(), "worker");
    assert!(lp.configure(LoopOption::BlockSignal));
    assert!(!lp.is_closed());
}

#[test]
fn test_close_busy_loop() {
    let lp = Loop::new().unwrap();
    let code = Rc::new(Cell::new(0));

    let c = code.clone();
    lp.on(move |e: &ErrorEvent, _: &Loop| c.set(e.code()));

    let idle = IdleHandle::new(&lp);
    idle.init();
    lp.close();
    assert_eq!(code.get(), UV_EBUSY);
    assert!(!lp.is_closed());

    idle.close();
    lp.run(RunMode::Default);
    lp.close();
    assert!(lp.is_closed());
}

#[test]
fn test_run_modes() {
    let lp = Loop::new().unwrap();
    let ticks = Rc::new(Cell::new(0));

    let idle = IdleHandle::new(&lp);
    let t = ticks.clone();
    idle.on(move |_: &IdleEvent, _: &IdleHandle| t.set(t.get() + 1));
    idle.init();
    idle.start();

    assert!(!lp.run(RunMode::NoWait));
    assert_eq!(ticks.get(), 1);
    assert!(!lp.run(RunMode::Once));
    assert_eq!(ticks.get(), 2);

    idle.close();
    assert!(lp.run(RunMode::Default));
    assert_eq!(ticks.get(), 2);
}

#[test]
fn test_stop() {
    let lp = Loop::new().unwrap();
    let ticks = Rc::new(Cell::new(0));

    let idle = IdleHandle::new(&lp);
    let t = ticks.clone();
    idle.on(move |_: &IdleEvent, idle: &IdleHandle| {
        t.set(t.get() + 1);
        idle.event_loop().stop();
    });
    idle.init();
    idle.start();

    assert!(!lp.run(RunMode::Default));
    assert_eq!(ticks.get(), 1);
    assert!(lp.alive());

    idle.close();
    lp.run(RunMode::Default);
    assert!(!lp.alive());
}

#[test]
fn test_now() {
    let lp = Loop::new().unwrap();
    let start = lp.now();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(lp.now(), start);

    lp.update_time();
    assert!(lp.now() >= start + Duration::from_millis(20));
}

#[test]
fn test_closed_loop() {
    let lp = Loop::new().unwrap();
    let code = Rc::new(Cell::new(0));

    let c = code.clone();
    lp.on(move |e: &ErrorEvent, _: &Loop| c.set(e.code()));

    lp.close();
    assert!(lp.is_closed());
    assert!(!lp.alive());
    assert!(lp.run(RunMode::Default));
    assert!(lp.run(RunMode::NoWait));
    assert_eq!(lp.now(), Duration::from_millis(0));
    lp.update_time();
    lp.stop();
    lp.close();
    assert!(!lp.configure(LoopOption::BlockSignal));
    assert_eq!(code.get(), UV_EINVAL);

    unsafe {
        assert_eq!(sys::uv_loop_alive(lp.raw()), 0);
        assert_eq!(sys::uv_run(lp.raw(), sys::uv_run_mode::UV_RUN_DEFAULT), 0);
        assert_eq!(sys::uv_now(lp.raw()), 0);
        assert_eq!(sys::uv_loop_close(lp.raw()), 0);
    }
}

#[test]
fn test_resources_on_closed_loop() {
    let lp = Loop::new().unwrap();
    lp.close();
    let errors = Rc::new(Cell::new(0));

    let idle = IdleHandle::new(&lp);
    let e = errors.clone();
    idle.on(move |err: &ErrorEvent, _: &IdleHandle| {
        assert_eq!(err.code(), UV_EINVAL);
        e.set(e.get() + 1);
    });
    assert!(!idle.init());
    assert!(!idle.initialized());
    idle.start();
    idle.close();
    assert_eq!(Rc::strong_count(&idle), 1);

    let timer = TimerHandle::new(&lp);
    let e = errors.clone();
    timer.on(move |err: &ErrorEvent, _: &TimerHandle| {
        assert_eq!(err.code(), UV_EINVAL);
        e.set(e.get() + 1);
    });
    assert!(!timer.init());

    let tcp = TcpHandle::new(&lp);
    let e = errors.clone();
    tcp.on(move |err: &ErrorEvent, _: &TcpHandle| {
        assert_eq!(err.code(), UV_EINVAL);
        e.set(e.get() + 1);
    });
    assert!(!tcp.init());

    let req = WorkReq::new(&lp, || panic!("work ran on a closed loop"));
    let e = errors.clone();
    req.on(move |err: &ErrorEvent, _: &WorkReq| {
        assert_eq!(err.code(), UV_EINVAL);
        e.set(e.get() + 1);
    });
    req.queue();
    assert_eq!(Rc::strong_count(&req), 1);

    // init, start, timer init, tcp init, queue
    assert_eq!(errors.get(), 5);
    assert!(lp.run(RunMode::Default));
}

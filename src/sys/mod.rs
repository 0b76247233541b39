//! Callback driven event loop with a libuv compatible surface.
//!
//! Handles and requests are plain `#[repr(C)]` structures owned by the
//! caller. Every structure carries a `data` field the engine never
//! touches, so owners can store a pointer back to themselves there.
//! Completions are reported through `unsafe extern "C"` callbacks with an
//! integer status, zero meaning success.
//!
//! The loop runs its phases in this order: timers, queued work, idle
//! handles, I/O polling and close callbacks.
#![allow(non_camel_case_types)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::os::raw::{c_int, c_void};
use std::ptr;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use slab::Slab;

/// Evaluates to the `LoopInner` of a loop, or returns `$ret` from the
/// enclosing function once the loop was closed.
macro_rules! inner_or {
    ($loop_:expr, $ret:expr) => {
        match get_inner($loop_) {
            Some(inner) => inner,
            None => return $ret,
        }
    };
}

pub mod errno;
mod tcp;

pub use self::errno::*;
pub use self::tcp::*;

bitflags! {
    /// State bits of a handle.
    pub struct HandleFlags: u32 {
        /// The handle has pending work.
        const ACTIVE = 1 << 0;
        /// The handle keeps the loop alive while active.
        const REF = 1 << 1;
        /// `uv_close` was called.
        const CLOSING = 1 << 2;
        /// The close callback ran.
        const CLOSED = 1 << 3;
        /// The stream can be read from.
        const READABLE = 1 << 4;
        /// The stream can be written to.
        const WRITABLE = 1 << 5;
    }
}

/// Kind of a handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum uv_handle_type {
    UV_UNKNOWN_HANDLE = 0,
    UV_IDLE = 6,
    UV_TCP = 12,
    UV_TIMER = 13,
}

/// Kind of a request.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum uv_req_type {
    UV_UNKNOWN_REQ = 0,
    UV_CONNECT = 2,
    UV_WRITE = 3,
    UV_SHUTDOWN = 4,
    UV_WORK = 7,
}

/// How `uv_run` drives the loop.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum uv_run_mode {
    UV_RUN_DEFAULT = 0,
    UV_RUN_ONCE = 1,
    UV_RUN_NOWAIT = 2,
}

/// Options accepted by `uv_loop_configure`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum uv_loop_option {
    UV_LOOP_BLOCK_SIGNAL = 0,
}

pub type uv_close_cb = unsafe extern "C" fn(*mut uv_handle_t);
pub type uv_idle_cb = unsafe extern "C" fn(*mut uv_idle_t);
pub type uv_timer_cb = unsafe extern "C" fn(*mut uv_timer_t);
pub type uv_work_cb = unsafe extern "C" fn(*mut uv_work_t);
pub type uv_after_work_cb = unsafe extern "C" fn(*mut uv_work_t, c_int);

/// Event loop.
#[repr(C)]
pub struct uv_loop_t {
    pub data: *mut c_void,
    inner: *mut LoopInner,
}

impl Default for uv_loop_t {
    fn default() -> Self {
        uv_loop_t {
            data: ptr::null_mut(),
            inner: ptr::null_mut(),
        }
    }
}

/// Fields shared by every handle.
#[repr(C)]
pub struct uv_handle_t {
    pub data: *mut c_void,
    pub loop_: *mut uv_loop_t,
    pub type_: uv_handle_type,
    pub flags: HandleFlags,
    close_cb: Option<uv_close_cb>,
}

impl Default for uv_handle_t {
    fn default() -> Self {
        uv_handle_t {
            data: ptr::null_mut(),
            loop_: ptr::null_mut(),
            type_: uv_handle_type::UV_UNKNOWN_HANDLE,
            flags: HandleFlags::empty(),
            close_cb: None,
        }
    }
}

/// Fields shared by every request.
#[repr(C)]
pub struct uv_req_t {
    pub data: *mut c_void,
    pub type_: uv_req_type,
}

impl Default for uv_req_t {
    fn default() -> Self {
        uv_req_t {
            data: ptr::null_mut(),
            type_: uv_req_type::UV_UNKNOWN_REQ,
        }
    }
}

/// Handle running its callback once per loop iteration.
#[repr(C)]
#[derive(Default)]
pub struct uv_idle_t {
    pub handle: uv_handle_t,
    cb: Option<uv_idle_cb>,
}

/// Handle running its callback after a timeout.
#[repr(C)]
#[derive(Default)]
pub struct uv_timer_t {
    pub handle: uv_handle_t,
    cb: Option<uv_timer_cb>,
    repeat: u64,
    key: Option<TimerKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkState {
    Idle,
    Queued,
    Canceled,
    Done,
}

impl Default for WorkState {
    fn default() -> Self {
        WorkState::Idle
    }
}

/// Request running a task on the loop thread.
#[repr(C)]
pub struct uv_work_t {
    pub req: uv_req_t,
    pub loop_: *mut uv_loop_t,
    work_cb: Option<uv_work_cb>,
    after_work_cb: Option<uv_after_work_cb>,
    state: WorkState,
}

impl Default for uv_work_t {
    fn default() -> Self {
        uv_work_t {
            req: uv_req_t::default(),
            loop_: ptr::null_mut(),
            work_cb: None,
            after_work_cb: None,
            state: WorkState::Idle,
        }
    }
}

/// Native structures with a user data slot.
pub trait Native: Default + 'static {
    /// Value of the user data slot.
    fn data(&self) -> *mut c_void;

    /// Stores `data` in the user data slot.
    fn set_data(&mut self, data: *mut c_void);
}

/// Native structures starting with a `uv_handle_t`.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with `uv_handle_t` as first field.
pub unsafe trait HandleNative: Native {}

/// Native structures starting with a `uv_req_t`.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with `uv_req_t` as first field.
pub unsafe trait RequestNative: Native {}

macro_rules! native {
    (handle: $($ty:ident),*) => {$(
        impl Native for $ty {
            fn data(&self) -> *mut c_void {
                self.handle.data
            }

            fn set_data(&mut self, data: *mut c_void) {
                self.handle.data = data;
            }
        }

        unsafe impl HandleNative for $ty {}
    )*};
    (request: $($ty:ident),*) => {$(
        impl Native for $ty {
            fn data(&self) -> *mut c_void {
                self.req.data
            }

            fn set_data(&mut self, data: *mut c_void) {
                self.req.data = data;
            }
        }

        unsafe impl RequestNative for $ty {}
    )*};
}

native!(handle: uv_idle_t, uv_timer_t, uv_tcp_t);
native!(request: uv_work_t, uv_connect_t, uv_write_t, uv_shutdown_t);

/// Ordered by deadline, then by start order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    deadline: u64,
    seq: u64,
    slot: usize,
}

pub(crate) struct LoopInner {
    handles: RefCell<Vec<*mut uv_handle_t>>,
    timers: RefCell<BTreeSet<TimerKey>>,
    timer_handles: RefCell<Slab<*mut uv_timer_t>>,
    timer_seq: Cell<u64>,
    idle_handles: RefCell<Vec<*mut uv_idle_t>>,
    tcp_handles: RefCell<Vec<*mut uv_tcp_t>>,
    work_queue: RefCell<VecDeque<*mut uv_work_t>>,
    closing_handles: RefCell<VecDeque<*mut uv_handle_t>>,
    active_reqs: Cell<usize>,
    stop_flag: Cell<bool>,
    block_signal: Cell<bool>,
    time_origin: Instant,
    now: Cell<u64>,
}

impl LoopInner {
    fn new() -> Self {
        LoopInner {
            handles: RefCell::new(Vec::new()),
            timers: RefCell::new(BTreeSet::new()),
            timer_handles: RefCell::new(Slab::new()),
            timer_seq: Cell::new(0),
            idle_handles: RefCell::new(Vec::new()),
            tcp_handles: RefCell::new(Vec::new()),
            work_queue: RefCell::new(VecDeque::new()),
            closing_handles: RefCell::new(VecDeque::new()),
            active_reqs: Cell::new(0),
            stop_flag: Cell::new(false),
            block_signal: Cell::new(false),
            time_origin: Instant::now(),
            now: Cell::new(0),
        }
    }

    fn update_time(&self) {
        let elapsed = Instant::now().duration_since(self.time_origin);
        self.now.set(elapsed.as_millis() as u64);
    }

    fn register(&self, handle: *mut uv_handle_t) {
        self.handles.borrow_mut().push(handle);
    }

    pub(crate) fn req_start(&self) {
        self.active_reqs.set(self.active_reqs.get() + 1);
    }

    pub(crate) fn req_done(&self) {
        debug_assert!(self.active_reqs.get() > 0);
        self.active_reqs.set(self.active_reqs.get().saturating_sub(1));
    }

    /// Whether there are active referenced handles, pending requests or
    /// pending close callbacks.
    fn alive(&self) -> bool {
        if self.active_reqs.get() > 0 || !self.closing_handles.borrow().is_empty() {
            return true;
        }
        self.handles.borrow().iter().any(|h| {
            let flags = unsafe { (**h).flags };
            flags.contains(HandleFlags::ACTIVE | HandleFlags::REF)
                && !flags.contains(HandleFlags::CLOSING)
        })
    }

    fn next_timer(&self) -> Option<u64> {
        self.timers.borrow().iter().next().map(|k| k.deadline)
    }

    /// Poll timeout in milliseconds, `-1` to block.
    fn backend_timeout(&self) -> c_int {
        if self.stop_flag.get()
            || !self.alive()
            || !self.idle_handles.borrow().is_empty()
            || !self.closing_handles.borrow().is_empty()
            || !self.work_queue.borrow().is_empty()
            || self.tcp_pending()
        {
            return 0;
        }
        match self.next_timer() {
            Some(deadline) => deadline.saturating_sub(self.now.get()).min(c_int::MAX as u64) as c_int,
            None => -1,
        }
    }

    fn insert_timer(&self, handle: *mut uv_timer_t, timeout: u64) {
        let seq = self.timer_seq.get();
        self.timer_seq.set(seq + 1);
        let slot = self.timer_handles.borrow_mut().insert(handle);
        let key = TimerKey {
            deadline: self.now.get().saturating_add(timeout),
            seq,
            slot,
        };
        self.timers.borrow_mut().insert(key);
        unsafe {
            (*handle).key = Some(key);
            (*handle).handle.flags.insert(HandleFlags::ACTIVE);
        }
    }

    unsafe fn stop_timer(&self, handle: *mut uv_timer_t) {
        if let Some(key) = (*handle).key.take() {
            self.timers.borrow_mut().remove(&key);
            let mut slots = self.timer_handles.borrow_mut();
            if slots.contains(key.slot) {
                slots.remove(key.slot);
            }
        }
        (*handle).handle.flags.remove(HandleFlags::ACTIVE);
    }

    unsafe fn run_timers(&self) {
        let now = self.now.get();
        let expired: Vec<TimerKey> = self
            .timers
            .borrow()
            .iter()
            .take_while(|k| k.deadline <= now)
            .cloned()
            .collect();

        for key in expired {
            // an earlier callback may have stopped or restarted this timer
            if !self.timers.borrow_mut().remove(&key) {
                continue;
            }
            let handle = {
                let mut slots = self.timer_handles.borrow_mut();
                if !slots.contains(key.slot) {
                    continue;
                }
                slots.remove(key.slot)
            };
            (*handle).key = None;
            (*handle).handle.flags.remove(HandleFlags::ACTIVE);

            let repeat = (*handle).repeat;
            if repeat > 0 {
                self.insert_timer(handle, repeat);
            }
            if let Some(cb) = (*handle).cb {
                cb(handle);
            }
        }
    }

    fn stop_idle(&self, handle: *mut uv_idle_t) {
        self.idle_handles
            .borrow_mut()
            .retain(|h| !ptr::eq(*h, handle));
        unsafe {
            (*handle).handle.flags.remove(HandleFlags::ACTIVE);
        }
    }

    unsafe fn run_idle(&self) {
        let snapshot: Vec<*mut uv_idle_t> = self.idle_handles.borrow().clone();
        for handle in snapshot {
            // stopped by an earlier callback of this phase
            if !(*handle).handle.flags.contains(HandleFlags::ACTIVE) {
                continue;
            }
            if let Some(cb) = (*handle).cb {
                cb(handle);
            }
        }
    }

    /// Runs queued work and its completion callback.
    unsafe fn run_work(&self) -> bool {
        let queued: Vec<*mut uv_work_t> = self.work_queue.borrow_mut().drain(..).collect();
        let ran = !queued.is_empty();

        for req in queued {
            let status = match (*req).state {
                WorkState::Canceled => UV_ECANCELED,
                _ => {
                    if let Some(work) = (*req).work_cb {
                        work(req);
                    }
                    0
                }
            };
            (*req).state = WorkState::Done;
            self.req_done();
            if let Some(cb) = (*req).after_work_cb {
                cb(req, status);
            }
        }
        ran
    }

    unsafe fn run_close(&self) {
        let closing: Vec<*mut uv_handle_t> = self.closing_handles.borrow_mut().drain(..).collect();
        for handle in closing {
            self.handles.borrow_mut().retain(|h| !ptr::eq(*h, handle));
            if (*handle).type_ == uv_handle_type::UV_TCP {
                tcp::finish_close(self, handle as *mut uv_tcp_t);
            }
            (*handle).flags.insert(HandleFlags::CLOSED);
            if let Some(cb) = (*handle).close_cb.take() {
                cb(handle);
            }
        }
    }

    unsafe fn tick(&self, mode: uv_run_mode) -> bool {
        self.update_time();
        self.run_timers();
        let ran_pending = self.run_work();
        self.run_idle();

        let timeout = match mode {
            uv_run_mode::UV_RUN_ONCE if !ran_pending => self.backend_timeout(),
            uv_run_mode::UV_RUN_DEFAULT => self.backend_timeout(),
            _ => 0,
        };
        self.run_io(timeout);
        self.run_close();

        if mode == uv_run_mode::UV_RUN_ONCE {
            self.update_time();
            self.run_timers();
        }
        self.alive()
    }

    unsafe fn run_io(&self, timeout: c_int) {
        if tcp::poll(self, timeout) {
            return;
        }
        // nothing to poll, wait for the next timer
        if timeout > 0 {
            std::thread::sleep(Duration::from_millis(timeout as u64));
        }
    }
}

#[inline]
pub(crate) unsafe fn get_inner<'a>(loop_: *mut uv_loop_t) -> Option<&'a LoopInner> {
    if loop_.is_null() {
        None
    } else {
        (*loop_).inner.as_ref()
    }
}

unsafe fn handle_init(
    loop_: *mut uv_loop_t,
    handle: *mut uv_handle_t,
    type_: uv_handle_type,
) -> c_int {
    let inner = inner_or!(loop_, UV_EINVAL);
    (*handle).loop_ = loop_;
    (*handle).type_ = type_;
    (*handle).flags = HandleFlags::REF;
    (*handle).close_cb = None;
    inner.register(handle);
    0
}

/// Initializes `loop_`.
///
/// # Safety
///
/// `loop_` must be valid and not initialized.
pub unsafe extern "C" fn uv_loop_init(loop_: *mut uv_loop_t) -> c_int {
    let inner = Box::new(LoopInner::new());
    inner.update_time();
    (*loop_).inner = Box::into_raw(inner);
    0
}

/// Applies an option to `loop_`.
///
/// Fails with `UV_EINVAL` once the loop was closed.
///
/// # Safety
///
/// `loop_` must be valid.
pub unsafe extern "C" fn uv_loop_configure(loop_: *mut uv_loop_t, option: uv_loop_option) -> c_int {
    let inner = inner_or!(loop_, UV_EINVAL);
    match option {
        uv_loop_option::UV_LOOP_BLOCK_SIGNAL => inner.block_signal.set(true),
    }
    0
}

/// Releases `loop_`.
///
/// Fails with `UV_EBUSY` while handles are not closed or requests are
/// pending.
///
/// # Safety
///
/// `loop_` must be initialized.
pub unsafe extern "C" fn uv_loop_close(loop_: *mut uv_loop_t) -> c_int {
    {
        let inner = inner_or!(loop_, 0);
        if !inner.handles.borrow().is_empty() || inner.active_reqs.get() > 0 {
            return UV_EBUSY;
        }
    }
    drop(Box::from_raw((*loop_).inner));
    (*loop_).inner = ptr::null_mut();
    0
}

/// Whether `loop_` has work left. A closed loop has none.
///
/// # Safety
///
/// `loop_` must be valid.
pub unsafe extern "C" fn uv_loop_alive(loop_: *const uv_loop_t) -> c_int {
    inner_or!(loop_ as *mut uv_loop_t, 0).alive() as c_int
}

/// Runs `loop_` according to `mode`.
///
/// Returns non-zero if there is still work left. A closed loop returns
/// zero right away.
///
/// # Safety
///
/// `loop_` must be valid.
pub unsafe extern "C" fn uv_run(loop_: *mut uv_loop_t, mode: uv_run_mode) -> c_int {
    let inner = inner_or!(loop_, 0);
    let mut alive = inner.alive();
    if !alive {
        inner.update_time();
    }

    while alive && !inner.stop_flag.get() {
        alive = inner.tick(mode);
        if mode != uv_run_mode::UV_RUN_DEFAULT {
            break;
        }
    }

    inner.stop_flag.set(false);
    alive as c_int
}

/// Makes the running `uv_run` return as soon as possible.
///
/// # Safety
///
/// `loop_` must be valid.
pub unsafe extern "C" fn uv_stop(loop_: *mut uv_loop_t) {
    let inner = inner_or!(loop_, ());
    inner.stop_flag.set(true);
}

/// Cached loop time in milliseconds, zero once the loop was closed.
///
/// # Safety
///
/// `loop_` must be valid.
pub unsafe extern "C" fn uv_now(loop_: *const uv_loop_t) -> u64 {
    inner_or!(loop_ as *mut uv_loop_t, 0).now.get()
}

/// Refreshes the cached loop time.
///
/// # Safety
///
/// `loop_` must be valid.
pub unsafe extern "C" fn uv_update_time(loop_: *mut uv_loop_t) {
    let inner = inner_or!(loop_, ());
    inner.update_time();
}

/// Closes `handle`; `close_cb` runs in the close phase.
///
/// # Safety
///
/// `handle` must be initialized and not closing. It must stay valid until
/// `close_cb` returns.
pub unsafe extern "C" fn uv_close(handle: *mut uv_handle_t, close_cb: Option<uv_close_cb>) {
    debug_assert!(!(*handle).flags.contains(HandleFlags::CLOSING));
    let inner = inner_or!((*handle).loop_, ());

    match (*handle).type_ {
        uv_handle_type::UV_IDLE => inner.stop_idle(handle as *mut uv_idle_t),
        uv_handle_type::UV_TIMER => inner.stop_timer(handle as *mut uv_timer_t),
        uv_handle_type::UV_TCP => tcp::start_close(inner, handle as *mut uv_tcp_t),
        uv_handle_type::UV_UNKNOWN_HANDLE => {}
    }

    (*handle).flags.insert(HandleFlags::CLOSING);
    (*handle).flags.remove(HandleFlags::ACTIVE);
    (*handle).close_cb = close_cb;
    inner.closing_handles.borrow_mut().push_back(handle);
}

/// Whether `handle` is closing or closed.
///
/// # Safety
///
/// `handle` must be valid.
pub unsafe extern "C" fn uv_is_closing(handle: *const uv_handle_t) -> c_int {
    (*handle)
        .flags
        .intersects(HandleFlags::CLOSING | HandleFlags::CLOSED) as c_int
}

/// Whether `handle` has pending work.
///
/// # Safety
///
/// `handle` must be valid.
pub unsafe extern "C" fn uv_is_active(handle: *const uv_handle_t) -> c_int {
    (*handle).flags.contains(HandleFlags::ACTIVE) as c_int
}

/// Makes `handle` keep the loop alive while active.
///
/// # Safety
///
/// `handle` must be valid.
pub unsafe extern "C" fn uv_ref(handle: *mut uv_handle_t) {
    (*handle).flags.insert(HandleFlags::REF);
}

/// Lets the loop exit even if `handle` is active.
///
/// # Safety
///
/// `handle` must be valid.
pub unsafe extern "C" fn uv_unref(handle: *mut uv_handle_t) {
    (*handle).flags.remove(HandleFlags::REF);
}

/// Whether `handle` is referenced.
///
/// # Safety
///
/// `handle` must be valid.
pub unsafe extern "C" fn uv_has_ref(handle: *const uv_handle_t) -> c_int {
    (*handle).flags.contains(HandleFlags::REF) as c_int
}

/// Size in bytes of a handle structure of kind `type_`.
pub fn uv_handle_size(type_: uv_handle_type) -> usize {
    match type_ {
        uv_handle_type::UV_IDLE => std::mem::size_of::<uv_idle_t>(),
        uv_handle_type::UV_TCP => std::mem::size_of::<uv_tcp_t>(),
        uv_handle_type::UV_TIMER => std::mem::size_of::<uv_timer_t>(),
        uv_handle_type::UV_UNKNOWN_HANDLE => 0,
    }
}

/// Size in bytes of a request structure of kind `type_`.
pub fn uv_req_size(type_: uv_req_type) -> usize {
    match type_ {
        uv_req_type::UV_CONNECT => std::mem::size_of::<uv_connect_t>(),
        uv_req_type::UV_WRITE => std::mem::size_of::<uv_write_t>(),
        uv_req_type::UV_SHUTDOWN => std::mem::size_of::<uv_shutdown_t>(),
        uv_req_type::UV_WORK => std::mem::size_of::<uv_work_t>(),
        uv_req_type::UV_UNKNOWN_REQ => 0,
    }
}

/// Initializes an idle handle.
///
/// # Safety
///
/// `loop_` must be initialized and `handle` valid.
pub unsafe extern "C" fn uv_idle_init(loop_: *mut uv_loop_t, handle: *mut uv_idle_t) -> c_int {
    let err = handle_init(loop_, handle as *mut uv_handle_t, uv_handle_type::UV_IDLE);
    if err != 0 {
        return err;
    }
    (*handle).cb = None;
    0
}

/// Starts an idle handle; `cb` runs once per loop iteration.
///
/// # Safety
///
/// `handle` must be initialized.
pub unsafe extern "C" fn uv_idle_start(handle: *mut uv_idle_t, cb: Option<uv_idle_cb>) -> c_int {
    if cb.is_none() || (*handle).handle.flags.contains(HandleFlags::CLOSING) {
        return UV_EINVAL;
    }
    (*handle).cb = cb;
    if (*handle).handle.flags.contains(HandleFlags::ACTIVE) {
        return 0;
    }
    let inner = inner_or!((*handle).handle.loop_, UV_EINVAL);
    (*handle).handle.flags.insert(HandleFlags::ACTIVE);
    inner.idle_handles.borrow_mut().push(handle);
    0
}

/// Stops an idle handle.
///
/// # Safety
///
/// `handle` must be initialized.
pub unsafe extern "C" fn uv_idle_stop(handle: *mut uv_idle_t) -> c_int {
    if (*handle).handle.flags.contains(HandleFlags::ACTIVE) {
        let inner = inner_or!((*handle).handle.loop_, UV_EINVAL);
        inner.stop_idle(handle);
    }
    0
}

/// Initializes a timer handle.
///
/// # Safety
///
/// `loop_` must be initialized and `handle` valid.
pub unsafe extern "C" fn uv_timer_init(loop_: *mut uv_loop_t, handle: *mut uv_timer_t) -> c_int {
    let err = handle_init(loop_, handle as *mut uv_handle_t, uv_handle_type::UV_TIMER);
    if err != 0 {
        return err;
    }
    (*handle).cb = None;
    (*handle).repeat = 0;
    (*handle).key = None;
    0
}

/// Starts a timer firing after `timeout` ms, then every `repeat` ms if
/// `repeat` is not zero.
///
/// # Safety
///
/// `handle` must be initialized.
pub unsafe extern "C" fn uv_timer_start(
    handle: *mut uv_timer_t,
    cb: Option<uv_timer_cb>,
    timeout: u64,
    repeat: u64,
) -> c_int {
    if cb.is_none() || (*handle).handle.flags.contains(HandleFlags::CLOSING) {
        return UV_EINVAL;
    }
    let inner = inner_or!((*handle).handle.loop_, UV_EINVAL);
    inner.stop_timer(handle);
    (*handle).cb = cb;
    (*handle).repeat = repeat;
    inner.insert_timer(handle, timeout);
    0
}

/// Stops a timer.
///
/// # Safety
///
/// `handle` must be initialized.
pub unsafe extern "C" fn uv_timer_stop(handle: *mut uv_timer_t) -> c_int {
    let inner = inner_or!((*handle).handle.loop_, UV_EINVAL);
    inner.stop_timer(handle);
    0
}

/// Restarts a repeating timer with its repeat value as timeout.
///
/// # Safety
///
/// `handle` must be initialized.
pub unsafe extern "C" fn uv_timer_again(handle: *mut uv_timer_t) -> c_int {
    if (*handle).cb.is_none() || (*handle).handle.flags.contains(HandleFlags::CLOSING) {
        return UV_EINVAL;
    }
    let repeat = (*handle).repeat;
    if repeat > 0 {
        let inner = inner_or!((*handle).handle.loop_, UV_EINVAL);
        inner.stop_timer(handle);
        inner.insert_timer(handle, repeat);
    }
    0
}

/// Sets the repeat interval in ms.
///
/// # Safety
///
/// `handle` must be initialized.
pub unsafe extern "C" fn uv_timer_set_repeat(handle: *mut uv_timer_t, repeat: u64) {
    (*handle).repeat = repeat;
}

/// Repeat interval in ms.
///
/// # Safety
///
/// `handle` must be initialized.
pub unsafe extern "C" fn uv_timer_get_repeat(handle: *const uv_timer_t) -> u64 {
    (*handle).repeat
}

/// Queues `work_cb` to run on the loop thread during the next iteration.
/// `after_work_cb` runs right after it, or with `UV_ECANCELED` if the
/// request was canceled first.
///
/// # Safety
///
/// `loop_` must be initialized; `req` must stay valid until
/// `after_work_cb` returns.
pub unsafe extern "C" fn uv_queue_work(
    loop_: *mut uv_loop_t,
    req: *mut uv_work_t,
    work_cb: Option<uv_work_cb>,
    after_work_cb: Option<uv_after_work_cb>,
) -> c_int {
    if work_cb.is_none() {
        return UV_EINVAL;
    }
    let inner = inner_or!(loop_, UV_EINVAL);
    (*req).req.type_ = uv_req_type::UV_WORK;
    (*req).loop_ = loop_;
    (*req).work_cb = work_cb;
    (*req).after_work_cb = after_work_cb;
    (*req).state = WorkState::Queued;

    inner.req_start();
    inner.work_queue.borrow_mut().push_back(req);
    0
}

/// Cancels a pending request.
///
/// Only queued work that has not started can be canceled; its completion
/// callback then reports `UV_ECANCELED`.
///
/// # Safety
///
/// `req` must be valid.
pub unsafe extern "C" fn uv_cancel(req: *mut uv_req_t) -> c_int {
    match (*req).type_ {
        uv_req_type::UV_WORK => {
            let work = req as *mut uv_work_t;
            match (*work).state {
                WorkState::Queued => {
                    (*work).state = WorkState::Canceled;
                    0
                }
                _ => UV_EBUSY,
            }
        }
        _ => UV_EINVAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static HITS: Cell<usize> = Cell::new(0);
    }

    fn hits() -> usize {
        HITS.with(|h| h.get())
    }

    fn hit() {
        HITS.with(|h| h.set(h.get() + 1));
    }

    unsafe fn make_loop() -> Box<uv_loop_t> {
        let mut lp = Box::new(uv_loop_t::default());
        assert_eq!(uv_loop_init(&mut *lp), 0);
        lp
    }

    #[test]
    fn test_empty_loop() {
        unsafe {
            let mut lp = make_loop();
            assert_eq!(uv_loop_alive(&*lp), 0);
            assert_eq!(uv_run(&mut *lp, uv_run_mode::UV_RUN_DEFAULT), 0);
            assert_eq!(uv_loop_close(&mut *lp), 0);
        }
    }

    #[test]
    fn test_init_keeps_data() {
        unsafe {
            let mut lp = make_loop();
            let mut idle = uv_idle_t::default();
            let marker = 7usize;
            idle.set_data(&marker as *const usize as *mut c_void);
            uv_idle_init(&mut *lp, &mut idle);
            assert_eq!(idle.data(), &marker as *const usize as *mut c_void);

            assert_eq!(uv_loop_close(&mut *lp), UV_EBUSY);
            uv_close(&mut idle as *mut uv_idle_t as *mut uv_handle_t, None);
            uv_run(&mut *lp, uv_run_mode::UV_RUN_DEFAULT);
            assert_eq!(uv_loop_close(&mut *lp), 0);
        }
    }

    unsafe extern "C" fn stop_idle(handle: *mut uv_idle_t) {
        hit();
        if hits() == 3 {
            uv_idle_stop(handle);
        }
    }

    #[test]
    fn test_idle() {
        HITS.with(|h| h.set(0));
        unsafe {
            let mut lp = make_loop();
            let mut idle = uv_idle_t::default();
            uv_idle_init(&mut *lp, &mut idle);
            assert_eq!(uv_idle_start(&mut idle, Some(stop_idle)), 0);
            assert_eq!(uv_is_active(&idle.handle), 1);

            assert_eq!(uv_run(&mut *lp, uv_run_mode::UV_RUN_DEFAULT), 0);
            assert_eq!(hits(), 3);
            assert_eq!(uv_is_active(&idle.handle), 0);

            uv_close(&mut idle.handle, None);
            assert_eq!(uv_is_closing(&idle.handle), 1);
            uv_run(&mut *lp, uv_run_mode::UV_RUN_DEFAULT);
            assert_eq!(uv_loop_close(&mut *lp), 0);
        }
    }

    unsafe extern "C" fn count_timer(_handle: *mut uv_timer_t) {
        hit();
    }

    #[test]
    fn test_timer_once_and_unref() {
        HITS.with(|h| h.set(0));
        unsafe {
            let mut lp = make_loop();
            let mut timer = uv_timer_t::default();
            uv_timer_init(&mut *lp, &mut timer);
            assert_eq!(uv_timer_start(&mut timer, Some(count_timer), 1, 0), 0);
            uv_run(&mut *lp, uv_run_mode::UV_RUN_DEFAULT);
            assert_eq!(hits(), 1);
            assert_eq!(uv_is_active(&timer.handle), 0);

            uv_timer_start(&mut timer, Some(count_timer), 1, 1);
            uv_unref(&mut timer.handle);
            assert_eq!(uv_has_ref(&timer.handle), 0);
            assert_eq!(uv_run(&mut *lp, uv_run_mode::UV_RUN_DEFAULT), 0);
            assert_eq!(hits(), 1);

            uv_close(&mut timer.handle, None);
            uv_run(&mut *lp, uv_run_mode::UV_RUN_DEFAULT);
            assert_eq!(uv_loop_close(&mut *lp), 0);
        }
    }

    unsafe extern "C" fn noop_work(_req: *mut uv_work_t) {
        hit();
    }

    unsafe extern "C" fn after_work(req: *mut uv_work_t, status: c_int) {
        *((*req).req.data as *mut c_int) = status;
    }

    #[test]
    fn test_work_and_cancel() {
        HITS.with(|h| h.set(0));
        unsafe {
            let mut lp = make_loop();
            let mut status_a: c_int = 1;
            let mut status_b: c_int = 1;
            let mut a = uv_work_t::default();
            let mut b = uv_work_t::default();
            a.set_data(&mut status_a as *mut c_int as *mut c_void);
            b.set_data(&mut status_b as *mut c_int as *mut c_void);

            uv_queue_work(&mut *lp, &mut a, Some(noop_work), Some(after_work));
            uv_queue_work(&mut *lp, &mut b, Some(noop_work), Some(after_work));
            assert_eq!(uv_cancel(&mut b.req), 0);
            assert_eq!(uv_cancel(&mut b.req), UV_EBUSY);

            uv_run(&mut *lp, uv_run_mode::UV_RUN_DEFAULT);
            assert_eq!(hits(), 1);
            assert_eq!(status_a, 0);
            assert_eq!(status_b, UV_ECANCELED);
            assert_eq!(uv_cancel(&mut a.req), UV_EBUSY);
            assert_eq!(uv_loop_close(&mut *lp), 0);
        }
    }
}

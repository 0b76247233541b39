//! The event loop.
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::os::raw::c_void;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::emitter::{Emitter, EventEmitter};
use crate::error::{Error, ErrorEvent};
use crate::sys::{self, uv_loop_option, uv_loop_t, uv_run_mode};
use crate::util::cell::RawCell;

mod builder;

pub use self::builder::Builder;

thread_local! {
    static DEFAULT: RefCell<Weak<Loop>> = RefCell::new(Weak::new());
}

/// How [`Loop::run`] drives the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Runs until there are no more active and referenced handles or
    /// requests.
    Default,
    /// Polls for I/O once, blocking if there are no pending callbacks.
    Once,
    /// Polls for I/O once without blocking.
    NoWait,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Default
    }
}

impl From<RunMode> for uv_run_mode {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::Default => uv_run_mode::UV_RUN_DEFAULT,
            RunMode::Once => uv_run_mode::UV_RUN_ONCE,
            RunMode::NoWait => uv_run_mode::UV_RUN_NOWAIT,
        }
    }
}

/// Options for [`Loop::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOption {
    /// Blocks a signal when polling for new events.
    BlockSignal,
}

impl From<LoopOption> for uv_loop_option {
    fn from(option: LoopOption) -> Self {
        match option {
            LoopOption::BlockSignal => uv_loop_option::UV_LOOP_BLOCK_SIGNAL,
        }
    }
}

/// Event loop, the scheduling context of every handle and request.
///
/// A loop publishes `ErrorEvent` when closing it fails.
pub struct Loop {
    raw: RawCell<uv_loop_t>,
    emitter: Emitter<Loop>,
    name: Cow<'static, str>,
    closed: Cell<bool>,
}

impl Loop {
    /// Creates a loop with the default configuration.
    pub fn new() -> Result<Rc<Loop>, Error> {
        Builder::new().build()
    }

    /// Returns a builder to configure a new loop.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Default loop of the current thread.
    ///
    /// The loop is created on first use and shared while someone holds
    /// it; once every reference is gone the next call creates a new one.
    pub fn get_default() -> Result<Rc<Loop>, Error> {
        if let Some(lp) = DEFAULT.with(|d| d.borrow().upgrade()) {
            return Ok(lp);
        }
        let lp = Builder::new().name("default").build()?;
        DEFAULT.with(|d| *d.borrow_mut() = Rc::downgrade(&lp));
        Ok(lp)
    }

    pub(crate) fn create(name: Cow<'static, str>) -> Result<Rc<Loop>, Error> {
        let lp = Rc::new_cyclic(|this: &Weak<Loop>| {
            let mut raw = uv_loop_t::default();
            raw.data = this.as_ptr() as *mut c_void;
            Loop {
                raw: RawCell::new(raw),
                emitter: Emitter::new(),
                name,
                closed: Cell::new(true),
            }
        });

        let err = unsafe { sys::uv_loop_init(lp.raw()) };
        if err != 0 {
            return Err(ErrorEvent::new(err).into());
        }
        lp.closed.set(false);
        debug!("loop {} created", lp.name);
        Ok(lp)
    }

    /// Name given to the loop by its builder.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pointer to the native loop.
    pub fn raw(&self) -> *mut uv_loop_t {
        self.raw.get()
    }

    /// Applies `option`; publishes `ErrorEvent` on failure, `EINVAL` once
    /// the loop is closed.
    pub fn configure(&self, option: LoopOption) -> bool {
        let err = if self.closed.get() {
            sys::UV_EINVAL
        } else {
            unsafe { sys::uv_loop_configure(self.raw(), option.into()) }
        };
        if err != 0 {
            self.emitter.publish(ErrorEvent::new(err), self);
        }
        err == 0
    }

    /// Runs the loop.
    ///
    /// Returns `true` if there is no more work left, which is always the
    /// case for a closed loop.
    pub fn run(&self, mode: RunMode) -> bool {
        if self.closed.get() {
            return true;
        }
        trace!("loop {} run {:?}", self.name, mode);
        unsafe { sys::uv_run(self.raw(), mode.into()) == 0 }
    }

    /// Makes a running loop return as soon as possible.
    pub fn stop(&self) {
        if self.closed.get() {
            return;
        }
        debug!("loop {} stop", self.name);
        unsafe { sys::uv_stop(self.raw()) }
    }

    /// Whether there are active handles or pending requests.
    pub fn alive(&self) -> bool {
        !self.closed.get() && unsafe { sys::uv_loop_alive(self.raw()) != 0 }
    }

    /// Cached time of the loop, relative to its creation. Zero once the
    /// loop is closed.
    pub fn now(&self) -> Duration {
        if self.closed.get() {
            return Duration::from_millis(0);
        }
        Duration::from_millis(unsafe { sys::uv_now(self.raw()) })
    }

    /// Refreshes the cached time.
    pub fn update_time(&self) {
        if !self.closed.get() {
            unsafe { sys::uv_update_time(self.raw()) }
        }
    }

    /// Whether the loop was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Releases the native loop.
    ///
    /// Publishes `ErrorEvent` if handles or requests are still pending.
    pub fn close(&self) {
        if self.closed.get() {
            return;
        }
        let err = unsafe { sys::uv_loop_close(self.raw()) };
        if err != 0 {
            self.emitter.publish(ErrorEvent::new(err), self);
        } else {
            self.closed.set(true);
            debug!("loop {} closed", self.name);
        }
    }

    /// Creates a wrapper bound to this loop.
    pub fn resource<R: FromLoop>(self: &Rc<Self>) -> Rc<R> {
        R::from_loop(self)
    }
}

impl EventEmitter for Loop {
    fn emitter(&self) -> &Emitter<Self> {
        &self.emitter
    }
}

impl Drop for Loop {
    fn drop(&mut self) {
        if !self.closed.get() {
            self.close();
            if !self.closed.get() {
                warn!("loop {} dropped with pending handles or requests", self.name);
            }
        }
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("name", &self.name)
            .field("closed", &self.closed.get())
            .finish()
    }
}

/// Wrappers that can be created from a loop.
pub trait FromLoop: Sized {
    /// Creates the wrapper.
    fn from_loop(lp: &Rc<Loop>) -> Rc<Self>;
}

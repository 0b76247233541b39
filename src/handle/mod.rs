//! Long lived native objects.
//!
//! A handle owns itself from a successful `init` until the close callback
//! runs, whatever the application does with its own references. Between
//! the two it may publish any number of events.
use std::os::raw::c_int;
use std::rc::Rc;

use crate::emitter::EventEmitter;
use crate::error::ErrorEvent;
use crate::event_loop::Loop;
use crate::resource::{reserve, Resource};
use crate::sys::{self, uv_handle_t, uv_handle_type, uv_loop_t, HandleNative};

mod idle;
mod stream;
mod tcp;
mod timer;

pub use self::idle::{IdleEvent, IdleHandle};
pub use self::stream::{DataEvent, EndEvent, ListenEvent, Stream, DEFAULT_BACKLOG};
pub use self::tcp::TcpHandle;
pub use self::timer::{TimerEvent, TimerHandle};

/// Published once a handle is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseEvent;

/// Kind of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleCategory {
    /// Not initialized.
    Unknown,
    /// [`IdleHandle`].
    Idle,
    /// [`TcpHandle`].
    Tcp,
    /// [`TimerHandle`].
    Timer,
}

impl From<uv_handle_type> for HandleCategory {
    fn from(t: uv_handle_type) -> Self {
        match t {
            uv_handle_type::UV_IDLE => HandleCategory::Idle,
            uv_handle_type::UV_TCP => HandleCategory::Tcp,
            uv_handle_type::UV_TIMER => HandleCategory::Timer,
            uv_handle_type::UV_UNKNOWN_HANDLE => HandleCategory::Unknown,
        }
    }
}

/// Operations shared by every handle.
pub trait Handle: EventEmitter {
    /// Native handle structure.
    type Raw: HandleNative;

    #[doc(hidden)]
    fn resource(&self) -> &Resource<Self, Self::Raw>;

    /// Pointer to the native handle.
    fn raw(&self) -> *mut Self::Raw {
        self.resource().raw()
    }

    /// Pointer to the common part of the native handle.
    fn as_handle(&self) -> *mut uv_handle_t {
        self.resource().raw_as::<uv_handle_t>()
    }

    /// Loop the handle belongs to.
    fn event_loop(&self) -> &Rc<Loop> {
        self.resource().event_loop()
    }

    /// Calls the native constructor `f` unless the handle is already
    /// alive. Publishes `ErrorEvent` if `f` fails, or with `EINVAL` if the
    /// loop is closed.
    ///
    /// Returns whether the handle is alive.
    fn initialize<F>(&self, f: F) -> bool
    where
        F: FnOnce(*mut uv_loop_t, *mut Self::Raw) -> c_int,
    {
        let res = self.resource();
        if !res.self_owned() && !self.closing() {
            let err = if res.event_loop().is_closed() {
                sys::UV_EINVAL
            } else {
                f(res.event_loop().raw(), res.raw())
            };
            if err != 0 {
                self.emitter().publish(ErrorEvent::new(err), self);
            } else {
                res.leak();
            }
        }
        res.self_owned()
    }

    /// Whether the native constructor ran.
    fn initialized(&self) -> bool {
        unsafe { !(*self.as_handle()).loop_.is_null() }
    }

    /// Calls the native operation `f`, publishing `ErrorEvent` if it
    /// fails.
    fn invoke<F>(&self, f: F) -> bool
    where
        F: FnOnce() -> c_int,
    {
        let err = if self.initialized() { f() } else { sys::UV_EINVAL };
        if err != 0 {
            self.emitter().publish(ErrorEvent::new(err), self);
        }
        err == 0
    }

    /// Closes the handle; `CloseEvent` is published once done.
    ///
    /// Does nothing if the handle is not initialized or already closing.
    fn close(&self) {
        if self.resource().self_owned() && !self.closing() {
            debug!("closing {:?} handle", self.category());
            unsafe { sys::uv_close(self.as_handle(), Some(close_callback::<Self>)) }
        }
    }

    /// Whether the handle is closing or closed.
    fn closing(&self) -> bool {
        unsafe { sys::uv_is_closing(self.as_handle()) != 0 }
    }

    /// Whether the handle has pending work.
    fn active(&self) -> bool {
        unsafe { sys::uv_is_active(self.as_handle()) != 0 }
    }

    /// Makes the handle keep the loop alive while active.
    fn reference(&self) {
        unsafe { sys::uv_ref(self.as_handle()) }
    }

    /// Lets the loop exit while the handle is active.
    fn unreference(&self) {
        unsafe { sys::uv_unref(self.as_handle()) }
    }

    /// Whether the handle is referenced.
    fn referenced(&self) -> bool {
        unsafe { sys::uv_has_ref(self.as_handle()) != 0 }
    }

    /// Kind of the handle.
    fn category(&self) -> HandleCategory {
        unsafe { (*self.as_handle()).type_.into() }
    }

    /// Size of the native structure.
    fn size(&self) -> usize {
        unsafe { sys::uv_handle_size((*self.as_handle()).type_) }
    }
}

unsafe extern "C" fn close_callback<H: Handle>(handle: *mut uv_handle_t) {
    if let Some(this) = reserve::<H>((*handle).data) {
        this.emitter().publish(CloseEvent, &*this);
        let released = this.resource().reset();
        drop(released);
    }
}

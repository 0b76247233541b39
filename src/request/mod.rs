//! One-shot native operations.
//!
//! A request owns itself from a successful submission until its
//! completion callback has published exactly one of its success event or
//! `ErrorEvent`.
use std::os::raw::c_int;
use std::rc::Rc;

use crate::emitter::EventEmitter;
use crate::error::ErrorEvent;
use crate::event_loop::Loop;
use crate::resource::{reserve, Resource};
use crate::sys::{self, uv_req_t, RequestNative};

mod connect;
mod shutdown;
mod work;
mod write;

pub use self::connect::{ConnectEvent, ConnectReq};
pub use self::shutdown::{ShutdownEvent, ShutdownReq};
pub use self::work::{WorkEvent, WorkReq};
pub use self::write::{WriteEvent, WriteReq};

/// Operations shared by every request.
pub trait Request: EventEmitter {
    /// Native request structure.
    type Raw: RequestNative;

    #[doc(hidden)]
    fn resource(&self) -> &Resource<Self, Self::Raw>;

    /// Pointer to the native request.
    fn raw(&self) -> *mut Self::Raw {
        self.resource().raw()
    }

    /// Pointer to the common part of the native request.
    fn as_req(&self) -> *mut uv_req_t {
        self.resource().raw_as::<uv_req_t>()
    }

    /// Loop the request belongs to.
    fn event_loop(&self) -> &Rc<Loop> {
        self.resource().event_loop()
    }

    /// Submits the native operation `f`.
    ///
    /// On success the request keeps itself alive until it completes; on
    /// failure `ErrorEvent` is published right away. A request still
    /// pending is refused with `EBUSY`, and one whose loop is closed with
    /// `EINVAL`; `f` is not called then.
    fn invoke<F>(&self, f: F) -> bool
    where
        F: FnOnce() -> c_int,
    {
        let err = if self.resource().self_owned() {
            sys::UV_EBUSY
        } else if self.event_loop().is_closed() {
            sys::UV_EINVAL
        } else {
            f()
        };
        if err != 0 {
            self.emitter().publish(ErrorEvent::new(err), self);
        } else {
            self.resource().leak();
        }
        err == 0
    }

    /// Tries to cancel the pending operation.
    ///
    /// The completion still runs, reporting `ErrorEvent` with
    /// `ECANCELED` if the cancellation succeeded.
    fn cancel(&self) -> bool {
        unsafe { sys::uv_cancel(self.as_req()) == 0 }
    }

    /// Size of the native structure.
    fn size(&self) -> usize {
        unsafe { sys::uv_req_size((*self.as_req()).type_) }
    }
}

/// Completion callback shared by requests: publishes `ErrorEvent` for a
/// non-zero `status`, `E` otherwise, then releases the request.
pub(crate) unsafe extern "C" fn default_callback<R, E>(req: *mut R::Raw, status: c_int)
where
    R: Request,
    E: Default + 'static,
{
    let data = (*(req as *mut uv_req_t)).data;
    if let Some(this) = reserve::<R>(data) {
        if status != 0 {
            this.emitter().publish(ErrorEvent::new(status), &*this);
        } else {
            this.emitter().publish(E::default(), &*this);
        }
        let released = this.resource().reset();
        drop(released);
    }
}

/// Republishes the completion of `req` on `to`.
pub(crate) fn forward<R, E, H>(req: &R, to: Rc<H>)
where
    R: Request,
    E: Clone + 'static,
    H: EventEmitter,
{
    let owner = to.clone();
    req.once(move |e: &ErrorEvent, _: &R| owner.emitter().publish(*e, &*owner));
    req.once(move |e: &E, _: &R| to.emitter().publish(e.clone(), &*to));
}

use std::rc::Rc;

use super::Handle;
use crate::emitter::{Emitter, EventEmitter};
use crate::event_loop::{FromLoop, Loop};
use crate::resource::{reserve, Resource};
use crate::sys::{self, uv_idle_t};

/// Published once per loop iteration while the handle is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleEvent;

/// Runs once per loop iteration, right before polling for I/O.
///
/// A started idle handle makes the loop poll with a zero timeout instead
/// of blocking.
#[derive(Debug)]
pub struct IdleHandle {
    resource: Resource<IdleHandle, uv_idle_t>,
}

impl IdleHandle {
    /// Creates an idle handle. Call `init` before using it.
    pub fn new(lp: &Rc<Loop>) -> Rc<Self> {
        Rc::new_cyclic(|this| IdleHandle {
            resource: Resource::new(lp, this),
        })
    }

    /// Initializes the handle.
    pub fn init(&self) -> bool {
        self.initialize(|lp, raw| unsafe { sys::uv_idle_init(lp, raw) })
    }

    /// Starts publishing `IdleEvent`.
    pub fn start(&self) {
        self.invoke(|| unsafe { sys::uv_idle_start(self.raw(), Some(start_callback)) });
    }

    /// Stops publishing `IdleEvent`.
    pub fn stop(&self) {
        self.invoke(|| unsafe { sys::uv_idle_stop(self.raw()) });
    }
}

unsafe extern "C" fn start_callback(handle: *mut uv_idle_t) {
    if let Some(idle) = reserve::<IdleHandle>((*handle).handle.data) {
        idle.emitter().publish(IdleEvent, &*idle);
    }
}

impl EventEmitter for IdleHandle {
    fn emitter(&self) -> &Emitter<Self> {
        self.resource.emitter()
    }
}

impl Handle for IdleHandle {
    type Raw = uv_idle_t;

    fn resource(&self) -> &Resource<Self, uv_idle_t> {
        &self.resource
    }
}

impl FromLoop for IdleHandle {
    fn from_loop(lp: &Rc<Loop>) -> Rc<Self> {
        IdleHandle::new(lp)
    }
}

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{default_callback, Request};
use crate::emitter::{Emitter, EventEmitter};
use crate::event_loop::Loop;
use crate::resource::{reserve, Resource};
use crate::sys::{self, uv_work_t};

/// Published once the task of a work request ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkEvent;

type Task = Box<dyn FnMut()>;

/// Runs a task on the loop thread during the next loop iteration.
///
/// Canceling a request that is queued but not started skips the task
/// and publishes `ErrorEvent` with `ECANCELED`.
pub struct WorkReq {
    resource: Resource<WorkReq, uv_work_t>,
    task: RefCell<Task>,
}

impl WorkReq {
    /// Creates a work request running `task`.
    pub fn new<F>(lp: &Rc<Loop>, task: F) -> Rc<Self>
    where
        F: FnMut() + 'static,
    {
        Rc::new_cyclic(|this| WorkReq {
            resource: Resource::new(lp, this),
            task: RefCell::new(Box::new(task)),
        })
    }

    /// Queues the task.
    pub fn queue(&self) {
        self.invoke(|| unsafe {
            sys::uv_queue_work(
                self.event_loop().raw(),
                self.raw(),
                Some(work_callback),
                Some(default_callback::<WorkReq, WorkEvent>),
            )
        });
    }
}

unsafe extern "C" fn work_callback(req: *mut uv_work_t) {
    if let Some(work) = reserve::<WorkReq>((*req).req.data) {
        let mut task = work.task.borrow_mut();
        (&mut *task)();
    }
}

impl EventEmitter for WorkReq {
    fn emitter(&self) -> &Emitter<Self> {
        self.resource.emitter()
    }
}

impl Request for WorkReq {
    type Raw = uv_work_t;

    fn resource(&self) -> &Resource<Self, uv_work_t> {
        &self.resource
    }
}

impl fmt::Debug for WorkReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkReq")
            .field("resource", &self.resource)
            .finish()
    }
}

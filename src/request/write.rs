use std::os::raw::c_char;
use std::rc::Rc;

use bytes::Bytes;

use super::{default_callback, Request};
use crate::emitter::{Emitter, EventEmitter};
use crate::event_loop::{FromLoop, Loop};
use crate::resource::Resource;
use crate::sys::{self, uv_buf_init, uv_stream_t, uv_write_t};

/// Published once the data of a write request is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteEvent;

/// Write request.
#[derive(Debug)]
pub struct WriteReq {
    resource: Resource<WriteReq, uv_write_t>,
}

impl WriteReq {
    /// Creates a write request.
    pub fn new(lp: &Rc<Loop>) -> Rc<Self> {
        Rc::new_cyclic(|this| WriteReq {
            resource: Resource::new(lp, this),
        })
    }

    /// Writes `data` to `stream`.
    pub(crate) fn write(&self, stream: *mut uv_stream_t, data: &Bytes) {
        let buf = uv_buf_init(data.as_ptr() as *mut c_char, data.len());
        self.invoke(|| unsafe {
            sys::uv_write(
                self.raw(),
                stream,
                &buf,
                1,
                Some(default_callback::<WriteReq, WriteEvent>),
            )
        });
    }
}

impl EventEmitter for WriteReq {
    fn emitter(&self) -> &Emitter<Self> {
        self.resource.emitter()
    }
}

impl Request for WriteReq {
    type Raw = uv_write_t;

    fn resource(&self) -> &Resource<Self, uv_write_t> {
        &self.resource
    }
}

impl FromLoop for WriteReq {
    fn from_loop(lp: &Rc<Loop>) -> Rc<Self> {
        WriteReq::new(lp)
    }
}

use std::os::raw::{c_char, c_int};
use std::slice;

use bytes::Bytes;

use super::Handle;
use crate::error::ErrorEvent;
use crate::request::{forward, ShutdownEvent, ShutdownReq, WriteEvent, WriteReq};
use crate::resource::reserve;
use crate::sys::{self, uv_buf_init, uv_buf_t, uv_handle_t, uv_stream_t, UV_EOF};

/// Backlog used by [`Stream::listen`].
pub const DEFAULT_BACKLOG: c_int = 1024;

/// Published when a listening stream has a new connection to accept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenEvent;

/// Published when the remote end closed the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndEvent;

/// Published when data was read from a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataEvent {
    /// Bytes read.
    pub data: Bytes,
}

/// Duplex byte streams.
pub trait Stream: Handle {
    /// Pointer to the stream part of the native handle.
    fn as_stream(&self) -> *mut uv_stream_t {
        self.resource().raw_as::<uv_stream_t>()
    }

    /// Starts listening with [`DEFAULT_BACKLOG`]; `ListenEvent` is
    /// published for every incoming connection.
    fn listen(&self) {
        self.listen_with(DEFAULT_BACKLOG)
    }

    /// Starts listening with the given backlog.
    fn listen_with(&self, backlog: c_int) {
        self.invoke(|| unsafe {
            sys::uv_listen(self.as_stream(), backlog, Some(listen_callback::<Self>))
        });
    }

    /// Accepts a pending connection into `client`, usually from a
    /// `ListenEvent` listener.
    fn accept<S: Stream>(&self, client: &S) {
        self.invoke(|| unsafe { sys::uv_accept(self.as_stream(), client.as_stream()) });
    }

    /// Starts reading; `DataEvent` is published for every chunk and
    /// `EndEvent` at end of stream.
    fn read(&self) {
        self.invoke(|| unsafe {
            sys::uv_read_start(
                self.as_stream(),
                Some(alloc_callback),
                Some(read_callback::<Self>),
            )
        });
    }

    /// Stops reading.
    fn stop(&self) {
        self.invoke(|| unsafe { sys::uv_read_stop(self.as_stream()) });
    }

    /// Writes `data`; `WriteEvent` is published once it is written.
    fn write(&self, data: Bytes) {
        if let Some(this) = self.resource().shared() {
            let req = WriteReq::new(self.event_loop());
            forward::<_, WriteEvent, _>(&*req, this);
            req.write(self.as_stream(), &data);
        }
    }

    /// Writes as much of `data` as possible without queueing.
    ///
    /// Returns the number of bytes written. On failure, including when
    /// nothing can be written right now, `ErrorEvent` is published and
    /// zero is returned.
    fn try_write(&self, data: &[u8]) -> usize {
        let buf = uv_buf_init(data.as_ptr() as *mut c_char, data.len());
        let written = if self.initialized() {
            unsafe { sys::uv_try_write(self.as_stream(), &buf, 1) }
        } else {
            sys::UV_EINVAL
        };
        if written < 0 {
            self.emitter().publish(ErrorEvent::new(written), self);
            0
        } else {
            written as usize
        }
    }

    /// Shuts down the write side once pending writes are done;
    /// `ShutdownEvent` is published once done.
    fn shutdown(&self) {
        if let Some(this) = self.resource().shared() {
            let req = ShutdownReq::new(self.event_loop());
            forward::<_, ShutdownEvent, _>(&*req, this);
            req.shutdown(self.as_stream());
        }
    }

    /// Whether the stream can be read from.
    fn readable(&self) -> bool {
        unsafe { sys::uv_is_readable(self.as_stream()) != 0 }
    }

    /// Whether the stream can be written to.
    fn writable(&self) -> bool {
        unsafe { sys::uv_is_writable(self.as_stream()) != 0 }
    }
}

unsafe extern "C" fn listen_callback<S: Stream>(server: *mut uv_stream_t, status: c_int) {
    if let Some(this) = reserve::<S>((*server).handle.data) {
        if status != 0 {
            this.emitter().publish(ErrorEvent::new(status), &*this);
        } else {
            this.emitter().publish(ListenEvent, &*this);
        }
    }
}

unsafe extern "C" fn alloc_callback(_: *mut uv_handle_t, suggested: usize, buf: *mut uv_buf_t) {
    let data = vec![0u8; suggested].into_boxed_slice();
    let len = data.len();
    *buf = uv_buf_init(Box::into_raw(data) as *mut u8 as *mut c_char, len);
}

unsafe extern "C" fn read_callback<S: Stream>(stream: *mut uv_stream_t, nread: isize, buf: *const uv_buf_t) {
    // reclaim the buffer given out by `alloc_callback`
    let data = if (*buf).base.is_null() {
        None
    } else {
        let raw = slice::from_raw_parts_mut((*buf).base as *mut u8, (*buf).len);
        Some(Box::from_raw(raw as *mut [u8]))
    };

    let this = match reserve::<S>((*stream).handle.data) {
        Some(this) => this,
        None => return,
    };
    if nread == UV_EOF as isize {
        this.emitter().publish(EndEvent, &*this);
    } else if nread > 0 {
        let mut data = data.map(|b| Bytes::from(b.into_vec())).unwrap_or_default();
        data.truncate(nread as usize);
        this.emitter().publish(DataEvent { data }, &*this);
    } else if nread < 0 {
        this.emitter().publish(ErrorEvent::new(nread as c_int), &*this);
    }
}

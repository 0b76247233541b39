//! Event-emitting wrappers over a libuv style event loop.
//!
//! Every handle and request is an [`EventEmitter`]: listeners are attached
//! per event type and the loop publishes into them from its callbacks.
//! Handles keep themselves alive from `init` until they are closed, and
//! requests from submission until they complete, so the application can
//! drop its own references at any time.
//!
//! ```no_run
//! use uvrx::{EventEmitter, Handle, IdleEvent, IdleHandle, Loop, RunMode};
//!
//! let lp = Loop::get_default().unwrap();
//! let idle = lp.resource::<IdleHandle>();
//! idle.on(|_: &IdleEvent, idle: &IdleHandle| idle.close());
//! idle.init();
//! idle.start();
//! lp.run(RunMode::Default);
//! ```
#![allow(clippy::cognitive_complexity)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

#[macro_use]
extern crate log;

mod emitter;
mod error;
mod event_loop;
mod handle;
mod request;
mod resource;
#[allow(missing_docs, missing_debug_implementations)]
pub mod sys;
pub mod type_info;
pub mod util;

pub use crate::emitter::{Connection, Emitter, EventEmitter};
pub use crate::error::{Error, ErrorEvent};
pub use crate::event_loop::{Builder, FromLoop, Loop, LoopOption, RunMode};
pub use crate::handle::{
    CloseEvent, DataEvent, EndEvent, Handle, HandleCategory, IdleEvent, IdleHandle, ListenEvent,
    Stream, TcpHandle, TimerEvent, TimerHandle, DEFAULT_BACKLOG,
};
pub use crate::request::{
    ConnectEvent, ConnectReq, Request, ShutdownEvent, ShutdownReq, WorkEvent, WorkReq, WriteEvent,
    WriteReq,
};
pub use crate::resource::Resource;
pub use crate::sys::TcpFlags;
pub use crate::util::Addr;

use std::rc::Rc;
use std::time::Duration;

use super::Handle;
use crate::emitter::{Emitter, EventEmitter};
use crate::event_loop::{FromLoop, Loop};
use crate::resource::{reserve, Resource};
use crate::sys::{self, uv_timer_t};

/// Published when a timer fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerEvent;

/// Fires after a timeout, then optionally at a fixed interval.
///
/// Times are in milliseconds, sub-millisecond parts are dropped.
#[derive(Debug)]
pub struct TimerHandle {
    resource: Resource<TimerHandle, uv_timer_t>,
}

fn millis(d: Duration) -> u64 {
    d.as_secs()
        .saturating_mul(1000)
        .saturating_add(u64::from(d.subsec_millis()))
}

impl TimerHandle {
    /// Creates a timer. Call `init` before using it.
    pub fn new(lp: &Rc<Loop>) -> Rc<Self> {
        Rc::new_cyclic(|this| TimerHandle {
            resource: Resource::new(lp, this),
        })
    }

    /// Initializes the handle.
    pub fn init(&self) -> bool {
        self.initialize(|lp, raw| unsafe { sys::uv_timer_init(lp, raw) })
    }

    /// Fires `TimerEvent` after `timeout`, then every `repeat` unless
    /// `repeat` is zero. Restarts an already started timer.
    pub fn start(&self, timeout: Duration, repeat: Duration) {
        self.invoke(|| unsafe {
            sys::uv_timer_start(
                self.raw(),
                Some(start_callback),
                millis(timeout),
                millis(repeat),
            )
        });
    }

    /// Stops the timer.
    pub fn stop(&self) {
        self.invoke(|| unsafe { sys::uv_timer_stop(self.raw()) });
    }

    /// Restarts a repeating timer, using the repeat interval as timeout.
    pub fn again(&self) {
        self.invoke(|| unsafe { sys::uv_timer_again(self.raw()) });
    }

    /// Sets the repeat interval, used from the next time the timer fires.
    pub fn set_repeat(&self, repeat: Duration) {
        unsafe { sys::uv_timer_set_repeat(self.raw(), millis(repeat)) }
    }

    /// Repeat interval.
    pub fn repeat(&self) -> Duration {
        Duration::from_millis(unsafe { sys::uv_timer_get_repeat(self.raw()) })
    }
}

unsafe extern "C" fn start_callback(handle: *mut uv_timer_t) {
    if let Some(timer) = reserve::<TimerHandle>((*handle).handle.data) {
        timer.emitter().publish(TimerEvent, &*timer);
    }
}

impl EventEmitter for TimerHandle {
    fn emitter(&self) -> &Emitter<Self> {
        self.resource.emitter()
    }
}

impl Handle for TimerHandle {
    type Raw = uv_timer_t;

    fn resource(&self) -> &Resource<Self, uv_timer_t> {
        &self.resource
    }
}

impl FromLoop for TimerHandle {
    fn from_loop(lp: &Rc<Loop>) -> Rc<Self> {
        TimerHandle::new(lp)
    }
}

#[cfg(test)]
mod tests {
    use super::millis;
    use std::time::Duration;

    #[test]
    fn test_millis() {
        assert_eq!(millis(Duration::from_micros(1500)), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }
}

use std::borrow::Cow;
use std::rc::Rc;

use super::{Loop, LoopOption};
use crate::error::{Error, ErrorEvent};

/// Builder for a [`Loop`].
///
/// ```
/// let lp = uvrx::Loop::builder().name("worker").build().unwrap();
/// assert_eq!(lp.name(), "worker");
/// ```
#[derive(Debug)]
pub struct Builder {
    /// Name of the loop. Defaults to "uvrx" if unset.
    name: Cow<'static, str>,

    /// Whether `SIGPROF` is blocked while polling. Defaults to false.
    block_signal: bool,
}

impl Builder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Builder {
            name: Cow::Borrowed("uvrx"),
            block_signal: false,
        }
    }

    /// Sets the name of the loop, used in log records.
    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Cow::Owned(name.into());
        self
    }

    /// Sets the option 'block_signal'.
    ///
    /// Defaults to false.
    pub fn block_signal(mut self, block_signal: bool) -> Self {
        self.block_signal = block_signal;
        self
    }

    /// Creates the loop.
    pub fn build(self) -> Result<Rc<Loop>, Error> {
        let lp = Loop::create(self.name)?;
        if self.block_signal {
            let err = unsafe {
                crate::sys::uv_loop_configure(lp.raw(), LoopOption::BlockSignal.into())
            };
            if err != 0 {
                return Err(ErrorEvent::new(err).into());
            }
        }
        Ok(lp)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

//! Ownership bridge between wrapper objects and native structures.
//!
//! A wrapper of type `T` embeds a [`Resource<T, U>`] that stores the
//! native structure `U` next to the wrapper's emitter. The `data` field of
//! the native structure holds a weak back-pointer to the wrapper, installed
//! when the wrapper is created and before any native call, so trampolines
//! can find their way back.
//!
//! While the engine may still call back into a wrapper that nobody else
//! owns, the resource holds a strong reference to its own wrapper. `leak`
//! installs it when an operation is submitted and `reset` releases it from
//! the trampoline that ends the operation.
use std::cell::RefCell;
use std::fmt;
use std::mem::ManuallyDrop;
use std::os::raw::c_void;
use std::rc::{Rc, Weak};

use crate::emitter::Emitter;
use crate::event_loop::Loop;
use crate::sys::Native;
use crate::util::cell::RawCell;

/// Native structure, emitter and self-reference slot of a wrapper `T`
/// around the native structure `U`.
///
/// Only the handle and request lifecycles toggle the slot:
///
/// ```compile_fail
/// use uvrx::{Handle, IdleHandle, Loop};
///
/// let lp = Loop::new().unwrap();
/// let idle = IdleHandle::new(&lp);
/// idle.init();
/// drop(idle.resource().reset());
/// ```
pub struct Resource<T: 'static, U: Native> {
    raw: RawCell<U>,
    emitter: Emitter<T>,
    lp: Rc<Loop>,
    this: Weak<T>,
    slot: RefCell<Option<Rc<T>>>,
}

impl<T: 'static, U: Native> Resource<T, U> {
    /// Creates the resource of the wrapper `this` points to.
    ///
    /// Meant to be called from the closure given to `Rc::new_cyclic`.
    pub fn new(lp: &Rc<Loop>, this: &Weak<T>) -> Self {
        let mut raw = U::default();
        raw.set_data(Weak::into_raw(this.clone()) as *mut c_void);

        Resource {
            raw: RawCell::new(raw),
            emitter: Emitter::new(),
            lp: lp.clone(),
            this: this.clone(),
            slot: RefCell::new(None),
        }
    }

    /// Pointer to the native structure.
    pub fn raw(&self) -> *mut U {
        self.raw.get()
    }

    /// Pointer to another wrapper's native structure, viewed as `R`.
    pub fn raw_as<R>(&self) -> *mut R {
        self.raw.get() as *mut R
    }

    /// Emitter of the wrapper.
    pub fn emitter(&self) -> &Emitter<T> {
        &self.emitter
    }

    /// Loop the resource belongs to.
    pub fn event_loop(&self) -> &Rc<Loop> {
        &self.lp
    }

    /// Strong reference to the wrapper, `None` once it is being dropped.
    pub fn shared(&self) -> Option<Rc<T>> {
        self.this.upgrade()
    }

    /// Whether the resource currently owns its wrapper.
    pub fn self_owned(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Makes the wrapper own itself until `reset` is called.
    pub(crate) fn leak(&self) {
        let mut slot = self.slot.borrow_mut();
        debug_assert!(slot.is_none(), "resource is already self-owned");
        if slot.is_none() {
            *slot = self.this.upgrade();
            trace!("leak {:p}", self.raw.get());
        }
    }

    /// Releases the self-reference installed by `leak`.
    ///
    /// The released reference is handed back; dropping it may drop the
    /// wrapper, so nothing may touch the resource afterwards.
    pub(crate) fn reset(&self) -> Option<Rc<T>> {
        let this = self.slot.borrow_mut().take();
        debug_assert!(this.is_some(), "resource is not self-owned");
        trace!("reset {:p}", self.raw.get());
        this
    }
}

impl<T: 'static, U: Native> Drop for Resource<T, U> {
    fn drop(&mut self) {
        let data = self.raw.with(|raw| unsafe { (*raw).data() });
        if !data.is_null() {
            // back-pointer installed by `new`
            unsafe { drop(Weak::from_raw(data as *const T)) };
        }
    }
}

impl<T: 'static, U: Native> fmt::Debug for Resource<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("raw", &self.raw)
            .field("self_owned", &self.self_owned())
            .finish()
    }
}

/// Recovers a strong reference to the wrapper behind the `data` field of
/// a native structure.
///
/// # Safety
///
/// `data` must be null or the back-pointer of a `Resource<T, _>` that was
/// not dropped yet.
pub(crate) unsafe fn reserve<T: 'static>(data: *mut c_void) -> Option<Rc<T>> {
    if data.is_null() {
        return None;
    }
    let this = ManuallyDrop::new(Weak::from_raw(data as *const T));
    this.upgrade()
}

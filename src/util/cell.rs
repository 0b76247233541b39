use std::cell::UnsafeCell;
use std::fmt;

/// Storage for a native structure the engine writes to through raw
/// pointers.
///
/// The value never moves once the owning allocation is created, so the
/// pointer handed to the engine stays valid for the owner's lifetime.
pub(crate) struct RawCell<T>(UnsafeCell<T>);

impl<T> RawCell<T> {
    pub(crate) fn new(data: T) -> RawCell<T> {
        RawCell(UnsafeCell::new(data))
    }

    pub(crate) fn get(&self) -> *mut T {
        self.0.get()
    }

    pub(crate) fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(*const T) -> R,
    {
        f(self.0.get())
    }

    pub(crate) fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(*mut T) -> R,
    {
        f(self.0.get())
    }
}

impl<T> fmt::Debug for RawCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawCell({:p})", self.0.get())
    }
}

//! Type-indexed event emitter.
//!
//! Every object that publishes events owns an [`Emitter`]. Listeners are
//! registered per event type, either as persistent listeners (`on`) or
//! as one-shot listeners (`once`), and receive the event together with
//! a reference to the owner that published it.
//!
//! Dispatch visits the most recently registered listener first and runs
//! all persistent listeners before the one-shot ones. Listeners may
//! register, erase and clear listeners of the emitter that is currently
//! dispatching; removals made while dispatching only mark the entries
//! and the lists are compacted once the outermost dispatch returns.
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::type_info::{type_id, EventTypeId};

type Callback<E, T> = Rc<dyn Fn(&E, &T)>;

struct Listener<E, T> {
    removed: Rc<Cell<bool>>,
    call: Callback<E, T>,
}

/// Registration of a listener for events of type `E`.
///
/// Pass it to `erase` to remove the listener. Erasing a connection whose
/// listener was already removed or already consumed does nothing.
pub struct Connection<E> {
    removed: Rc<Cell<bool>>,
    _event: PhantomData<fn(&E)>,
}

impl<E> Connection<E> {
    /// Whether the listener behind this connection is gone.
    pub fn is_removed(&self) -> bool {
        self.removed.get()
    }
}

impl<E> Clone for Connection<E> {
    fn clone(&self) -> Self {
        Connection {
            removed: self.removed.clone(),
            _event: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("removed", &self.removed.get())
            .finish()
    }
}

trait BaseHandler {
    fn is_empty(&self) -> bool;

    fn clear(&self);

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Listener lists of one event type.
struct Handler<E, T> {
    dispatching: Cell<usize>,
    on_list: RefCell<Vec<Listener<E, T>>>,
    once_list: RefCell<Vec<Listener<E, T>>>,
}

impl<E: 'static, T: 'static> Handler<E, T> {
    fn new() -> Self {
        Handler {
            dispatching: Cell::new(0),
            on_list: RefCell::new(Vec::new()),
            once_list: RefCell::new(Vec::new()),
        }
    }

    fn is_dispatching(&self) -> bool {
        self.dispatching.get() > 0
    }

    fn insert(&self, list: &RefCell<Vec<Listener<E, T>>>, call: Callback<E, T>) -> Connection<E> {
        let removed = Rc::new(Cell::new(false));
        list.borrow_mut().push(Listener {
            removed: removed.clone(),
            call,
        });
        Connection {
            removed,
            _event: PhantomData,
        }
    }

    fn on(&self, call: Callback<E, T>) -> Connection<E> {
        self.insert(&self.on_list, call)
    }

    fn once(&self, call: Callback<E, T>) -> Connection<E> {
        self.insert(&self.once_list, call)
    }

    fn erase(&self, conn: &Connection<E>) {
        conn.removed.set(true);
        if !self.is_dispatching() {
            self.purge();
        }
    }

    /// Drops every entry marked removed.
    fn purge(&self) {
        let mut gone = Vec::new();
        for list in &[&self.on_list, &self.once_list] {
            let entries = mem::take(&mut *list.borrow_mut());
            let (keep, removed): (Vec<_>, Vec<_>) =
                entries.into_iter().partition(|l| !l.removed.get());
            *list.borrow_mut() = keep;
            gone.extend(removed);
        }
        // closures are dropped once no list is borrowed
        drop(gone);
    }

    fn listener_at(&self, index: usize) -> Option<Callback<E, T>> {
        self.on_list
            .borrow()
            .get(index)
            .filter(|l| !l.removed.get())
            .map(|l| l.call.clone())
    }

    fn publish(&self, event: &E, owner: &T) {
        let detached = mem::take(&mut *self.once_list.borrow_mut());

        self.dispatching.set(self.dispatching.get() + 1);

        let mut start = 0;
        let mut end = self.on_list.borrow().len();
        loop {
            for index in (start..end).rev() {
                if let Some(call) = self.listener_at(index) {
                    call(event, owner);
                }
            }

            // visit listeners appended while the pass was running
            let len = self.on_list.borrow().len();
            if len <= end {
                break;
            }
            start = end;
            end = len;
        }

        for l in detached.iter().rev() {
            if !l.removed.get() {
                (l.call)(event, owner);
            }
        }
        for l in &detached {
            l.removed.set(true);
        }

        self.dispatching.set(self.dispatching.get() - 1);

        if !self.is_dispatching() {
            self.purge();
        }
        drop(detached);
    }
}

impl<E: 'static, T: 'static> BaseHandler for Handler<E, T> {
    fn is_empty(&self) -> bool {
        let removed = |l: &Listener<E, T>| l.removed.get();
        self.on_list.borrow().iter().all(removed) && self.once_list.borrow().iter().all(removed)
    }

    fn clear(&self) {
        for list in &[&self.on_list, &self.once_list] {
            for l in list.borrow().iter() {
                l.removed.set(true);
            }
        }
        if !self.is_dispatching() {
            self.purge();
        }
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Event emitter owned by `T`.
///
/// Listeners receive `(&E, &T)`. All methods take `&self` so listeners
/// can change the registrations of the emitter that is calling them.
pub struct Emitter<T> {
    handlers: RefCell<FxHashMap<EventTypeId, Rc<dyn BaseHandler>>>,
    _owner: PhantomData<fn(&T)>,
}

impl<T: 'static> Emitter<T> {
    /// Creates an emitter without listeners.
    pub fn new() -> Self {
        Emitter {
            handlers: RefCell::new(FxHashMap::default()),
            _owner: PhantomData,
        }
    }

    fn handler<E: 'static>(&self) -> Rc<Handler<E, T>> {
        let id = type_id::<E>();
        let handler = self
            .handlers
            .borrow_mut()
            .entry(id)
            .or_insert_with(|| Rc::new(Handler::<E, T>::new()) as Rc<dyn BaseHandler>)
            .clone();

        handler
            .into_any()
            .downcast::<Handler<E, T>>()
            .unwrap_or_else(|_| panic!("event type id {:?} is shared by two types", id))
    }

    fn handlers(&self) -> Vec<Rc<dyn BaseHandler>> {
        self.handlers.borrow().values().cloned().collect()
    }

    /// Registers a persistent listener for events of type `E`.
    pub fn on<E, F>(&self, f: F) -> Connection<E>
    where
        E: 'static,
        F: Fn(&E, &T) + 'static,
    {
        self.handler::<E>().on(Rc::new(f))
    }

    /// Registers a listener that runs on the next event of type `E` only.
    pub fn once<E, F>(&self, f: F) -> Connection<E>
    where
        E: 'static,
        F: Fn(&E, &T) + 'static,
    {
        self.handler::<E>().once(Rc::new(f))
    }

    /// Removes the listener behind `conn`.
    pub fn erase<E: 'static>(&self, conn: Connection<E>) {
        self.handler::<E>().erase(&conn);
    }

    /// Removes every listener of events of type `E`.
    pub fn clear<E: 'static>(&self) {
        self.handler::<E>().clear();
    }

    /// Removes every listener of every event type.
    pub fn clear_all(&self) {
        for handler in self.handlers() {
            handler.clear();
        }
    }

    /// Checks if there are no listeners for events of type `E`.
    pub fn is_empty<E: 'static>(&self) -> bool {
        self.handler::<E>().is_empty()
    }

    /// Checks if there are no listeners at all.
    pub fn is_empty_all(&self) -> bool {
        self.handlers().iter().all(|h| h.is_empty())
    }

    /// Dispatches `event` to the listeners of type `E`.
    ///
    /// Only the owner should publish, passing itself as `owner`.
    #[doc(hidden)]
    pub fn publish<E: 'static>(&self, event: E, owner: &T) {
        let handler = self.handler::<E>();
        trace!("publish {} ({:?})", std::any::type_name::<E>(), type_id::<E>());
        handler.publish(&event, owner);
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Emitter::new()
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("event_types", &self.handlers.borrow().len())
            .finish()
    }
}

/// Types that own an [`Emitter`] for themselves.
///
/// Implementors only provide `emitter`, the registration methods come
/// for free.
pub trait EventEmitter: Sized + 'static {
    /// The emitter of this object.
    fn emitter(&self) -> &Emitter<Self>;

    /// Registers a persistent listener for events of type `E`.
    fn on<E, F>(&self, f: F) -> Connection<E>
    where
        E: 'static,
        F: Fn(&E, &Self) + 'static,
    {
        self.emitter().on(f)
    }

    /// Registers a one-shot listener for events of type `E`.
    fn once<E, F>(&self, f: F) -> Connection<E>
    where
        E: 'static,
        F: Fn(&E, &Self) + 'static,
    {
        self.emitter().once(f)
    }

    /// Removes the listener behind `conn`.
    fn erase<E: 'static>(&self, conn: Connection<E>) {
        self.emitter().erase(conn)
    }

    /// Removes every listener of events of type `E`.
    fn clear<E: 'static>(&self) {
        self.emitter().clear::<E>()
    }

    /// Removes every listener.
    fn clear_all(&self) {
        self.emitter().clear_all()
    }

    /// Checks if there are no listeners for events of type `E`.
    fn is_empty<E: 'static>(&self) -> bool {
        self.emitter().is_empty::<E>()
    }

    /// Checks if there are no listeners at all.
    fn is_empty_all(&self) -> bool {
        self.emitter().is_empty_all()
    }
}

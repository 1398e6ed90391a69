//! Memoized-once deferred decode.
//!
//! A [`LazyResource`] owns an initializer and runs it the first time the value
//! is read. Concurrent readers block on the first one and then all observe the
//! same published value.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::OnceCell;

type Initializer<T> = Box<dyn FnOnce() -> T + Send>;

pub struct LazyResource<T> {
    cell: OnceCell<T>,
    init: Mutex<Option<Initializer<T>>>,
}

impl<T> LazyResource<T> {
    pub fn new<F>(init: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Mutex::new(Some(Box::new(init))),
        }
    }

    /// Cell that is already initialised, e.g. pixels handed back by an editor.
    pub fn from_value(value: T) -> Self {
        Self {
            cell: OnceCell::with_value(value),
            init: Mutex::new(None),
        }
    }

    pub fn get(&self) -> &T {
        self.cell.get_or_init(|| {
            let init = self
                .init
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match init {
                Some(init) => init(),
                // Only reachable when an earlier initializer panicked.
                None => panic!("LazyResource instance has previously been poisoned"),
            }
        })
    }

    pub fn get_if_initialized(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("LazyResource").field(value).finish(),
            None => f.write_str("LazyResource(<pending>)"),
        }
    }
}

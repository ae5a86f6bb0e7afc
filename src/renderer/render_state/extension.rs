//! Per-slot extension state
//!
//! A sub-pipeline registers a type once and gets one instance per slot. The
//! instance lives inside that slot's `RenderState`, so it is handed between
//! producer and consumer together with the rest of the snapshot.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

/// Typed handle to a registered extension
pub struct ExtensionKey<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ExtensionKey<T> {
    pub(super) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub(super) fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for ExtensionKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ExtensionKey<T> {}

impl<T> fmt::Debug for ExtensionKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionKey")
            .field("index", &self.index)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

pub(super) type ExtensionInit = Box<dyn Fn() -> Box<dyn Any + Send>>;

/// Extension instances owned by one slot
#[derive(Default)]
pub struct Extensions {
    values: Vec<Box<dyn Any + Send>>,
}

impl Extensions {
    pub(super) fn from_inits(inits: &[ExtensionInit]) -> Self {
        Self {
            values: inits.iter().map(|init| init()).collect(),
        }
    }

    pub fn get<T: 'static>(&self, key: &ExtensionKey<T>) -> Option<&T> {
        self.values.get(key.index())?.downcast_ref()
    }

    pub fn get_mut<T: 'static>(&mut self, key: &ExtensionKey<T>) -> Option<&mut T> {
        self.values.get_mut(key.index())?.downcast_mut()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("count", &self.values.len())
            .finish()
    }
}

//! The shared lease discipline.

use crate::error::Result;
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

/// A growable free list of resources.
///
/// `acquire` pops an available resource, creating one with the supplied
/// factory when the list is empty. The returned [`Lease`] puts the resource
/// back on drop, on every exit path including cancellation.
pub struct FreeList<R> {
    available: RefCell<Vec<R>>,
    add: Box<dyn Fn() -> Result<R>>,
}

impl<R> FreeList<R> {
    pub fn new(add: impl Fn() -> Result<R> + 'static) -> Self {
        Self {
            available: RefCell::new(Vec::new()),
            add: Box::new(add),
        }
    }

    /// Temporarily acquire a resource from the pool.
    pub fn acquire(&self) -> Result<Lease<'_, R>> {
        let resource = match self.available.borrow_mut().pop() {
            Some(resource) => resource,
            None => (self.add)()?,
        };
        Ok(Lease {
            list: self,
            resource: Some(resource),
        })
    }

    fn release(&self, resource: R) {
        self.available.borrow_mut().push(resource);
    }

    /// Drain every pooled resource, for teardown.
    pub fn drain(&self) -> Vec<R> {
        self.available.borrow_mut().drain(..).collect()
    }
}

/// Exclusive access to one pooled resource.
pub struct Lease<'a, R> {
    list: &'a FreeList<R>,
    resource: Option<R>,
}

impl<R> Deref for Lease<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource.as_ref().expect("resource present until drop")
    }
}

impl<R> DerefMut for Lease<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.resource.as_mut().expect("resource present until drop")
    }
}

impl<R> Drop for Lease<'_, R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.list.release(resource);
        }
    }
}

//! Listener registry
//!
//! A minimal single-threaded event emitter. Listeners are boxed closures
//! kept in registration order; `on` returns a [`ListenerId`] that removes
//! the listener again.

/// Handle returned by [`Emitter::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fires events of type `E` to registered listeners
pub struct Emitter<E> {
    listeners: Vec<(ListenerId, Box<dyn FnMut(&E)>)>,
    next_id: u64,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> std::fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn on(&mut self, listener: impl FnMut(&E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener, returns false if it was not registered
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn fire(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_fire_and_off() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter = Emitter::new();
        let s = seen.clone();
        let id = emitter.on(move |v: &u32| s.borrow_mut().push(*v));
        emitter.fire(&1);
        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        emitter.fire(&2);
        assert_eq!(*seen.borrow(), vec![1]);
        assert!(emitter.is_empty());
    }
}

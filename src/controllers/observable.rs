use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub type SubscriptionId = u64;

type Listener<T> = Rc<dyn Fn(&T)>;

/// Listener registry used by every controller to announce a new snapshot.
pub struct Subscribers<T> {
    next_id: Cell<SubscriptionId>,
    listeners: RefCell<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<T> Subscribers<T> {
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.borrow_mut().retain(|(existing, _)| *existing != id);
    }

    pub fn notify(&self, value: &T) {
        // Listeners may subscribe or unsubscribe while being notified.
        let listeners: Vec<Listener<T>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(value);
        }
    }

    /// Drops every listener.
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

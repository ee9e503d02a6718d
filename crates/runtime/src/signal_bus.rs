use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Single-threaded FIFO of signals.
///
/// Engine callbacks hold a [`SignalSender`] and push into the bus; the owning
/// controller drains it on its own schedule, so a callback never needs a
/// mutable borrow of the controller itself.
#[derive(Debug)]
pub struct SignalBus<T> {
    queue: Rc<RefCell<Vec<T>>>,
}

impl<T> SignalBus<T> {
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn sender(&self) -> SignalSender<T> {
        SignalSender {
            queue: Rc::downgrade(&self.queue),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Takes every queued signal in emission order.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }
}

impl<T> Default for SignalBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Write half of a [`SignalBus`].
///
/// Once the bus is dropped every emit is discarded.
#[derive(Debug)]
pub struct SignalSender<T> {
    queue: Weak<RefCell<Vec<T>>>,
}

impl<T> Clone for SignalSender<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T> SignalSender<T> {
    /// Returns `false` when the bus no longer exists.
    pub fn emit(&self, signal: T) -> bool {
        match self.queue.upgrade() {
            Some(queue) => {
                queue.borrow_mut().push(signal);
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.queue.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::SignalBus;

    #[test]
    fn drains_in_emission_order() {
        let bus = SignalBus::new();
        let tx = bus.sender();
        tx.emit("ready");
        tx.clone().emit("style");
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.drain(), vec!["ready", "style"]);
        assert!(bus.is_empty());
    }

    #[test]
    fn emits_after_drop_are_discarded() {
        let bus = SignalBus::new();
        let tx = bus.sender();
        drop(bus);
        assert!(!tx.is_connected());
        assert!(!tx.emit(1u32));
    }
}

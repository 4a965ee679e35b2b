use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use parking_lot::{
    lock_api::{self, GuardSend, RawMutex as _},
    RawMutex,
};

/// Short-held lock around a section's bookkeeping.
///
/// Unlike a `MutexGuard`, the guard returned by [`Ledger::lock`] owns a reference to the
/// ledger and may be sent to another thread. A task that has to wait can keep the books
/// locked across its suspension and let the resuming thread release them once the waiter
/// has been queued.
pub(crate) struct Ledger<T> {
    raw: RawMutex,
    books: UnsafeCell<T>,
}

// Safety: `books` is only reachable through a `Books` guard, and `raw` makes sure at most
// one guard exists at a time.
unsafe impl<T: Send> Send for Ledger<T> {}
unsafe impl<T: Send> Sync for Ledger<T> {}

impl<T> Ledger<T> {
    pub(crate) fn new(books: T) -> Self {
        Self {
            raw: RawMutex::INIT,
            books: UnsafeCell::new(books),
        }
    }

    pub(crate) fn lock(self: &Arc<Self>) -> Books<T> {
        self.raw.lock();
        Books {
            ledger: self.clone(),
        }
    }
}

/// Exclusive access to the books of a [`Ledger`]. Unlocks on drop, on whichever thread
/// drops it.
pub(crate) struct Books<T> {
    ledger: Arc<Ledger<T>>,
}

// Safety: with the `send_guard` feature `RawMutex::GuardMarker` is `GuardSend`, so the lock
// may be released on a thread other than the one that acquired it.
unsafe impl<T: Send> Send for Books<T> {}

const _: fn() = || {
    fn releasable_anywhere<M: lock_api::RawMutex<GuardMarker = GuardSend>>() {}
    releasable_anywhere::<RawMutex>();
};

impl<T> Deref for Books<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: holding `Books` means holding `raw`
        unsafe { &*self.ledger.books.get() }
    }
}

impl<T> DerefMut for Books<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: holding `Books` means holding `raw`
        unsafe { &mut *self.ledger.books.get() }
    }
}

impl<T> Drop for Books<T> {
    fn drop(&mut self) {
        // Safety: this guard acquired `raw` in `Ledger::lock`
        unsafe { self.ledger.raw.unlock() }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use parking_lot::{lock_api, RawMutex};

    use super::Ledger;

    #[test]
    fn raw_lock_guards_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<<RawMutex as lock_api::RawMutex>::GuardMarker>();
    }

    #[test]
    fn books_unlock_from_another_thread() {
        let ledger = Arc::new(Ledger::new(Vec::new()));

        let mut books = ledger.lock();
        books.push(1);
        thread::spawn(move || {
            books.push(2);
            drop(books);
        })
        .join()
        .unwrap();

        assert_eq!(*ledger.lock(), vec![1, 2]);
    }

    #[test]
    fn books_are_exclusive() {
        let ledger = Arc::new(Ledger::new(0usize));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *ledger.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*ledger.lock(), 8000);
    }
}

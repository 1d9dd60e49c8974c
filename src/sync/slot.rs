//! Single-value mailboxes.
//!
//! | Type | Writer | Reader |
//! |------|--------|--------|
//! | [`PendingSlot`] | overwrite (last write wins) | read-and-clear |
//! | [`DedupSlot`] | publish only if different from the last accepted value | read-and-clear |

use parking_lot::Mutex;

/// Holds at most one unconsumed update
#[derive(Debug)]
pub struct PendingSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> Default for PendingSlot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }
}

impl<T> PendingSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is pending.
    pub fn put(&self, value: T) {
        *self.value.lock() = Some(value);
    }

    /// Return the pending value and leave the slot empty.
    pub fn take(&self) -> Option<T> {
        self.value.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.value.lock().is_some()
    }

    pub fn clear(&self) {
        *self.value.lock() = None;
    }
}

#[derive(Debug)]
struct DedupState<T> {
    last: Option<T>,
    pending: Option<T>,
}

/// A pending slot guarded by a change filter
///
/// The last accepted value and the pending update live under one lock, so a
/// reader never sees the cache updated without the matching publish.
#[derive(Debug)]
pub struct DedupSlot<T> {
    state: Mutex<DedupState<T>>,
}

impl<T> Default for DedupSlot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(DedupState {
                last: None,
                pending: None,
            }),
        }
    }
}

impl<T: Clone + PartialEq> DedupSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a freshly received value.
    ///
    /// Returns `true` if it differed from the last accepted value and is now
    /// pending. An equal value is dropped and leaves any pending update alone.
    pub fn offer(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if state.last.as_ref() == Some(&value) {
            return false;
        }
        state.last = Some(value.clone());
        state.pending = Some(value);
        true
    }

    /// Return the pending change and leave the slot empty.
    pub fn take(&self) -> Option<T> {
        self.state.lock().pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Last accepted value, whether or not it has been consumed.
    pub fn last(&self) -> Option<T> {
        self.state.lock().last.clone()
    }

    /// Forget both the cache and any pending update.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last = None;
        state.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pending_last_write_wins() {
        let slot = PendingSlot::new();
        slot.put("a");
        slot.put("b");
        assert_eq!(slot.take(), Some("b"));
    }

    #[test]
    fn test_pending_read_and_clear() {
        let slot = PendingSlot::new();
        slot.put(3);
        assert!(slot.is_pending());
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_dedup_same_value_published_once() {
        let slot = DedupSlot::new();
        assert!(slot.offer(String::from("Mun")));
        assert!(!slot.offer(String::from("Mun")));
        assert_eq!(slot.take().as_deref(), Some("Mun"));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_dedup_repeat_after_drain_is_not_republished() {
        let slot = DedupSlot::new();
        slot.offer(1);
        assert_eq!(slot.take(), Some(1));
        assert!(!slot.offer(1));
        assert_eq!(slot.take(), None);
        assert_eq!(slot.last(), Some(1));
    }

    #[test]
    fn test_dedup_last_write_wins() {
        let slot = DedupSlot::new();
        slot.offer(1);
        slot.offer(2);
        assert_eq!(slot.take(), Some(2));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_dedup_equal_offer_keeps_pending() {
        let slot = DedupSlot::new();
        slot.offer(5);
        assert!(!slot.offer(5));
        assert_eq!(slot.take(), Some(5));
    }

    #[test]
    fn test_dedup_change_back_is_a_change() {
        let slot = DedupSlot::new();
        slot.offer('a');
        slot.offer('b');
        assert!(slot.offer('a'));
        assert_eq!(slot.take(), Some('a'));
    }

    #[test]
    fn test_dedup_reset_forgets_cache() {
        let slot = DedupSlot::new();
        slot.offer(9);
        slot.reset();
        assert!(!slot.is_pending());
        assert!(slot.offer(9));
    }

    #[test]
    fn test_concurrent_writer_and_reader() {
        let slot = Arc::new(DedupSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 0..1000u32 {
                    slot.offer(i);
                }
            })
        };

        let mut seen = Vec::new();
        while !writer.is_finished() {
            if let Some(v) = slot.take() {
                seen.push(v);
            }
        }
        writer.join().unwrap();
        if let Some(v) = slot.take() {
            seen.push(v);
        }

        // every observed value is unique and in publish order
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&999));
    }
}

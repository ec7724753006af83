/*!
    Bounded blocking queue connecting pipeline stages.

    Queues are the only synchronization points between worker threads.
    `push` blocks while the queue is full and `pop` blocks while it is
    empty; `clear` wakes blocked pushers so that cancellation can always
    make progress. A cleared queue leaves poppers waiting for the next
    element — the element that arrives is typically an end-of-stream
    signal pushed right after the clear.
*/

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::{Packet, Pts};

/**
    A bounded FIFO with blocking `push`/`pop`.

    The writer caches additionally use the packet-search operations
    (`find_pts`, `find_last_key_frame`, `find_first_key_frame`) defined
    on `Queue<Packet>`.
*/
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> Queue<T> {
    /**
        Create a queue holding at most `capacity` elements.

        # Panics

        Panics if `capacity` is zero — a queue that can hold nothing
        deadlocks its producer immediately.
    */
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity cannot be zero");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: Some(capacity),
        }
    }

    /**
        Create a queue with no capacity limit. Used by the writer's
        pre-roll caches, which bound their growth by trimming on time.
    */
    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: None,
        }
    }

    fn is_at_capacity(&self, len: usize) -> bool {
        self.capacity.is_some_and(|cap| len >= cap)
    }

    /**
        Append an element, blocking while the queue is full.

        A concurrent `clear` unblocks the wait.
    */
    pub fn push(&self, element: T) {
        let mut items = self.items.lock();
        while self.is_at_capacity(items.len()) {
            self.not_full.wait(&mut items);
        }
        items.push_back(element);
        drop(items);
        self.not_empty.notify_one();
    }

    /**
        Remove and return the front element, blocking while empty.
    */
    pub fn pop(&self) -> T {
        let mut items = self.items.lock();
        while items.is_empty() {
            self.not_empty.wait(&mut items);
        }
        let element = items.pop_front().expect("queue verified non-empty");
        drop(items);
        self.not_full.notify_one();
        element
    }

    /**
        Remove and return the front element if one is present.
    */
    pub fn try_pop(&self) -> Option<T> {
        let element = self.items.lock().pop_front();
        if element.is_some() {
            self.not_full.notify_one();
        }
        element
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        let items = self.items.lock();
        self.is_at_capacity(items.len())
    }

    /**
        Discard every element and wake all blocked pushers.
    */
    pub fn clear(&self) {
        self.items.lock().clear();
        self.not_full.notify_all();
    }

    /**
        Discard the first `n` elements (or everything if fewer remain).
    */
    pub fn erase_front(&self, n: usize) {
        let mut items = self.items.lock();
        let n = n.min(items.len());
        items.drain(..n);
        drop(items);
        self.not_full.notify_all();
    }

    /**
        Retain only the newest element, discarding everything older.

        Live streams use this to shed latency: when the consumer falls
        behind, only the freshest input is worth presenting.
    */
    pub fn remove_latency(&self) {
        let mut items = self.items.lock();
        let len = items.len();
        if len > 1 {
            items.drain(..len - 1);
            drop(items);
            self.not_full.notify_all();
        }
    }
}

impl<T: Clone> Queue<T> {
    /// Copy of the front element, if any.
    pub fn front(&self) -> Option<T> {
        self.items.lock().front().cloned()
    }

    /// Copy of the element at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.lock().get(index).cloned()
    }
}

impl Queue<Packet> {
    /**
        Index of the first packet whose pts is at or past `pts`.
        Packets without a pts never match.
    */
    pub fn find_pts(&self, pts: Pts) -> Option<usize> {
        let items = self.items.lock();
        items
            .iter()
            .position(|pkt| pkt.pts.is_some_and(|p| p >= pts))
    }

    /**
        Index of the last key frame at or before `starting_index`,
        scanning backward.
    */
    pub fn find_last_key_frame(&self, starting_index: usize) -> Option<usize> {
        let items = self.items.lock();
        if items.is_empty() {
            return None;
        }
        let start = starting_index.min(items.len() - 1);
        (0..=start).rev().find(|&i| items[i].is_key_frame)
    }

    /**
        Index of the first key frame at or after `starting_index`,
        scanning forward.
    */
    pub fn find_first_key_frame(&self, starting_index: usize) -> Option<usize> {
        let items = self.items.lock();
        (starting_index..items.len()).find(|&i| items[i].is_key_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MediaDuration, Rational, StreamKind};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn packet(pts: Option<i64>, key: bool) -> Packet {
        Packet {
            data: Vec::new(),
            pts: pts.map(Pts),
            dts: pts.map(Pts),
            duration: MediaDuration(1),
            time_base: Rational::new(1, 1000),
            is_key_frame: key,
            stream: StreamKind::Video,
        }
    }

    #[test]
    fn fifo_order() {
        let q = Queue::bounded(4);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), 1);
        assert_eq!(q.pop(), 2);
        assert_eq!(q.pop(), 3);
    }

    #[test]
    #[should_panic(expected = "capacity cannot be zero")]
    fn zero_capacity_panics() {
        let _ = Queue::<u32>::bounded(0);
    }

    #[test]
    fn push_blocks_until_pop() {
        let q = Arc::new(Queue::bounded(1));
        q.push(1u32);

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(2))
        };

        // Producer must be blocked on the full queue.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.len(), 1);

        assert_eq!(q.pop(), 1);
        producer.join().unwrap();
        assert_eq!(q.pop(), 2);
    }

    #[test]
    fn clear_unblocks_pusher() {
        let q = Arc::new(Queue::bounded(1));
        q.push(1u32);

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(2))
        };

        thread::sleep(Duration::from_millis(50));
        q.clear();
        // Push after clear never deadlocks.
        producer.join().unwrap();
        assert_eq!(q.pop(), 2);
    }

    #[test]
    fn pop_after_clear_blocks_until_next_push() {
        let q = Arc::new(Queue::bounded(4));
        q.push(1u32);
        q.clear();

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());
        q.push(9);
        assert_eq!(consumer.join().unwrap(), 9);
    }

    #[test]
    fn try_pop() {
        let q = Queue::bounded(2);
        assert_eq!(q.try_pop(), None);
        q.push(5u32);
        assert_eq!(q.try_pop(), Some(5));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn erase_front() {
        let q = Queue::bounded(8);
        for i in 0..5u32 {
            q.push(i);
        }
        q.erase_front(3);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), 3);

        // erasing more than the length clears
        q.erase_front(100);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_latency_keeps_newest() {
        let q = Queue::bounded(8);
        for i in 0..5u32 {
            q.push(i);
        }
        q.remove_latency();
        assert_eq!(q.len(), 1);
        assert_eq!(q.front(), Some(4));

        // idempotent once a single element remains
        q.remove_latency();
        q.remove_latency();
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), 4);
    }

    #[test]
    fn full_and_empty() {
        let q = Queue::bounded(2);
        assert!(q.is_empty());
        assert!(!q.is_full());
        q.push(1u32);
        q.push(2);
        assert!(q.is_full());
        let unbounded = Queue::unbounded();
        for i in 0..1000u32 {
            unbounded.push(i);
        }
        assert!(!unbounded.is_full());
    }

    #[test]
    fn indexed_access() {
        let q = Queue::bounded(4);
        q.push(10u32);
        q.push(20);
        assert_eq!(q.get(0), Some(10));
        assert_eq!(q.get(1), Some(20));
        assert_eq!(q.get(2), None);
    }

    #[test]
    fn find_pts_first_at_or_past_target() {
        let q = Queue::unbounded();
        q.push(packet(Some(100), true));
        q.push(packet(None, false));
        q.push(packet(Some(200), false));
        q.push(packet(Some(300), false));

        assert_eq!(q.find_pts(Pts(150)), Some(2));
        assert_eq!(q.find_pts(Pts(100)), Some(0));
        assert_eq!(q.find_pts(Pts(301)), None);
    }

    #[test]
    fn key_frame_scans() {
        let q = Queue::unbounded();
        q.push(packet(Some(0), true));
        q.push(packet(Some(1), false));
        q.push(packet(Some(2), true));
        q.push(packet(Some(3), false));

        assert_eq!(q.find_last_key_frame(3), Some(2));
        assert_eq!(q.find_last_key_frame(1), Some(0));
        assert_eq!(q.find_first_key_frame(1), Some(2));
        assert_eq!(q.find_first_key_frame(3), None);
        // out-of-range start clamps for the backward scan
        assert_eq!(q.find_last_key_frame(99), Some(2));
    }

    #[test]
    fn key_frame_scan_on_empty_queue() {
        let q: Queue<Packet> = Queue::unbounded();
        assert_eq!(q.find_last_key_frame(0), None);
        assert_eq!(q.find_first_key_frame(0), None);
    }
}

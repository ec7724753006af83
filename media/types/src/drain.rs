/*!
    Terminal queue consumer.
*/

use std::sync::Arc;

use crate::{Item, Queue};

/**
    A stage that consumes a queue to completion, handing each element to an
    optional handler. Useful for headless consumers and for tests that need
    to keep a producer from blocking.
*/
pub struct Drain<T> {
    queue: Arc<Queue<Item<T>>>,
    handler: Option<Box<dyn FnMut(T) + Send>>,
    count: usize,
    closed: bool,
}

impl<T> Drain<T> {
    pub fn new(queue: Arc<Queue<Item<T>>>) -> Self {
        Self {
            queue,
            handler: None,
            count: 0,
            closed: false,
        }
    }

    pub fn with_handler(queue: Arc<Queue<Item<T>>>, handler: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            queue,
            handler: Some(Box::new(handler)),
            count: 0,
            closed: false,
        }
    }

    /// Elements consumed so far (signals excluded).
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consume one element; returns false once end of stream was seen.
    pub fn drain_one(&mut self) -> bool {
        match self.queue.pop() {
            Item::Data(value) => {
                self.count += 1;
                if let Some(handler) = self.handler.as_mut() {
                    handler(value);
                }
                true
            }
            Item::Signal(signal) => {
                if signal == crate::PipelineSignal::Eos {
                    self.closed = true;
                }
                !self.closed
            }
        }
    }

    /// Consume until end of stream.
    pub fn run(&mut self) {
        while self.drain_one() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineSignal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn drains_until_eos() {
        let queue = Arc::new(Queue::bounded(8));
        for i in 0..5u32 {
            queue.push(Item::Data(i));
        }
        queue.push(Item::Signal(PipelineSignal::Eos));

        let mut drain = Drain::new(Arc::clone(&queue));
        drain.run();
        assert_eq!(drain.count(), 5);
        assert!(drain.is_closed());
    }

    #[test]
    fn flush_signals_do_not_close() {
        let queue = Arc::new(Queue::bounded(8));
        queue.push(Item::Data(1u32));
        queue.push(Item::Signal(PipelineSignal::Flush));
        queue.push(Item::Data(2));
        queue.push(Item::Signal(PipelineSignal::Eos));

        let sum = Arc::new(AtomicUsize::new(0));
        let mut drain = {
            let sum = Arc::clone(&sum);
            Drain::with_handler(Arc::clone(&queue), move |v: u32| {
                sum.fetch_add(v as usize, Ordering::Relaxed);
            })
        };
        drain.run();
        assert_eq!(sum.load(Ordering::Relaxed), 3);
        assert_eq!(drain.count(), 2);
    }
}

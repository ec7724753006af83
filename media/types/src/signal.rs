/*!
    Pipeline control signals and the queue element type.
*/

/**
    Control messages that travel in-band through pipeline queues.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineSignal {
    /**
        Flush buffers — a discontinuity in the stream (after seeking).

        Recipients reset codec state and continue; nothing else is implied.
    */
    Flush,
    /**
        End of stream — no more data will arrive on this queue.

        The first Eos a stage observes ends that stage; a second producer's
        Eos may never be read and recipients must not wait for it.
    */
    Eos,
}

/**
    Element type of every pipeline queue: either a piece of media or a
    control signal. This replaces the null-object sentinel convention —
    end of stream is a value, not an empty packet.
*/
#[derive(Clone, Debug)]
pub enum Item<T> {
    Data(T),
    Signal(PipelineSignal),
}

impl<T> Item<T> {
    pub fn is_eos(&self) -> bool {
        matches!(self, Self::Signal(PipelineSignal::Eos))
    }

    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Signal(PipelineSignal::Flush))
    }

    pub fn data(self) -> Option<T> {
        match self {
            Self::Data(value) => Some(value),
            Self::Signal(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&T> {
        match self {
            Self::Data(value) => Some(value),
            Self::Signal(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        let data: Item<u32> = Item::Data(7);
        assert!(!data.is_eos());
        assert!(!data.is_flush());
        assert!(Item::<u32>::Signal(PipelineSignal::Eos).is_eos());
        assert!(Item::<u32>::Signal(PipelineSignal::Flush).is_flush());
    }

    #[test]
    fn data_extraction() {
        assert_eq!(Item::Data(7).data(), Some(7));
        assert_eq!(Item::<u32>::Signal(PipelineSignal::Eos).data(), None);
        assert_eq!(Item::Data(7).as_data(), Some(&7));
    }
}

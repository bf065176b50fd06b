use crate::record::Record;

pub const DEFAULT_PURGE_AFTER: usize = 10_000;

/// Ordered in-memory batch with a count threshold.
///
/// The threshold is a signal, not a limit: `append` never rejects a record,
/// it only reports when the owner should drain.
#[derive(Debug)]
pub struct Buffer<T = Record> {
    records: Vec<T>,
    purge_after: usize,
}

impl<T> Buffer<T> {
    /// A zero threshold is clamped to 1.
    pub fn new(purge_after: usize) -> Self {
        let purge_after = purge_after.max(1);
        Self {
            records: Vec::with_capacity(purge_after),
            purge_after,
        }
    }

    /// Push to the tail. Returns `true` once the threshold is reached.
    pub fn append(&mut self, record: T) -> bool {
        self.records.push(record);
        self.is_full()
    }

    /// Take every held record in insertion order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.purge_after))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.purge_after
    }

    pub fn purge_after(&self) -> usize {
        self.purge_after
    }
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_PURGE_AFTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_full_exactly_at_threshold() {
        let mut buf = Buffer::new(3);
        assert!(!buf.append(1));
        assert!(!buf.append(2));
        assert!(buf.append(3));
        assert_eq!(buf.len(), 3);
        assert!(buf.is_full());
    }

    #[test]
    fn drain_returns_insertion_order_and_resets() {
        let mut buf = Buffer::new(4);
        for i in 0..4 {
            buf.append(i);
        }
        assert_eq!(buf.drain(), vec![0, 1, 2, 3]);
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
        assert!(!buf.append(9));
    }

    #[test]
    fn append_past_threshold_is_accepted() {
        let mut buf = Buffer::new(1);
        assert!(buf.append("a"));
        assert!(buf.append("b"));
        assert_eq!(buf.drain(), vec!["a", "b"]);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let mut buf: Buffer<u8> = Buffer::new(0);
        assert_eq!(buf.purge_after(), 1);
        assert!(buf.append(7));
    }

    #[test]
    fn default_threshold() {
        let buf: Buffer = Buffer::default();
        assert_eq!(buf.purge_after(), DEFAULT_PURGE_AFTER);
        assert!(buf.is_empty());
    }

    #[test]
    fn repeated_cycles_preserve_order() {
        let mut buf = Buffer::new(5);
        let mut flushed = Vec::new();
        for i in 0..20 {
            if buf.append(i) {
                flushed.extend(buf.drain());
            }
        }
        assert_eq!(flushed, (0..20).collect::<Vec<_>>());
    }
}

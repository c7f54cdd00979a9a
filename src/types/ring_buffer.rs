/// Fixed-capacity ring buffer.
///
/// Slots live in a preallocated arena; `head` indexes the oldest element and
/// `len` counts occupied slots. Pushing into a full buffer overwrites the oldest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` elements (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    fn slot(&self, offset: usize) -> usize {
        (self.head + offset) % self.capacity()
    }

    /// Append an element, returning the evicted oldest one when full
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.is_full() {
            let evicted = self.slots[self.head].replace(item);
            self.head = self.slot(1);
            evicted
        } else {
            let index = self.slot(self.len);
            self.slots[index] = Some(item);
            self.len += 1;
            None
        }
    }

    /// Element `index` positions after the oldest
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.slots[self.slot(index)].as_ref()
    }

    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn last(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn last_mut(&mut self) -> Option<&mut T> {
        let last = self.len.checked_sub(1)?;
        let index = self.slot(last);
        self.slots[index].as_mut()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[self.slot(i)].as_ref())
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

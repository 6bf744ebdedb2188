/// Fixed-capacity circular store that overwrites its oldest slot on append.
///
/// `position` is the next slot to be written. `num_written` counts every
/// append ever made and never wraps, so callers can tell whether a slot
/// some distance in the past has actually been filled yet.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,
    position: usize,
    num_written: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize, default: T) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            buffer: vec![default; capacity],
            position: 0,
            num_written: 0,
        }
    }

    pub fn append(&mut self, value: T) {
        self.buffer[self.position] = value;
        self.position = (self.position + 1) % self.buffer.len();
        self.num_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn num_written(&self) -> usize {
        self.num_written
    }

    /// Physical index of the slot `offset` steps away from `position`.
    pub fn physical_index(&self, offset: isize) -> usize {
        let capacity = self.buffer.len() as isize;
        ((self.position() as isize + offset) % capacity + capacity) as usize % self.buffer.len()
    }

    /// Slot relative to `position`; `-1` is the newest value.
    pub fn slot(&self, offset: isize) -> &T {
        &self.buffer[self.physical_index(offset)]
    }

    pub fn slot_mut(&mut self, offset: isize) -> &mut T {
        let index = self.physical_index(offset);
        &mut self.buffer[index]
    }

    /// The `n`-th most recent value, `1` being the newest.
    pub fn latest(&self, n: usize) -> &T {
        debug_assert!(n >= 1 && n <= self.capacity());
        debug_assert!(self.num_written >= n);
        self.slot(-(n as isize))
    }

    /// Every slot from oldest to newest.
    pub fn chronological(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.buffer.split_at(self.position);
        older.iter().chain(newer.iter())
    }
}

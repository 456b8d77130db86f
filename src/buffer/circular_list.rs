//! Ring buffer of rows
//!
//! A fixed-capacity list with a rotating start index. Pushing onto a full
//! list overwrites the oldest entry in O(1). Logical indices are mapped to
//! physical slots in [`CircularList::cyclic_index`] only.
//!
//! Listeners registered with `on_trim`, `on_insert` and `on_delete` are told
//! about rows leaving the front of the list and about splices, so holders of
//! row indices (markers, selections) can re-index.

use std::fmt;

use tracing::trace;

use crate::error::{Error, Result};
use crate::event::{Emitter, ListenerId};

/// Rows inserted or deleted by a splice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceEvent {
    pub index: usize,
    pub amount: usize,
}

pub struct CircularList<T> {
    array: Vec<Option<T>>,
    start_index: usize,
    length: usize,
    max_length: usize,
    trim_events: Emitter<usize>,
    insert_events: Emitter<SpliceEvent>,
    delete_events: Emitter<SpliceEvent>,
}

impl<T: fmt::Debug> fmt::Debug for CircularList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircularList")
            .field("length", &self.length)
            .field("max_length", &self.max_length)
            .field("start_index", &self.start_index)
            .finish()
    }
}

impl<T> CircularList<T> {
    pub fn new(max_length: usize) -> Self {
        let mut array = Vec::with_capacity(max_length);
        array.resize_with(max_length, || None);
        Self {
            array,
            start_index: 0,
            length: 0,
            max_length,
            trim_events: Emitter::new(),
            insert_events: Emitter::new(),
            delete_events: Emitter::new(),
        }
    }

    pub fn on_trim(&mut self, listener: impl FnMut(&usize) + 'static) -> ListenerId {
        self.trim_events.on(listener)
    }

    pub fn on_insert(&mut self, listener: impl FnMut(&SpliceEvent) + 'static) -> ListenerId {
        self.insert_events.on(listener)
    }

    pub fn on_delete(&mut self, listener: impl FnMut(&SpliceEvent) + 'static) -> ListenerId {
        self.delete_events.on(listener)
    }

    pub fn off_trim(&mut self, id: ListenerId) -> bool {
        self.trim_events.off(id)
    }

    pub fn off_insert(&mut self, id: ListenerId) -> bool {
        self.insert_events.off(id)
    }

    pub fn off_delete(&mut self, id: ListenerId) -> bool {
        self.delete_events.off(id)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Change the capacity
    ///
    /// Rows are re-laid out from physical index 0. Shrinking below the
    /// current length drops the oldest rows and fires a trim.
    pub fn set_max_length(&mut self, max_length: usize) {
        if self.max_length == max_length {
            return;
        }
        self.normalize();
        let overflow = self.length.saturating_sub(max_length);
        if overflow > 0 {
            self.array.drain(..overflow);
            self.length -= overflow;
        }
        self.array.resize_with(max_length, || None);
        self.max_length = max_length;
        if overflow > 0 {
            self.fire_trim(overflow);
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The list holds `max_length` rows
    pub fn is_full(&self) -> bool {
        self.length == self.max_length
    }

    #[inline]
    fn cyclic_index(&self, index: usize) -> usize {
        (self.start_index + index) % self.max_length
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.length {
            return None;
        }
        self.array[self.cyclic_index(index)].as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.length {
            return None;
        }
        let i = self.cyclic_index(index);
        self.array[i].as_mut()
    }

    /// Replace the row at `index`; ignored outside the populated range
    pub fn set(&mut self, index: usize, value: T) {
        if index < self.length {
            let i = self.cyclic_index(index);
            self.array[i] = Some(value);
        }
    }

    /// Exchange two rows
    pub fn swap(&mut self, a: usize, b: usize) {
        if a < self.length && b < self.length {
            let (a, b) = (self.cyclic_index(a), self.cyclic_index(b));
            self.array.swap(a, b);
        }
    }

    /// Append a row, evicting the oldest one if the list is full
    pub fn push(&mut self, value: T) {
        if self.max_length == 0 {
            return;
        }
        let i = self.cyclic_index(self.length);
        self.array[i] = Some(value);
        if self.length == self.max_length {
            self.start_index = (self.start_index + 1) % self.max_length;
            self.fire_trim(1);
        } else {
            self.length += 1;
        }
    }

    /// Advance over the oldest row and hand it back as the new last row
    ///
    /// Lets callers reuse the evicted row's storage instead of allocating.
    /// Only valid on a full list.
    pub fn recycle(&mut self) -> Result<&mut T> {
        if self.length != self.max_length || self.max_length == 0 {
            return Err(Error::RecycleNotFull);
        }
        self.start_index = (self.start_index + 1) % self.max_length;
        self.fire_trim(1);
        let i = self.cyclic_index(self.length - 1);
        self.array[i].as_mut().ok_or(Error::RecycleNotFull)
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.length == 0 {
            return None;
        }
        self.length -= 1;
        let i = self.cyclic_index(self.length);
        self.array[i].take()
    }

    /// Delete `delete_count` rows at `start`, then insert `items` there
    ///
    /// Fires delete then insert. If the list overflows, the oldest rows are
    /// trimmed.
    pub fn splice(&mut self, start: usize, delete_count: usize, items: Vec<T>) {
        self.normalize();
        let start = start.min(self.length);
        let delete_count = delete_count.min(self.length - start);

        if delete_count > 0 {
            self.array[start..self.length].rotate_left(delete_count);
            for slot in &mut self.array[self.length - delete_count..self.length] {
                *slot = None;
            }
            self.length -= delete_count;
            self.delete_events.fire(&SpliceEvent {
                index: start,
                amount: delete_count,
            });
        }

        let inserted = items.len();
        if inserted == 0 {
            return;
        }
        let total = self.length + inserted;
        if self.array.len() < total {
            self.array.resize_with(total, || None);
        }
        for (offset, item) in items.into_iter().enumerate() {
            self.array[self.length + offset] = Some(item);
        }
        self.array[start..total].rotate_right(inserted);
        self.insert_events.fire(&SpliceEvent {
            index: start,
            amount: inserted,
        });

        let overflow = total.saturating_sub(self.max_length);
        if overflow > 0 {
            self.array.drain(..overflow);
            self.array.truncate(self.max_length);
            self.length = self.max_length;
            self.fire_trim(overflow);
        } else {
            self.length = total;
        }
    }

    /// Drop `count` rows from the front
    pub fn trim_start(&mut self, count: usize) {
        let count = count.min(self.length);
        if count == 0 {
            return;
        }
        for i in 0..count {
            let slot = self.cyclic_index(i);
            self.array[slot] = None;
        }
        self.start_index = (self.start_index + count) % self.max_length;
        self.length -= count;
        self.fire_trim(count);
    }

    /// Rotate storage so that logical index 0 is physical index 0
    pub fn normalize(&mut self) {
        if self.start_index == 0 {
            return;
        }
        self.array.rotate_left(self.start_index);
        self.start_index = 0;
    }

    fn fire_trim(&mut self, count: usize) {
        trace!(count, "circular list trimmed");
        self.trim_events.fire(&count);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.length).filter_map(move |i| self.get(i))
    }
}

impl<T: Clone> CircularList<T> {
    /// Copy `count` rows starting at `start` to `start + offset`
    ///
    /// The source rows are left in place. Shifting past the end grows the
    /// list, trimming the front when it exceeds `max_length`.
    pub fn shift_elements(&mut self, start: usize, count: usize, offset: isize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if start >= self.length {
            return Err(Error::StartOutOfRange);
        }
        if (start as isize) + offset < 0 {
            return Err(Error::ShiftBeyondStart);
        }

        if offset > 0 {
            let offset = offset as usize;
            let expand = (start + count + offset).saturating_sub(self.length);
            for i in (0..count).rev() {
                let value = self.get(start + i).cloned();
                let dest = self.cyclic_index(start + i + offset);
                if value.is_some() {
                    self.array[dest] = value;
                }
            }
            if expand > 0 {
                self.length += expand;
                let mut trimmed = 0;
                while self.length > self.max_length {
                    self.length -= 1;
                    self.start_index = (self.start_index + 1) % self.max_length;
                    trimmed += 1;
                }
                if trimmed > 0 {
                    self.fire_trim(trimmed);
                }
            }
        } else {
            let back = offset.unsigned_abs();
            for i in 0..count {
                if let Some(value) = self.get(start + i).cloned() {
                    self.set(start + i - back, value);
                }
            }
        }
        Ok(())
    }
}

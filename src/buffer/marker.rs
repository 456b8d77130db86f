//! Row markers
//!
//! A marker is a row index into a buffer's line list that stays attached to
//! its row while the list trims, inserts and deletes. The set is shared with
//! the list's listeners; a marker whose row leaves the list is disposed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::circular_list::{CircularList, SpliceEvent};

/// Identifies a marker within its [`MarkerSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerId(u32);

/// Live markers keyed by id, each holding an absolute row
#[derive(Debug, Default)]
pub struct MarkerSet {
    lines: BTreeMap<MarkerId, usize>,
    next_id: u32,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared set and keep it in sync with `list`
    pub fn attach<T>(list: &mut CircularList<T>) -> Rc<RefCell<MarkerSet>> {
        let set = Rc::new(RefCell::new(MarkerSet::new()));
        let s = Rc::clone(&set);
        list.on_trim(move |count| s.borrow_mut().trim(*count));
        let s = Rc::clone(&set);
        list.on_insert(move |event| s.borrow_mut().insert(event));
        let s = Rc::clone(&set);
        list.on_delete(move |event| s.borrow_mut().delete(event));
        set
    }

    pub fn add(&mut self, line: usize) -> MarkerId {
        let id = MarkerId(self.next_id);
        self.next_id += 1;
        self.lines.insert(id, line);
        id
    }

    /// Current row of a marker, `None` once disposed
    pub fn line(&self, id: MarkerId) -> Option<usize> {
        self.lines.get(&id).copied()
    }

    pub fn dispose(&mut self, id: MarkerId) -> bool {
        self.lines.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn trim(&mut self, count: usize) {
        self.lines.retain(|_, line| match line.checked_sub(count) {
            Some(l) => {
                *line = l;
                true
            }
            None => false,
        });
    }

    fn insert(&mut self, event: &SpliceEvent) {
        for line in self.lines.values_mut() {
            if *line >= event.index {
                *line += event.amount;
            }
        }
    }

    fn delete(&mut self, event: &SpliceEvent) {
        let end = event.index + event.amount;
        self.lines.retain(|_, line| {
            if *line >= event.index && *line < end {
                return false;
            }
            if *line >= end {
                *line -= event.amount;
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_follow_list() {
        let mut list = CircularList::new(4);
        let markers = MarkerSet::attach(&mut list);
        for i in 0..4 {
            list.push(i);
        }
        let (a, b) = {
            let mut set = markers.borrow_mut();
            (set.add(0), set.add(2))
        };

        list.push(4);
        assert_eq!(markers.borrow().line(a), None);
        assert_eq!(markers.borrow().line(b), Some(1));

        list.pop();
        list.splice(0, 0, vec![9]);
        assert_eq!(markers.borrow().line(b), Some(2));

        list.splice(2, 1, Vec::new());
        assert_eq!(markers.borrow().line(b), None);
        assert!(markers.borrow().is_empty());
    }

    #[test]
    fn test_delete_shifts_later_markers() {
        let mut list = CircularList::new(10);
        let markers = MarkerSet::attach(&mut list);
        for i in 0..6 {
            list.push(i);
        }
        let m = markers.borrow_mut().add(5);
        list.splice(1, 2, Vec::new());
        assert_eq!(markers.borrow().line(m), Some(3));
        assert!(markers.borrow_mut().dispose(m));
    }
}

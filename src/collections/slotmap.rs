/// A vec of slots that reuses freed indices. Free slots form a list threaded through
/// the `Err` entries, headed by `head`.
#[derive(Debug)]
pub struct SlotMap<T> {
    head: u32,
    len: usize,
    entries: Vec<Result<T, u32>>,
}
impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self {
            head: u32::MAX,
            len: 0,
            entries: vec![],
        }
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn get(&self, i: usize) -> Option<&T> {
        self.entries.get(i).and_then(|r| r.as_ref().ok())
    }
    pub fn insert(&mut self, value: T) -> usize {
        self.len += 1;
        let i = self.head as usize;
        if let Some(&Err(next)) = self.entries.get(i) {
            self.entries[i] = Ok(value);
            self.head = next;
            i
        } else {
            self.entries.push(Ok(value));
            self.entries.len() - 1
        }
    }
    pub fn release(&mut self, i: usize) -> Option<T> {
        let slot = self.entries.get_mut(i)?;
        if slot.is_err() {
            return None;
        }
        self.len -= 1;
        let old = core::mem::replace(slot, Err(self.head));
        self.head = i as u32;
        old.ok()
    }
    pub fn clear(&mut self) {
        self.entries.clear();
        self.head = u32::MAX;
        self.len = 0;
    }
}
pub struct IterMut<'a, T> {
    entries: core::iter::Enumerate<core::slice::IterMut<'a, Result<T, u32>>>,
}
impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = (usize, &'a mut T);
    fn next(&mut self) -> Option<Self::Item> {
        for (i, v) in self.entries.by_ref() {
            if let Ok(v) = v {
                return Some((i, v));
            }
        }
        None
    }
}
impl<T> SlotMap<T> {
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut { entries: self.entries.iter_mut().enumerate() }
    }
}

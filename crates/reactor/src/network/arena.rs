//! Generation checked slot storage for the live sessions of a reactor.
//!
//! A [`SessionKey`] is a slot index plus the generation the slot had when the
//! value was inserted. Removing a value bumps the slot's generation, so a key
//! held by a late event or a deferred response stops matching instead of
//! addressing whatever reuses the slot.

use mio::Token;

/// Half of the token is the slot index, the other half the generation.
const SHIFT: u32 = usize::BITS / 2;
const MASK: usize = (1 << SHIFT) - 1;

/// Stable handle of a session inside one reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    index: usize,
    generation: usize,
}

impl SessionKey {
    pub(crate) fn token(self) -> Token {
        Token((self.generation << SHIFT) | self.index)
    }

    pub(crate) fn from_token(token: Token) -> Self {
        Self { index: token.0 & MASK, generation: (token.0 >> SHIFT) & MASK }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: usize,
    value: Option<T>,
}

#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), len: 0 }
    }

    /// Stores `value`, handing it back when every index is taken.
    ///
    /// The all-ones index is never used, the listener token lives there.
    pub(crate) fn insert(&mut self, value: T) -> Result<SessionKey, T> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < MASK => {
                self.slots.push(Slot { generation: 0, value: None });
                self.slots.len() - 1
            }
            None => return Err(value),
        };

        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.len += 1;
        Ok(SessionKey { index, generation: slot.generation })
    }

    pub(crate) fn get_mut(&mut self, key: SessionKey) -> Option<&mut T> {
        self.slots.get_mut(key.index).filter(|slot| slot.generation == key.generation)?.value.as_mut()
    }

    pub(crate) fn remove(&mut self, key: SessionKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index).filter(|slot| slot.generation == key.generation)?;
        let value = slot.value.take()?;
        slot.generation = (slot.generation + 1) & MASK;
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    /// Keeps the values for which `keep` returns true, dropping the others.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(SessionKey, &mut T) -> bool) {
        for index in 0..self.slots.len() {
            let generation = self.slots[index].generation;
            let key = SessionKey { index, generation };
            let retained = match self.slots[index].value.as_mut() {
                Some(value) => keep(key, value),
                None => true,
            };
            if !retained {
                self.remove(key);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

use core::fmt;

// low bits hold the table slot, the rest count how often the slot was reused
const SLOT_BITS: u32 = 12;
pub const MAX_NENV: usize = 1 << SLOT_BITS;

/// Generation-tagged process id. A stale id (slot since reused) never
/// resolves to the new occupant.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Refers to the calling process wherever a target id is accepted.
    pub const CURRENT: ProcessId = ProcessId(0);

    pub(crate) fn new(generation: u32, slot: usize) -> Self {
        debug_assert!(slot < MAX_NENV);
        Self(generation << SLOT_BITS | slot as u32)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn to_inner(self) -> u32 {
        self.0
    }

    pub fn slot(self) -> usize {
        (self.0 as usize) & (MAX_NENV - 1)
    }

    pub fn generation(self) -> u32 {
        self.0 >> SLOT_BITS
    }

    pub fn is_current(self) -> bool {
        self == Self::CURRENT
    }

    // id for the next occupant of the same slot; generation 0 is reserved
    // so that no live id equals CURRENT
    pub(crate) fn next_generation(self, slot: usize) -> Self {
        let generation = match self.generation().wrapping_add(1) & (u32::MAX >> SLOT_BITS) {
            0 => 1,
            generation => generation,
        };
        Self::new(generation, slot)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generations_never_collide_with_current() {
        let id = ProcessId::new(u32::MAX >> SLOT_BITS, 7);
        let next = id.next_generation(7);
        assert_eq!(next.generation(), 1);
        assert_eq!(next.slot(), 7);
        assert!(!next.is_current());
        assert_ne!(ProcessId::new(1, 7), ProcessId::new(2, 7));
    }
}

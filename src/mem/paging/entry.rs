use crate::mem::frame::Frame;
use bitflags::bitflags;

bitflags! {
    pub struct Perm: u32 {
        const X =          1 << 0;
        const W =          1 << 1;
        const R =          1 << 2;
        const SHARE =      1 << 6;
        const COMBINE =    1 << 7;
        // set by the kernel on every user mapping, never accepted from userspace
        const USER =       1 << 12;
        const ALLOC_ZERO = 1 << 20;
        const ALLOC_ONE =  1 << 21;

        const RW = Self::R.bits | Self::W.bits;
        const RWX = Self::R.bits | Self::W.bits | Self::X.bits;
        const PROT_ALL = Self::R.bits | Self::W.bits | Self::X.bits | Self::SHARE.bits | Self::COMBINE.bits;
    }
}

impl Perm {
    /// Bits a caller may pass when mapping an existing region.
    pub fn is_mappable(&self) -> bool {
        Perm::PROT_ALL.contains(*self)
    }

    /// Bits a caller may pass when allocating a fresh region.
    pub fn is_allocatable(&self) -> bool {
        (Perm::PROT_ALL | Perm::ALLOC_ZERO | Perm::ALLOC_ONE).contains(*self)
            && !self.contains(Perm::ALLOC_ZERO | Perm::ALLOC_ONE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    frame: Frame,
    perm: Perm,
}

impl Entry {
    pub fn new(frame: Frame, perm: Perm) -> Self {
        Self { frame, perm }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn perm(&self) -> Perm {
        self.perm
    }

    pub fn is_writable(&self) -> bool {
        self.perm.contains(Perm::W)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn perm_classes() {
        assert!(Perm::RW.is_mappable());
        assert!((Perm::R | Perm::SHARE).is_mappable());
        assert!(!(Perm::R | Perm::USER).is_mappable());
        assert!(!(Perm::W | Perm::ALLOC_ZERO).is_mappable());
        assert!((Perm::W | Perm::ALLOC_ONE).is_allocatable());
        assert!(!(Perm::ALLOC_ZERO | Perm::ALLOC_ONE).is_allocatable());
        assert_eq!(Perm::from_bits(1 << 30), None);
    }
}

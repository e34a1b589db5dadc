use alloc::boxed::Box;
use alloc::vec;
use hashbrown::HashMap;
use log::trace;

use super::allocator::{BitMapAllocator, FrameAllocator};
use super::frame::Frame;
use super::PAGE_SIZE;
use crate::error::{KResult, KernelError};

#[derive(Debug)]
struct FrameData {
    bytes: Box<[u8]>,
    // number of mappings (or page-table slots) holding the frame
    refs: u32,
}

/// Modelled RAM: the frame allocator plus the contents of every live frame.
#[derive(Debug)]
pub struct PhysicalMemory {
    allocator: BitMapAllocator,
    frames: HashMap<Frame, FrameData>,
}

impl PhysicalMemory {
    pub fn new(frames: usize) -> Self {
        Self {
            allocator: BitMapAllocator::new(frames),
            frames: HashMap::new(),
        }
    }

    pub fn free_frames(&self) -> u64 {
        self.allocator.free_frames()
    }

    /// Allocates a frame with one reference, every byte set to `fill`.
    pub fn alloc(&mut self, fill: u8) -> KResult<Frame> {
        let frame = self
            .allocator
            .allocate_frame()
            .ok_or(KernelError::OutOfMemory)?;
        let data = FrameData {
            bytes: vec![fill; PAGE_SIZE as usize].into_boxed_slice(),
            refs: 1,
        };
        self.frames.insert(frame, data);
        Ok(frame)
    }

    pub fn retain(&mut self, frame: Frame) {
        let data = self
            .frames
            .get_mut(&frame)
            .unwrap_or_else(|| panic!("retain of dead frame {:#x?}", frame));
        data.refs += 1;
    }

    pub fn release(&mut self, frame: Frame) {
        let data = self
            .frames
            .get_mut(&frame)
            .unwrap_or_else(|| panic!("release of dead frame {:#x?}", frame));
        data.refs -= 1;
        if data.refs == 0 {
            self.frames.remove(&frame);
            self.allocator.deallocate_frame(frame);
            trace!("frame {:#x} returned to the allocator", frame.number);
        }
    }

    pub fn refs(&self, frame: Frame) -> u32 {
        self.frames.get(&frame).map_or(0, |data| data.refs)
    }

    pub(crate) fn read(&self, frame: Frame, offset: usize, buf: &mut [u8]) {
        let data = &self.frames[&frame];
        buf.copy_from_slice(&data.bytes[offset..offset + buf.len()]);
    }

    pub(crate) fn write(&mut self, frame: Frame, offset: usize, bytes: &[u8]) {
        let data = self
            .frames
            .get_mut(&frame)
            .unwrap_or_else(|| panic!("write to dead frame {:#x?}", frame));
        data.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

use alloc::vec;
use alloc::vec::Vec;
use log::{info, trace};

use super::FrameAllocator;
use crate::mem::frame::Frame;
use crate::mem::{PhysicalAddress, PAGE_SIZE};

/// Frame allocator over a fixed amount of modelled RAM.
#[derive(Debug)]
pub struct BitMapAllocator(BitMap);

impl BitMapAllocator {
    pub fn new(frames: usize) -> Self {
        Self(BitMap::new(frames))
    }

    pub fn ram_frames(&self) -> u64 {
        self.0.ram_frames
    }
}

impl FrameAllocator for BitMapAllocator {
    fn allocate_frame(&mut self) -> Option<Frame> {
        self.0.alloc(1).map(Frame::containing_address)
    }

    fn deallocate_frame(&mut self, frame: Frame) {
        self.0.free(frame.start_address(), 1);
    }

    fn free_frames(&self) -> u64 {
        self.0.ram_frames - self.0.used_ram_frames - self.0.reserved_ram_frames
    }
}

/// used = 1
/// free = 0
#[derive(Debug)]
struct BitMap {
    inner: Vec<u8>,
    // statistics
    used_ram_frames: u64,
    reserved_ram_frames: u64,
    ram_frames: u64,
}

impl BitMap {
    fn new(frames: usize) -> Self {
        let mut bitmap = Self {
            inner: vec![0; frames.div_ceil(8)],
            used_ram_frames: 0,
            reserved_ram_frames: 0,
            ram_frames: frames as u64,
        };

        // bits past the end of RAM are never free
        for frame in frames..bitmap.inner.len() * 8 {
            bitmap.set(frame);
        }

        // physical address 0 doubles as "no frame", never hand it out
        bitmap.set(0);
        bitmap.reserved_ram_frames += 1;

        info!(
            "Initialised bitmap: reserved_ram_frames: {:#x}, ram_frames: {:#x}",
            bitmap.reserved_ram_frames, bitmap.ram_frames,
        );
        bitmap
    }

    fn get_free_frames(&self, num_frames: usize) -> Option<usize> {
        let mut cur_frames = 0;
        for index in 0..self.inner.len() * 8 {
            if !self.present(index) {
                cur_frames += 1;
            } else {
                cur_frames = 0;
            }

            if cur_frames == num_frames {
                return Some(index - (num_frames - 1));
            }
        }

        None
    }

    fn alloc(&mut self, num_frames: usize) -> Option<PhysicalAddress> {
        trace!("bitmap request to allocate {:#x} frames", num_frames);
        self.get_free_frames(num_frames).map(|start_index| {
            for index in start_index..start_index + num_frames {
                self.set(index);
            }
            self.used_ram_frames += num_frames as u64;
            trace!(
                "bitmap allocated frames {:#x}..{:#x}",
                start_index,
                start_index + num_frames
            );
            PhysicalAddress::new(start_index as u64 * PAGE_SIZE)
        })
    }

    fn free(&mut self, start: PhysicalAddress, num_frames: usize) {
        let start_index = Frame::containing_address(start).number as usize;
        for index in start_index..start_index + num_frames {
            assert!(self.present(index), "double free of frame {:#x}", index);
            self.reset(index);
        }
        self.used_ram_frames -= num_frames as u64;
        trace!(
            "bitmap freed frames {:#x}..{:#x}",
            start_index,
            start_index + num_frames
        );
    }

    #[inline]
    fn present(&self, frame: usize) -> bool {
        self.inner[frame / 8] & (1 << (frame % 8)) != 0
    }

    #[inline]
    fn set(&mut self, frame: usize) {
        self.inner[frame / 8] |= 1 << (frame % 8);
    }

    #[inline]
    fn reset(&mut self, frame: usize) {
        self.inner[frame / 8] &= !(1 << (frame % 8));
    }
}

mod bitmap_allocator;

pub use bitmap_allocator::BitMapAllocator;

use super::frame::Frame;

pub trait FrameAllocator {
    fn allocate_frame(&mut self) -> Option<Frame>;
    fn deallocate_frame(&mut self, frame: Frame);
    fn free_frames(&self) -> u64;
}

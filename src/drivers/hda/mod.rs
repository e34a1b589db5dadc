//! High Definition Audio output stream.
//!
//! Only the part of the controller that turns "a buffer finished playing"
//! into a semaphore post is driven here: the codec verbs that route the
//! stream to a pin are outside of the model.

mod playback;
pub mod regs;

pub use playback::{pcm_from_wav, wav_find_data, PlaybackTask};
pub use regs::{BufferDescriptor, HdaFormat, HdaRegisters, StreamDescriptor};

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{info, trace};

use crate::error::{KResult, KernelError};
use crate::interrupts::IrqContext;
use crate::kernel::Kernel;
use crate::locks::SpinLockIrq;
use crate::sync::SemId;
use regs::INTCTL_GIE;

// the output stream is tagged with stream number 1
const OUT_STREAM_NUMBER: u32 = 1;

#[derive(Debug)]
pub struct HdaDevice {
    regs: SpinLockIrq<HdaRegisters>,
    irq: u8,
    // posted once per completed buffer
    sem: SemId,
    stream_exists: AtomicBool,
}

impl HdaDevice {
    /// Takes over the controller and routes its interrupt line to the
    /// stream semaphore.
    pub fn attach(kernel: &mut Kernel, mut regs: HdaRegisters, irq: u8) -> KResult<Arc<Self>> {
        if regs.out_stream_count() == 0 {
            return Err(KernelError::InvalidArgument);
        }
        regs.interrupt_control = 0;
        regs.stream_sync = 0;
        regs.interrupt_control |= INTCTL_GIE | regs.out_stream_bit();

        let sem = kernel.create_semaphore(0);
        let dev = Arc::new(Self {
            regs: SpinLockIrq::new(regs, kernel.cpu()),
            irq,
            sem,
            stream_exists: AtomicBool::new(false),
        });

        let isr = dev.clone();
        if let Err(err) = kernel.register_irq(irq, move |cx: &mut IrqContext<'_>| isr.handle_interrupt(cx)) {
            kernel.destroy_semaphore(sem)?;
            return Err(err);
        }
        info!("hda: attached on irq {}", irq);
        Ok(dev)
    }

    /// Programs the output stream to loop over two buffers of `buff_size`
    /// bytes each, interrupting at the end of every buffer.
    pub fn stream_init(&self, format: HdaFormat, buff_size: u32, buffers: [u64; 2]) -> KResult<()> {
        if buff_size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if self.stream_exists.load(Ordering::Acquire) {
            return Err(KernelError::Busy);
        }

        let mut regs = self.regs.lock();
        for (desc, addr) in regs.bdl.iter_mut().zip(buffers) {
            *desc = BufferDescriptor {
                addr,
                len: buff_size,
                ioc: true,
            };
        }
        let sd = &mut regs.out_stream;
        // a reset forgets whatever the previous stream left behind
        *sd = StreamDescriptor::default();
        sd.set_stream_number(OUT_STREAM_NUMBER);
        sd.format = format.to_raw();
        sd.set_ioc_enabled(true);
        sd.last_valid_index = 1;
        sd.buff_len = buff_size * 2;

        self.stream_exists.store(true, Ordering::Release);
        trace!("hda: stream of 2x{} bytes, format {:#06x}", buff_size, format.to_raw());
        Ok(())
    }

    pub fn play(&self) -> KResult<()> {
        if !self.stream_exists.load(Ordering::Acquire) {
            return Err(KernelError::InvalidArgument);
        }
        let mut regs = self.regs.lock();
        regs.out_stream.set_running(true);
        regs.stream_sync |= 1;
        Ok(())
    }

    pub fn pause(&self) {
        self.regs.lock().out_stream.set_running(false);
    }

    /// Bytes played inside the cyclic buffer.
    pub fn position(&self) -> u32 {
        self.regs.lock().out_stream.link_position
    }

    pub fn deinit(&self) {
        self.pause();
        self.stream_exists.store(false, Ordering::Release);
    }

    pub fn has_stream(&self) -> bool {
        self.stream_exists.load(Ordering::Acquire)
    }

    pub fn sem(&self) -> SemId {
        self.sem
    }

    pub fn irq(&self) -> u8 {
        self.irq
    }

    pub fn regs(&self) -> &SpinLockIrq<HdaRegisters> {
        &self.regs
    }

    fn handle_interrupt(&self, cx: &mut IrqContext<'_>) {
        {
            let mut regs = self.regs.lock();
            let bit = regs.out_stream_bit();
            if regs.interrupt_status & bit == 0 || !regs.out_stream.is_buffer_complete() {
                return;
            }
            regs.out_stream.set_buffer_complete(false);
            regs.interrupt_status &= !bit;
        }

        // a completion nobody consumed yet is not counted twice
        if self.has_stream() && cx.sem_value(self.sem) == Some(0) {
            cx.post(self.sem);
        }
    }
}

use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{info, warn};

use super::{HdaDevice, HdaFormat};
use crate::error::{KResult, KernelError};
use crate::kernel::Kernel;
use crate::mem::paging::entry::Perm;
use crate::mem::{align_up, VirtualAddress, PAGE_SIZE};
use crate::process::{ProcessId, ProcessType, Task, TaskContext};
use crate::syscall::Syscall;

pub const SAMPLES_PER_BUFFER: usize = 512;
pub const BUFFER_BYTES: usize = SAMPLES_PER_BUFFER * 2;

/// Offset right behind the `data` tag of a WAV file, where the chunk size
/// starts.
pub fn wav_find_data(wav: &[u8]) -> Option<usize> {
    if wav.len() < 4 {
        return None;
    }
    (0..wav.len() - 4).find(|i| &wav[*i..*i + 4] == b"data").map(|i| i + 4)
}

/// The 16 bit little endian samples of a WAV file's `data` chunk.
pub fn pcm_from_wav(wav: &[u8]) -> KResult<Vec<i16>> {
    let off = wav_find_data(wav).ok_or(KernelError::InvalidArgument)?;
    let size = wav
        .get(off..off + 4)
        .ok_or(KernelError::InvalidArgument)?;
    let size = u32::from_le_bytes([size[0], size[1], size[2], size[3]]) as usize;
    let data = wav
        .get(off + 4..off + 4 + size)
        .ok_or(KernelError::InvalidArgument)?;
    Ok(data
        .chunks_exact(2)
        .map(|s| i16::from_le_bytes([s[0], s[1]]))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Playing,
    Done,
}

/// Plays PCM samples through the HDA output stream from a double buffer in
/// the process' own memory. The task sleeps on the stream semaphore between
/// buffer completions and refills the half the hardware just left.
pub struct PlaybackTask {
    dev: Arc<HdaDevice>,
    samples: Vec<i16>,
    buffers: VirtualAddress,
    // next sample to copy into a buffer
    pos: usize,
    state: State,
}

impl PlaybackTask {
    pub fn new(dev: Arc<HdaDevice>, samples: Vec<i16>, buffers: VirtualAddress) -> Self {
        Self {
            dev,
            samples,
            buffers,
            pos: 0,
            state: State::Start,
        }
    }

    /// Spawns the task with its double buffer backed at `buffers`.
    pub fn spawn(kernel: &mut Kernel, dev: Arc<HdaDevice>, samples: Vec<i16>, buffers: VirtualAddress) -> KResult<ProcessId> {
        let id = kernel.spawn(ProcessType::User, Self::new(dev, samples, buffers))?;
        let size = align_up(2 * BUFFER_BYTES as u64, PAGE_SIZE);
        if let Err(err) = kernel.alloc_user(id, buffers, size, Perm::RW) {
            kernel.destroy(id)?;
            return Err(err);
        }
        Ok(id)
    }

    fn buffer(&self, n: usize) -> VirtualAddress {
        self.buffers.offset((n * BUFFER_BYTES) as u64)
    }

    // copies the next SAMPLES_PER_BUFFER samples, zero padded, into buffer `n`
    fn fill(&mut self, cx: &mut TaskContext<'_>, n: usize) -> KResult<()> {
        let bytes: Vec<u8> = (self.pos..self.pos + SAMPLES_PER_BUFFER)
            .flat_map(|i| self.samples.get(i).copied().unwrap_or(0).to_le_bytes())
            .collect();
        cx.write(self.buffer(n), &bytes)?;
        self.pos += SAMPLES_PER_BUFFER;
        Ok(())
    }

    fn start(&mut self, cx: &mut TaskContext<'_>) -> KResult<()> {
        self.fill(cx, 0)?;
        self.fill(cx, 1)?;
        let buffers = [self.buffer(0).to_inner(), self.buffer(1).to_inner()];
        self.dev
            .stream_init(HdaFormat::PCM_48K_16_STEREO, BUFFER_BYTES as u32, buffers)?;
        self.dev.play()
    }

    // the hardware finished a buffer: stop once it played past the last
    // sample, otherwise refill the half it just left
    fn refill(&mut self, cx: &mut TaskContext<'_>) -> KResult<bool> {
        let stream_pos = self.dev.position() as usize;
        let played = self.pos - SAMPLES_PER_BUFFER + (stream_pos % BUFFER_BYTES) / 2;
        if played > self.samples.len() {
            return Ok(false);
        }
        let curr = (stream_pos < BUFFER_BYTES) as usize;
        self.fill(cx, curr)?;
        Ok(true)
    }
}

impl Task for PlaybackTask {
    fn resume(&mut self, cx: &mut TaskContext<'_>) -> Syscall {
        let res = match self.state {
            State::Start => self.start(cx).map(|()| true),
            State::Playing => self.refill(cx),
            State::Done => Ok(false),
        };
        match res {
            Ok(true) => {
                self.state = State::Playing;
                Syscall::SemWait(self.dev.sem())
            }
            Ok(false) => {
                if self.state == State::Playing {
                    info!("[{}] played {} samples", cx.id(), self.samples.len());
                    self.dev.deinit();
                }
                self.state = State::Done;
                Syscall::Exit
            }
            Err(err) => {
                warn!("[{}] couldn't play audio stream: {}", cx.id(), err);
                if self.state == State::Playing {
                    self.dev.deinit();
                }
                self.state = State::Done;
                Syscall::Exit
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drivers::hda::HdaRegisters;
    use crate::kernel::RunOutcome;
    use crate::testing::kernel;

    const IRQ: u8 = 9;
    const BUF: VirtualAddress = VirtualAddress::new(0x40_0000);

    fn wav(samples: &[i16]) -> Vec<u8> {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF\0\0\0\0WAVEfmt ");
        wav.extend_from_slice(&[0; 20]);
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&((samples.len() * 2) as u32).to_le_bytes());
        samples.iter().for_each(|s| wav.extend_from_slice(&s.to_le_bytes()));
        wav
    }

    fn buffer(k: &Kernel, id: ProcessId, n: usize) -> Vec<i16> {
        let mut bytes = [0; BUFFER_BYTES];
        k.read_user(id, BUF.offset((n * BUFFER_BYTES) as u64), &mut bytes)
            .unwrap();
        bytes
            .chunks_exact(2)
            .map(|s| i16::from_le_bytes([s[0], s[1]]))
            .collect()
    }

    fn complete(k: &mut Kernel, dev: &HdaDevice) {
        if dev.regs().lock().complete_buffer() {
            k.raise_irq(dev.irq());
        }
    }

    #[test]
    fn finds_data_chunk() {
        let file = wav(&[1, -2, 3]);
        assert_eq!(wav_find_data(&file), Some(40));
        assert_eq!(pcm_from_wav(&file), Ok(alloc::vec![1, -2, 3]));

        assert_eq!(wav_find_data(b"dat"), None);
        assert_eq!(wav_find_data(b"RIFFWAVE"), None);
        // the tag must leave room behind it
        assert_eq!(wav_find_data(b"xxdata"), None);
        assert_eq!(wav_find_data(b"xxdata\0"), Some(6));
        assert_eq!(pcm_from_wav(b"xxdata\0"), Err(KernelError::InvalidArgument));

        // chunk claims more than the file holds
        let mut short = wav(&[1, 2, 3, 4]);
        short.truncate(short.len() - 2);
        assert_eq!(pcm_from_wav(&short), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn double_buffered_playback() {
        let mut k = kernel();
        let dev = HdaDevice::attach(&mut k, HdaRegisters::new(4, 4), IRQ).unwrap();
        let samples: Vec<i16> = (1..=1500).collect();
        let id = PlaybackTask::spawn(&mut k, dev.clone(), samples.clone(), BUF).unwrap();

        // both halves primed, stream running, task parked on the semaphore
        assert_eq!(k.run(10), RunOutcome::Idle);
        assert!(dev.has_stream());
        assert!(dev.regs().lock().out_stream.is_running());
        assert_eq!(buffer(&k, id, 0), samples[..512]);
        assert_eq!(buffer(&k, id, 1), samples[512..1024]);
        assert_eq!(k.process(id).unwrap().sem(), Some(dev.sem()));

        // buffer 0 played: refilled with the tail, zero padded
        complete(&mut k, &dev);
        assert_eq!(k.run(10), RunOutcome::Idle);
        let refilled = buffer(&k, id, 0);
        assert_eq!(refilled[..476], samples[1024..]);
        assert!(refilled[476..].iter().all(|s| *s == 0));
        assert_eq!(buffer(&k, id, 1), samples[512..1024]);

        // buffer 1 played: nothing left but silence
        complete(&mut k, &dev);
        assert_eq!(k.run(10), RunOutcome::Idle);
        assert!(buffer(&k, id, 1).iter().all(|s| *s == 0));

        // the last real sample is out: the stream is torn down
        complete(&mut k, &dev);
        assert_eq!(k.run(10), RunOutcome::Idle);
        assert!(k.process(id).is_none());
        assert!(!dev.has_stream());
        assert!(!dev.regs().lock().out_stream.is_running());
        assert_eq!(k.sem_value(dev.sem()), Some(0));
    }

    #[test]
    fn second_stream_is_refused() {
        let mut k = kernel();
        let dev = HdaDevice::attach(&mut k, HdaRegisters::new(4, 4), IRQ).unwrap();
        PlaybackTask::spawn(&mut k, dev.clone(), alloc::vec![7; 2048], BUF).unwrap();
        let other = PlaybackTask::spawn(&mut k, dev.clone(), alloc::vec![1; 16], BUF).unwrap();

        assert_eq!(k.run(10), RunOutcome::Idle);
        assert!(k.process(other).is_none());
        assert!(crate::logging::console_contains("couldn't play audio stream: "));
        assert!(dev.has_stream());
    }
}

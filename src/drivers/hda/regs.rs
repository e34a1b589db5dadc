use paste::paste;

// Register        Bits
// GCAP            15-12 output streams, 11-8 input streams, 7-4 bidirectional streams
// INTCTL          31 global interrupt enable, n stream n interrupt enable
// INTSTS          n stream n interrupt status
// SDnCTL/STS      0 reset, 1 run, 2 IOC enable, 23-20 stream number, 26 buffer complete
pub const INTCTL_GIE: u32 = 1 << 31;
pub const SD_STREAM_NUMBER_SHIFT: u32 = 20;

macro_rules! flag {
    ($name: ident, $bit: expr) => {
        paste! {
            #[inline]
            pub fn [<is_$name>](&self) -> bool {
                self.control_and_status & (1 << $bit) != 0
            }
            #[inline]
            pub fn [<set_$name>](&mut self, on: bool) {
                if on {
                    self.control_and_status |= 1 << $bit;
                } else {
                    self.control_and_status &= !(1 << $bit);
                }
            }
        }
    };
}

/// Output stream descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub control_and_status: u32,
    // bytes played inside the cyclic buffer
    pub link_position: u32,
    // cyclic buffer length in bytes
    pub buff_len: u32,
    pub last_valid_index: u16,
    pub format: u16,
}

impl StreamDescriptor {
    flag!(reset, 0);
    flag!(running, 1);
    flag!(ioc_enabled, 2);
    flag!(buffer_complete, 26);

    pub fn stream_number(&self) -> u32 {
        (self.control_and_status >> SD_STREAM_NUMBER_SHIFT) & 0xf
    }

    pub fn set_stream_number(&mut self, number: u32) {
        self.control_and_status &= !(0xf << SD_STREAM_NUMBER_SHIFT);
        self.control_and_status |= (number & 0xf) << SD_STREAM_NUMBER_SHIFT;
    }
}

/// Buffer descriptor list entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub addr: u64,
    pub len: u32,
    // interrupt on completion
    pub ioc: bool,
}

/// The part of the controller's register block the stream code touches.
/// The device model has no DMA engine; the "hardware" is whoever calls
/// [`HdaRegisters::complete_buffer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdaRegisters {
    pub global_capabilities: u16,
    pub interrupt_control: u32,
    pub interrupt_status: u32,
    pub stream_sync: u32,
    pub out_stream: StreamDescriptor,
    pub bdl: [BufferDescriptor; 2],
}

impl HdaRegisters {
    pub fn new(in_streams: u16, out_streams: u16) -> Self {
        Self {
            global_capabilities: (out_streams & 0xf) << 12 | (in_streams & 0xf) << 8,
            ..Self::default()
        }
    }

    pub fn out_stream_count(&self) -> u32 {
        (self.global_capabilities >> 12) as u32
    }

    // output stream descriptors follow the input ones, so the first output
    // stream's status bit sits right after them
    pub fn in_stream_count(&self) -> u32 {
        ((self.global_capabilities >> 8) & 0xf) as u32
    }

    pub fn out_stream_bit(&self) -> u32 {
        1 << self.in_stream_count()
    }

    // bdl entry the link position currently falls into
    fn current_descriptor(&self) -> usize {
        let last = (self.out_stream.last_valid_index as usize).min(self.bdl.len() - 1);
        let mut start = 0;
        for (n, desc) in self.bdl[..=last].iter().enumerate() {
            start += desc.len;
            if self.out_stream.link_position < start {
                return n;
            }
        }
        last
    }

    /// Hardware side: finishes the buffer being played. The link position
    /// moves past it and, if the buffer asked for it, the completion bits are
    /// raised. Returns true if that calls for an interrupt.
    pub fn complete_buffer(&mut self) -> bool {
        if !self.out_stream.is_running() || self.out_stream.buff_len == 0 {
            return false;
        }
        let desc = self.bdl[self.current_descriptor()];
        let sd = &mut self.out_stream;
        sd.link_position = (sd.link_position + desc.len) % sd.buff_len;
        if !desc.ioc || !sd.is_ioc_enabled() {
            return false;
        }

        sd.set_buffer_complete(true);
        let bit = self.out_stream_bit();
        self.interrupt_status |= bit;
        self.interrupt_control & INTCTL_GIE != 0 && self.interrupt_control & bit != 0
    }
}

/// Stream format word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdaFormat {
    // 44.1 kHz base instead of 48 kHz
    pub base_44k1: bool,
    pub rate_multiplier: u8,
    pub rate_divisor: u8,
    pub bits_per_sample: u8,
    pub channels: u8,
}

impl HdaFormat {
    /// 48 kHz, 16 bit, stereo.
    pub const PCM_48K_16_STEREO: Self = Self {
        base_44k1: false,
        rate_multiplier: 1,
        rate_divisor: 1,
        bits_per_sample: 16,
        channels: 2,
    };

    pub fn to_raw(self) -> u16 {
        let bits = match self.bits_per_sample {
            8 => 0,
            16 => 1,
            20 => 2,
            24 => 3,
            _ => 4,
        };
        (self.base_44k1 as u16) << 14
            | ((self.rate_multiplier.saturating_sub(1) & 0x7) as u16) << 11
            | ((self.rate_divisor.saturating_sub(1) & 0x7) as u16) << 8
            | bits << 4
            | (self.channels.saturating_sub(1) & 0xf) as u16
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn running(len: u32) -> HdaRegisters {
        let mut regs = HdaRegisters::new(4, 4);
        regs.interrupt_control = INTCTL_GIE | regs.out_stream_bit();
        regs.bdl = [
            BufferDescriptor { addr: 0, len, ioc: true },
            BufferDescriptor { addr: len as u64, len, ioc: true },
        ];
        regs.out_stream.last_valid_index = 1;
        regs.out_stream.buff_len = 2 * len;
        regs.out_stream.set_ioc_enabled(true);
        regs.out_stream.set_running(true);
        regs
    }

    #[test]
    fn flags_and_capabilities() {
        let mut regs = HdaRegisters::new(4, 2);
        assert_eq!((regs.in_stream_count(), regs.out_stream_count()), (4, 2));
        assert_eq!(regs.out_stream_bit(), 1 << 4);

        let sd = &mut regs.out_stream;
        sd.set_stream_number(1);
        sd.set_running(true);
        sd.set_buffer_complete(true);
        assert_eq!(sd.control_and_status, 1 << 20 | 1 << 1 | 1 << 26);
        sd.set_running(false);
        assert!(!sd.is_running());
        assert!(sd.is_buffer_complete());
        assert_eq!(sd.stream_number(), 1);
    }

    #[test]
    fn completion_walks_the_cyclic_buffer() {
        let mut regs = running(1024);
        assert!(regs.complete_buffer());
        assert_eq!(regs.out_stream.link_position, 1024);
        assert!(regs.out_stream.is_buffer_complete());
        assert_eq!(regs.interrupt_status, 1 << 4);

        assert!(regs.complete_buffer());
        assert_eq!(regs.out_stream.link_position, 0);
    }

    #[test]
    fn stopped_or_quiet_streams_do_not_interrupt() {
        let mut regs = running(1024);
        regs.out_stream.set_running(false);
        assert!(!regs.complete_buffer());
        assert_eq!(regs.out_stream.link_position, 0);

        let mut regs = running(1024);
        regs.bdl[0].ioc = false;
        assert!(!regs.complete_buffer());
        assert_eq!(regs.out_stream.link_position, 1024);
        assert!(!regs.out_stream.is_buffer_complete());

        let mut regs = running(1024);
        regs.interrupt_control = 0;
        assert!(!regs.complete_buffer());
        assert!(regs.out_stream.is_buffer_complete());
    }

    #[test]
    fn format_word() {
        // 48 kHz / 16 bit / 2 channels
        assert_eq!(HdaFormat::PCM_48K_16_STEREO.to_raw(), 0x0011);
        let fmt = HdaFormat {
            base_44k1: true,
            rate_multiplier: 2,
            rate_divisor: 1,
            bits_per_sample: 24,
            channels: 1,
        };
        assert_eq!(fmt.to_raw(), 1 << 14 | 1 << 11 | 3 << 4);
    }
}

use r4300_util::Bit;
use super::{AddrUnit, BusMap};

pub const RAM_SIZE: usize = 8 * 1024 * 1024;

/// RDRAM. Stored as big endian words, since that's the natural unit of the CPU.
pub struct Ram {
    words: Box<[u32]>,
}

impl Ram {
    pub fn new() -> Self {
        Self {
            words: vec![0; RAM_SIZE / 4].into_boxed_slice(),
        }
    }

    fn byte(&self, offset: usize) -> u8 {
        let shift = 24 - (offset & 3) * 8;
        (self.words[offset >> 2] >> shift) as u8
    }

    fn set_byte(&mut self, offset: usize, val: u8) {
        let shift = 24 - (offset & 3) * 8;
        let word = &mut self.words[offset >> 2];
        *word = (*word & !(0xff << shift)) | ((val as u32) << shift);
    }

    pub fn load<T: AddrUnit>(&self, offset: u32) -> u64 {
        let offset = offset.bit_range(0, 22) as usize;
        (0..T::WIDTH).fold(0, |value, byte| {
            (value << 8) | self.byte(offset + byte) as u64
        })
    }

    pub fn store<T: AddrUnit>(&mut self, offset: u32, val: u64) {
        let offset = offset.bit_range(0, 22) as usize;
        for i in 0..T::WIDTH {
            self.set_byte(offset + i, (val >> (8 * (T::WIDTH - 1 - i))) as u8);
        }
    }

    /// Copy raw big endian bytes into RAM at `offset`. Bytes past the end of RAM are dropped.
    pub fn write_bytes(&mut self, offset: u32, data: &[u8]) {
        let start = offset as usize;
        for (i, byte) in data.iter().enumerate() {
            if start + i >= RAM_SIZE {
                break;
            }
            self.set_byte(start + i, *byte);
        }
    }

    /// CRC32 of the 4 KiB page containing `offset`.
    pub fn page_checksum(&self, offset: u32) -> u32 {
        let first = (offset as usize & (RAM_SIZE - 1) & !0xfff) >> 2;
        let bytes: &[u8] = bytemuck::cast_slice(&self.words[first..first + 0x400]);
        crc32fast::hash(bytes)
    }
}

impl BusMap for Ram {
    const BUS_BEGIN: u32 = 0x0;
    const BUS_END: u32 = RAM_SIZE as u32 - 1;
}

use crate::gb::constants::{AUDIO_REGISTERS_SIZE, AUDIO_REGISTERS_START};

/// Register-file stub for the sound unit at 0xFF10-0xFF3F. Writes land in
/// the backing store and read back with the per-register undocumented bits
/// forced to 1; no audio is synthesised.
#[derive(Clone)]
pub struct AudioProcessor {
    r: [u8; AUDIO_REGISTERS_SIZE],
}

impl Default for AudioProcessor {
    fn default() -> Self {
        AudioProcessor {
            r: [0; AUDIO_REGISTERS_SIZE],
        }
    }
}

impl AudioProcessor {
    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            // Unmapped holes inside the audio range absorb writes.
            0xFF15 | 0xFF1F | 0xFF27..=0xFF2F => {}
            _ => self.r[(address - AUDIO_REGISTERS_START) as usize] = value,
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        let value = self.r[(address - AUDIO_REGISTERS_START) as usize];
        // Undocumented bits should be 1
        value | self.read_mask(address)
    }

    /// Mask of bits that are not backed by the register and read as 1.
    fn read_mask(&self, address: u16) -> u8 {
        match address {
            0xFF10 => 0b1000_0000, // NR10, sweep
            0xFF1A => 0b0111_1111, // NR30, only the DAC enable bit is mapped
            0xFF1C => 0b1001_1111, // NR32, coarse volume
            0xFF20 => 0b1100_0000, // NR41, length timer
            0xFF23 => 0b0011_1111, // NR44, trigger/length enable
            0xFF26 => 0b0111_0000, // NR52, channel status bits stay low
            0xFF15 | 0xFF1F | 0xFF27..=0xFF2F => 0xFF,
            _ => 0,
        }
    }
}

use crate::gb::ppu::misc::Shade;
use crate::gb::{SCREEN_HEIGHT, SCREEN_WIDTH};

const PIXELS: usize = SCREEN_WIDTH as usize * SCREEN_HEIGHT as usize;

/// The 160x144 frame as packed 32-bit ARGB words, written pixel by pixel as
/// the PPU emits them and snapshotted by the host once per vertical blank.
#[derive(Clone)]
pub struct FrameBuffer {
    buffer: Vec<u32>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self {
            buffer: vec![Shade::White.argb(); PIXELS],
        }
    }
}

impl FrameBuffer {
    /// Writes a colorized pixel. Out-of-range coordinates are a programming
    /// error in the PPU, not in the guest.
    #[inline]
    pub fn write_pixel(&mut self, x: u8, y: u8, shade: Shade) {
        debug_assert!(x < SCREEN_WIDTH && y < SCREEN_HEIGHT);
        self.buffer[y as usize * SCREEN_WIDTH as usize + x as usize] = shade.argb();
    }

    #[inline]
    pub fn pixel(&self, x: u8, y: u8) -> u32 {
        self.buffer[y as usize * SCREEN_WIDTH as usize + x as usize]
    }

    /// The whole frame in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.buffer
    }

    /// Resets the panel to its blank (white) state.
    pub fn clear(&mut self) {
        self.buffer.fill(Shade::White.argb());
    }
}

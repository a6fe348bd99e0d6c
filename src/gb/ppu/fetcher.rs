use crate::gb::constants::VRAM_SIZE;
use crate::gb::ppu::misc::{ObjPixel, Pixel, Sprite, SpriteAttributes};
use crate::gb::ppu::registers::{LCDControl, Registers};
use std::collections::VecDeque;

/// Upper bound of both FIFOs: two tile rows worth of pixels.
pub const FIFO_CAPACITY: usize = 16;

/// The fetcher walks this cycle for every tile; it advances one sub-state
/// every second master cycle.
#[derive(Copy, Clone, PartialEq, Debug)]
enum FetcherState {
    Tile,
    DataLow,
    DataHigh,
    Push,
}

/// The background/window tile fetcher feeding the pixel FIFO. It runs at
/// half the master clock and stalls in `Push` while the FIFO still holds
/// more than a tile row.
#[derive(Clone)]
pub struct Fetcher {
    state: FetcherState,
    clock: u8,
    /// Tile column within the current map row.
    tile_x: u8,
    tile_id: u8,
    data_low: u8,
    data_high: u8,
    pub bg_fifo: VecDeque<Pixel>,
    pub obj_fifo: VecDeque<ObjPixel>,
    /// Leading pixels of the first tile still to drop (SCX alignment).
    pub discard: u8,
    pub window_active: bool,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self {
            state: FetcherState::Tile,
            clock: 0,
            tile_x: 0,
            tile_id: 0,
            data_low: 0,
            data_high: 0,
            bg_fifo: VecDeque::with_capacity(FIFO_CAPACITY),
            obj_fifo: VecDeque::with_capacity(FIFO_CAPACITY),
            discard: 0,
            window_active: false,
        }
    }
}

impl Fetcher {
    /// Arms the fetcher for a new scanline: empty FIFOs, background map,
    /// and the sub-tile scroll offset to discard.
    pub fn begin_line(&mut self, scx: u8) {
        self.state = FetcherState::Tile;
        self.clock = 0;
        self.tile_x = 0;
        self.bg_fifo.clear();
        self.obj_fifo.clear();
        self.discard = scx % 8;
        self.window_active = false;
    }

    /// Switches to window fetching mid-line: the background FIFO restarts
    /// from the window map. Already fetched object pixels survive.
    pub fn start_window(&mut self) {
        self.state = FetcherState::Tile;
        self.clock = 0;
        self.tile_x = 0;
        self.bg_fifo.clear();
        self.window_active = true;
    }

    /// Advances the fetcher by one master cycle.
    pub fn step(&mut self, vram: &[u8; VRAM_SIZE], r: &Registers, window_line: u8) {
        self.clock += 1;
        if self.clock < 2 {
            return;
        }
        self.clock = 0;

        match self.state {
            FetcherState::Tile => {
                let (map_base, col, y) = self.map_position(r, window_line);
                self.tile_id = vram[map_base + (y as usize / 8) * 32 + col as usize];
                self.state = FetcherState::DataLow;
            }
            FetcherState::DataLow => {
                let address = self.tile_row_address(r, window_line);
                self.data_low = vram[address];
                self.state = FetcherState::DataHigh;
            }
            FetcherState::DataHigh => {
                let address = self.tile_row_address(r, window_line);
                self.data_high = vram[address + 1];
                self.state = FetcherState::Push;
            }
            FetcherState::Push => {
                // Stall until the FIFO is down to one tile row.
                if self.bg_fifo.len() <= 8 {
                    for bit in (0..8).rev() {
                        let color =
                            (self.data_high >> bit & 1) << 1 | (self.data_low >> bit & 1);
                        self.bg_fifo.push_back(Pixel::from(color));
                    }
                    self.tile_x = self.tile_x.wrapping_add(1);
                    self.state = FetcherState::Tile;
                }
            }
        }
    }

    /// Tile map base and position of the tile currently being fetched.
    fn map_position(&self, r: &Registers, window_line: u8) -> (usize, u8, u8) {
        match self.window_active {
            true => {
                let map = match r.lcd_control.contains(LCDControl::WIN_MAP) {
                    true => 0x1C00,
                    false => 0x1800,
                };
                (map, self.tile_x & 0x1F, window_line)
            }
            false => {
                let map = match r.lcd_control.contains(LCDControl::BG_MAP) {
                    true => 0x1C00,
                    false => 0x1800,
                };
                let col = (r.scx / 8).wrapping_add(self.tile_x) & 0x1F;
                (map, col, r.ly.wrapping_add(r.scy))
            }
        }
    }

    /// VRAM offset of the low byte of the fetched tile row, honouring the
    /// LCDC tile data addressing mode.
    fn tile_row_address(&self, r: &Registers, window_line: u8) -> usize {
        let y = match self.window_active {
            true => window_line,
            false => r.ly.wrapping_add(r.scy),
        };
        let base = match r.lcd_control.contains(LCDControl::TILE_SEL) {
            // 0x8000 mode: unsigned tile index.
            true => self.tile_id as usize * 16,
            // 0x8800 mode: signed index around 0x9000.
            false => (0x1000 + i32::from(self.tile_id as i8) * 16) as usize,
        };
        base + (y as usize % 8) * 2
    }

    /// Fetches an object's tile row and overlays its eight pixels onto the
    /// object FIFO, aligned so that slot 0 is the pixel emitted next (at
    /// screen position `lx`). Earlier (lower X) objects win overlaps;
    /// transparent pixels never claim a slot.
    pub fn overlay_sprite(
        &mut self,
        sprite: &Sprite,
        vram: &[u8; VRAM_SIZE],
        r: &Registers,
        lx: u8,
    ) {
        let height: i16 = match r.lcd_control.contains(LCDControl::OBJ_SIZE) {
            true => 16,
            false => 8,
        };
        let mut row = i16::from(r.ly) - sprite.y;
        if sprite.attributes.contains(SpriteAttributes::Y_FLIP) {
            row = height - 1 - row;
        }

        // Tall objects span two tiles, bit 0 of the index is ignored.
        let mut tile = match height {
            16 => sprite.tile_index & 0xFE,
            _ => sprite.tile_index,
        };
        if row >= 8 {
            tile += 1;
            row -= 8;
        }

        // Object tiles always use the 0x8000 addressing mode.
        let address = tile as usize * 16 + row as usize * 2;
        let data_low = vram[address];
        let data_high = vram[address + 1];

        for i in 0..8i16 {
            let bit = match sprite.attributes.contains(SpriteAttributes::X_FLIP) {
                true => i,
                false => 7 - i,
            };
            let color = Pixel::from((data_high >> bit & 1) << 1 | (data_low >> bit & 1));
            if color == Pixel::Zero {
                continue;
            }

            let slot = sprite.x + i - i16::from(lx);
            if !(0..FIFO_CAPACITY as i16).contains(&slot) {
                continue;
            }
            let slot = slot as usize;
            while self.obj_fifo.len() <= slot {
                self.obj_fifo.push_back(ObjPixel::default());
            }
            if self.obj_fifo[slot].color == Pixel::Zero {
                self.obj_fifo[slot] = ObjPixel {
                    color,
                    palette: sprite.attributes.contains(SpriteAttributes::DMG_PALETTE),
                    behind_bg: sprite.attributes.contains(SpriteAttributes::PRIORITY),
                };
            }
        }
    }
}

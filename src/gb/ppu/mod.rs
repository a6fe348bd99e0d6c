pub mod buffer;
pub mod fetcher;
pub mod misc;
pub mod registers;

use crate::gb::bus::InterruptRegister;
use crate::gb::constants::*;
use crate::gb::ppu::buffer::FrameBuffer;
use crate::gb::ppu::fetcher::Fetcher;
use crate::gb::ppu::misc::{ObjPixel, Palette, Pixel, Shade, Sprite};
use crate::gb::ppu::registers::{LCDControl, LCDMode, LCDState, Registers};
use crate::gb::{SCREEN_HEIGHT, SCREEN_WIDTH, SubSystem};

/// Duration of the OAM scan, mode 2.
const OAM_SCAN_CYCLES: u16 = 80;

/// Minimum duration of the pixel transfer, mode 3. Scrolling, the window
/// and visible objects stretch it at the expense of the following HBlank.
const TRANSFER_BASE_CYCLES: u16 = 172;

/// Last scanline of the vertical blank period.
const VBLANK_LINE_MAX: u8 = 153;

/// The hardware mixes at most ten objects into one scanline.
const MAX_VISIBLE_SPRITES: usize = 10;

/// Pixel Processing Unit: a four-mode per-scanline state machine driving
/// the tile fetcher and pixel FIFO into the frame buffer. It owns VRAM and
/// OAM and gates CPU access to them by mode.
#[derive(Clone)]
pub struct PPU {
    pub r: Registers,
    vram: [u8; VRAM_SIZE],
    oam: [u8; OAM_SIZE],
    /// Master cycles into the current scanline.
    clock: u16,
    transfer_duration: u16,
    fetcher: Fetcher,
    /// Objects intersecting the current scanline, sorted by X.
    visible: Vec<Sprite>,
    sprite_cursor: usize,
    /// Next pixel to emit on the current scanline.
    lx: u8,
    /// Internal window line counter; the window resumes where it left off
    /// even when hidden for a few scanlines.
    window_line: u8,
    frame: FrameBuffer,
    frame_complete: bool,
}

impl Default for PPU {
    fn default() -> Self {
        Self {
            r: Registers::default(),
            vram: [0; VRAM_SIZE],
            oam: [0; OAM_SIZE],
            clock: 0,
            transfer_duration: TRANSFER_BASE_CYCLES,
            fetcher: Fetcher::default(),
            visible: Vec::with_capacity(MAX_VISIBLE_SPRITES),
            sprite_cursor: 0,
            lx: 0,
            window_line: 0,
            frame: FrameBuffer::default(),
            frame_complete: false,
        }
    }
}

impl PPU {
    /// Advances the PPU for the given number of master cycles.
    pub fn step(&mut self, int_reg: &mut InterruptRegister, cycles: u16) {
        if !self.r.lcd_control.contains(LCDControl::LCD_EN) {
            return;
        }
        for _ in 0..cycles {
            self.tick(int_reg);
        }
    }

    /// The mode the bus consults for VRAM/OAM access gating.
    #[inline]
    pub fn mode(&self) -> LCDMode {
        self.r.lcd_stat.lcd_mode()
    }

    /// Read-only view of the most recent frame.
    #[inline]
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Whether a vertical blank has been entered since the last call.
    #[inline]
    pub fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    /// Privileged OAM write used by the DMA engine, bypassing the gate.
    #[inline]
    pub fn dma_write_oam(&mut self, offset: u8, value: u8) {
        self.oam[offset as usize] = value;
    }

    fn tick(&mut self, int_reg: &mut InterruptRegister) {
        self.clock += 1;
        match self.mode() {
            LCDMode::OamScan => {
                if self.clock >= OAM_SCAN_CYCLES {
                    self.scan_oam();
                    self.transfer_duration = self.mode3_duration();
                    self.lx = 0;
                    self.sprite_cursor = 0;
                    self.fetcher.begin_line(self.r.scx);
                    self.switch_mode(LCDMode::PixelTransfer, int_reg);
                }
            }
            LCDMode::PixelTransfer => {
                self.tick_transfer();
                if self.lx >= SCREEN_WIDTH
                    && self.clock >= OAM_SCAN_CYCLES + self.transfer_duration
                {
                    if self.fetcher.window_active {
                        self.window_line += 1;
                    }
                    self.switch_mode(LCDMode::HBlank, int_reg);
                }
            }
            LCDMode::HBlank => {
                if self.clock >= CYCLES_PER_LINE {
                    self.clock = 0;
                    self.r.ly += 1;
                    self.check_coincidence(int_reg);
                    match self.r.ly >= SCREEN_HEIGHT {
                        true => {
                            self.frame_complete = true;
                            self.switch_mode(LCDMode::VBlank, int_reg);
                        }
                        false => self.switch_mode(LCDMode::OamScan, int_reg),
                    }
                }
            }
            LCDMode::VBlank => {
                if self.clock >= CYCLES_PER_LINE {
                    self.clock = 0;
                    self.r.ly += 1;
                    if self.r.ly > VBLANK_LINE_MAX {
                        self.r.ly = 0;
                        self.window_line = 0;
                        self.switch_mode(LCDMode::OamScan, int_reg);
                    }
                    self.check_coincidence(int_reg);
                }
            }
        }
    }

    /// One master cycle of the pixel pipeline: advance the fetcher, then
    /// try to emit a pixel from the FIFO head.
    fn tick_transfer(&mut self) {
        self.fetcher.step(&self.vram, &self.r, self.window_line);

        if self.fetcher.bg_fifo.is_empty() {
            return;
        }

        // The first SCX % 8 pixels of the leftmost tile never reach the
        // screen.
        if self.fetcher.discard > 0 {
            self.fetcher.bg_fifo.pop_front();
            self.fetcher.discard -= 1;
            return;
        }
        if self.lx >= SCREEN_WIDTH {
            return;
        }

        // Restarting the fetcher on the window costs its fetch latency, no
        // pixel is emitted this cycle.
        if self.window_reached() {
            self.fetcher.start_window();
            return;
        }

        if self.r.lcd_control.contains(LCDControl::OBJ_EN) {
            while let Some(&sprite) = self.visible.get(self.sprite_cursor) {
                if sprite.x > i16::from(self.lx) {
                    break;
                }
                self.fetcher
                    .overlay_sprite(&sprite, &self.vram, &self.r, self.lx);
                self.sprite_cursor += 1;
            }
        }

        let Some(bg) = self.fetcher.bg_fifo.pop_front() else {
            return;
        };
        let obj = self.fetcher.obj_fifo.pop_front().unwrap_or_default();
        let shade = self.mix(bg, obj);
        self.frame.write_pixel(self.lx, self.r.ly, shade);
        self.lx += 1;
    }

    /// Whether the next pixel belongs to the window.
    fn window_reached(&self) -> bool {
        self.r.lcd_control.contains(LCDControl::WIN_EN)
            && !self.fetcher.window_active
            && self.r.ly >= self.r.wy
            && u16::from(self.lx) + 7 >= u16::from(self.r.wx)
    }

    /// Resolves one background and one object pixel into a shade.
    fn mix(&self, bg: Pixel, obj: ObjPixel) -> Shade {
        let bg = match self.r.lcd_control.contains(LCDControl::BG_EN) {
            true => bg,
            false => Pixel::Zero,
        };
        let obj_wins = obj.color != Pixel::Zero && (!obj.behind_bg || bg == Pixel::Zero);
        match obj_wins {
            true => self.obj_palette(obj.palette).colorize(obj.color),
            false => self.r.bg_palette.colorize(bg),
        }
    }

    #[inline]
    fn obj_palette(&self, select: bool) -> &Palette {
        match select {
            true => &self.r.obj_palette1,
            false => &self.r.obj_palette0,
        }
    }

    /// Walks the 40 OAM descriptors and collects up to ten objects that
    /// intersect the current scanline, sorted by X ascending. The sort is
    /// stable, ties keep their OAM order.
    fn scan_oam(&mut self) {
        self.visible.clear();
        if !self.r.lcd_control.contains(LCDControl::OBJ_EN) {
            return;
        }
        let height: i16 = match self.r.lcd_control.contains(LCDControl::OBJ_SIZE) {
            true => 16,
            false => 8,
        };
        let ly = i16::from(self.r.ly);
        for entry in self.oam.chunks_exact(4) {
            let sprite = Sprite::from_oam_entry(entry);
            if (sprite.y..sprite.y + height).contains(&ly) {
                self.visible.push(sprite);
                if self.visible.len() == MAX_VISIBLE_SPRITES {
                    break;
                }
            }
        }
        self.visible.sort_by_key(|sprite| sprite.x);
        debug_assert!(self.visible.len() <= MAX_VISIBLE_SPRITES);
    }

    /// Mode 3 duration for the current scanline: the base plus the SCX
    /// alignment penalty, the window penalty and six cycles per object.
    fn mode3_duration(&self) -> u16 {
        let mut duration = TRANSFER_BASE_CYCLES + u16::from(self.r.scx % 8);
        if self.r.lcd_control.contains(LCDControl::WIN_EN)
            && self.r.ly >= self.r.wy
            && self.r.wx <= 166
        {
            duration += 6;
        }
        duration + 6 * self.visible.len() as u16
    }

    /// Switches the LCD mode and raises the interrupts tied to it.
    fn switch_mode(&mut self, mode: LCDMode, int_reg: &mut InterruptRegister) {
        self.r.lcd_stat.set_lcd_mode(mode);
        match mode {
            LCDMode::OamScan => {
                if self.r.lcd_stat.contains(LCDState::OAM_INT) {
                    int_reg.insert(InterruptRegister::STAT);
                }
            }
            LCDMode::HBlank => {
                if self.r.lcd_stat.contains(LCDState::H_BLANK_INT) {
                    int_reg.insert(InterruptRegister::STAT);
                }
            }
            LCDMode::VBlank => {
                int_reg.insert(InterruptRegister::VBLANK);
                if self.r.lcd_stat.contains(LCDState::V_BLANK_INT) {
                    int_reg.insert(InterruptRegister::STAT);
                }
            }
            LCDMode::PixelTransfer => {}
        }
    }

    /// Updates the coincidence flag on an LY change and raises LCD-STAT if
    /// the LY = LYC source is enabled.
    fn check_coincidence(&mut self, int_reg: &mut InterruptRegister) {
        let matched = self.r.ly == self.r.lyc;
        self.r.lcd_stat.set(LCDState::LYC_STAT, matched);
        if matched && self.r.lcd_stat.contains(LCDState::LY_INT) {
            int_reg.insert(InterruptRegister::STAT);
        }
    }

    /// Handles an LCDC write, including switching the panel on or off.
    fn write_lcd_control(&mut self, value: u8) {
        let was_enabled = self.r.lcd_control.contains(LCDControl::LCD_EN);
        self.r.lcd_control = LCDControl::from_bits_truncate(value);
        let enabled = self.r.lcd_control.contains(LCDControl::LCD_EN);

        if was_enabled && !enabled {
            // The panel blanks, LY resets and STAT reports mode 1.
            self.clock = 0;
            self.lx = 0;
            self.r.ly = 0;
            self.r.lcd_stat.set_lcd_mode(LCDMode::VBlank);
            self.frame.clear();
        } else if !was_enabled && enabled {
            self.clock = 0;
            self.lx = 0;
            self.r.ly = 0;
            self.window_line = 0;
            self.r.lcd_stat.set_lcd_mode(LCDMode::OamScan);
        }
    }
}

impl SubSystem for PPU {
    fn write(&mut self, address: u16, value: u8) {
        match address {
            // VRAM is not accessible during the pixel transfer.
            VRAM_BEGIN..=VRAM_END => {
                if self.mode() != LCDMode::PixelTransfer {
                    self.vram[(address - VRAM_BEGIN) as usize] = value;
                }
            }
            // OAM is blocked during the scan as well.
            OAM_BEGIN..=OAM_END => match self.mode() {
                LCDMode::OamScan | LCDMode::PixelTransfer => {}
                _ => self.oam[(address - OAM_BEGIN) as usize] = value,
            },
            PPU_LCDC => self.write_lcd_control(value),
            // Only the interrupt source bits are writable.
            PPU_STAT => {
                let sources = LCDState::from_bits_truncate(value & 0b0111_1000);
                let fixed = LCDState::from_bits_retain(self.r.lcd_stat.bits() & 0b0000_0111);
                self.r.lcd_stat = sources | fixed;
            }
            PPU_SCY => self.r.scy = value,
            PPU_SCX => self.r.scx = value,
            // Writing the line counter resets it.
            PPU_LY => self.r.ly = 0,
            PPU_LYC => self.r.lyc = value,
            PPU_DMA => self.r.dma = value,
            PPU_BGP => self.r.bg_palette = Palette::from(value),
            PPU_OBP0 => self.r.obj_palette0 = Palette::from(value),
            PPU_OBP1 => self.r.obj_palette1 = Palette::from(value),
            PPU_WY => self.r.wy = value,
            PPU_WX => self.r.wx = value,
            _ => panic!("Attempt to write to unmapped PPU register: {address:#06x}"),
        }
    }

    fn read(&mut self, address: u16) -> u8 {
        match address {
            VRAM_BEGIN..=VRAM_END => match self.mode() {
                LCDMode::PixelTransfer => UNDEFINED_READ,
                _ => self.vram[(address - VRAM_BEGIN) as usize],
            },
            OAM_BEGIN..=OAM_END => match self.mode() {
                LCDMode::OamScan | LCDMode::PixelTransfer => UNDEFINED_READ,
                _ => self.oam[(address - OAM_BEGIN) as usize],
            },
            PPU_LCDC => self.r.lcd_control.bits(),
            // Undocumented bit should be 1
            PPU_STAT => self.r.lcd_stat.bits() | 0b1000_0000,
            PPU_SCY => self.r.scy,
            PPU_SCX => self.r.scx,
            PPU_LY => self.r.ly,
            PPU_LYC => self.r.lyc,
            PPU_DMA => self.r.dma,
            PPU_BGP => u8::from(self.r.bg_palette),
            PPU_OBP0 => u8::from(self.r.obj_palette0),
            PPU_OBP1 => u8::from(self.r.obj_palette1),
            PPU_WY => self.r.wy,
            PPU_WX => self.r.wx,
            _ => panic!("Attempt to read from unmapped PPU register: {address:#06x}"),
        }
    }
}

use crate::gb::bus::{InterruptRegister, MainBus};
use crate::gb::cartridge::Cartridge;
use crate::gb::constants::CYCLES_PER_FRAME;
use crate::gb::cpu::CPU;
use crate::gb::error::EmuResult;
use crate::gb::joypad::Button;
use crate::gb::ppu::buffer::FrameBuffer;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

pub mod audio;
pub mod bus;
pub mod cartridge;
pub mod constants;
pub mod cpu;
pub mod error;
pub mod joypad;
pub mod ppu;
#[cfg(test)]
pub mod tests;
pub mod timer;

pub const DISPLAY_REFRESH_RATE: u32 = 60; // TODO: exact refresh rate is 59.7

pub const SCREEN_WIDTH: u8 = 160;
pub const SCREEN_HEIGHT: u8 = 144;

/// This trait defines a common interface for all subsystems of the emulator.
pub trait SubSystem {
    /// Writes a byte to the given address.
    fn write(&mut self, address: u16, value: u8);

    /// Reads a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Reads a 16-bit little-endian word.
    fn read16(&mut self, address: u16) -> u16 {
        u16::from(self.read(address)) | u16::from(self.read(address.wrapping_add(1))) << 8
    }

    /// Writes a 16-bit word, low byte first.
    fn write16(&mut self, address: u16, value: u16) {
        self.write(address, value as u8);
        self.write(address.wrapping_add(1), (value >> 8) as u8);
    }
}

/// This trait defines the interface the CPU needs from the hardware bus.
pub trait Bus: SubSystem {
    /// Indicates whether an enabled interrupt is pending.
    fn has_irq(&self) -> bool;

    fn set_ie(&mut self, r: InterruptRegister);
    fn get_ie(&self) -> InterruptRegister;
    fn set_if(&mut self, r: InterruptRegister);
    fn get_if(&self) -> InterruptRegister;
}

/// This enum defines the possible messages that can be sent from the
/// emulator to the frontend.
pub enum EmulatorMessage {
    Frame(FrameBuffer),
    Save(Option<Vec<u8>>),
}

/// This enum defines the possible messages that can be sent from the
/// frontend to the emulator.
pub enum FrontendMessage {
    Stop,
    Input { button: Button, pressed: bool },
    RequestSave,
}

/// Holds and manages the state of the whole emulator backend: the CPU and
/// the bus with every subsystem behind it. The CPU reports the master
/// cycles each step consumed and the bus fans them out to the PPU and
/// timer, keeping everything on the shared ~4.194 MHz clock.
pub struct Emulator {
    cpu: CPU,
    bus: MainBus,
    sender: Sender<EmulatorMessage>,
    receiver: Receiver<FrontendMessage>,
    is_running: bool,
}

impl Emulator {
    /// Creates a new `Emulator` instance in the post-boot state.
    pub fn new(
        sender: Sender<EmulatorMessage>,
        receiver: Receiver<FrontendMessage>,
        cartridge: Cartridge,
    ) -> Self {
        Self {
            cpu: CPU::post_boot(),
            bus: MainBus::with_cartridge(cartridge),
            sender,
            receiver,
            is_running: true,
        }
    }

    /// Builds the machine straight from a raw ROM image.
    pub fn load_rom(
        sender: Sender<EmulatorMessage>,
        receiver: Receiver<FrontendMessage>,
        rom: &[u8],
    ) -> EmuResult<Self> {
        let cartridge = Cartridge::try_from(Arc::from(rom.to_vec().into_boxed_slice()))?;
        Ok(Self::new(sender, receiver, cartridge))
    }

    /// Executes one instruction (or interrupt dispatch) and advances the
    /// rest of the machine by the cycles it consumed.
    pub fn step(&mut self) -> EmuResult<u16> {
        let cycles = self.cpu.step(&mut self.bus)?;
        self.bus.step(cycles);
        Ok(cycles)
    }

    /// Runs the machine for at least `cycles` master cycles.
    pub fn step_cycles(&mut self, cycles: u64) -> EmuResult<()> {
        let mut remaining = cycles as i64;
        while remaining > 0 {
            remaining -= i64::from(self.step()?);
        }
        Ok(())
    }

    /// Read-only view of the 160x144 ARGB frame, stable between VBlanks.
    #[inline]
    pub fn framebuffer(&self) -> &[u32] {
        self.bus.ppu.frame().as_slice()
    }

    /// Feeds a host button event into the joypad latch.
    #[inline]
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.bus.set_button(button, pressed);
    }

    /// Battery-backed RAM blob, `None` for cartridges without a battery.
    #[inline]
    pub fn save_ram(&self) -> Option<Vec<u8>> {
        self.bus.cartridge.save_ram()
    }

    /// Restores a previously saved battery RAM blob.
    #[inline]
    pub fn load_ram(&mut self, data: &[u8]) -> EmuResult<()> {
        self.bus.cartridge.load_ram(data)
    }

    /// Runs the emulator loop: one frame of emulation, ship it to the
    /// frontend, pace to the display rate, handle frontend messages.
    pub fn run(&mut self) {
        log::info!("Starting emulator with ROM: {}", self.bus.cartridge);
        let mut limiter = FrameLimiter::new(f64::from(DISPLAY_REFRESH_RATE));

        while self.is_running {
            self.handle_message();
            if let Err(error) = self.step_frame() {
                log::error!("Emulation aborted: {error}");
                break;
            }
            let frame = self.bus.ppu.frame().clone();
            if self.sender.send(EmulatorMessage::Frame(frame)).is_err() {
                // Frontend is gone, nothing left to do.
                break;
            }
            limiter.wait();
        }
    }

    /// Steps until the PPU finishes a frame. With the LCD disabled no
    /// VBlank ever comes, so a frame worth of cycles is the fallback.
    fn step_frame(&mut self) -> EmuResult<()> {
        let mut remaining = i64::from(CYCLES_PER_FRAME);
        while remaining > 0 {
            remaining -= i64::from(self.step()?);
            if self.bus.ppu.take_frame_complete() {
                break;
            }
        }
        Ok(())
    }

    /// Checks for a new `FrontendMessage` and handles it.
    fn handle_message(&mut self) {
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                FrontendMessage::Stop => self.is_running = false,
                FrontendMessage::Input { button, pressed } => {
                    self.bus.set_button(button, pressed);
                }
                FrontendMessage::RequestSave => {
                    let blob = self.bus.cartridge.save_ram();
                    self.sender.send(EmulatorMessage::Save(blob)).ok();
                }
            }
        }
    }
}

/// Limits the frame rate to the configured display refresh rate.
struct FrameLimiter {
    frame_duration: Duration,
    last_call: Instant,
}

impl FrameLimiter {
    #[inline]
    fn new(refresh_rate: f64) -> Self {
        Self {
            frame_duration: Duration::from_secs_f64(1.0 / refresh_rate),
            last_call: Instant::now(),
        }
    }

    /// Blocks the current thread until the allotted frame time has passed.
    fn wait(&mut self) {
        let elapsed = self.last_call.elapsed();
        if elapsed < self.frame_duration {
            spin_sleep::sleep(self.frame_duration - elapsed);
        }
        self.last_call = Instant::now();
    }
}

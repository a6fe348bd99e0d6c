use crate::gb::cartridge::Cartridge;
use crate::gb::joypad::Button;
use crate::gb::ppu::buffer::FrameBuffer;
use crate::gb::{Emulator, EmulatorMessage, FrontendMessage, SCREEN_HEIGHT, SCREEN_WIDTH};
use eframe::epaint::ColorImage;
use eframe::epaint::textures::TextureOptions;
use egui::{Color32, Key, Ui, Vec2};
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

/// Keyboard to joypad mapping.
const KEY_MAP: [(Key, Button); 8] = [
    (Key::ArrowRight, Button::Right),
    (Key::ArrowLeft, Button::Left),
    (Key::ArrowUp, Button::Up),
    (Key::ArrowDown, Button::Down),
    (Key::X, Button::A),
    (Key::Z, Button::B),
    (Key::Backspace, Button::Select),
    (Key::Enter, Button::Start),
];

/// A channel to communicate between the emulator and the frontend.
struct EmulatorChannel {
    sender: Sender<FrontendMessage>,
    receiver: Receiver<EmulatorMessage>,
}

/// Holds the emulation frontend that is responsible for the interaction
/// with the emulation backend running on its own thread.
pub struct EmulatorFrontend {
    thread: JoinHandle<()>,
    channel: EmulatorChannel,
    latest_frame: FrameBuffer,
    scale: usize,
    /// Pressed state per `KEY_MAP` entry, to only send transitions.
    key_state: [bool; 8],
}

impl EmulatorFrontend {
    /// Starts the emulator thread with the given cartridge.
    pub fn start(cartridge: Cartridge, scale: usize) -> Self {
        let (emulator_sender, emulator_receiver) = mpsc::channel();
        let (frontend_sender, frontend_receiver) = mpsc::channel();
        let thread = thread::spawn(move || {
            Emulator::new(emulator_sender, frontend_receiver, cartridge).run();
        });
        Self {
            thread,
            channel: EmulatorChannel {
                sender: frontend_sender,
                receiver: emulator_receiver,
            },
            latest_frame: FrameBuffer::default(),
            scale,
            key_state: [false; 8],
        }
    }

    /// Shuts the emulator down and returns its battery RAM, if any.
    pub fn shutdown(&self) -> Option<Vec<u8>> {
        self.channel.sender.send(FrontendMessage::RequestSave).ok();
        let save = loop {
            match self.channel.receiver.recv_timeout(Duration::from_millis(500)) {
                Ok(EmulatorMessage::Save(blob)) => break blob,
                Ok(EmulatorMessage::Frame(_)) => continue,
                Err(_) => break None,
            }
        };

        match self.channel.sender.send(FrontendMessage::Stop) {
            Ok(_) => log::info!("Stopping emulator ..."),
            Err(_) => log::warn!("Emulator is not running"),
        }
        while !self.thread.is_finished() {
            thread::sleep(Duration::from_millis(15));
        }
        save
    }

    /// Translates held keys into joypad transitions.
    fn handle_user_input(&mut self, ui: &Ui) {
        ui.input(|input| {
            for (index, (key, button)) in KEY_MAP.iter().enumerate() {
                let pressed = input.key_down(*key);
                if pressed != self.key_state[index] {
                    self.key_state[index] = pressed;
                    self.channel
                        .sender
                        .send(FrontendMessage::Input {
                            button: *button,
                            pressed,
                        })
                        .ok();
                }
            }
        });
    }

    /// Drains pending emulator messages, keeping the most recent frame.
    fn drain_messages(&mut self) {
        while let Ok(message) = self.channel.receiver.try_recv() {
            if let EmulatorMessage::Frame(frame) = message {
                self.latest_frame = frame;
            }
        }
    }

    /// Uploads the latest frame as a texture and draws it scaled.
    fn draw_screen(&self, ctx: &egui::Context, ui: &mut Ui) {
        let pixels = self
            .latest_frame
            .as_slice()
            .iter()
            .map(|&argb| {
                Color32::from_rgb((argb >> 16) as u8, (argb >> 8) as u8, argb as u8)
            })
            .collect();
        let image = ColorImage {
            size: [SCREEN_WIDTH as usize, SCREEN_HEIGHT as usize],
            pixels,
        };
        let texture = ctx.load_texture("frame", image, TextureOptions::NEAREST);
        let size = Vec2::new(
            (SCREEN_WIDTH as usize * self.scale) as f32,
            (SCREEN_HEIGHT as usize * self.scale) as f32,
        );
        ui.image((texture.id(), size));
        ctx.request_repaint();
    }

    /// Per-frame update: input, messages, screen.
    pub fn update(&mut self, ctx: &egui::Context, ui: &mut Ui) {
        self.handle_user_input(ui);
        self.drain_messages();
        self.draw_screen(ctx, ui);
    }
}

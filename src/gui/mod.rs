mod frontend;

use crate::gb::cartridge::Cartridge;
use crate::gb::error::EmuResult;
use crate::gui::frontend::EmulatorFrontend;
use eframe::egui;
use egui::{CentralPanel, Color32, Label, RichText, TopBottomPanel, Ui, Widget};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main application window: menu strip on top, emulator screen below.
pub struct DotMatrix {
    frontend: Option<EmulatorFrontend>,
    cartridge: Option<Cartridge>,
    save_path: Option<PathBuf>,
    scale: usize,
}

impl DotMatrix {
    pub fn new(rom: Option<PathBuf>, scale: usize) -> Self {
        let mut app = Self {
            frontend: None,
            cartridge: None,
            save_path: None,
            scale,
        };
        if let Some(path) = rom {
            match app.load_cartridge(&path) {
                Ok(()) => app.run(),
                Err(error) => log::error!("Failed to load {}: {error}", path.display()),
            }
        }
        app
    }

    /// Loads a cartridge from the given `Path` and restores its battery RAM
    /// from the sibling save file when present.
    fn load_cartridge(&mut self, path: &Path) -> EmuResult<()> {
        log::info!("Loading Cartridge: {}", path.display());
        let rom = fs::read(path)?;
        let mut cartridge = Cartridge::try_from(Arc::from(rom.into_boxed_slice()))?;

        let save_path = path.with_extension("sav");
        if let Ok(blob) = fs::read(&save_path) {
            match cartridge.load_ram(&blob) {
                Ok(()) => log::info!("Restored battery RAM from {}", save_path.display()),
                Err(error) => log::warn!("Ignoring save file: {error}"),
            }
        }

        self.save_path = Some(save_path);
        self.cartridge = Some(cartridge);
        Ok(())
    }

    /// Loads a cartridge using a file dialog.
    fn choose_cartridge(&mut self) {
        let dialog = rfd::FileDialog::new().add_filter("Game Boy ROM", &["gb"]);
        if let Some(path) = dialog.pick_file() {
            if let Err(error) = self.load_cartridge(&path) {
                log::error!("Failed to load {}: {error}", path.display());
            }
        }
    }

    /// Starts the emulator with the loaded cartridge.
    #[inline]
    fn run(&mut self) {
        if let Some(cartridge) = &self.cartridge {
            self.frontend = Some(EmulatorFrontend::start(cartridge.clone(), self.scale));
        }
    }

    /// Shuts down the emulator and persists its battery RAM.
    fn shutdown(&mut self) {
        let Some(frontend) = self.frontend.take() else {
            return;
        };
        let save = frontend.shutdown();
        if let (Some(blob), Some(path)) = (save, &self.save_path) {
            match fs::write(path, blob) {
                Ok(()) => log::info!("Battery RAM saved to {}", path.display()),
                Err(error) => log::error!("Failed to write save file: {error}"),
            }
        }
    }

    /// Draws the top panel of the main window.
    fn draw_top_panel(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            if ui.button("Load ROM").clicked() {
                self.shutdown();
                self.choose_cartridge();
                self.run();
            }
            ui.separator();
            if ui.button("Run").clicked() {
                self.shutdown();
                self.run();
            }
            if ui.button("Stop").clicked() {
                self.shutdown();
            }
            ui.separator();
            match &self.cartridge {
                Some(cartridge) => {
                    Label::new(RichText::new(format!("{cartridge}")).color(Color32::ORANGE))
                        .selectable(false)
                        .ui(ui);
                }
                None => {
                    Label::new("No ROM loaded").selectable(false).ui(ui);
                }
            }
        });
    }
}

impl eframe::App for DotMatrix {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        TopBottomPanel::top("top_panel").show(ctx, |ui| {
            self.draw_top_panel(ui);
        });
        CentralPanel::default().show(ctx, |ui| {
            if let Some(emulator) = &mut self.frontend {
                emulator.update(ctx, ui);
            }
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.shutdown();
    }
}

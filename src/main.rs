#[macro_use]
extern crate bitflags;

mod gb;
mod gui;

use crate::gb::{SCREEN_HEIGHT, SCREEN_WIDTH};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Cycle-accurate DMG emulator")]
struct Args {
    /// Path of the ROM to load; a file dialog is available in the window
    rom: Option<PathBuf>,

    /// Integer scale factor for the emulator screen
    #[arg(short, long, default_value_t = 3)]
    scale: usize,
}

fn main() -> eframe::Result {
    env_logger::init();
    let args = Args::parse();

    let width = (SCREEN_WIDTH as usize * args.scale) as f32;
    let height = (SCREEN_HEIGHT as usize * args.scale) as f32 + 32.0;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([width, height]),
        ..Default::default()
    };

    eframe::run_native(
        "dotmatrix",
        options,
        Box::new(move |_cc| Ok(Box::new(gui::DotMatrix::new(args.rom, args.scale)))),
    )
}

use std::collections::HashMap;

use log::info;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;

use crate::controller::ControllerState;
use crate::nes::Nes;

/// Drives an sdl2 window at 3x scale, running one emulated frame per vsync
/// and feeding keyboard state back into the controller port.
pub fn run(mut nes: Nes) {
    let sdl_context = sdl2::init().unwrap();
    let video_subsystem = sdl_context.video().unwrap();
    let window = video_subsystem
        .window("nesette", (256.0 * 3.0) as u32, (240.0 * 3.0) as u32)
        .position_centered()
        .build()
        .unwrap();

    let mut canvas = window.into_canvas().present_vsync().build().unwrap();
    let mut event_pump = sdl_context.event_pump().unwrap();
    canvas.set_scale(3.0, 3.0).unwrap();

    let creator = canvas.texture_creator();
    let mut texture = creator
        .create_texture_target(PixelFormatEnum::RGB24, 256, 240)
        .unwrap();

    let mut key_map = HashMap::new();
    key_map.insert(Keycode::A, ControllerState::A);
    key_map.insert(Keycode::S, ControllerState::B);
    key_map.insert(Keycode::Q, ControllerState::SELECT);
    key_map.insert(Keycode::W, ControllerState::START);
    key_map.insert(Keycode::Up, ControllerState::UP);
    key_map.insert(Keycode::Down, ControllerState::DOWN);
    key_map.insert(Keycode::Left, ControllerState::LEFT);
    key_map.insert(Keycode::Right, ControllerState::RIGHT);

    let mut rgb_buffer = [0u8; 3 * 256 * 240];

    info!("screen: entering main loop");
    loop {
        nes.run_frame();

        if nes.ppu.take_frame_ready() {
            for (i, &pixel) in nes.ppu.pixels().iter().enumerate() {
                rgb_buffer[i * 3] = (pixel >> 16) as u8;
                rgb_buffer[i * 3 + 1] = (pixel >> 8) as u8;
                rgb_buffer[i * 3 + 2] = pixel as u8;
            }
            texture.update(None, &rgb_buffer, 256 * 3).unwrap();
            canvas.copy(&texture, None, None).unwrap();
            canvas.present();
        }

        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => std::process::exit(0),
                Event::KeyDown { keycode: Some(keycode), .. } => {
                    if let Some(key) = key_map.get(&keycode) {
                        nes.update_controller(*key, true);
                    }
                }
                Event::KeyUp { keycode: Some(keycode), .. } => {
                    if let Some(key) = key_map.get(&keycode) {
                        nes.update_controller(*key, false);
                    }
                }
                _ => {}
            }
        }
    }
}

use crate::cartridge::Cartridge;
use crate::controller::{Controller, ControllerState};
use crate::cpu::Cpu;
use crate::error::CartridgeError;
use crate::ppu::Ppu;

/// Owns the whole console: CPU, PPU, cartridge, and the single controller
/// port this core models. `run_frame` is the entry point a display driver
/// calls once per vsync.
pub struct Nes {
    pub cpu: Cpu,
    pub ppu: Ppu,
    pub cart: Cartridge,
    pub controller: Controller,
}

impl Nes {
    pub fn new(cart: Cartridge) -> Self {
        let mut ppu = Ppu::new();
        ppu.set_mirroring(cart.mirroring());
        let mut nes = Nes {
            cpu: Cpu::new(),
            ppu,
            cart,
            controller: Controller::new(),
        };
        nes.cpu.reset(&mut nes.ppu, &mut nes.cart, &mut nes.controller);
        nes
    }

    pub fn load(path: &str) -> Result<Self, CartridgeError> {
        Ok(Self::new(Cartridge::load(path)?))
    }

    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.ppu, &mut self.cart, &mut self.controller);
    }

    pub fn update_controller(&mut self, key: ControllerState, pressed: bool) {
        self.controller.controller_state.set(key, pressed);
    }

    /// Runs CPU cycles until a full frame's worth of PPU dots have been
    /// produced; the caller reads `self.ppu.pixels()` afterward.
    pub fn run_frame(&mut self) {
        self.cpu.run_frame(&mut self.ppu, &mut self.cart, &mut self.controller);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cart() -> Cartridge {
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(b"NES\x1A");
        data[4] = 2;
        data[5] = 1;
        data.resize(data.len() + 2 * 0x4000, 0);
        data.resize(data.len() + 0x2000, 0);
        Cartridge::from_bytes(&data, false).unwrap()
    }

    #[test]
    fn new_resets_pc_from_vector() {
        let nes = Nes::new(test_cart());
        assert_eq!(nes.cpu.pc, 0);
    }

    #[test]
    fn run_frame_advances_without_panicking() {
        let mut nes = Nes::new(test_cart());
        nes.run_frame();
    }
}

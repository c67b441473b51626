mod mapper0;
mod mapper1;
mod mapper3;
mod mapper4;

use log::info;

use crate::error::CartridgeError;

pub use mapper0::Mapper0;
pub use mapper1::Mapper1;
pub use mapper3::Mapper3;
pub use mapper4::Mapper4;

const HEADER_SIZE: usize = 16;

/// Nametable mirroring mode reported by a cartridge/mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

/// Bank layout a mapper computes; shared by every mapper so the CPU/PPU-facing
/// read/write paths stay branch-free after the cartridge dispatches to one.
#[derive(Debug, Clone, Copy, Default)]
pub struct BankMap {
    pub prg: [u32; 4],
    pub chr: [u32; 8],
}

impl BankMap {
    /// `map_prg(page_kb, slot, bank)`: negative banks count from the end.
    fn map_prg(&mut self, prg_size: u32, page_kb: u32, slot: u32, bank: i32) {
        let bank = if bank < 0 {
            (prg_size / (1024 * page_kb)) as i32 + bank
        } else {
            bank
        };
        let bank = bank as u32;
        for i in 0..(page_kb / 8) {
            let idx = ((page_kb / 8) * slot + i) as usize;
            self.prg[idx] = (page_kb * 1024 * bank + 0x2000 * i) % prg_size;
        }
    }

    fn map_chr(&mut self, chr_size: u32, page_kb: u32, slot: u32, bank: u32) {
        for i in 0..page_kb {
            let idx = (page_kb * slot + i) as usize;
            self.chr[idx] = (page_kb * 1024 * bank + 0x400 * i) % chr_size.max(1);
        }
    }
}

/// Cartridge-internal bank-switching logic. One of the four concrete mappers
/// implements this; the cartridge owns the boxed trait object and never
/// branches on mapper id outside of load-time dispatch.
pub trait Mapper: std::fmt::Debug {
    fn read(&self, prg: &[u8], prg_ram: &[u8], addr: u16) -> u8;
    fn write(&mut self, prg_ram: &mut [u8], addr: u16, value: u8);
    fn read_chr(&self, chr: &[u8], addr: u16) -> u8;
    fn write_chr(&mut self, chr: &mut [u8], addr: u16, value: u8);
    fn mirroring(&self) -> Mirroring;
    /// Called once per visible scanline at PPU dot 260 while rendering is enabled.
    fn signal_scanline(&mut self) {}
    /// True if the mapper wants the CPU IRQ line asserted; does not clear it.
    fn irq_pending(&self) -> bool {
        false
    }
    /// Whether `$6000-$7FFF` writes land in PRG-RAM. NROM has none wired up
    /// and ignores writes to that window; every other mapper here does.
    fn has_prg_ram(&self) -> bool {
        true
    }
}

/// A loaded iNES ROM plus its mapper, ready to answer CPU/PPU bus traffic.
pub struct Cartridge {
    prg: Vec<u8>,
    chr: Vec<u8>,
    prg_ram: Vec<u8>,
    chr_is_ram: bool,
    mapper: Box<dyn Mapper>,
    mapper_id: u8,
    /// Sticky flag: the loaded path names the nestest conformance ROM, which
    /// forces the CPU reset vector override to $C000.
    nes_test: bool,
}

impl std::fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cartridge")
            .field("mapper_id", &self.mapper_id)
            .field("prg_len", &self.prg.len())
            .field("chr_len", &self.chr.len())
            .field("nes_test", &self.nes_test)
            .finish()
    }
}

impl Cartridge {
    /// Parse an iNES v1 image already read into memory (see [`Cartridge::load`]
    /// for the file-reading entry point).
    pub fn from_bytes(data: &[u8], nes_test: bool) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_SIZE {
            return Err(CartridgeError::ShortHeader);
        }
        let header = &data[0..HEADER_SIZE];
        if &header[0..4] != b"NES\x1A" {
            return Err(CartridgeError::BadMagic);
        }
        if header[7] & 0x0C == 0x08 {
            return Err(CartridgeError::Ines2NotSupported);
        }

        let prg_size = (header[4] as u32) * 0x4000;
        let chr_rom_size = (header[5] as u32) * 0x2000;
        let chr_is_ram = chr_rom_size == 0;
        let chr_size = if chr_is_ram { 0x2000 } else { chr_rom_size };
        let trainer = (header[6] >> 3) & 1 == 1;
        let mapper_id = (header[7] & 0xF0) | (header[6] >> 4);
        let prg_ram_size = header[8].max(1) as usize * 0x2000;

        let prg_start = HEADER_SIZE + if trainer { 512 } else { 0 };
        let prg_end = prg_start + prg_size as usize;
        let chr_end = prg_end + chr_rom_size as usize;
        if data.len() < prg_end || (!chr_is_ram && data.len() < chr_end) {
            return Err(CartridgeError::ShortBody);
        }

        let prg = data[prg_start..prg_end].to_vec();
        let chr = if chr_is_ram {
            vec![0u8; chr_size as usize]
        } else {
            data[prg_end..chr_end].to_vec()
        };

        let vertical = header[6] & 0x01 == 1;
        let mapper: Box<dyn Mapper> = match mapper_id {
            0 => Box::new(Mapper0::new(prg_size, chr_size, vertical)),
            1 => Box::new(Mapper1::new(prg_size, chr_size, vertical)),
            3 => Box::new(Mapper3::new(prg_size, chr_size, header[4], vertical)),
            4 => Box::new(Mapper4::new(prg_size, chr_size)),
            other => return Err(CartridgeError::UnsupportedMapper(other)),
        };

        info!(
            "cartridge: mapper {}, PRG {} bytes, CHR {} bytes ({}), trainer {}, PRG-RAM {} bytes",
            mapper_id,
            prg_size,
            chr_size,
            if chr_is_ram { "RAM" } else { "ROM" },
            trainer,
            prg_ram_size
        );

        Ok(Cartridge {
            prg,
            chr,
            prg_ram: vec![0u8; prg_ram_size],
            chr_is_ram,
            mapper,
            mapper_id,
            nes_test,
        })
    }

    /// Read, parse, and validate an iNES ROM file from disk.
    pub fn load(path: &str) -> Result<Self, CartridgeError> {
        info!("cartridge: loading {}", path);
        let data = std::fs::read(path)?;
        let nes_test = path.contains("nestest.nes");
        Self::from_bytes(&data, nes_test)
    }

    pub fn nes_test(&self) -> bool {
        self.nes_test
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mapper.mirroring()
    }

    pub fn mapper_id(&self) -> u8 {
        self.mapper_id
    }

    /// CPU-facing read: $6000-$7FFF is PRG-RAM, $8000-$FFFF is banked PRG.
    pub fn read(&self, addr: u16) -> u8 {
        if (0x6000..0x8000).contains(&addr) {
            let idx = (addr - 0x6000) as usize;
            return *self.prg_ram.get(idx).unwrap_or(&0);
        }
        self.mapper.read(&self.prg, &self.prg_ram, addr)
    }

    /// CPU-facing write: PRG-RAM is read/write (mapper permitting); $8000+
    /// routes to mapper registers. NROM has no PRG-RAM wired up and ignores
    /// writes to $6000-$7FFF entirely.
    pub fn write(&mut self, addr: u16, value: u8) {
        if self.mapper.has_prg_ram() && (0x6000..0x8000).contains(&addr) {
            let idx = (addr - 0x6000) as usize;
            if let Some(slot) = self.prg_ram.get_mut(idx) {
                *slot = value;
            }
            return;
        }
        self.mapper.write(&mut self.prg_ram, addr, value);
    }

    /// PPU-facing pattern table read, $0000-$1FFF.
    pub fn read_chr(&self, addr: u16) -> u8 {
        self.mapper.read_chr(&self.chr, addr)
    }

    /// PPU-facing pattern table write; only meaningful for CHR-RAM cartridges.
    pub fn write_chr(&mut self, addr: u16, value: u8) {
        if !self.chr_is_ram {
            return;
        }
        self.mapper.write_chr(&mut self.chr, addr, value);
    }

    /// Called by the PPU once per visible scanline at dot 260 while rendering.
    pub fn signal_scanline(&mut self) {
        self.mapper.signal_scanline();
    }

    pub fn irq_pending(&self) -> bool {
        self.mapper.irq_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ines_header(prg_banks: u8, chr_banks: u8, flags6: u8, flags7: u8) -> Vec<u8> {
        let mut header = vec![0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(b"NES\x1A");
        header[4] = prg_banks;
        header[5] = chr_banks;
        header[6] = flags6;
        header[7] = flags7;
        header
    }

    fn build_rom(prg_banks: u8, chr_banks: u8, flags6: u8, flags7: u8) -> Vec<u8> {
        let mut data = ines_header(prg_banks, chr_banks, flags6, flags7);
        data.resize(data.len() + prg_banks as usize * 0x4000, 0xEA);
        data.resize(data.len() + chr_banks as usize * 0x2000, 0);
        data
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = build_rom(1, 1, 0, 0);
        data[0] = b'X';
        assert!(matches!(
            Cartridge::from_bytes(&data, false),
            Err(CartridgeError::BadMagic)
        ));
    }

    #[test]
    fn rejects_ines2() {
        let data = build_rom(1, 1, 0, 0x08);
        assert!(matches!(
            Cartridge::from_bytes(&data, false),
            Err(CartridgeError::Ines2NotSupported)
        ));
    }

    #[test]
    fn rejects_unsupported_mapper() {
        // mapper id 2 (UxROM) is not implemented by this core.
        let data = build_rom(1, 1, 0x20, 0);
        assert!(matches!(
            Cartridge::from_bytes(&data, false),
            Err(CartridgeError::UnsupportedMapper(2))
        ));
    }

    #[test]
    fn mapper0_16k_prg_mirrors_to_both_halves() {
        let data = build_rom(1, 1, 0, 0);
        let cart = Cartridge::from_bytes(&data, false).unwrap();
        assert_eq!(cart.read(0x8000), cart.read(0xC000));
        // write to PRG is a no-op for mapper 0.
        let mut cart = cart;
        cart.write(0x9000, 0x42);
        assert_eq!(cart.read(0x9000), 0xEA);
    }

    #[test]
    fn nestest_flag_set_from_path() {
        assert!(!Cartridge::from_bytes(&build_rom(1, 1, 0, 0), false)
            .unwrap()
            .nes_test());
        assert!(Cartridge::from_bytes(&build_rom(1, 1, 0, 0), true)
            .unwrap()
            .nes_test());
    }

    use proptest::prelude::*;

    proptest! {
        /// `map_prg` must only ever produce byte offsets inside the PRG image,
        /// no matter which bank a mapper asks for.
        #[test]
        fn map_prg_stays_in_bounds(prg_banks in 1u32..8, page_choice in 0u32..3, bank in -1i32..8) {
            let page_kb = [8u32, 16, 32][page_choice as usize];
            let prg_size = prg_banks * 0x4000;
            // page size must divide the image evenly for a well-formed mapper.
            prop_assume!(prg_size % (page_kb * 1024) == 0);
            let mut banks = BankMap::default();
            banks.map_prg(prg_size, page_kb, 0, bank);
            for &offset in banks.prg.iter().take((page_kb / 8) as usize) {
                prop_assert!(offset < prg_size);
            }
        }

        /// `map_chr` must only ever produce byte offsets inside the CHR image.
        #[test]
        fn map_chr_stays_in_bounds(chr_banks in 1u32..8, page_choice in 0u32..4, bank in 0u32..16) {
            let page_kb = [1u32, 2, 4, 8][page_choice as usize];
            let chr_size = chr_banks * 0x2000;
            prop_assume!(chr_size % (page_kb * 1024) == 0);
            let mut banks = BankMap::default();
            banks.map_chr(chr_size, page_kb, 0, bank);
            for &offset in banks.chr.iter().take(page_kb as usize) {
                prop_assert!(offset < chr_size);
            }
        }
    }
}

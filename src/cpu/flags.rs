use bitflags::bitflags;

bitflags! {
    /// The 6502 processor status register. `UNUSED` is always read back as 1;
    /// `BREAK` only ever exists in the copy pushed to the stack.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuFlags: u8 {
        const CARRY       = 0b0000_0001;
        const ZERO        = 0b0000_0010;
        const INT_DISABLE = 0b0000_0100;
        const DECIMAL     = 0b0000_1000;
        const BREAK       = 0b0001_0000;
        const UNUSED      = 0b0010_0000;
        const OVERFLOW    = 0b0100_0000;
        const NEGATIVE    = 0b1000_0000;
    }
}

impl CpuFlags {
    pub fn set_zero(&mut self, result: u8) {
        self.set(CpuFlags::ZERO, result == 0);
    }

    pub fn set_negative(&mut self, result: u8) {
        self.set(CpuFlags::NEGATIVE, result & 0x80 != 0);
    }

    pub fn set_zero_negative(&mut self, result: u8) {
        self.set_zero(result);
        self.set_negative(result);
    }
}

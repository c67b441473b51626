/// The 6502's addressing modes. `resolve` (in `cpu::mod`) turns one of these,
/// plus the bytes following an opcode, into an effective address and a
/// page-crossed flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implicit,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Relative,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
}

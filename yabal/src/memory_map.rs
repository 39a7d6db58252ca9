//! Compile-time constants describing the machine's memory-mapped devices and default layout.
//!
//! None of this is configurable at runtime — there is no configuration loader, only these
//! compiled-in defaults, which the linker and the `yabal` CLI both assume.

use crate::symbols::Bank;

/// Total addressable program memory, in words, for bank 0.
pub const DEFAULT_PROGRAM_SIZE: u16 = 0xEF6E;

/// Number of stack slots reserved by default when no function bodies are present yet and the
/// exact high-water mark isn't known ahead of time; grown on demand by the builder.
pub const DEFAULT_STACK_SLOTS: u16 = 16;

/// Bank holding the memory-mapped display, keyboard and mouse devices.
pub const DEVICE_BANK: Bank = 1;

pub const SCREEN_ADDRESS: u16 = 0xD26F;
pub const CHARACTER_BUFFER_ADDRESS: u16 = 0xD12A;
pub const KEYBOARD_ADDRESS: u16 = 0xD0FC;
pub const MOUSE_ADDRESS: u16 = 0xD0FD;

/// Initial value of the stack pointer for a program with `stack_slots` stack-resident variable
/// slots: the stack grows down from the top of program memory, reserving one word per slot plus
/// one word for the saved return address of the outermost call.
pub fn initial_stack_pointer(stack_slots: u16) -> u16 {
    DEFAULT_PROGRAM_SIZE.wrapping_sub(1 + stack_slots.wrapping_mul(16))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_stack_pointer_matches_documented_formula() {
        assert_eq!(
            initial_stack_pointer(DEFAULT_STACK_SLOTS) as u32,
            0xEF6Eu32 - (1 + DEFAULT_STACK_SLOTS as u32 * 16)
        );
    }
}

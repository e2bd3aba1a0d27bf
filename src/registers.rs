//! Register map for the stackable I/O expansion card.
//!
//! The card exposes all of its peripherals through a flat byte-addressed
//! register file. Per-channel register groups are laid out contiguously:
//! `base + (channel - 1) * width`, where `width` is the on-wire size of one
//! channel's value (1, 2, or 4 bytes).

// ---------------------------------------------------------------------------
// Bus addressing
// ---------------------------------------------------------------------------

/// Base 7-bit bus address of stack level 0. Each jumper-selected stack level
/// adds its level number to this.
pub const DEFAULT_ADDRESS: u8 = 0x28;

/// Highest selectable stack level (eight cards per bus).
pub const STACK_LEVEL_MAX: u8 = 7;

/// Resolve a stack level to the card's 7-bit bus address.
///
/// Out-of-range levels are clamped, never rejected: the card at the nearest
/// valid level answers instead.
pub fn hardware_address(stack: u8) -> u8 {
    DEFAULT_ADDRESS + stack.min(STACK_LEVEL_MAX)
}

// ---------------------------------------------------------------------------
// Relay registers
// ---------------------------------------------------------------------------

/// Full 8-relay output mask, read/write.
pub const RELAY_VALUE: u8 = 0;

/// Write a 1-based relay number here to close that relay.
pub const RELAY_SET: u8 = 1;

/// Write a 1-based relay number here to open that relay.
pub const RELAY_CLEAR: u8 = 2;

// ---------------------------------------------------------------------------
// Opto-isolated input registers
// ---------------------------------------------------------------------------

/// 8-channel opto input mask, bit = channel - 1.
pub const OPTO_VALUE: u8 = 3;

/// Rising-edge count-enable mask, bit = channel - 1.
pub const OPTO_RISING_ENABLE: u8 = 56;

/// Falling-edge count-enable mask, bit = channel - 1.
pub const OPTO_FALLING_ENABLE: u8 = 57;

/// Write a 1-based channel number here to zero that channel's edge counter.
pub const OPTO_COUNT_RESET: u8 = 60;

/// Base of the per-channel edge counters (signed 32-bit little-endian,
/// 4 bytes per channel).
pub const OPTO_EDGE_COUNT: u8 = 128;

// ---------------------------------------------------------------------------
// Analog registers
// ---------------------------------------------------------------------------

/// Base of the ADC readings (signed 16-bit little-endian millivolts,
/// 2 bytes per channel).
pub const ADC_MILLIVOLTS: u8 = 24;

/// Base of the 0-10V output targets (16-bit little-endian millivolts,
/// 2 bytes per channel).
pub const VOLTAGE_OUT: u8 = 40;

/// Base of the open-drain PWM duty targets (16-bit little-endian,
/// hundredths of a percent, 2 bytes per channel).
pub const PWM_DUTY: u8 = 48;

// ---------------------------------------------------------------------------
// Channel counts
// ---------------------------------------------------------------------------

/// Number of relays on the card.
pub const RELAY_COUNT: u8 = 8;

/// Number of opto-isolated inputs (and edge counters).
pub const OPTO_COUNT: u8 = 8;

/// Number of 0-10V analog inputs.
pub const ADC_COUNT: u8 = 8;

/// Number of 0-10V analog outputs.
pub const DAC_COUNT: u8 = 4;

/// Number of open-drain PWM outputs.
pub const PWM_COUNT: u8 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_of_stack_zero_is_base() {
        assert_eq!(hardware_address(0), 0x28);
    }

    #[test]
    fn address_of_top_stack_level() {
        assert_eq!(hardware_address(7), 0x2F);
    }

    #[test]
    fn address_clamps_excess_stack_levels() {
        assert_eq!(hardware_address(8), 0x2F);
        assert_eq!(hardware_address(99), 0x2F);
    }
}

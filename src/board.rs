//! High-level interface for the stackable I/O expansion card.
//!
//! [`IoPlus`] wraps the low-level register bus with stack-level addressing,
//! channel clamping, value scaling, and the edge-counter configuration
//! cache.

use embedded_hal_async::i2c::I2c;

use crate::driver::RegisterBus;
use crate::error::IoPlusError;
use crate::registers::{
    hardware_address, ADC_COUNT, ADC_MILLIVOLTS, DAC_COUNT, OPTO_COUNT, OPTO_COUNT_RESET,
    OPTO_EDGE_COUNT, OPTO_FALLING_ENABLE, OPTO_RISING_ENABLE, OPTO_VALUE, PWM_COUNT, PWM_DUTY,
    RELAY_CLEAR, RELAY_COUNT, RELAY_SET, RELAY_VALUE, VOLTAGE_OUT,
};

/// Clamp into `[0, max]`, treating NaN as 0.
fn clamp_range(value: f64, max: f64) -> f64 {
    if !(value > 0.0) {
        0.0
    } else if value > max {
        max
    } else {
        value
    }
}

/// Round a non-negative scaled value half-up to the on-wire word.
fn scale_word(value: f64, factor: f64) -> u16 {
    (value * factor + 0.5) as u16
}

/// High-level interface for one bus of stackable I/O expansion cards.
///
/// One instance owns the port and serves up to eight cards, selected per
/// call by stack level (0–7, clamped). Out-of-range channels are clamped
/// into their valid range rather than rejected; the strict validation of
/// dynamic host requests lives in [`dispatch`](crate::dispatch).
///
/// # Example
///
/// ```ignore
/// use ioplus_driver::IoPlus;
///
/// // `i2c` is any `embedded-hal-async` I2C implementation
/// let mut board = IoPlus::new(i2c);
///
/// // Close relay 3 on the card at stack level 0
/// board.set_relay(0, 3, true).await?;
///
/// // Read analog input 1 in volts
/// let volts = board.read_voltage_in(0, 1).await?;
/// ```
pub struct IoPlus<I2C> {
    bus: RegisterBus<I2C>,
    /// Channel whose edge-enable bits were reconciled last, across all
    /// stack levels. `None` until the first counter read.
    last_configured_channel: Option<u8>,
}

impl<I2C> IoPlus<I2C>
where
    I2C: I2c,
{
    /// Create a new card interface.
    ///
    /// # Arguments
    /// * `i2c` — I2C peripheral (takes ownership for exclusive access)
    pub fn new(i2c: I2C) -> Self {
        Self {
            bus: RegisterBus::new(i2c),
            last_configured_channel: None,
        }
    }

    /// Release the underlying bus handle.
    pub fn release(self) -> I2C {
        self.bus.release()
    }

    // -----------------------------------------------------------------------
    // Relays
    // -----------------------------------------------------------------------

    /// Close or open a single relay.
    ///
    /// The card interprets a 1-based relay number written to its set/clear
    /// register, so this is always a single-byte transaction; the other
    /// seven relays are untouched.
    ///
    /// # Arguments
    /// * `stack` — stack level (0–7, clamped)
    /// * `relay` — relay number (1–8, clamped)
    /// * `on` — `true` closes the relay, `false` opens it
    ///
    /// # Errors
    /// * [`IoPlusError::I2c`] on communication failure
    pub async fn set_relay(
        &mut self,
        stack: u8,
        relay: u8,
        on: bool,
    ) -> Result<(), IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        let relay = relay.clamp(1, RELAY_COUNT);
        let reg = if on { RELAY_SET } else { RELAY_CLEAR };
        self.bus.write_u8(address, reg, relay).await
    }

    /// Overwrite all eight relays at once with a bitmask (bit = relay - 1).
    pub async fn write_relays(
        &mut self,
        stack: u8,
        mask: u8,
    ) -> Result<(), IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        self.bus.write_u8(address, RELAY_VALUE, mask).await
    }

    /// Read back the current state of all eight relays as a bitmask.
    pub async fn read_relays(&mut self, stack: u8) -> Result<u8, IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        self.bus.read_u8(address, RELAY_VALUE).await
    }

    /// Read back whether a single relay is currently closed.
    pub async fn relay_is_on(
        &mut self,
        stack: u8,
        relay: u8,
    ) -> Result<bool, IoPlusError<I2C::Error>> {
        let relay = relay.clamp(1, RELAY_COUNT);
        let mask = self.read_relays(stack).await?;
        Ok(mask & (1 << (relay - 1)) != 0)
    }

    // -----------------------------------------------------------------------
    // Analog I/O
    // -----------------------------------------------------------------------

    /// Read a 0-10V analog input, in volts.
    ///
    /// The card reports signed little-endian millivolts.
    ///
    /// # Arguments
    /// * `stack` — stack level (0–7, clamped)
    /// * `channel` — input channel (1–8, clamped)
    ///
    /// # Errors
    /// * [`IoPlusError::I2c`] on communication failure
    pub async fn read_voltage_in(
        &mut self,
        stack: u8,
        channel: u8,
    ) -> Result<f64, IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        let channel = channel.clamp(1, ADC_COUNT);
        let reg = ADC_MILLIVOLTS + (channel - 1) * 2;
        let millivolts = self.bus.read_i16_le(address, reg).await?;
        Ok(f64::from(millivolts) / 1000.0)
    }

    /// Set a 0-10V analog output, in volts.
    ///
    /// `volts` is clamped into `[0, 10]` and written as little-endian
    /// millivolts, rounded.
    ///
    /// # Arguments
    /// * `stack` — stack level (0–7, clamped)
    /// * `channel` — output channel (1–4, clamped)
    pub async fn write_voltage_out(
        &mut self,
        stack: u8,
        channel: u8,
        volts: f64,
    ) -> Result<(), IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        let channel = channel.clamp(1, DAC_COUNT);
        let reg = VOLTAGE_OUT + (channel - 1) * 2;
        let word = scale_word(clamp_range(volts, 10.0), 1000.0);
        self.bus.write_u16_le(address, reg, word).await
    }

    /// Set an open-drain PWM output's duty cycle, in percent.
    ///
    /// `percent` is clamped into `[0, 100]` and written in hundredths of a
    /// percent, rounded.
    ///
    /// # Arguments
    /// * `stack` — stack level (0–7, clamped)
    /// * `channel` — output channel (1–4, clamped)
    pub async fn write_pwm(
        &mut self,
        stack: u8,
        channel: u8,
        percent: f64,
    ) -> Result<(), IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        let channel = channel.clamp(1, PWM_COUNT);
        let reg = PWM_DUTY + (channel - 1) * 2;
        let word = scale_word(clamp_range(percent, 100.0), 100.0);
        self.bus.write_u16_le(address, reg, word).await
    }

    // -----------------------------------------------------------------------
    // Opto-isolated inputs
    // -----------------------------------------------------------------------

    /// Read all eight opto inputs as a raw bitmask (bit = channel - 1).
    pub async fn read_opto(&mut self, stack: u8) -> Result<u8, IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        self.bus.read_u8(address, OPTO_VALUE).await
    }

    /// Read a single opto input.
    ///
    /// # Arguments
    /// * `stack` — stack level (0–7, clamped)
    /// * `channel` — input channel (1–8, clamped)
    pub async fn read_opto_channel(
        &mut self,
        stack: u8,
        channel: u8,
    ) -> Result<bool, IoPlusError<I2C::Error>> {
        let channel = channel.clamp(1, OPTO_COUNT);
        let mask = self.read_opto(stack).await?;
        Ok(mask & (1 << (channel - 1)) != 0)
    }

    // -----------------------------------------------------------------------
    // Edge counters
    // -----------------------------------------------------------------------

    /// Read a channel's hardware edge counter, reconciling the card's
    /// edge-enable configuration first when needed.
    ///
    /// The card counts transitions on each opto input into a device-resident
    /// signed 32-bit counter, gated by two global enable masks (rising and
    /// falling). Before reading the counter this method brings the channel's
    /// two enable bits in line with `rising`/`falling` — but only when the
    /// requested channel differs from the one configured by the previous
    /// call. Repeat reads of the same channel skip the two configuration
    /// reads and go straight to the counter, on the assumption that nothing
    /// else rewrote the enable masks in between.
    ///
    /// Reconfiguration is best-effort per edge: a failure while reconciling
    /// one enable mask does not stop the other mask or the counter read from
    /// being attempted. If the counter read itself fails, that error is
    /// returned; otherwise the first reconciliation failure (if any) is.
    ///
    /// # Arguments
    /// * `stack` — stack level (0–7, clamped)
    /// * `channel` — counter channel (1–8, clamped)
    /// * `rising` — count rising edges on this channel
    /// * `falling` — count falling edges on this channel
    ///
    /// # Errors
    /// * [`IoPlusError::I2c`] on communication failure
    pub async fn read_edge_counter(
        &mut self,
        stack: u8,
        channel: u8,
        rising: bool,
        falling: bool,
    ) -> Result<i32, IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        let channel = channel.clamp(1, OPTO_COUNT);

        let mut reconcile_failure = None;
        if self.last_configured_channel != Some(channel) {
            if let Err(e) = self
                .reconcile_enable(address, OPTO_RISING_ENABLE, channel, rising)
                .await
            {
                reconcile_failure = Some(e);
            }
            if let Err(e) = self
                .reconcile_enable(address, OPTO_FALLING_ENABLE, channel, falling)
                .await
            {
                reconcile_failure.get_or_insert(e);
            }
            // The channel counts as configured even when a reconcile step
            // failed; the next read for it will not retry.
            self.last_configured_channel = Some(channel);
        }

        let reg = OPTO_EDGE_COUNT + (channel - 1) * 4;
        match (self.bus.read_i32_le(address, reg).await, reconcile_failure) {
            (Err(e), _) => Err(e),
            (Ok(_), Some(e)) => Err(e),
            (Ok(count), None) => Ok(count),
        }
    }

    /// Zero a channel's hardware edge counter.
    pub async fn reset_edge_counter(
        &mut self,
        stack: u8,
        channel: u8,
    ) -> Result<(), IoPlusError<I2C::Error>> {
        let address = hardware_address(stack);
        let channel = channel.clamp(1, OPTO_COUNT);
        self.bus.write_u8(address, OPTO_COUNT_RESET, channel).await
    }

    /// Bring one enable mask's bit for `channel` in line with `wanted`,
    /// writing the mask back only on mismatch.
    async fn reconcile_enable(
        &mut self,
        address: u8,
        reg: u8,
        channel: u8,
        wanted: bool,
    ) -> Result<(), IoPlusError<I2C::Error>> {
        let current = self.bus.read_u8(address, reg).await?;
        let bit = 1u8 << (channel - 1);
        if (current & bit != 0) == wanted {
            return Ok(());
        }
        let next = if wanted { current | bit } else { current & !bit };
        #[cfg(feature = "defmt")]
        defmt::trace!("edge enable reg {=u8}: rewrite {=u8:x} -> {=u8:x}", reg, current, next);
        self.bus.write_u8(address, reg, next).await
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = 0x28;

    fn board(expectations: &[I2cTransaction]) -> IoPlus<I2cMock> {
        IoPlus::new(I2cMock::new(expectations))
    }

    // ── Relays ───────────────────────────────────────────────────────

    #[test]
    fn relay_on_writes_relay_number_to_set_register() {
        let expectations = [I2cTransaction::write(ADDR, vec![RELAY_SET, 3])];
        let mut board = board(&expectations);

        block_on(board.set_relay(0, 3, true)).unwrap();

        board.release().done();
    }

    #[test]
    fn relay_off_writes_relay_number_to_clear_register() {
        let expectations = [I2cTransaction::write(ADDR, vec![RELAY_CLEAR, 3])];
        let mut board = board(&expectations);

        block_on(board.set_relay(0, 3, false)).unwrap();

        board.release().done();
    }

    #[test]
    fn relay_number_is_clamped() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![RELAY_SET, 8]),
            I2cTransaction::write(ADDR, vec![RELAY_CLEAR, 1]),
        ];
        let mut board = board(&expectations);

        block_on(board.set_relay(0, 12, true)).unwrap();
        block_on(board.set_relay(0, 0, false)).unwrap();

        board.release().done();
    }

    #[test]
    fn relay_mask_overwrites_value_register() {
        let expectations = [I2cTransaction::write(ADDR, vec![RELAY_VALUE, 200])];
        let mut board = board(&expectations);

        block_on(board.write_relays(0, 200)).unwrap();

        board.release().done();
    }

    #[test]
    fn relay_readback_tests_the_channel_bit() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![RELAY_VALUE], vec![0b0000_0100]),
            I2cTransaction::write_read(ADDR, vec![RELAY_VALUE], vec![0b0000_0100]),
        ];
        let mut board = board(&expectations);

        assert!(block_on(board.relay_is_on(0, 3)).unwrap());
        assert!(!block_on(board.relay_is_on(0, 2)).unwrap());

        board.release().done();
    }

    #[test]
    fn stack_level_selects_bus_address() {
        let expectations = [
            I2cTransaction::write(0x2B, vec![RELAY_SET, 1]),
            I2cTransaction::write(0x2F, vec![RELAY_SET, 1]),
        ];
        let mut board = board(&expectations);

        block_on(board.set_relay(3, 1, true)).unwrap();
        // Stack levels beyond 7 address the top card.
        block_on(board.set_relay(99, 1, true)).unwrap();

        board.release().done();
    }

    // ── Analog I/O ───────────────────────────────────────────────────

    #[test]
    fn voltage_in_decodes_little_endian_millivolts() {
        let expectations = [I2cTransaction::write_read(
            ADDR,
            vec![ADC_MILLIVOLTS],
            vec![0xE8, 0x03],
        )];
        let mut board = board(&expectations);

        let volts = block_on(board.read_voltage_in(0, 1)).unwrap();
        assert_eq!(volts, 1.0);

        board.release().done();
    }

    #[test]
    fn voltage_in_channel_offsets_by_two_bytes() {
        let expectations = [I2cTransaction::write_read(
            ADDR,
            vec![ADC_MILLIVOLTS + 14],
            vec![0x00, 0x00],
        )];
        let mut board = board(&expectations);

        let volts = block_on(board.read_voltage_in(0, 8)).unwrap();
        assert_eq!(volts, 0.0);

        board.release().done();
    }

    #[test]
    fn voltage_out_encodes_millivolt_word() {
        // 10000 mV = [0x10, 0x27] little-endian
        let expectations = [I2cTransaction::write(ADDR, vec![VOLTAGE_OUT, 0x10, 0x27])];
        let mut board = board(&expectations);

        block_on(board.write_voltage_out(0, 1, 10.0)).unwrap();

        board.release().done();
    }

    #[test]
    fn voltage_out_clamps_over_range_to_ten_volts() {
        let expectations = [I2cTransaction::write(ADDR, vec![VOLTAGE_OUT, 0x10, 0x27])];
        let mut board = board(&expectations);

        block_on(board.write_voltage_out(0, 1, 11.0)).unwrap();

        board.release().done();
    }

    #[test]
    fn pwm_encodes_hundredths_of_a_percent() {
        // 50% = 5000 = [0x88, 0x13], channel 2 sits one word up
        let expectations = [I2cTransaction::write(ADDR, vec![PWM_DUTY + 2, 0x88, 0x13])];
        let mut board = board(&expectations);

        block_on(board.write_pwm(0, 2, 50.0)).unwrap();

        board.release().done();
    }

    #[test]
    fn pwm_clamps_negative_duty_to_zero() {
        let expectations = [I2cTransaction::write(ADDR, vec![PWM_DUTY, 0x00, 0x00])];
        let mut board = board(&expectations);

        block_on(board.write_pwm(0, 1, -5.0)).unwrap();

        board.release().done();
    }

    // ── Opto inputs ──────────────────────────────────────────────────

    #[test]
    fn opto_channel_tests_the_right_bit() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![OPTO_VALUE], vec![0b0000_0101]),
            I2cTransaction::write_read(ADDR, vec![OPTO_VALUE], vec![0b0000_0101]),
            I2cTransaction::write_read(ADDR, vec![OPTO_VALUE], vec![0b0000_0101]),
        ];
        let mut board = board(&expectations);

        assert!(block_on(board.read_opto_channel(0, 1)).unwrap());
        assert!(!block_on(board.read_opto_channel(0, 2)).unwrap());
        assert!(block_on(board.read_opto_channel(0, 3)).unwrap());

        board.release().done();
    }

    #[test]
    fn opto_raw_read_returns_the_whole_mask() {
        let expectations = [I2cTransaction::write_read(
            ADDR,
            vec![OPTO_VALUE],
            vec![0b0000_0101],
        )];
        let mut board = board(&expectations);

        assert_eq!(block_on(board.read_opto(0)).unwrap(), 5);

        board.release().done();
    }

    // ── Edge counters ────────────────────────────────────────────────

    #[test]
    fn counter_read_reconfigures_then_decodes_little_endian() {
        let expectations = [
            // Rising bit for channel 1 is clear but wanted: set it.
            I2cTransaction::write_read(ADDR, vec![OPTO_RISING_ENABLE], vec![0b0000_0000]),
            I2cTransaction::write(ADDR, vec![OPTO_RISING_ENABLE, 0b0000_0001]),
            // Falling bit already clear and unwanted: no write.
            I2cTransaction::write_read(ADDR, vec![OPTO_FALLING_ENABLE], vec![0b0000_0000]),
            I2cTransaction::write_read(ADDR, vec![OPTO_EDGE_COUNT], vec![0x0A, 0, 0, 0]),
        ];
        let mut board = board(&expectations);

        let count = block_on(board.read_edge_counter(0, 1, true, false)).unwrap();
        assert_eq!(count, 10);

        board.release().done();
    }

    #[test]
    fn counter_decodes_twos_complement() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![OPTO_RISING_ENABLE], vec![0b0000_0001]),
            I2cTransaction::write_read(ADDR, vec![OPTO_FALLING_ENABLE], vec![0b0000_0001]),
            I2cTransaction::write_read(
                ADDR,
                vec![OPTO_EDGE_COUNT],
                vec![0xFF, 0xFF, 0xFF, 0xFF],
            ),
        ];
        let mut board = board(&expectations);

        let count = block_on(board.read_edge_counter(0, 1, true, true)).unwrap();
        assert_eq!(count, -1);

        board.release().done();
    }

    #[test]
    fn repeat_reads_of_one_channel_reconfigure_once() {
        let expectations = [
            // First call: reconcile both masks, then read.
            I2cTransaction::write_read(ADDR, vec![OPTO_RISING_ENABLE], vec![0b0000_0001]),
            I2cTransaction::write_read(ADDR, vec![OPTO_FALLING_ENABLE], vec![0b0000_0000]),
            I2cTransaction::write_read(ADDR, vec![OPTO_EDGE_COUNT], vec![1, 0, 0, 0]),
            // Second call, same channel: straight to the counter.
            I2cTransaction::write_read(ADDR, vec![OPTO_EDGE_COUNT], vec![2, 0, 0, 0]),
        ];
        let mut board = board(&expectations);

        assert_eq!(block_on(board.read_edge_counter(0, 1, true, false)).unwrap(), 1);
        assert_eq!(block_on(board.read_edge_counter(0, 1, true, false)).unwrap(), 2);

        board.release().done();
    }

    #[test]
    fn channel_change_reconfigures_even_with_unchanged_flags() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![OPTO_RISING_ENABLE], vec![0b0000_0001]),
            I2cTransaction::write_read(ADDR, vec![OPTO_FALLING_ENABLE], vec![0b0000_0000]),
            I2cTransaction::write_read(ADDR, vec![OPTO_EDGE_COUNT], vec![1, 0, 0, 0]),
            // New channel: both masks are checked again, rising gains bit 1.
            I2cTransaction::write_read(ADDR, vec![OPTO_RISING_ENABLE], vec![0b0000_0001]),
            I2cTransaction::write(ADDR, vec![OPTO_RISING_ENABLE, 0b0000_0011]),
            I2cTransaction::write_read(ADDR, vec![OPTO_FALLING_ENABLE], vec![0b0000_0000]),
            I2cTransaction::write_read(ADDR, vec![OPTO_EDGE_COUNT + 4], vec![2, 0, 0, 0]),
        ];
        let mut board = board(&expectations);

        assert_eq!(block_on(board.read_edge_counter(0, 1, true, false)).unwrap(), 1);
        assert_eq!(block_on(board.read_edge_counter(0, 2, true, false)).unwrap(), 2);

        board.release().done();
    }

    #[test]
    fn disabling_an_edge_clears_the_bit() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![OPTO_RISING_ENABLE], vec![0b0000_0101]),
            I2cTransaction::write(ADDR, vec![OPTO_RISING_ENABLE, 0b0000_0100]),
            I2cTransaction::write_read(ADDR, vec![OPTO_FALLING_ENABLE], vec![0b0000_0001]),
            I2cTransaction::write_read(ADDR, vec![OPTO_EDGE_COUNT], vec![0, 0, 0, 0]),
        ];
        let mut board = board(&expectations);

        block_on(board.read_edge_counter(0, 1, false, true)).unwrap();

        board.release().done();
    }

    #[test]
    fn reconcile_failure_does_not_block_the_counter_read() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![OPTO_RISING_ENABLE], vec![0])
                .with_error(ErrorKind::Other),
            // Falling mask is still reconciled and the counter still read.
            I2cTransaction::write_read(ADDR, vec![OPTO_FALLING_ENABLE], vec![0b0000_0001]),
            I2cTransaction::write_read(ADDR, vec![OPTO_EDGE_COUNT], vec![7, 0, 0, 0]),
        ];
        let mut board = board(&expectations);

        let result = block_on(board.read_edge_counter(0, 1, true, true));
        assert_eq!(result, Err(IoPlusError::I2c(ErrorKind::Other)));

        let cache = board.last_configured_channel;
        board.release().done();

        // The failed attempt still marks the channel configured: the next
        // read goes straight to the counter.
        let expectations = [I2cTransaction::write_read(
            ADDR,
            vec![OPTO_EDGE_COUNT],
            vec![7, 0, 0, 0],
        )];
        let mut board = IoPlus {
            bus: RegisterBus::new(I2cMock::new(&expectations)),
            last_configured_channel: cache,
        };
        assert_eq!(block_on(board.read_edge_counter(0, 1, true, true)).unwrap(), 7);

        board.release().done();
    }

    #[test]
    fn counter_reset_writes_the_channel_number() {
        let expectations = [I2cTransaction::write(ADDR, vec![OPTO_COUNT_RESET, 4])];
        let mut board = board(&expectations);

        block_on(board.reset_edge_counter(0, 4)).unwrap();

        board.release().done();
    }

    // ── Scaling helpers ──────────────────────────────────────────────

    #[test]
    fn scale_word_rounds_half_up() {
        assert_eq!(scale_word(1.0004, 1000.0), 1000);
        assert_eq!(scale_word(1.0005, 1000.0), 1001);
        assert_eq!(scale_word(0.0, 1000.0), 0);
    }

    #[test]
    fn clamp_range_handles_nan() {
        assert_eq!(clamp_range(f64::NAN, 10.0), 0.0);
        assert_eq!(clamp_range(-1.0, 10.0), 0.0);
        assert_eq!(clamp_range(11.0, 10.0), 10.0);
        assert_eq!(clamp_range(4.5, 10.0), 4.5);
    }
}

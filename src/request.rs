//! Host boundary: dynamic request records and command dispatch.
//!
//! Host automation frameworks hand this driver loosely typed values — a
//! field may be missing, a number, a boolean, or text that happens to spell
//! a number. [`Payload`] models that value, [`PayloadSource`] models where a
//! handler's value comes from (a static literal, a named request field, or
//! nothing), and [`dispatch`] turns a [`Request`] plus a [`Command`] into a
//! typed call on [`IoPlus`], validating fields before any bus transaction.
//!
//! The caller resolves the [`PayloadSource`] into [`Request::value`] up
//! front, so the dispatch path only ever sees concrete values.

use embedded_hal_async::i2c::I2c;

use crate::board::IoPlus;
use crate::error::{Field, IoPlusError};
use crate::registers::{ADC_COUNT, DAC_COUNT, OPTO_COUNT, PWM_COUNT, RELAY_COUNT, STACK_LEVEL_MAX};

/// A loosely typed value carried by a host request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'a> {
    /// Missing or explicitly empty.
    Null,
    Bool(bool),
    Number(f64),
    Text(&'a str),
}

impl<'a> Payload<'a> {
    /// Numeric view: numbers pass through (NaN is rejected), text is parsed,
    /// booleans and null are not numeric.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Payload::Number(n) if !n.is_nan() => Some(n),
            Payload::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Integer view of [`as_number`](Self::as_number), truncated toward zero.
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number().map(|n| n as i64)
    }

    /// Whether this value means "switch off" for a relay: null, `false`,
    /// zero, or the literal text `"off"`. Anything else means "switch on".
    pub fn is_off(&self) -> bool {
        match *self {
            Payload::Null | Payload::Bool(false) => true,
            Payload::Number(n) => n == 0.0,
            Payload::Text(s) => s == "off",
            Payload::Bool(true) => false,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Payload::Null)
    }
}

/// Where a handler's value comes from.
///
/// Resolved by the caller before dispatch, so handlers only ever receive a
/// concrete [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadSource<'a> {
    /// A literal configured up front.
    Static(Payload<'a>),
    /// A named field of the inbound request.
    FromRequestField(&'a str),
    /// No value configured.
    None,
}

impl<'a> PayloadSource<'a> {
    /// Resolve against a request.
    ///
    /// # Errors
    /// * [`IoPlusError::PayloadEvaluation`] when a referenced field is absent
    pub fn resolve<E>(&self, request: &Request<'a>) -> Result<Payload<'a>, IoPlusError<E>> {
        match *self {
            PayloadSource::Static(payload) => Ok(payload),
            PayloadSource::FromRequestField(name) => request
                .field(name)
                .ok_or(IoPlusError::PayloadEvaluation),
            PayloadSource::None => Ok(Payload::Null),
        }
    }
}

/// One inbound host request.
///
/// `stack`, `channel`, and `value` are the addressing and payload fields
/// every handler consumes; `fields` carries any further named values a
/// [`PayloadSource::FromRequestField`] may reference.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub stack: Payload<'a>,
    pub channel: Payload<'a>,
    pub value: Payload<'a>,
    pub fields: &'a [(&'a str, Payload<'a>)],
}

impl<'a> Request<'a> {
    /// Look up an extra named field.
    pub fn field(&self, name: &str) -> Option<Payload<'a>> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|&(_, payload)| payload)
    }
}

impl Default for Request<'_> {
    fn default() -> Self {
        Self {
            stack: Payload::Null,
            channel: Payload::Null,
            value: Payload::Null,
            fields: &[],
        }
    }
}

/// The operation a request asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Switch one relay by the truthiness of the value, or overwrite all
    /// eight when the relay index is 0 (value must then be 0–255).
    SetRelay,
    /// Read a 0-10V analog input.
    ReadVoltageIn,
    /// Write a 0-10V analog output.
    WriteVoltageOut,
    /// Write a PWM duty cycle in percent.
    WritePwm,
    /// Read the opto inputs: one channel as a level, or the raw mask when
    /// the channel is 0.
    ReadOpto,
    /// Read a hardware edge counter, reconciling the enable masks first.
    ReadEdgeCounter { rising: bool, falling: bool },
    /// Zero a hardware edge counter.
    ResetEdgeCounter,
}

/// The value a successful request produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// A write completed; nothing to report.
    Written,
    Voltage(f64),
    Level(bool),
    Mask(u8),
    Count(i32),
}

/// Validate a request and execute a command against the board.
///
/// Field validation happens before any bus transaction: a request that fails
/// here has no side effects. Out-of-range but numeric stack, channel, and
/// relay values are clamped silently rather than rejected.
///
/// # Errors
/// * [`IoPlusError::InvalidField`] naming the offending field
/// * [`IoPlusError::I2c`] on communication failure
pub async fn dispatch<I2C>(
    board: &mut IoPlus<I2C>,
    command: Command,
    request: &Request<'_>,
) -> Result<Outcome, IoPlusError<I2C::Error>>
where
    I2C: I2c,
{
    let stack = parse_stack(request.stack)?;
    match command {
        Command::SetRelay => {
            let relay = parse_index(request.channel, Field::Relay, 0, i64::from(RELAY_COUNT))?;
            if relay == 0 {
                let mask = parse_mask(request.value)?;
                board.write_relays(stack, mask).await?;
            } else {
                board.set_relay(stack, relay, !request.value.is_off()).await?;
            }
            Ok(Outcome::Written)
        }
        Command::ReadVoltageIn => {
            let channel = parse_index(request.channel, Field::Channel, 1, i64::from(ADC_COUNT))?;
            let volts = board.read_voltage_in(stack, channel).await?;
            Ok(Outcome::Voltage(volts))
        }
        Command::WriteVoltageOut => {
            let channel = parse_index(request.channel, Field::Channel, 1, i64::from(DAC_COUNT))?;
            let volts = parse_number(request.value)?;
            board.write_voltage_out(stack, channel, volts).await?;
            Ok(Outcome::Written)
        }
        Command::WritePwm => {
            let channel = parse_index(request.channel, Field::Channel, 1, i64::from(PWM_COUNT))?;
            let percent = parse_number(request.value)?;
            board.write_pwm(stack, channel, percent).await?;
            Ok(Outcome::Written)
        }
        Command::ReadOpto => {
            let channel = parse_index(request.channel, Field::Channel, 0, i64::from(OPTO_COUNT))?;
            if channel == 0 {
                Ok(Outcome::Mask(board.read_opto(stack).await?))
            } else {
                Ok(Outcome::Level(board.read_opto_channel(stack, channel).await?))
            }
        }
        Command::ReadEdgeCounter { rising, falling } => {
            let channel = parse_index(request.channel, Field::Channel, 1, i64::from(OPTO_COUNT))?;
            let count = board.read_edge_counter(stack, channel, rising, falling).await?;
            Ok(Outcome::Count(count))
        }
        Command::ResetEdgeCounter => {
            let channel = parse_index(request.channel, Field::Channel, 1, i64::from(OPTO_COUNT))?;
            board.reset_edge_counter(stack, channel).await?;
            Ok(Outcome::Written)
        }
    }
}

/// A missing stack level means level 0; anything numeric clamps into range.
fn parse_stack<E>(payload: Payload) -> Result<u8, IoPlusError<E>> {
    if payload.is_missing() {
        return Ok(0);
    }
    match payload.as_integer() {
        Some(level) => Ok(level.clamp(0, i64::from(STACK_LEVEL_MAX)) as u8),
        None => Err(IoPlusError::InvalidField(Field::Stack)),
    }
}

fn parse_index<E>(
    payload: Payload,
    field: Field,
    min: i64,
    max: i64,
) -> Result<u8, IoPlusError<E>> {
    match payload.as_integer() {
        Some(index) => Ok(index.clamp(min, max) as u8),
        None => Err(IoPlusError::InvalidField(field)),
    }
}

/// Full relay masks are range-checked, never clamped.
fn parse_mask<E>(payload: Payload) -> Result<u8, IoPlusError<E>> {
    match payload.as_integer() {
        Some(mask @ 0..=255) => Ok(mask as u8),
        _ => Err(IoPlusError::InvalidField(Field::Payload)),
    }
}

fn parse_number<E>(payload: Payload) -> Result<f64, IoPlusError<E>> {
    payload
        .as_number()
        .ok_or(IoPlusError::InvalidField(Field::Payload))
}

// ── Tests ────────────────────────────────────────────────────────────────

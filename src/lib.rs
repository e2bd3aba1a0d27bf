//! Async driver for stackable I2C I/O expansion cards.
//!
//! Each card carries 8 relays, 8 opto-isolated inputs with hardware edge
//! counters, 8 analog 0-10V inputs, 4 analog 0-10V outputs, and 4 open-drain
//! PWM outputs, all behind a flat byte-addressed register map. Up to eight
//! cards stack on one bus; a jumper-selected stack level (0-7) offsets the
//! base address `0x28`.
//!
//! # Architecture
//!
//! The crate is split into three layers:
//!
//! - **`driver`** (crate-private) — Low-level register bus primitives that
//!   handle offset addressing and little-endian encoding.
//! - **[`IoPlus`]** — Typed, validated API per peripheral group, including
//!   the stateful edge-counter read with its lazy enable-mask
//!   reconciliation.
//! - **[`dispatch`]** — Host boundary for loosely typed request records:
//!   field validation, silent range clamping, and value-source resolution
//!   via [`PayloadSource`].
//!
//! # Quick start
//!
//! ```ignore
//! use ioplus_driver::IoPlus;
//!
//! // Construct with any `embedded-hal-async` I2C implementation. The
//! // driver owns the port; `&mut` access serializes all transactions.
//! let mut board = IoPlus::new(i2c);
//!
//! // Close relay 2 on the card at stack level 1
//! board.set_relay(1, 2, true).await?;
//!
//! // Count rising edges on opto input 3
//! let count = board.read_edge_counter(1, 3, true, false).await?;
//!
//! // Hand the port back when done
//! let i2c = board.release();
//! ```
//!
//! # Features
//!
//! - **`defmt`** — Enable [`defmt::Format`] on error types and trace output
//!   for edge-enable reconfiguration.

#![cfg_attr(not(test), no_std)]

pub use board::IoPlus;
pub use error::{Field, IoPlusError};
pub use registers::{hardware_address, DEFAULT_ADDRESS, STACK_LEVEL_MAX};
pub use request::{dispatch, Command, Outcome, Payload, PayloadSource, Request};

mod board;
mod driver;
mod error;
mod registers;
mod request;

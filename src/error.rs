//! Error types for the expansion card driver.

use core::fmt;

/// Request field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Stack level selector.
    Stack,
    /// Channel index.
    Channel,
    /// Relay index.
    Relay,
    /// The value carried by the request.
    Payload,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Stack => "stack",
            Field::Channel => "channel",
            Field::Relay => "relay",
            Field::Payload => "payload",
        }
    }
}

/// Errors that can occur when driving the expansion card.
#[derive(Debug, PartialEq)]
pub enum IoPlusError<E> {
    /// Underlying I2C bus error.
    I2c(E),

    /// A request field is missing or not a number where one is required.
    /// Raised before any bus transaction is issued.
    InvalidField(Field),

    /// The configured value source referenced a request field that is absent.
    PayloadEvaluation,
}

// Allow ergonomic `?` propagation from raw I2C errors.
impl<E> From<E> for IoPlusError<E> {
    fn from(error: E) -> Self {
        IoPlusError::I2c(error)
    }
}

impl<E: fmt::Debug> fmt::Display for IoPlusError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IoPlusError::I2c(e) => write!(f, "I2C error: {:?}", e),
            IoPlusError::InvalidField(field) => {
                write!(f, "{} value is missing or incorrect", field.name())
            }
            IoPlusError::PayloadEvaluation => write!(f, "payload source could not be resolved"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: defmt::Format> defmt::Format for IoPlusError<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            IoPlusError::I2c(e) => defmt::write!(f, "I2C error: {}", e),
            IoPlusError::InvalidField(field) => {
                defmt::write!(f, "{} value is missing or incorrect", field.name())
            }
            IoPlusError::PayloadEvaluation => {
                defmt::write!(f, "payload source could not be resolved")
            }
        }
    }
}

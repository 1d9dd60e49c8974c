//! Message discriminator for the save channel.
//!
//! ```text
//! ┌────────────────┬──────────────────────────────────────┐
//! │ Type (1 byte)  │ Payload                              │
//! ├────────────────┼──────────────────────────────────────┤
//! │ 0 ConnectionTest │ none                               │
//! │ 1 SaveUpdate     │ [u32 BE length][save bytes]        │
//! └────────────────┴──────────────────────────────────────┘
//! ```
//!
//! Any other byte is a protocol violation.

use crate::error::{Error, Result};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TcpMessage {
    /// Keep-alive, no payload
    ConnectionTest = 0,
    /// A framed save blob follows
    SaveUpdate = 1,
}

impl TcpMessage {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Write just the discriminator byte.
    pub fn write_to<W: Write>(self, w: &mut W) -> Result<()> {
        w.write_all(&[self.as_byte()])?;
        Ok(())
    }
}

impl TryFrom<u8> for TcpMessage {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(TcpMessage::ConnectionTest),
            1 => Ok(TcpMessage::SaveUpdate),
            other => Err(Error::UnknownMessage(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;

    #[test]
    fn test_known_discriminators() {
        assert_eq!(TcpMessage::try_from(0).unwrap(), TcpMessage::ConnectionTest);
        assert_eq!(TcpMessage::try_from(1).unwrap(), TcpMessage::SaveUpdate);
        assert_eq!(TcpMessage::SaveUpdate.as_byte(), 1);
    }

    #[test]
    fn test_unknown_discriminator_is_protocol_fault() {
        let err = TcpMessage::try_from(7).unwrap_err();
        assert!(matches!(err, Error::UnknownMessage(7)));
        assert_eq!(err.fault(), Fault::Protocol);
    }
}

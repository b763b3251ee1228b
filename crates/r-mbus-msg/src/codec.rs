//! ---
//! mbus_section: "02-messaging-ipc-data-model"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message entity and gateway wire codec."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
//! Gateway wire envelope:
//!
//! ```text
//! [0xA1 0x60]                      2-byte fixed header
//! [u32, big-endian]                total envelope size, header included
//! [u32, big-endian]                property count
//! (key NUL value NUL)*             UTF-8 property pairs
//! [u32, big-endian]                content length
//! [bytes]                          content
//! ```
//!
//! The smallest legal envelope is 14 bytes: header, size, zero properties,
//! zero-length content.

use crate::types::{Message, Properties};
use crate::{MessageError, Result};

/// Fixed two-byte envelope header.
pub const HEADER: [u8; 2] = [0xA1, 0x60];

/// Size of an envelope with no properties and no content.
pub const MIN_WIRE_SIZE: usize = 14;

pub(crate) fn encode(message: &Message) -> Result<Vec<u8>> {
    let content = message.content();
    let properties = message.properties();

    let mut property_bytes = 0usize;
    for (key, value) in properties {
        if key.as_bytes().contains(&0) || value.as_bytes().contains(&0) {
            return Err(MessageError::EmbeddedNul);
        }
        property_bytes += key.len() + 1 + value.len() + 1;
    }

    let total = 2 + 4 + 4 + property_bytes + 4 + content.len();
    let total_size = u32::try_from(total).map_err(|_| MessageError::TooLarge)?;
    let property_count = u32::try_from(properties.len()).map_err(|_| MessageError::TooLarge)?;
    let content_size = u32::try_from(content.len()).map_err(|_| MessageError::TooLarge)?;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&HEADER);
    out.extend_from_slice(&total_size.to_be_bytes());
    out.extend_from_slice(&property_count.to_be_bytes());
    for (key, value) in properties {
        out.extend_from_slice(key.as_bytes());
        out.push(0);
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }
    out.extend_from_slice(&content_size.to_be_bytes());
    out.extend_from_slice(content);
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Message> {
    if bytes.len() < MIN_WIRE_SIZE {
        return Err(MessageError::Truncated);
    }
    if bytes[..2] != HEADER {
        return Err(MessageError::InvalidHeader);
    }

    let mut reader = Reader {
        bytes,
        position: 2,
    };

    let declared = reader.read_u32()?;
    if declared as usize != bytes.len() {
        return Err(MessageError::SizeMismatch {
            declared,
            actual: bytes.len(),
        });
    }

    let property_count = reader.read_u32()?;
    let mut properties = Properties::new();
    for _ in 0..property_count {
        let key = reader.read_nul_terminated()?;
        let value = reader.read_nul_terminated()?;
        properties.insert(key.to_string(), value.to_string());
    }

    let content_length = reader.read_u32()? as usize;
    let content = reader.read_exact(content_length)?;
    if !reader.is_empty() {
        return Err(MessageError::SizeMismatch {
            declared,
            actual: bytes.len(),
        });
    }

    Ok(Message::new(content.to_vec(), properties))
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.read_exact(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_exact(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(length)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(MessageError::Truncated)?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_nul_terminated(&mut self) -> Result<&'a str> {
        let remaining = &self.bytes[self.position..];
        let nul = remaining
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(MessageError::UnterminatedProperty)?;
        let text = std::str::from_utf8(&remaining[..nul])?;
        self.position += nul + 1;
        Ok(text)
    }

    fn is_empty(&self) -> bool {
        self.position == self.bytes.len()
    }
}

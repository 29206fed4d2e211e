//! What a handled command sends back

use crate::error::Result;
use crate::pipeline::ImageFrame;
use crate::protocol::{write_header, write_packet, write_response, CommandHeader};
use std::fmt;
use std::io::Write;

/// Pixel bytes of a frame, cut to the size advertised in the header
#[derive(Clone)]
pub struct PixelPacket {
    frame: ImageFrame,
    len: usize,
}

impl PixelPacket {
    pub fn new(frame: ImageFrame, advertised: usize) -> Self {
        let len = advertised.min(frame.pixels().len());
        Self { frame, len }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.frame.pixels()[..self.len]
    }
}

impl fmt::Debug for PixelPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelPacket").field("len", &self.len).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Response {
    /// SET commands are never acknowledged
    Silent,
    /// Request header echoed with its size set to the payload length
    Reply {
        header: CommandHeader,
        payload: Vec<u8>,
    },
    /// Optional bare header followed by a raw pixel packet
    Image {
        header: Option<CommandHeader>,
        pixels: Option<PixelPacket>,
    },
    /// Raw packet with no header
    Packet(Vec<u8>),
}

impl Response {
    /// Zero-size echo of `request`
    pub fn empty(request: &CommandHeader) -> Self {
        Self::reply(*request, Vec::new())
    }

    pub fn reply(header: CommandHeader, payload: Vec<u8>) -> Self {
        Response::Reply { header, payload }
    }

    /// Size reported in the reply header, if any
    pub fn payload_size(&self) -> Option<usize> {
        match self {
            Response::Reply { payload, .. } => Some(payload.len()),
            Response::Image {
                header: Some(_), ..
            } => Some(0),
            _ => None,
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        match self {
            Response::Silent => Ok(()),
            Response::Reply { header, payload } => write_response(out, header, payload),
            Response::Image { header, pixels } => {
                if let Some(header) = header {
                    write_header(out, &header.reply(0))?;
                }
                if let Some(pixels) = pixels {
                    write_packet(out, pixels.bytes())?;
                }
                Ok(())
            }
            Response::Packet(bytes) => write_packet(out, bytes),
        }
    }
}

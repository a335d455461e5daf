//! Non-blocking per-peer connection with incremental frame buffering
//! (§4.2, §4.5). Bytes accumulate in a read buffer; a frame is only
//! handed to [`bitc_core::wire::Message::decode_frame`] once its
//! declared length says the whole thing has arrived, so a short read
//! never gets misread as a protocol violation.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::net::SocketAddr;

use bitc_core::config::Network;
use bitc_core::wire::Message;
use mio::net::TcpStream;
use mio::{Interest, Token};

use crate::error::Result;

const READ_CHUNK: usize = 16 * 1024;

/// Offset of the little-endian payload-length field within a frame:
/// 4 bytes magic + 12 bytes command.
const LENGTH_FIELD_OFFSET: usize = 16;
/// magic + command + length + checksum.
const FRAME_HEADER_LEN: usize = 24;

pub struct Connection {
    pub stream: TcpStream,
    pub token: Token,
    pub addr: SocketAddr,
    read_buf: Vec<u8>,
    write_queue: VecDeque<Vec<u8>>,
    write_offset: usize,
}

impl Connection {
    pub fn connect(addr: SocketAddr, token: Token) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Connection { stream, token, addr, read_buf: Vec::new(), write_queue: VecDeque::new(), write_offset: 0 })
    }

    pub fn from_stream(stream: TcpStream, addr: SocketAddr, token: Token) -> Self {
        Connection { stream, token, addr, read_buf: Vec::new(), write_queue: VecDeque::new(), write_offset: 0 }
    }

    /// The readiness interests the reactor should watch for; writable
    /// is only requested while a queued write hasn't fully drained.
    pub fn interests(&self) -> Interest {
        if self.write_queue.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    pub fn queue_message(&mut self, message: &Message, network: Network) -> io::Result<()> {
        let frame = message.encode_frame(network)?;
        self.write_queue.push_back(frame);
        Ok(())
    }

    /// Flushes as much of the queued writes as the socket accepts
    /// without blocking. Call again on the next writable event.
    pub fn flush_writes(&mut self) -> io::Result<()> {
        while let Some(front) = self.write_queue.front() {
            match self.stream.write(&front[self.write_offset..]) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "connection closed mid-write")),
                Ok(n) => {
                    self.write_offset += n;
                    if self.write_offset == front.len() {
                        self.write_queue.pop_front();
                        self.write_offset = 0;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Returns the byte length of the next complete frame at the front
    /// of the buffer, or `None` if it hasn't fully arrived yet.
    fn next_frame_len(&self) -> Option<usize> {
        if self.read_buf.len() < FRAME_HEADER_LEN {
            return None;
        }
        let length_bytes: [u8; 4] = self.read_buf[LENGTH_FIELD_OFFSET..LENGTH_FIELD_OFFSET + 4].try_into().unwrap();
        let payload_len = u32::from_le_bytes(length_bytes) as usize;
        let total = FRAME_HEADER_LEN + payload_len;
        (self.read_buf.len() >= total).then_some(total)
    }

    /// Reads whatever the socket currently offers without blocking,
    /// then pulls out every complete frame now available.
    pub fn read_messages(&mut self, network: Network) -> Result<Vec<Message>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed connection").into()),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        let mut messages = Vec::new();
        while let Some(frame_len) = self.next_frame_len() {
            let mut cursor = Cursor::new(&self.read_buf[..frame_len]);
            let message = Message::decode_frame(&mut cursor, network)?;
            self.read_buf.drain(..frame_len);
            messages.push(message);
        }
        Ok(messages)
    }
}

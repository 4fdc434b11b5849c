//! ExtMCU transport.
//!
//! The attached microcontroller's transport is, by design, a single
//! synchronous "push image, get success/fail" call — wire framing beyond
//! that is not this agent's concern. [`ExtMcu`] names the two operations
//! the Worker needs; [`SerialExtMcu`] is a minimal placeholder built over
//! any `Read + Write` transport (a serial port in production).

use std::io::{self, Read, Write};

/// The two calls the Worker makes into the attached microcontroller.
pub trait ExtMcu: Send + Sync {
    /// Currently installed firmware version on the ExtMCU.
    fn get_version(&self) -> u32;

    /// Pushes the local `ota.bin` into the ExtMCU. Returns `true` on
    /// success, `false` on any failure — the caller does not distinguish
    /// failure causes.
    fn download(&self, image: &mut dyn Read) -> bool;
}

/// A thin placeholder transport over a serial-like duplex stream.
///
/// Framing is intentionally minimal (one version query, one bulk image
/// push) since the real wire protocol is out of scope for this agent.
pub struct SerialExtMcu<T> {
    transport: std::sync::Mutex<T>,
}

impl<T: Read + Write> SerialExtMcu<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: std::sync::Mutex::new(transport),
        }
    }

    fn query_version(&self) -> io::Result<u32> {
        let mut transport = self.transport.lock().unwrap();
        transport.write_all(b"V?\n")?;
        let mut reply = [0u8; 4];
        transport.read_exact(&mut reply)?;
        Ok(u32::from_le_bytes(reply))
    }

    fn push_image(&self, image: &mut dyn Read) -> io::Result<()> {
        let mut transport = self.transport.lock().unwrap();
        transport.write_all(b"D\n")?;
        io::copy(image, &mut *transport)?;
        let mut ack = [0u8; 1];
        transport.read_exact(&mut ack)?;
        if ack[0] == 1 {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "extmcu nacked image"))
        }
    }
}

impl<T: Read + Write + Send> ExtMcu for SerialExtMcu<T> {
    fn get_version(&self) -> u32 {
        self.query_version().unwrap_or_else(|e| {
            log::warn!("extmcu: version query failed: {e}");
            0
        })
    }

    fn download(&self, image: &mut dyn Read) -> bool {
        match self.push_image(image) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("extmcu: download failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn serial_extmcu_round_trips_version_and_image() {
        // Fake transport: version reply 1 (LE), then accept the image push.
        let reply = [1u8, 0, 0, 0];
        let mut script = Vec::new();
        script.extend_from_slice(&reply);
        script.push(1); // ack for the push

        struct Loopback {
            read_buf: Cursor<Vec<u8>>,
            written: Vec<u8>,
        }
        impl Read for Loopback {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.read_buf.read(buf)
            }
        }
        impl Write for Loopback {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.written.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let transport = Loopback {
            read_buf: Cursor::new(script),
            written: Vec::new(),
        };
        let mcu = SerialExtMcu::new(transport);
        assert_eq!(mcu.get_version(), 1);

        let mut image = Cursor::new(b"firmware bytes".to_vec());
        assert!(mcu.download(&mut image));
    }
}

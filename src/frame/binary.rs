//! Binary framing with handler-declared packet lengths.

use log::warn;

use super::{FrameReader, LengthProbe, PacketLength, PartialFrame};
use crate::connection::{Connection, ReadFailure};

impl FrameReader<'_> {
    /// Read until the maximum length, the declared length, or (after a
    /// [`PacketLength::LineTerminated`] declaration) a line terminator.
    ///
    /// The probe is first consulted once the minimum packet length is
    /// buffered, and again after each byte for as long as it answers
    /// `Fixed(0)`.
    pub(super) async fn read_binary<P>(
        &self,
        conn: &mut Connection,
        frame: &mut PartialFrame,
        mut probe: Option<&mut P>,
    ) -> Result<(), ReadFailure>
    where
        P: LengthProbe + ?Sized,
    {
        let max = self.config.max_packet_length();
        let min = self.config.min_packet_length();
        let mut actual: Option<usize> = None;
        let mut line = false;
        loop {
            let byte = frame.next_byte(conn).await?;
            if line {
                if self.config.is_line_terminator(byte) {
                    return Ok(());
                }
                if self.config.is_ignored(byte) {
                    continue;
                }
            }
            frame.buf.push(byte);

            let len = frame.buf.len();
            if len >= max {
                return Ok(());
            }
            if let Some(expected) = actual {
                if len >= expected {
                    return Ok(());
                }
                continue;
            }
            let Some(probe) = probe.as_mut() else {
                continue;
            };
            if len < min {
                continue;
            }
            let expected = match probe.actual_length(&frame.buf) {
                PacketLength::Fixed(0) => continue,
                PacketLength::Fixed(n) if n > max => {
                    warn!("declared packet length exceeds maximum: actual={n}, max={max}");
                    max
                }
                PacketLength::Fixed(n) => n,
                PacketLength::LineTerminated => {
                    if self.config.is_line_terminator(byte) {
                        frame.buf.pop();
                        return Ok(());
                    }
                    line = true;
                    max
                }
                PacketLength::ReadToEnd => max,
            };
            if len >= expected {
                return Ok(());
            }
            actual = Some(expected);
        }
    }
}

//! Line-terminated text framing.

use super::{FrameReader, PartialFrame};
use crate::connection::{Connection, ReadFailure};

impl FrameReader<'_> {
    /// Read until a line terminator or the maximum packet length.
    ///
    /// The terminator is not part of the packet. Ignored bytes are dropped,
    /// backspace removes the previous byte and any other control byte below
    /// `0x20` is discarded.
    pub(super) async fn read_line(
        &self,
        conn: &mut Connection,
        frame: &mut PartialFrame,
    ) -> Result<(), ReadFailure> {
        let max = self.config.max_packet_length();
        loop {
            let byte = frame.next_byte(conn).await?;
            if self.config.is_line_terminator(byte) {
                return Ok(());
            }
            if self.config.is_ignored(byte) {
                continue;
            }
            if self.config.is_backspace(byte) {
                frame.buf.pop();
                continue;
            }
            if byte < b' ' {
                continue;
            }
            frame.buf.push(byte);
            if frame.buf.len() >= max {
                return Ok(());
            }
        }
    }
}

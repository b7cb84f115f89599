//! Framing configuration shared by every session of a server.
//!
//! [`FramingConfig`] is assembled before the server starts and is read-only
//! afterwards. It selects text or binary framing, bounds packet lengths,
//! names the special bytes used by text framing and carries the timeout and
//! linger settings.

use std::time::Duration;

use bytes::Bytes;

use crate::timeout::TimeoutPolicy;

/// Default maximum packet length for text framing.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 2048;
/// Default maximum packet length for binary framing.
pub const DEFAULT_MAX_BINARY_LENGTH: usize = 1024;
/// Default linger applied when a connection closes.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(4);

/// Bytes written before each packet is read on TCP sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Prompt {
    /// No prompt.
    #[default]
    None,
    /// The same bytes before every packet.
    Fixed(Bytes),
    /// A numbered prompt (`"1> "`, `"2> "`, ...); text framing only.
    Auto,
}

/// Framing and session settings.
///
/// ```
/// use std::time::Duration;
///
/// use sessionframe::{FramingConfig, TimeoutPolicy};
///
/// let config = FramingConfig::text()
///     .line_terminators(b"\n\r".to_vec())
///     .timeouts(TimeoutPolicy::none().idle(Duration::from_secs(30)));
/// assert_eq!(config.max_packet_length(), 2048);
/// assert!(config.is_line_terminator(b'\r'));
/// ```
#[derive(Clone, Debug)]
pub struct FramingConfig {
    text: bool,
    max_length: Option<usize>,
    min_length: Option<usize>,
    terminators: Vec<u8>,
    backspace: Vec<u8>,
    ignore: Vec<u8>,
    prompt: Prompt,
    timeouts: TimeoutPolicy,
    terminate_on_timeout: bool,
    linger: Duration,
}

impl Default for FramingConfig {
    fn default() -> Self { Self::text() }
}

impl FramingConfig {
    /// Line-oriented text framing: `\n` terminates, `\r` is ignored and `\b`
    /// deletes the previous byte.
    #[must_use]
    pub fn text() -> Self {
        Self {
            text: true,
            max_length: None,
            min_length: None,
            terminators: vec![b'\n'],
            backspace: vec![0x08],
            ignore: vec![b'\r'],
            prompt: Prompt::None,
            timeouts: TimeoutPolicy::none(),
            terminate_on_timeout: true,
            linger: DEFAULT_LINGER,
        }
    }

    /// Binary framing with handler-declared packet lengths.
    #[must_use]
    pub fn binary() -> Self { Self::text().text_packets(false) }

    /// Switch between text and binary framing.
    ///
    /// Binary framing has no backspace or ignore bytes; the terminator set is
    /// kept for handlers that declare [`PacketLength::LineTerminated`].
    ///
    /// [`PacketLength::LineTerminated`]: crate::frame::PacketLength::LineTerminated
    #[must_use]
    pub fn text_packets(mut self, text: bool) -> Self {
        self.text = text;
        if !text {
            self.backspace.clear();
            self.ignore.clear();
        }
        self
    }

    /// Set the maximum packet length; zero restores the default.
    #[must_use]
    pub fn with_max_packet_length(mut self, len: usize) -> Self {
        self.max_length = (len > 0).then_some(len);
        self
    }

    /// Set the length at which binary framing asks the handler for the actual
    /// packet length; zero restores the default.
    #[must_use]
    pub fn with_min_packet_length(mut self, len: usize) -> Self {
        self.min_length = (len > 0).then_some(len);
        self
    }

    /// Replace the line terminator set.
    #[must_use]
    pub fn line_terminators(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.terminators = bytes.into();
        self
    }

    /// Replace the backspace set.
    #[must_use]
    pub fn backspace(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.backspace = bytes.into();
        self
    }

    /// Replace the set of bytes silently dropped by text framing.
    #[must_use]
    pub fn ignore(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.ignore = bytes.into();
        self
    }

    /// Write `prompt` before each packet on TCP sessions.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<Bytes>) -> Self {
        let prompt = prompt.into();
        self.prompt = if prompt.is_empty() {
            Prompt::None
        } else {
            Prompt::Fixed(prompt)
        };
        self
    }

    /// Enable or disable numbered prompts.
    #[must_use]
    pub fn auto_prompt(mut self, auto: bool) -> Self {
        if auto {
            self.prompt = Prompt::Auto;
        } else if self.prompt == Prompt::Auto {
            self.prompt = Prompt::None;
        }
        self
    }

    /// Replace the timeout policy.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// End the session when a read times out; otherwise the partial packet is
    /// discarded and the session continues.
    #[must_use]
    pub fn terminate_on_timeout(mut self, terminate: bool) -> Self {
        self.terminate_on_timeout = terminate;
        self
    }

    /// How long a closing connection waits for the peer to drain.
    #[must_use]
    pub fn linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Whether text framing is active.
    #[must_use]
    pub fn is_text(&self) -> bool { self.text }

    /// Effective maximum packet length.
    #[must_use]
    pub fn max_packet_length(&self) -> usize {
        match self.max_length {
            Some(len) => len,
            None if self.text => DEFAULT_MAX_TEXT_LENGTH,
            None => DEFAULT_MAX_BINARY_LENGTH,
        }
    }

    /// Effective minimum packet length.
    ///
    /// Binary framing defaults to the maximum, so the handler is only asked
    /// for a length when one is configured explicitly.
    #[must_use]
    pub fn min_packet_length(&self) -> usize {
        match self.min_length {
            Some(len) => len,
            None if self.text => 1,
            None => self.max_packet_length(),
        }
    }

    /// Timeout policy.
    #[must_use]
    pub fn timeout_policy(&self) -> &TimeoutPolicy { &self.timeouts }

    /// Whether a read timeout ends the session.
    #[must_use]
    pub fn terminates_on_timeout(&self) -> bool { self.terminate_on_timeout }

    /// Linger duration used when closing.
    #[must_use]
    pub fn linger_duration(&self) -> Duration { self.linger }

    /// Whether `byte` ends a line.
    #[must_use]
    pub fn is_line_terminator(&self, byte: u8) -> bool { self.terminators.contains(&byte) }

    /// Whether `byte` deletes the previously buffered byte.
    #[must_use]
    pub fn is_backspace(&self, byte: u8) -> bool { self.backspace.contains(&byte) }

    /// Whether `byte` is dropped by text framing.
    #[must_use]
    pub fn is_ignored(&self, byte: u8) -> bool { self.ignore.contains(&byte) }

    /// Whether any prompt is written.
    #[must_use]
    pub fn has_prompt(&self) -> bool {
        match self.prompt {
            Prompt::None => false,
            Prompt::Fixed(_) => true,
            Prompt::Auto => self.text,
        }
    }

    /// Prompt written before reading packet number `index` (zero-based).
    #[must_use]
    pub fn prompt_for(&self, index: usize) -> Option<Bytes> {
        match &self.prompt {
            Prompt::None => None,
            Prompt::Fixed(bytes) => Some(bytes.clone()),
            Prompt::Auto if self.text => Some(Bytes::from(format!("{}> ", index + 1))),
            Prompt::Auto => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FramingConfig::text(), 2048, 1)]
    #[case(FramingConfig::binary(), 1024, 1024)]
    #[case(FramingConfig::binary().with_max_packet_length(64), 64, 64)]
    #[case(FramingConfig::binary().with_min_packet_length(4), 1024, 4)]
    #[case(FramingConfig::text().with_max_packet_length(0), 2048, 1)]
    fn length_defaults(#[case] config: FramingConfig, #[case] max: usize, #[case] min: usize) {
        assert_eq!(config.max_packet_length(), max);
        assert_eq!(config.min_packet_length(), min);
    }

    #[test]
    fn binary_clears_text_only_sets() {
        let config = FramingConfig::binary();
        assert!(!config.is_backspace(0x08));
        assert!(!config.is_ignored(b'\r'));
        assert!(config.is_line_terminator(b'\n'));
    }

    #[test]
    fn auto_prompt_counts_from_one() {
        let config = FramingConfig::text().auto_prompt(true);
        assert!(config.has_prompt());
        assert_eq!(config.prompt_for(0).as_deref(), Some(&b"1> "[..]));
        assert_eq!(config.prompt_for(9).as_deref(), Some(&b"10> "[..]));
    }

    #[test]
    fn auto_prompt_requires_text() {
        let config = FramingConfig::binary().auto_prompt(true);
        assert!(!config.has_prompt());
        assert_eq!(config.prompt_for(0), None);
    }

    #[test]
    fn fixed_prompt_replaces_auto() {
        let config = FramingConfig::text().auto_prompt(true).prompt("> ");
        assert_eq!(config.prompt_for(3).as_deref(), Some(&b"> "[..]));
        let config = config.auto_prompt(false);
        assert!(config.has_prompt());
        assert!(!config.prompt("").has_prompt());
    }
}

//! Message reading logic for subprocess transport

use std::io::ErrorKind;

use async_stream::stream;
use futures::StreamExt;
use tokio_util::codec::LinesCodecError;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::message::decode_line;
use crate::transport::MessageStream;

use super::transport::SubprocessTransport;

impl SubprocessTransport {
    /// Turn stdout into a lazy message stream
    ///
    /// The stream owns the framed stdout, so writes and kills on the
    /// transport never wait on a pending read.
    ///
    /// # Errors
    /// Returns `AgentError::AlreadyConsumed` if stdout was already taken
    pub(super) fn read_messages_impl(&mut self, cancel: CancellationToken) -> Result<MessageStream> {
        if self.stdout_taken {
            return Err(AgentError::AlreadyConsumed);
        }
        let mut stdout = self
            .stdout
            .take()
            .ok_or_else(|| AgentError::transport("Not connected - stdout not available"))?;
        self.stdout_taken = true;
        let max_line = self.max_buffer_size;

        let messages = stream! {
            let mut after_error = false;

            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    next = stdout.next() => next,
                };

                match next {
                    Some(Ok(line)) => {
                        after_error = false;
                        let Some(message) = decode_line(&line) else {
                            continue;
                        };
                        let ends_turn = message.is_result();
                        yield Ok(message);
                        if ends_turn {
                            break;
                        }
                    }
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        log::warn!("Discarding agent output line longer than {max_line} bytes");
                        after_error = true;
                    }
                    // The codec has already split off the offending line
                    Some(Err(LinesCodecError::Io(e))) if e.kind() == ErrorKind::InvalidData => {
                        log::debug!("Skipping agent output line that is not valid UTF-8");
                        after_error = true;
                    }
                    Some(Err(LinesCodecError::Io(e))) => {
                        yield Err(AgentError::Io(e));
                        break;
                    }
                    // A decode error is followed by one `None` before reading resumes
                    None if after_error => after_error = false,
                    None => break,
                }
            }
        };

        Ok(messages.boxed())
    }
}

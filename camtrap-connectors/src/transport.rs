//! AT command transport
//!
//! Writes one command, then polls the line until bytes arrive or the
//! timeout passes. No retries and no pipelining: a second command must
//! not be sent before the first one has been answered, which `&mut self`
//! enforces.

use std::sync::Arc;
use std::time::Duration;

use camtrap_core::constants::modem::LINE_TERMINATOR;
use camtrap_core::constants::time::COMMAND_POLL_INTERVAL;
use camtrap_core::{CommandLink, CommandResult, ReconnectHook};
use tokio::time::{sleep, Instant};

use crate::ConnectorError;

/// Request/response channel to the modem
pub struct AtTransport<L> {
    link: L,
    reconnect: Option<Arc<dyn ReconnectHook>>,
    reconnects: u32,
}

impl<L: CommandLink> AtTransport<L> {
    /// Transport over an opened link
    pub fn new(link: L) -> Self {
        Self {
            link,
            reconnect: None,
            reconnects: 0,
        }
    }

    /// Action to run when a reply reports a dropped broker session
    pub fn set_reconnect_hook(&mut self, hook: Arc<dyn ReconnectHook>) {
        self.reconnect = Some(hook);
    }

    /// Reconnects triggered so far
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Send `command` and wait up to `timeout` for the reply
    ///
    /// An `ERROR` reply is `Ok` with `success == false`; only a missing
    /// reply or a broken line is an `Err`.
    pub async fn send(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ConnectorError> {
        self.write_command(command)?;

        let started = Instant::now();
        let bytes = loop {
            sleep(COMMAND_POLL_INTERVAL).await;
            match self.link.read_available() {
                Ok(bytes) if !bytes.is_empty() => break bytes,
                Ok(_) | Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => {
                    log::error!("Read failed after {command:?}: {e}");
                    return Err(ConnectorError::Transport(e));
                }
            }
            let waited = started.elapsed();
            if waited >= timeout {
                log::error!("Sent: {command:?}, no reply after {waited:?}");
                return Err(ConnectorError::TransportTimeout {
                    command: command.to_owned(),
                    waited,
                });
            }
        };

        let response = String::from_utf8_lossy(&bytes).into_owned();
        log::debug!("Sent: {command:?} Response: {response:?}");

        let result = CommandResult::from_response(response);
        if result.reconnected {
            log::warn!("Broker session lost while running {command:?}, reconnecting");
            self.reconnects += 1;
            if let Some(hook) = &self.reconnect {
                hook.reconnect();
            }
        } else if !result.success {
            log::warn!("Command {command:?} rejected: {:?}", result.response);
        }
        Ok(result)
    }

    /// Like [`send`](Self::send), but an `ERROR` reply becomes `CommandRejected`
    pub async fn send_checked(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ConnectorError> {
        let result = self.send(command, timeout).await?;
        if result.success {
            Ok(result.response)
        } else {
            Err(ConnectorError::CommandRejected {
                command: command.to_owned(),
                response: result.response,
            })
        }
    }

    /// Send `command`, wait `settle`, then take whatever is buffered
    ///
    /// For commands whose reply is parsed rather than classified. An
    /// empty buffer yields an empty string.
    pub async fn query_buffered(
        &mut self,
        command: &str,
        settle: Duration,
    ) -> Result<String, ConnectorError> {
        self.write_command(command)?;
        sleep(settle).await;

        let bytes = match self.link.read_available() {
            Ok(bytes) => bytes,
            Err(nb::Error::WouldBlock) => Vec::new(),
            Err(nb::Error::Other(e)) => return Err(ConnectorError::Transport(e)),
        };
        let response = String::from_utf8_lossy(&bytes).into_owned();
        log::debug!("Sent: {command:?} Response: {response:?}");
        Ok(response)
    }

    fn write_command(&mut self, command: &str) -> Result<(), ConnectorError> {
        let line = format!("{command}{LINE_TERMINATOR}");
        self.link.write_all(line.as_bytes()).map_err(|e| {
            log::error!("Failed to write {command:?}: {e}");
            ConnectorError::Transport(e)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Link that answers each written line with the next scripted reply
    ///
    /// `None` in the script means the modem stays silent for that command.
    #[derive(Default)]
    pub(crate) struct ScriptedLink {
        pub(crate) written: Vec<String>,
        pub(crate) replies: VecDeque<Option<String>>,
        pending: Option<Vec<u8>>,
    }

    impl ScriptedLink {
        pub(crate) fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = Option<S>>,
            S: Into<String>,
        {
            Self {
                replies: replies.into_iter().map(|r| r.map(Into::into)).collect(),
                ..Self::default()
            }
        }
    }

    impl CommandLink for ScriptedLink {
        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.push(String::from_utf8_lossy(bytes).into_owned());
            self.pending = self.replies.pop_front().flatten().map(String::into_bytes);
            Ok(())
        }

        fn read_available(&mut self) -> nb::Result<Vec<u8>, io::Error> {
            self.pending.take().ok_or(nb::Error::WouldBlock)
        }
    }

    struct BrokenLink;

    impl CommandLink for BrokenLink {
        fn write_all(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read_available(&mut self) -> nb::Result<Vec<u8>, io::Error> {
            Err(nb::Error::Other(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")))
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_ok_reply() {
        let mut transport = AtTransport::new(ScriptedLink::new([Some("\r\nOK\r\n")]));
        let result = transport.send("ATE0", TIMEOUT).await.unwrap();

        assert!(result.success);
        assert!(!result.reconnected);
        assert_eq!(transport.link().written, vec!["ATE0\r\n".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_reply_is_failure_not_err() {
        let mut transport = AtTransport::new(ScriptedLink::new([Some("\r\nERROR\r\n")]));
        let result = transport.send("AT+CGREG?", TIMEOUT).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_checked_rejects() {
        let mut transport = AtTransport::new(ScriptedLink::new([Some("ERROR")]));
        match transport.send_checked("AT+CSQ", TIMEOUT).await {
            Err(ConnectorError::CommandRejected { command, response }) => {
                assert_eq!(command, "AT+CSQ");
                assert_eq!(response, "ERROR");
            }
            other => panic!("Expected CommandRejected, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_reconnects_exactly_once() {
        let count = Arc::new(AtomicU32::new(0));
        let hook_count = Arc::clone(&count);
        let hook: Arc<dyn ReconnectHook> = Arc::new(move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });

        let mut transport = AtTransport::new(ScriptedLink::new([
            Some("+CMQTTCONNLOST: 0,1\r\nERROR\r\n"),
            Some("OK"),
        ]));
        transport.set_reconnect_hook(hook);

        let result = transport.send("AT+CGREG?", TIMEOUT).await.unwrap();
        assert!(result.success);
        assert!(result.reconnected);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        transport.send("AT+CSQ", TIMEOUT).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(transport.reconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_modem_times_out() {
        let mut transport = AtTransport::new(ScriptedLink::new([None::<String>]));
        let started = Instant::now();

        match transport.send("AT+CGREG?", TIMEOUT).await {
            Err(ConnectorError::TransportTimeout { command, waited }) => {
                assert_eq!(command, "AT+CGREG?");
                assert!(waited >= TIMEOUT);
            }
            other => panic!("Expected TransportTimeout, got {other:?}"),
        }
        // Gives up on the first poll past the deadline
        assert!(started.elapsed() < TIMEOUT + COMMAND_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_line() {
        let mut transport = AtTransport::new(BrokenLink);
        assert!(matches!(
            transport.send("ATE0", TIMEOUT).await,
            Err(ConnectorError::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_buffered_empty() {
        let mut transport = AtTransport::new(ScriptedLink::new([None::<String>]));
        let reply = transport
            .query_buffered("AT+CCLK?", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn test_hook_is_shareable() {
        let seen = Arc::new(Mutex::new(0));
        let inner = Arc::clone(&seen);
        let hook: Arc<dyn ReconnectHook> = Arc::new(move || *inner.lock().unwrap() += 1);
        hook.reconnect();
        hook.reconnect();
        assert_eq!(*seen.lock().unwrap(), 2);
    }
}

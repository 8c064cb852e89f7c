use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tracing::debug;

/// Errors on the control channel. These are fatal to the call: the channel has
/// no retry semantics, and a broken stream cannot be resumed mid-call.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("control channel closed by peer")]
    Closed,
    #[error("control protocol violation: {0}")]
    Protocol(String),
    #[error("control channel i/o failed")]
    Io(#[from] std::io::Error),
}

/// The `agi_*` variables the telephony host sends before the first command.
#[derive(Debug, Clone, Default)]
pub struct AgiEnv {
    vars: HashMap<String, String>,
}

impl AgiEnv {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Caller number as presented by the host, or "Unknown" when withheld.
    pub fn caller_id(&self) -> &str {
        self.get("agi_callerid").unwrap_or("Unknown")
    }

    /// The host's unique identifier for this call. Opaque; used only to
    /// namespace per-call artifacts and log lines.
    pub fn unique_id(&self) -> Option<&str> {
        self.get("agi_uniqueid")
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
impl AgiEnv {
    /// Hand-built handshake for state machine tests.
    pub(crate) fn for_tests(caller_id: &str, unique_id: &str) -> Self {
        let mut vars = HashMap::new();
        vars.insert("agi_callerid".to_string(), caller_id.to_string());
        vars.insert("agi_uniqueid".to_string(), unique_id.to_string());
        Self { vars }
    }
}

/// Call-control surface the dialogue engine drives. One concrete
/// implementation speaks the real AGI byte stream; tests substitute a mock so
/// call flow can be exercised without a telephony host.
///
/// Every operation writes exactly one command line and consumes exactly one
/// response line. The channel is strictly half-duplex, so these methods take
/// `&mut self` and callers cannot interleave commands.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait CallControl: Send {
    async fn answer(&mut self) -> Result<String, ChannelError>;

    /// Play an audio file (path without extension, host resolves the format).
    /// `escape_digits` are DTMF keys that may interrupt playback.
    async fn stream_file(&mut self, path: &str, escape_digits: &str)
    -> Result<String, ChannelError>;

    /// Record from the caller into `path`.`format`, stopping on an escape
    /// digit, `timeout_ms` of audio, or `silence_secs` of trailing silence.
    async fn record_file(
        &mut self,
        path: &str,
        format: &str,
        escape_digits: &str,
        timeout_ms: u32,
        beep: bool,
        silence_secs: u32,
    ) -> Result<String, ChannelError>;

    async fn say_digits(&mut self, digits: &str) -> Result<String, ChannelError>;

    async fn set_variable(&mut self, name: &str, value: &str) -> Result<String, ChannelError>;

    /// Emit a diagnostic line into the host's console log.
    async fn verbose(&mut self, message: &str, level: u8) -> Result<String, ChannelError>;

    async fn hangup(&mut self) -> Result<String, ChannelError>;
}

/// Line-oriented AGI client over any duplex byte stream. The host spawns us
/// with the call's control session on stdin/stdout; tests wire both ends to
/// in-memory pipes.
pub struct AgiChannel<R, W> {
    reader: R,
    writer: W,
}

impl AgiChannel<BufReader<Stdin>, Stdout> {
    /// Channel over the process's own stdio, as the telephony host invokes us.
    pub fn from_stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> AgiChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Consume the `key: value` handshake the host sends at call setup,
    /// terminated by a blank line. Must run before the first command.
    pub async fn read_environment(&mut self) -> Result<AgiEnv, ChannelError> {
        let mut env = AgiEnv::default();
        loop {
            let line = self.read_line().await?.ok_or_else(|| {
                ChannelError::Protocol("stream closed during environment handshake".into())
            })?;
            if line.trim().is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                env.vars
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        debug!("agi environment read: {} variables", env.len());
        Ok(env)
    }

    /// Send one command line and block for its single response line.
    pub async fn execute(&mut self, command: &str) -> Result<String, ChannelError> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let response = self.read_line().await?.ok_or(ChannelError::Closed)?;
        debug!("agi command: {command} | response: {response}");
        Ok(response)
    }

    async fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end().to_string()))
    }
}

#[async_trait]
impl<R, W> CallControl for AgiChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn answer(&mut self) -> Result<String, ChannelError> {
        self.execute("ANSWER").await
    }

    async fn stream_file(
        &mut self,
        path: &str,
        escape_digits: &str,
    ) -> Result<String, ChannelError> {
        self.execute(&format!("STREAM FILE {path} \"{escape_digits}\""))
            .await
    }

    async fn record_file(
        &mut self,
        path: &str,
        format: &str,
        escape_digits: &str,
        timeout_ms: u32,
        beep: bool,
        silence_secs: u32,
    ) -> Result<String, ChannelError> {
        let mut cmd = format!("RECORD FILE {path} {format} \"{escape_digits}\" {timeout_ms} 0");
        if beep {
            cmd.push_str(" BEEP");
        }
        if silence_secs > 0 {
            cmd.push_str(&format!(" s={silence_secs}"));
        }
        self.execute(&cmd).await
    }

    async fn say_digits(&mut self, digits: &str) -> Result<String, ChannelError> {
        self.execute(&format!("SAY DIGITS {digits} \"\"")).await
    }

    async fn set_variable(&mut self, name: &str, value: &str) -> Result<String, ChannelError> {
        self.execute(&format!("SET VARIABLE {name} {value}")).await
    }

    async fn verbose(&mut self, message: &str, level: u8) -> Result<String, ChannelError> {
        // The command must stay on one line, so flatten whatever we were given.
        let message = message.replace(['\r', '\n'], " ").replace('"', "'");
        self.execute(&format!("VERBOSE \"{message}\" {level}")).await
    }

    async fn hangup(&mut self) -> Result<String, ChannelError> {
        self.execute("HANGUP").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    // Builds a channel with both directions backed by in-memory pipes. The
    // returned host ends let a test play the telephony side: write handshake
    // lines / command responses into `host_tx`, read issued commands from
    // `host_rx`. The duplex buffers are large enough that either side can
    // write before the other reads.
    fn test_channel() -> (
        AgiChannel<BufReader<DuplexStream>, DuplexStream>,
        DuplexStream,
        DuplexStream,
    ) {
        let (host_tx, engine_rx) = tokio::io::duplex(4096);
        let (engine_tx, host_rx) = tokio::io::duplex(4096);
        let channel = AgiChannel::new(BufReader::new(engine_rx), engine_tx);
        (channel, host_tx, host_rx)
    }

    // Dropping the channel closes its write half, which lets the host side
    // read everything that was sent in one go.
    async fn sent_commands(
        channel: AgiChannel<BufReader<DuplexStream>, DuplexStream>,
        host_rx: &mut DuplexStream,
    ) -> String {
        drop(channel);
        let mut sent = String::new();
        host_rx.read_to_string(&mut sent).await.unwrap();
        sent
    }

    #[tokio::test]
    async fn read_environment_parses_until_blank_line() {
        let (mut channel, mut host_tx, _host_rx) = test_channel();

        host_tx
            .write_all(
                b"agi_request: handler.agi\n\
                  agi_channel: PJSIP/100-00000001\n\
                  agi_callerid : 5551234 \n\
                  agi_uniqueid: 1700000000.42\n\
                  not a variable line\n\
                  \n",
            )
            .await
            .unwrap();

        let env = channel.read_environment().await.unwrap();

        assert_eq!(env.get("agi_request"), Some("handler.agi"));
        // Keys and values are trimmed of surrounding whitespace.
        assert_eq!(env.get("agi_callerid"), Some("5551234"));
        assert_eq!(env.caller_id(), "5551234");
        assert_eq!(env.unique_id(), Some("1700000000.42"));
        // Lines without a colon are skipped, not stored.
        assert_eq!(env.len(), 4);
    }

    #[tokio::test]
    async fn read_environment_fails_if_stream_ends_before_blank_line() {
        let (mut channel, mut host_tx, _host_rx) = test_channel();

        host_tx.write_all(b"agi_callerid: 5551234\n").await.unwrap();
        drop(host_tx);

        let err = channel.read_environment().await.unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn caller_id_defaults_to_unknown() {
        let env = AgiEnv::default();
        assert_eq!(env.caller_id(), "Unknown");
        assert_eq!(env.unique_id(), None);
    }

    #[tokio::test]
    async fn execute_sends_one_line_and_strips_the_response() {
        let (mut channel, mut host_tx, mut host_rx) = test_channel();

        // Queue the response up front; the duplex buffer holds it until the
        // channel reads it after writing the command.
        host_tx.write_all(b"200 result=0\n").await.unwrap();

        let response = channel.execute("ANSWER").await.unwrap();
        assert_eq!(response, "200 result=0");

        let sent = sent_commands(channel, &mut host_rx).await;
        assert_eq!(sent, "ANSWER\n");
    }

    #[tokio::test]
    async fn execute_reports_closed_channel_on_eof() {
        let (mut channel, host_tx, _host_rx) = test_channel();
        drop(host_tx);

        let err = channel.execute("HANGUP").await.unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
    }

    #[tokio::test]
    async fn commands_follow_the_wire_grammar() {
        let (mut channel, mut host_tx, mut host_rx) = test_channel();

        // One canned response per command issued below.
        for _ in 0..6 {
            host_tx.write_all(b"200 result=0\n").await.unwrap();
        }

        channel.answer().await.unwrap();
        channel.stream_file("/tmp/agi_audio/greeting", "").await.unwrap();
        channel
            .record_file("/tmp/agi_audio/rec_1", "wav", "#", 5000, false, 2)
            .await
            .unwrap();
        channel.say_digits("42").await.unwrap();
        channel.set_variable("AI_HANDLED", "yes").await.unwrap();
        channel.hangup().await.unwrap();

        let sent = sent_commands(channel, &mut host_rx).await;
        let lines: Vec<&str> = sent.lines().collect();
        assert_eq!(
            lines,
            vec![
                "ANSWER",
                "STREAM FILE /tmp/agi_audio/greeting \"\"",
                "RECORD FILE /tmp/agi_audio/rec_1 wav \"#\" 5000 0 s=2",
                "SAY DIGITS 42 \"\"",
                "SET VARIABLE AI_HANDLED yes",
                "HANGUP",
            ]
        );
    }

    #[tokio::test]
    async fn record_file_appends_beep_before_silence() {
        let (mut channel, mut host_tx, mut host_rx) = test_channel();
        host_tx.write_all(b"200 result=0\n").await.unwrap();

        channel
            .record_file("/tmp/agi_audio/rec_2", "wav", "#", 20000, true, 3)
            .await
            .unwrap();

        let sent = sent_commands(channel, &mut host_rx).await;
        assert_eq!(
            sent,
            "RECORD FILE /tmp/agi_audio/rec_2 wav \"#\" 20000 0 BEEP s=3\n"
        );
    }

    #[tokio::test]
    async fn verbose_flattens_messages_onto_one_line() {
        let (mut channel, mut host_tx, mut host_rx) = test_channel();
        host_tx.write_all(b"200 result=1\n").await.unwrap();

        channel
            .verbose("line one\nline \"two\"", 3)
            .await
            .unwrap();

        let sent = sent_commands(channel, &mut host_rx).await;
        assert_eq!(sent, "VERBOSE \"line one line 'two'\" 3\n");
    }
}

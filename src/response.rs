//! The response side of the application contract.
//!
//! A response is driven by a small dedicated task ("the response actor")
//! that exclusively owns the `h2` handles for this stream, rather than by
//! the handler's own task directly. [`ResponseWriter`] is a cheap handle
//! that sends it commands and awaits their replies. This exists for one
//! reason beyond tidiness: detecting a peer `RST_STREAM` while the
//! application is doing something other than reading the body or writing a
//! response (sleeping, calling out to a database, ...) requires *something*
//! to keep polling `poll_reset` concurrently with the application running.
//! Since only one task may hold the `&mut` `h2` handle at a time, that
//! something has to be this actor, racing `poll_reset` against incoming
//! commands in its own select loop; the instant it sees a reset it cancels
//! the stream's [`CancellationToken`], which is what actually unblocks an
//! application sleeping with nothing left to poll.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::engine;
use crate::error::{Error, Result};
use crate::request::Header;

enum Command {
    Interim {
        status: u16,
        headers: Vec<Header>,
        reply: oneshot::Sender<Result<()>>,
    },
    Headers {
        status: u16,
        headers: Vec<Header>,
        end_stream: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Body {
        data: Bytes,
        end_stream: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Trailers {
        headers: Vec<Header>,
        reply: oneshot::Sender<Result<()>>,
    },
    Reset {
        reason: h2::Reason,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// A handle to one response-in-progress. Cloning is not supported: exactly
/// one handle exists per stream.
pub struct ResponseWriter {
    commands: mpsc::Sender<Command>,
    ended: Arc<AtomicBool>,
}

impl ResponseWriter {
    /// Spawns the response actor for one accepted stream and returns the
    /// handle used to drive it. `reset_cancel` is cancelled the moment the
    /// peer resets this stream, from wherever the application happens to be
    /// suspended.
    pub(crate) fn spawn(
        respond: h2::server::SendResponse<Bytes>,
        send_timeout: Duration,
        reset_cancel: CancellationToken,
    ) -> Self {
        let (commands, rx) = mpsc::channel(1);
        let ended = Arc::new(AtomicBool::new(false));
        tokio::spawn(run_actor(respond, send_timeout, rx, reset_cancel, ended.clone()));
        Self { commands, ended }
    }

    /// Whether a terminal frame (`END_STREAM`, a reset, or trailers) has
    /// already gone out.
    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Sends a `1xx` informational response. May be called any number of
    /// times before the final [`ResponseWriter::headers`] call.
    pub async fn interim(&mut self, status: u16, headers: Vec<Header>) -> Result<()> {
        if !(100..200).contains(&status) {
            return Err(Error::WriterMisuse("interim status must be 1xx"));
        }
        self.call(|reply| Command::Interim { status, headers, reply }).await
    }

    /// Sends the final response headers. `end_stream` signals there is no
    /// body to follow.
    pub async fn headers(&mut self, status: u16, headers: Vec<Header>, end_stream: bool) -> Result<()> {
        self.call(|reply| Command::Headers {
            status,
            headers,
            end_stream,
            reply,
        })
        .await
    }

    /// Sends one chunk of body data, sliced against the peer's flow-control
    /// window as needed. `end_stream` marks this as the last chunk.
    ///
    /// A zero-length chunk with `end_stream` true is still sent, as a single
    /// empty `DATA` frame carrying `END_STREAM`, rather than skipped, since
    /// skipping it would leave the stream open with nothing left to ever
    /// close it.
    pub async fn body(&mut self, data: Bytes, end_stream: bool) -> Result<()> {
        self.call(|reply| Command::Body { data, end_stream, reply }).await
    }

    /// Sends trailers, which implicitly carry `END_STREAM`.
    pub async fn trailers(&mut self, headers: Vec<Header>) -> Result<()> {
        self.call(|reply| Command::Trailers { headers, reply }).await
    }

    /// Ensures the stream is terminated, emitting an empty `DATA` frame with
    /// `END_STREAM` if nothing has closed it yet. Used by the stream handler
    /// when an application handler returns without itself ending the
    /// response.
    pub async fn end(&mut self) -> Result<()> {
        if self.ended() {
            return Ok(());
        }
        self.body(Bytes::new(), true).await
    }

    /// Aborts the stream with a `RST_STREAM` carrying `reason`, whether or
    /// not headers have gone out yet. Used when an application handler
    /// returns an error: the stream is confined and reset rather than closed
    /// gracefully.
    pub(crate) async fn reset(&mut self, reason: h2::Reason) -> Result<()> {
        if self.ended() {
            return Ok(());
        }
        self.call(|reply| Command::Reset { reason, reply }).await
    }

    async fn call(&mut self, make: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(make(reply_tx)).await.is_err() {
            return Err(Error::Cancelled);
        }
        reply_rx.await.unwrap_or(Err(Error::Cancelled))
    }
}

/// What to do after one trip through the actor's `select!`. Kept as a plain
/// value (rather than handling each branch inline) so that by the time a
/// command is actually run, the `select!`'s internal futures — including
/// the one borrowing `respond`/`send_stream` to poll for a reset — have
/// already been dropped, and `run_command` is free to borrow them again.
enum Event {
    Reset(std::result::Result<h2::Reason, h2::Error>),
    Command(Option<Command>),
}

async fn run_actor(
    mut respond: h2::server::SendResponse<Bytes>,
    send_timeout: Duration,
    mut commands: mpsc::Receiver<Command>,
    reset_cancel: CancellationToken,
    ended: Arc<AtomicBool>,
) {
    let mut send_stream: Option<h2::SendStream<Bytes>> = None;

    loop {
        let event = {
            let reset = std::future::poll_fn(|cx| match send_stream.as_mut() {
                Some(s) => s.poll_reset(cx),
                None => respond.poll_reset(cx),
            });
            tokio::select! {
                biased;
                reset = reset => Event::Reset(reset),
                cmd = commands.recv() => Event::Command(cmd),
            }
        };

        match event {
            Event::Reset(reset) => {
                match reset {
                    Ok(reason) => tracing::debug!(?reason, "stream reset by peer"),
                    Err(error) => tracing::debug!(%error, "error observing stream reset"),
                }
                reset_cancel.cancel();
                return;
            }
            Event::Command(None) => return,
            Event::Command(Some(cmd)) => {
                let result = run_command(&cmd, &mut respond, &mut send_stream, send_timeout, &ended).await;
                reply(cmd, result);
            }
        }
    }
}

async fn run_command(
    cmd: &Command,
    respond: &mut h2::server::SendResponse<Bytes>,
    send_stream: &mut Option<h2::SendStream<Bytes>>,
    send_timeout: Duration,
    ended: &AtomicBool,
) -> Result<()> {
    match cmd {
        Command::Interim { status, headers, .. } => {
            let response = engine::response_from_status(*status, headers)?;
            let _ = respond.send_response(response, false)?;
            Ok(())
        }
        Command::Headers {
            status,
            headers,
            end_stream,
            ..
        } => {
            let response = engine::response_from_status(*status, headers)?;
            let stream = respond.send_response(response, *end_stream)?;
            *send_stream = Some(stream);
            if *end_stream {
                ended.store(true, Ordering::Release);
            }
            Ok(())
        }
        Command::Body { data, end_stream, .. } => {
            let stream = send_stream
                .as_mut()
                .ok_or(Error::WriterMisuse("body written before headers"))?;
            write_body(stream, data.clone(), *end_stream, send_timeout).await?;
            if *end_stream {
                ended.store(true, Ordering::Release);
            }
            Ok(())
        }
        Command::Trailers { headers, .. } => {
            let stream = send_stream
                .as_mut()
                .ok_or(Error::WriterMisuse("trailers written before headers"))?;
            stream.send_trailers(engine::header_map(headers)?)?;
            ended.store(true, Ordering::Release);
            Ok(())
        }
        Command::Reset { reason, .. } => {
            match send_stream.as_mut() {
                Some(stream) => stream.send_reset(*reason),
                None => respond.send_reset(*reason),
            }
            ended.store(true, Ordering::Release);
            Ok(())
        }
    }
}

fn reply(cmd: Command, result: Result<()>) {
    let reply = match cmd {
        Command::Interim { reply, .. } => reply,
        Command::Headers { reply, .. } => reply,
        Command::Body { reply, .. } => reply,
        Command::Trailers { reply, .. } => reply,
        Command::Reset { reply, .. } => reply,
    };
    let _ = reply.send(result);
}

async fn write_body(
    stream: &mut h2::SendStream<Bytes>,
    mut data: Bytes,
    end_stream: bool,
    send_timeout: Duration,
) -> Result<()> {
    if data.is_empty() {
        if end_stream {
            stream.send_data(data, true)?;
        }
        return Ok(());
    }

    while !data.is_empty() {
        stream.reserve_capacity(data.len());
        let granted = wait_for_capacity(stream, send_timeout).await?;
        if granted == 0 {
            // The stream ended (peer reset it, or it was otherwise closed)
            // while we were waiting for capacity; nothing left to write to.
            return Err(Error::Cancelled);
        }
        let chunk = data.split_to(granted.min(data.len()));
        let last = data.is_empty() && end_stream;
        stream.send_data(chunk, last)?;
    }
    Ok(())
}

/// Waits for `stream` to be granted at least one byte of the capacity most
/// recently reserved via `reserve_capacity`, bounded by `timeout`. This is
/// the only place a response write can genuinely block (on the peer's
/// flow-control window), so it is the only place the outgoing-send timeout
/// applies.
async fn wait_for_capacity(stream: &mut h2::SendStream<Bytes>, timeout: Duration) -> Result<usize> {
    let capacity = tokio::time::timeout(timeout, std::future::poll_fn(|cx| stream.poll_capacity(cx)))
        .await
        .map_err(|_| Error::SendTimeout(timeout))?;

    match capacity {
        Some(Ok(n)) => Ok(n),
        Some(Err(e)) => Err(Error::Protocol(e)),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn interim_status_range_matches_rfc_1xx() {
        assert!((100..200).contains(&100u16));
        assert!(!(100..200).contains(&200u16));
    }
}

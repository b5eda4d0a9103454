//! Line transport for a session: one JSON command per input line, one JSON
//! event per output line.
//!
//! Blank lines are skipped. Lines that do not decode are logged and
//! skipped, except a recognisable `create-hash`, which is answered with a
//! failed `hash-found`. End of input drains the session: outstanding
//! searches finish and are written out before [`serve`] returns.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::protocol::{parse_command, reject_malformed, render_event, Event};
use crate::session::{self, SessionConfig, SessionHandle};

/// Run a fresh session over `input` and `output` until input ends and every
/// outcome has been written.
pub async fn serve<R, W>(config: SessionConfig, input: R, output: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (handle, events) = session::spawn(config);
    run(handle, events, input, output).await
}

/// Drive an already spawned session.
pub async fn run<R, W>(
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<Event>,
    input: R,
    output: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Worker ready");
    tokio::try_join!(forward_commands(handle, input), write_events(events, output))?;
    Ok(())
}

async fn forward_commands<R>(handle: SessionHandle, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line) {
            Ok(command) => handle.send(command).await?,
            Err(err) => match reject_malformed(line, &err) {
                Some(outcome) => handle.reject(outcome).await?,
                None => warn!(error = %err, "Ignoring malformed command"),
            },
        }
    }

    // Dropping the handle lets the session drain and close its events.
    info!("Input closed, finishing outstanding searches");
    Ok(())
}

async fn write_events<W>(mut events: mpsc::UnboundedReceiver<Event>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        let mut line = render_event(&event)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}

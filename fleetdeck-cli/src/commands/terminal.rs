//! Line-oriented terminal over the terminal bridge.
//!
//! Each stdin line is sent followed by a carriage return. A line of the
//! form `:resize COLS ROWS` sends a resize control frame instead.

use std::path::Path;

use fleetdeck_core::{
    ControlMessage, Frame, FrameSink, FrameSource, TerminalBridge, TerminalConfig, TracingLevel,
    frame_channel,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::CliError;
use crate::util::{Context, create_runtime};

/// Frames buffered in each direction
const CHANNEL_CAPACITY: usize = 64;

/// Terminal command handler
pub fn cmd_terminal(
    config_path: Option<&Path>,
    verbosity: Option<TracingLevel>,
    name: &str,
) -> Result<(), CliError> {
    let context = Context::load(config_path, verbosity)?;
    let host_id = context.find_host(name)?.id;

    let pool = context.pool();
    let bridge = TerminalBridge::new(
        pool.clone(),
        context.store.clone(),
        context.store.clone(),
        context.vault.clone(),
        TerminalConfig::from(&context.settings.terminal),
    );

    let runtime = create_runtime()?;
    let result = runtime.block_on(async {
        let (bridge_end, client) = frame_channel(CHANNEL_CAPACITY);
        let run = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.run(host_id, bridge_end.sink, bridge_end.source).await }
        });

        let mut source = client.source;
        let output = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(frame) = source.recv().await {
                match frame {
                    Frame::Binary(bytes) => {
                        if stdout.write_all(&bytes).await.is_err() {
                            break;
                        }
                        let _ = stdout.flush().await;
                    }
                    Frame::Text(text) => eprintln!("{text}"),
                    Frame::Close => break,
                }
            }
        });

        let sink = client.sink;
        let input = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let frame = match parse_resize(&line) {
                    Some(resize) => Frame::Text(resize.to_json()),
                    None => Frame::Text(format!("{line}\r")),
                };
                if sink.send(frame).await.is_err() {
                    return;
                }
            }
            let _ = sink.send(Frame::Close).await;
        });

        let result = run.await;
        let _ = output.await;
        input.abort();
        pool.shutdown().await;
        result
    });
    // stdin reads park a blocking thread that never returns on its own
    runtime.shutdown_background();

    let record = result
        .map_err(|e| CliError::Connection(format!("terminal task failed: {e}")))??;
    eprintln!(
        "Session ended after {}s ({} commands, {} bytes)",
        record.duration_seconds, record.commands_executed, record.bytes_transferred
    );
    Ok(())
}

/// Parses `:resize COLS ROWS`
fn parse_resize(line: &str) -> Option<ControlMessage> {
    let mut parts = line.split_whitespace();
    if parts.next()? != ":resize" {
        return None;
    }
    let cols = parts.next()?.parse().ok()?;
    let rows = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(ControlMessage::Resize { cols, rows })
}

pub mod check;
pub mod info;
pub mod process;
pub mod thumbnail;
pub mod trim;
pub mod volume;

use std::io::Write;
use std::path::PathBuf;

use retime_common::error::RetimeError;
use retime_render_engine::{Engine, ExportTicket};

/// Follow an export to the end: print progress, cancel on Ctrl-C.
pub async fn follow(engine: &Engine, mut ticket: ExportTicket) -> anyhow::Result<PathBuf> {
    let id = ticket.id();
    let mut cancelling = false;

    loop {
        tokio::select! {
            event = ticket.progress.recv() => match event {
                Some(event) => {
                    print!("\r  Progress: {:.1}%  ", event.progress * 100.0);
                    std::io::stdout().flush().ok();
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if !cancelling => {
                if let Err(err) = signal {
                    tracing::warn!(error = %err, "Failed to listen for Ctrl-C");
                }
                cancelling = true;
                println!("\n  Cancelling...");
                engine.cancel(id);
            }
        }
    }
    println!();

    ticket.finish().await.map_err(failure)
}

/// Turn an engine error into a CLI error carrying its code.
pub fn failure(err: RetimeError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {err}", err.code())
}

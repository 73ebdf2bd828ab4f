//! `rips run`: compile, wait for the event source, then hand everything
//! to the dispatcher until the stream ends or a signal stops it.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rips_core::Program;
use rips_eval::levels::check_level_scripts;
use rips_eval::{
    feed, watch, Builtins, Context, Dispatcher, Exit, IdsWatcher, Interpreter, SignalKind,
    Sources, Stats, PATH_BACKLOG,
};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;

use crate::commands::compile_or_report;
use crate::config::{Input, RunConfig};
use crate::{report_error, OutputFormat};

/// Exit status when setup fails before the first event.
const SETUP_FAILED: i32 = 1;

pub(crate) async fn cmd_run(file: &Path, cfg: RunConfig, output: OutputFormat, quiet: bool) -> i32 {
    let started = Instant::now();
    let mut compiling = Duration::ZERO;
    let Some(program) = Stats::timed(&mut compiling, || compile_or_report(file, output, quiet)) else {
        return SETUP_FAILED;
    };
    tracing::info!(file = %file.display(), ?compiling, rules = program.rule_count(), "compiled");

    let builtins = match Builtins::standard() {
        Ok(b) => b,
        Err(e) => {
            report_error(&format!("builtin table: {}", e), output, quiet);
            return SETUP_FAILED;
        }
    };

    let (sig_tx, mut sig_rx) = mpsc::channel(8);
    // keeps the handlers installed until the run ends
    let _signals = match rips_eval::dispatcher::forward_signals(sig_tx) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "signal handlers not installed");
            None
        }
    };

    let (path_tx, path_rx) = mpsc::channel(PATH_BACKLOG);
    let _watcher = start_watcher(&cfg, path_tx);

    let session = Session {
        program,
        builtins,
        cfg: cfg.clone(),
        compiling,
        started,
    };

    match &cfg.input {
        Input::Stdin => {
            let reader = BufReader::new(tokio::io::stdin());
            session.serve(reader, tokio::io::stdout(), sig_rx, path_rx, output, quiet).await
        }
        Input::Socket(path) => {
            let _ = std::fs::remove_file(path);
            let listener = match UnixListener::bind(path) {
                Ok(l) => l,
                Err(e) => {
                    let msg = format!("cannot listen on '{}': {}", path.display(), e);
                    report_error(&msg, output, quiet);
                    return SETUP_FAILED;
                }
            };
            tracing::info!(socket = %path.display(), "waiting for a connection");
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                Some(signal) = sig_rx.recv() => {
                    tracing::info!(signal = signal.name(), "stopped before a connection arrived");
                    let _ = std::fs::remove_file(path);
                    return Exit::Signal(signal).code();
                }
            };
            let code = match accepted {
                Ok((stream, _)) => {
                    tracing::info!("peer connected");
                    let (read, write) = stream.into_split();
                    session
                        .serve(BufReader::new(read), write, sig_rx, path_rx, output, quiet)
                        .await
                }
                Err(e) => {
                    report_error(&format!("accept failed: {}", e), output, quiet);
                    SETUP_FAILED
                }
            };
            let _ = std::fs::remove_file(path);
            code
        }
    }
}

fn start_watcher(cfg: &RunConfig, tx: mpsc::Sender<std::path::PathBuf>) -> Option<IdsWatcher> {
    if !cfg.ids_dir.is_dir() {
        tracing::warn!(dir = %cfg.ids_dir.display(), "ids directory missing, idsalert stays false");
        return None;
    }
    match watch(&cfg.ids_dir, cfg.ids_pattern.clone(), tx) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(dir = %cfg.ids_dir.display(), error = %e, "cannot watch ids directory");
            None
        }
    }
}

struct Session {
    program: Program,
    builtins: Builtins,
    cfg: RunConfig,
    compiling: Duration,
    started: Instant,
}

impl Session {
    async fn serve<R, W>(
        self,
        reader: R,
        writer: W,
        signals: mpsc::Receiver<SignalKind>,
        paths: mpsc::Receiver<std::path::PathBuf>,
        output: OutputFormat,
        quiet: bool,
    ) -> i32
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_peer(writer, peer_rx));

        let ctx = Context::new(self.program.levels.clone())
            .with_scripts(&self.cfg.scripts)
            .with_fault_policy(self.cfg.fault_policy)
            .with_peer(peer_tx);
        let missing = check_level_scripts(&ctx);
        if !missing.is_empty() {
            let msg = format!(
                "{} level script(s) missing or not executable in '{}'",
                missing.len(),
                self.cfg.scripts.display()
            );
            report_error(&msg, output, quiet);
            return SETUP_FAILED;
        }

        let interp = Interpreter::new(Arc::new(self.program), self.builtins);
        let mut dispatcher = Dispatcher::new(interp, ctx);

        let (msg_tx, msg_rx) = mpsc::channel(1);
        let feeder = tokio::spawn(feed(reader, msg_tx));
        let exit = dispatcher
            .run(Sources {
                messages: msg_rx,
                signals,
                paths,
                poll: self.cfg.poll,
            })
            .await;

        let decoding = match exit {
            Exit::EndOfStream | Exit::DecodeFailed(_) => feeder.await.unwrap_or_default(),
            _ => {
                feeder.abort();
                Duration::ZERO
            }
        };

        let (_, ctx) = dispatcher.into_parts();
        let mut stats = ctx.stats.clone();
        drop(ctx);
        // the writer ends once the context's sender is gone
        if let Err(e) = writer_task.await {
            tracing::warn!(error = %e, "peer writer failed");
        }

        stats.compiling = self.compiling;
        stats.decoding = decoding;
        stats.total = self.started.elapsed();
        stats.log();
        if !quiet && output == OutputFormat::Text {
            eprintln!("{}", stats);
        }

        match &exit {
            Exit::EndOfStream => tracing::info!("end of stream"),
            Exit::Signal(signal) => tracing::info!(signal = signal.name(), "stopped by signal"),
            Exit::Crash(msg) => tracing::error!(message = %msg, "crash action"),
            Exit::Fatal(msg) => report_error(&format!("fatal: {}", msg), output, quiet),
            Exit::DecodeFailed(msg) => report_error(&format!("decode error: {}", msg), output, quiet),
        }
        exit.code()
    }
}

/// Copy status lines to the peer until every sender is gone.
async fn write_peer<W: AsyncWrite + Unpin>(mut out: W, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        if let Err(e) = out.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "peer write failed");
            return;
        }
        if let Err(e) = out.flush().await {
            tracing::warn!(error = %e, "peer flush failed");
            return;
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_lines_are_written_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (client, mut server) = tokio::io::duplex(256);
        let task = tokio::spawn(write_peer(client, rx));
        tx.send("---\nalert: 'a'\n...\n".to_string()).unwrap();
        tx.send("---\nalert: 'b'\n...\n".to_string()).unwrap();
        drop(tx);
        task.await.unwrap();

        let mut got = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut got).await.unwrap();
        assert_eq!(got, "---\nalert: 'a'\n...\n---\nalert: 'b'\n...\n");
    }
}

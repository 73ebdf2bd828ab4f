//! The run loop: one consumer arbitrating between signals, decoded
//! events, IDS file changes and the poll tick.
//!
//! Only the dispatcher evaluates rules, one pass at a time. The decoder
//! side waits for each event to be acknowledged before it decodes the
//! next one.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::io::AsyncBufRead;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::context::{Context, SignalKind};
use crate::decoder::Decoder;
use crate::error::EvalError;
use crate::interp::Interpreter;
use crate::levels;
use crate::message::{MessageView, RosMessage};

pub const DEFAULT_POLL: Duration = Duration::from_millis(200);

/// Capacity of the IDS path channel.
pub const PATH_BACKLOG: usize = 500;

/// Item on the message channel.
#[derive(Debug)]
pub enum Delivery {
    /// A decoded event; send on `ack` once it has been evaluated
    Message {
        message: Box<RosMessage>,
        ack: oneshot::Sender<()>,
    },
    /// The stream could not be decoded any further
    Failed(String),
}

/// Why the run loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit {
    EndOfStream,
    Signal(SignalKind),
    Crash(String),
    Fatal(String),
    DecodeFailed(String),
}

impl Exit {
    pub fn code(&self) -> i32 {
        match self {
            Exit::EndOfStream => 0,
            Exit::Signal(_) | Exit::DecodeFailed(_) => 1,
            Exit::Crash(_) | Exit::Fatal(_) => 2,
        }
    }
}

/// Receiving ends of every event source.
pub struct Sources {
    pub messages: mpsc::Receiver<Delivery>,
    pub signals: mpsc::Receiver<SignalKind>,
    pub paths: mpsc::Receiver<PathBuf>,
    pub poll: Duration,
}

pub struct Dispatcher {
    interp: Interpreter,
    ctx: Context,
}

impl Dispatcher {
    pub fn new(interp: Interpreter, ctx: Context) -> Self {
        Dispatcher { interp, ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    /// Announce the initial level, then serve events until a source ends
    /// the run.
    pub async fn run(&mut self, mut sources: Sources) -> Exit {
        self.interp.env_mut().set_predef_vars(&self.ctx);
        let level = self.ctx.current_level;
        levels::trigger(&mut self.ctx, level, level);

        let mut tick = tokio::time::interval(sources.poll);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of an interval completes at once
        tick.reset();

        loop {
            tokio::select! {
                biased;

                Some(signal) = sources.signals.recv() => {
                    tracing::debug!(signal = signal.name(), "signal");
                    match signal {
                        SignalKind::User1 | SignalKind::User2 => self.ctx.deliver(signal),
                        SignalKind::Interrupt | SignalKind::Terminate => return Exit::Signal(signal),
                    }
                }

                delivery = sources.messages.recv() => match delivery {
                    Some(Delivery::Message { message, ack }) => {
                        let result = self.evaluate(Some(message));
                        // the feeder may already be gone at shutdown
                        let _ = ack.send(());
                        if let Err(exit) = result {
                            return exit;
                        }
                    }
                    Some(Delivery::Failed(err)) => return Exit::DecodeFailed(err),
                    None => return Exit::EndOfStream,
                },

                Some(path) = sources.paths.recv() => {
                    tracing::debug!(path = %path.display(), "ids file changed");
                    self.ctx.paths.insert(path);
                }

                _ = tick.tick() => {
                    let result = self.evaluate(None);
                    self.ctx.paths.clear();
                    if let Err(exit) = result {
                        return exit;
                    }
                }
            }
        }
    }

    /// One evaluation pass for `message`, or for no event on a tick.
    pub fn evaluate(&mut self, message: Option<Box<RosMessage>>) -> Result<(), Exit> {
        self.ctx
            .set_message(message.map(|m| m as Box<dyn MessageView>));
        let start = Instant::now();
        let result = self.interp.run(&mut self.ctx);
        self.ctx.stats.executing += start.elapsed();
        self.ctx.stats.passes += 1;
        self.ctx.set_message(None);
        match result {
            Ok(report) => {
                tracing::trace!(?report, "pass done");
                Ok(())
            }
            Err(EvalError::Crash(msg)) => Err(Exit::Crash(msg)),
            Err(e) => {
                tracing::error!(error = %e, "fatal evaluation error");
                Err(Exit::Fatal(e.to_string()))
            }
        }
    }

    pub fn into_parts(self) -> (Interpreter, Context) {
        (self.interp, self.ctx)
    }
}

/// Decode events from `reader` and hand them to the dispatcher one at a
/// time. Returns the time spent decoding.
pub async fn feed<R>(reader: R, tx: mpsc::Sender<Delivery>) -> Duration
where
    R: AsyncBufRead + Unpin,
{
    let mut decoder = Decoder::new(reader);
    loop {
        match decoder.next_message().await {
            Ok(Some(message)) => {
                let (ack, done) = oneshot::channel();
                let delivery = Delivery::Message {
                    message: Box::new(message),
                    ack,
                };
                if tx.send(delivery).await.is_err() || done.await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "decode failed");
                let _ = tx.send(Delivery::Failed(e.to_string())).await;
                break;
            }
        }
    }
    tracing::debug!(events = decoder.decoded(), "decoder done");
    decoder.elapsed()
}

/// Forward process signals to `tx` until the receiver goes away.
#[cfg(unix)]
pub fn forward_signals(tx: mpsc::Sender<SignalKind>) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind as Unix};

    let mut usr1 = signal(Unix::user_defined1())?;
    let mut usr2 = signal(Unix::user_defined2())?;
    let mut int = signal(Unix::interrupt())?;
    let mut term = signal(Unix::terminate())?;
    Ok(tokio::spawn(async move {
        loop {
            let kind = tokio::select! {
                Some(()) = usr1.recv() => SignalKind::User1,
                Some(()) = usr2.recv() => SignalKind::User2,
                Some(()) = int.recv() => SignalKind::Interrupt,
                Some(()) = term.recv() => SignalKind::Terminate,
                else => break,
            };
            if tx.send(kind).await.is_err() {
                break;
            }
        }
    }))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Builtins;
    use rips_core::{compile, Value};
    use std::sync::Arc;

    const RULES: &str = "levels: calm; vars: msgs int = 0; ticks int = 0; usr int = 0;\n\
        rules Msg: true ? set(msgs, msgs + 1);\n\
        rules External: signal(\"SIGUSR1\") ? set(usr, usr + 1); true ? set(ticks, ticks + 1);\n\
        rules Graph: msgs + ticks + usr > 100000 ? crash(\"overflow\");";

    fn dispatcher(src: &str) -> Dispatcher {
        let program = compile(src, "d.rul").unwrap_or_else(|e| panic!("{}", e));
        let ctx = Context::new(program.levels.clone());
        let interp = Interpreter::new(Arc::new(program), Builtins::standard().unwrap());
        Dispatcher::new(interp, ctx)
    }

    struct Harness {
        messages: mpsc::Sender<Delivery>,
        signals: mpsc::Sender<SignalKind>,
        paths: mpsc::Sender<PathBuf>,
        sources: Sources,
    }

    fn harness(poll: Duration) -> Harness {
        let (messages, mrx) = mpsc::channel(1);
        let (signals, srx) = mpsc::channel(8);
        let (paths, prx) = mpsc::channel(PATH_BACKLOG);
        Harness {
            messages,
            signals,
            paths,
            sources: Sources {
                messages: mrx,
                signals: srx,
                paths: prx,
                poll,
            },
        }
    }

    fn get(d: &Dispatcher, name: &str) -> Value {
        d.interpreter().env().get(name).cloned().unwrap()
    }

    #[tokio::test]
    async fn events_are_acknowledged_in_order() {
        let mut d = dispatcher(RULES);
        let h = harness(Duration::from_secs(3600));
        let input = "---\nevent: message\n...\n---\nevent: message\n...\n---\nevent: message\n...\n";
        let feeder = tokio::spawn(feed(input.as_bytes(), h.messages));
        let exit = d.run(h.sources).await;
        assert_eq!(exit, Exit::EndOfStream);
        assert_eq!(exit.code(), 0);
        feeder.await.unwrap();
        assert_eq!(get(&d, "msgs"), Value::Int(3));
        assert_eq!(d.context().stats.passes, 3);
        drop(h.signals);
        drop(h.paths);
    }

    #[tokio::test]
    async fn user_signals_are_counted_and_consumed_on_tick() {
        let mut d = dispatcher(RULES);
        let h = harness(Duration::from_millis(10));
        h.signals.send(SignalKind::User1).await.unwrap();
        h.signals.send(SignalKind::User1).await.unwrap();
        let signals = h.signals.clone();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            signals.send(SignalKind::Terminate).await.unwrap();
        });
        let exit = d.run(h.sources).await;
        stopper.await.unwrap();
        assert_eq!(exit, Exit::Signal(SignalKind::Terminate));
        assert_eq!(exit.code(), 1);
        assert_eq!(get(&d, "usr"), Value::Int(2));
        assert!(matches!(get(&d, "ticks"), Value::Int(n) if n >= 2));
        assert_eq!(d.context().usr1, 0);
        drop(h.messages);
        drop(h.paths);
    }

    #[tokio::test]
    async fn paths_collapse_until_the_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("rips.alert");
        std::fs::write(&log, "[**] Portscan detected [**]\n").unwrap();

        let mut d = dispatcher(
            "levels: calm; vars: alerts int = 0;\n\
             rules External: idsalert(\"Portscan\") ? set(alerts, alerts + 1);",
        );
        let h = harness(Duration::from_millis(20));
        for _ in 0..3 {
            h.paths.send(log.clone()).await.unwrap();
        }
        let signals = h.signals.clone();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            signals.send(SignalKind::Interrupt).await.unwrap();
        });
        let exit = d.run(h.sources).await;
        stopper.await.unwrap();
        assert_eq!(exit, Exit::Signal(SignalKind::Interrupt));
        assert_eq!(get(&d, "alerts"), Value::Int(1));
        assert!(d.context().paths.is_empty());
        drop(h.messages);
        drop(h.paths);
    }

    #[tokio::test]
    async fn crash_ends_the_run_with_status_two() {
        let mut d = dispatcher(
            "levels: calm; rules Msg: topicin(\"/estop\") ? crash(\"emergency stop\");",
        );
        let (peer, mut out) = mpsc::unbounded_channel();
        d.ctx = Context::new(d.ctx.levels().to_vec()).with_peer(peer);
        let h = harness(Duration::from_secs(3600));
        let input = "---\nevent: message\nfromtopic: /odom\n...\n---\nevent: message\nfromtopic: /estop\n...\n";
        let feeder = tokio::spawn(feed(input.as_bytes(), h.messages));
        let exit = d.run(h.sources).await;
        assert_eq!(exit, Exit::Crash("emergency stop".into()));
        assert_eq!(exit.code(), 2);
        feeder.await.unwrap();
        let mut lines = Vec::new();
        while let Ok(l) = out.try_recv() {
            lines.push(l);
        }
        assert_eq!(lines.last().unwrap(), "---\ncrashing: 'emergency stop'\n...\n");
        drop(h.signals);
        drop(h.paths);
    }

    #[tokio::test]
    async fn decode_errors_stop_the_run() {
        let mut d = dispatcher(RULES);
        let h = harness(Duration::from_secs(3600));
        let feeder = tokio::spawn(feed("---\nevent: [\n...\n".as_bytes(), h.messages));
        let exit = d.run(h.sources).await;
        assert!(matches!(exit, Exit::DecodeFailed(_)));
        feeder.await.unwrap();
        drop(h.signals);
        drop(h.paths);
    }
}

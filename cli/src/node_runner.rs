//! Runs the node's event loop on its own dedicated OS thread and
//! exposes a [`bitc_rpc::handle::NodeHandle`] other threads (the
//! jsonrpsee runtime) can call into. Every call hands a command across
//! a channel and pokes the reactor's self-pipe so `poll_once` wakes up
//! promptly instead of waiting out its next timer.

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bitc_rpc::error::Error as RpcError;
use bitc_rpc::handle::NodeHandle;
use bitc_rpc::types::StatusSnapshot;

use crate::context::NodeContext;

enum Command {
    Status(mpsc::Sender<StatusSnapshot>),
    SubmitTx { recipient: String, amount_sat: u64, fee_rate: u64, reply: mpsc::Sender<Result<String, RpcError>> },
}

/// Owns the channel into the node thread and a waker to nudge it out
/// of `poll_once`. Implements [`NodeHandle`] for the RPC server.
pub struct NodeRunner {
    commands: mpsc::Sender<Command>,
    waker: Mutex<bitc_net::reactor::Waker>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl NodeRunner {
    /// Spawns the reactor thread, moving `context` into it, and returns
    /// a handle plus the shutdown flag `main` should set on Ctrl-C.
    pub fn spawn(mut context: NodeContext) -> crate::error::Result<Arc<Self>> {
        let waker = context.waker()?;
        let (tx, rx) = mpsc::channel::<Command>();
        let shutdown = context.shutdown_flag();

        let join = std::thread::Builder::new()
            .name("bitc-reactor".into())
            .spawn(move || {
                context.dial_initial_peers().unwrap_or_else(|e| {
                    tracing::error!(error = %e, "failed to dial initial peers");
                });

                while !shutdown.load(Ordering::SeqCst) {
                    if let Err(e) = context.run_once() {
                        tracing::warn!(error = %e, "reactor iteration failed");
                    }
                    while let Ok(command) = rx.try_recv() {
                        dispatch(&mut context, command);
                    }
                }

                if let Err(e) = context.shutdown() {
                    tracing::warn!(error = %e, "error during node shutdown");
                }
            })
            .expect("failed to spawn reactor thread");

        Ok(Arc::new(NodeRunner { commands: tx, waker: Mutex::new(waker), join: Mutex::new(Some(join)) }))
    }

    fn wake(&self) {
        let _ = self.waker.lock().unwrap().wake();
    }

    /// Blocks the calling (non-reactor) thread until the reactor has
    /// drained and replied to every command sent before this call.
    pub fn join(&self) {
        if let Some(handle) = self.join.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn dispatch(context: &mut NodeContext, command: Command) {
    match command {
        Command::Status(reply) => {
            let snapshot = StatusSnapshot {
                best_height: context.best_height(),
                peer_count: context.peer_count(),
                balance_sat: context.confirmed_plus_unconfirmed_balance_sat(),
                sync_percent: context.sync_percent(),
            };
            let _ = reply.send(snapshot);
        }
        Command::SubmitTx { recipient, amount_sat, fee_rate, reply } => {
            let result = context
                .submit_tx(&recipient, amount_sat, fee_rate)
                .map(|txid| hex::encode(txid))
                .map_err(|e| RpcError::SubmitFailed(e.to_string()));
            let _ = reply.send(result);
        }
    }
}

impl NodeHandle for NodeRunner {
    fn status_snapshot(&self) -> StatusSnapshot {
        let (tx, rx) = mpsc::channel();
        if self.commands.send(Command::Status(tx)).is_err() {
            return StatusSnapshot { best_height: 0, peer_count: 0, balance_sat: 0, sync_percent: 0.0 };
        }
        self.wake();
        rx.recv().unwrap_or(StatusSnapshot { best_height: 0, peer_count: 0, balance_sat: 0, sync_percent: 0.0 })
    }

    fn submit_tx(&self, recipient: String, amount_sat: u64, fee_rate_sat_per_vbyte: u64) -> Result<String, RpcError> {
        let (tx, rx) = mpsc::channel();
        self.commands
            .send(Command::SubmitTx { recipient, amount_sat, fee_rate: fee_rate_sat_per_vbyte, reply: tx })
            .map_err(|_| RpcError::SubmitFailed("node thread is not running".into()))?;
        self.wake();
        rx.recv().map_err(|_| RpcError::SubmitFailed("node thread dropped the reply channel".into()))?
    }
}

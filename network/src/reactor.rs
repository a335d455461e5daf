//! The single-threaded readiness reactor (§4.5): wraps `mio::Poll` over
//! registered sockets plus a self-pipe used by the worker pool to wake
//! the reactor when a job completes, and a monotonic timer heap for
//! periodic work (pings, rebroadcast, sync-peer rotation).
//!
//! Every registered fd carries a `mio::Token`; the self-pipe is always
//! registered at [`WAKE_TOKEN`] so `poll` can special-case it before
//! dispatching to component handlers.

use std::collections::BinaryHeap;
use std::cmp::Ordering as CmpOrdering;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use mio::unix::pipe;
use mio::{Events, Interest, Poll, Token};

use crate::error::Result;

/// Reserved token for the self-pipe wake source; component fds use any
/// other token value.
pub const WAKE_TOKEN: Token = Token(0);

/// A scheduled timer callback, ordered earliest-deadline-first.
struct TimerEntry {
    deadline: Instant,
    id: u64,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline.
        other.deadline.cmp(&self.deadline).then_with(|| other.id.cmp(&self.id))
    }
}

/// Readiness-based event loop: owns the `Poll` instance, the wake pipe,
/// and the timer heap. Component state (peers, chain index, address
/// book) lives outside the reactor and is driven by whatever calls
/// [`Reactor::poll_once`] in a loop.
pub struct Reactor {
    poll: Poll,
    wake_receiver: pipe::Receiver,
    wake_sender: pipe::Sender,
    timers: BinaryHeap<TimerEntry>,
    next_timer_id: u64,
}

/// What `poll_once` observed in one iteration.
pub struct PollOutcome {
    pub woken: bool,
    pub fired_timers: Vec<u64>,
    pub events: Events,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        let poll = Poll::new()?;
        let (sender, mut receiver) = pipe::new()?;
        poll.registry().register(&mut receiver, WAKE_TOKEN, Interest::READABLE)?;

        Ok(Reactor {
            poll,
            wake_receiver: receiver,
            wake_sender: sender,
            timers: BinaryHeap::new(),
            next_timer_id: 0,
        })
    }

    /// Registers a component's file descriptor for readiness events.
    pub fn register<S: mio::event::Source>(&self, source: &mut S, token: Token, interests: Interest) -> Result<()> {
        self.poll.registry().register(source, token, interests)?;
        Ok(())
    }

    pub fn deregister<S: mio::event::Source>(&self, source: &mut S) -> Result<()> {
        self.poll.registry().deregister(source)?;
        Ok(())
    }

    /// Updates the readiness interests for an already-registered source,
    /// used whenever a connection's write queue goes from empty to
    /// non-empty or back (§4.5: writable is only watched while a write
    /// is pending).
    pub fn reregister<S: mio::event::Source>(&self, source: &mut S, token: Token, interests: Interest) -> Result<()> {
        self.poll.registry().reregister(source, token, interests)?;
        Ok(())
    }

    /// A clonable handle worker-pool threads use to poke the self-pipe
    /// on job completion (§4.5 "the self-pipe is poked").
    pub fn waker(&self) -> Result<Waker> {
        Ok(Waker { sender: self.wake_sender.try_clone()? })
    }

    /// Schedules a one-shot timer firing at `delay` from now. Returns an
    /// id the caller can use to recognize which timer fired.
    pub fn schedule_timer(&mut self, delay: Duration) -> u64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        self.timers.push(TimerEntry { deadline: Instant::now() + delay, id });
        id
    }

    fn next_timeout(&self) -> Option<Duration> {
        self.timers.peek().map(|t| t.deadline.saturating_duration_since(Instant::now()))
    }

    /// Runs one iteration: blocks in `poll` until a readiness event, a
    /// wake, or the next timer deadline, then drains the wake pipe and
    /// due timers. This is the reactor's *only* blocking point (§4.5
    /// "Suspension").
    pub fn poll_once(&mut self) -> Result<PollOutcome> {
        let mut events = Events::with_capacity(128);
        let timeout = self.next_timeout();
        self.poll.poll(&mut events, timeout)?;

        let mut woken = false;
        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                woken = true;
            }
        }
        if woken {
            self.drain_wake_pipe()?;
        }

        let now = Instant::now();
        let mut fired = Vec::new();
        while let Some(entry) = self.timers.peek() {
            if entry.deadline > now {
                break;
            }
            fired.push(self.timers.pop().unwrap().id);
        }

        Ok(PollOutcome { woken, fired_timers: fired, events })
    }

    fn drain_wake_pipe(&mut self) -> Result<()> {
        let mut buf = [0u8; 64];
        loop {
            match self.wake_receiver.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Clonable wake handle given to worker-pool threads.
pub struct Waker {
    sender: pipe::Sender,
}

impl Waker {
    /// Writes a single byte to the self-pipe, unblocking a `poll` in
    /// progress (§4.5 "A self-pipe receives a single byte per
    /// cross-thread notification").
    pub fn wake(&mut self) -> Result<()> {
        let _ = self.sender.write(&[1u8])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waking_the_self_pipe_is_observed_by_poll_once() {
        let mut reactor = Reactor::new().unwrap();
        let mut waker = reactor.waker().unwrap();
        waker.wake().unwrap();

        let outcome = reactor.poll_once().unwrap();
        assert!(outcome.woken);
    }

    #[test]
    fn a_due_timer_is_reported_as_fired() {
        let mut reactor = Reactor::new().unwrap();
        let id = reactor.schedule_timer(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        // Poke the pipe too, so poll_once doesn't block waiting for I/O
        // readiness that will never come in this unit test.
        let mut waker = reactor.waker().unwrap();
        waker.wake().unwrap();

        let outcome = reactor.poll_once().unwrap();
        assert!(outcome.fired_timers.contains(&id));
    }

    #[test]
    fn timer_ordering_is_earliest_deadline_first() {
        let mut reactor = Reactor::new().unwrap();
        let far = reactor.schedule_timer(Duration::from_secs(10));
        let near = reactor.schedule_timer(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        let mut waker = reactor.waker().unwrap();
        waker.wake().unwrap();

        let outcome = reactor.poll_once().unwrap();
        assert_eq!(outcome.fired_timers, vec![near]);
        assert!(!outcome.fired_timers.contains(&far));
    }
}

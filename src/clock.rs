//! Monotonic tick source for the [`Tracker`] and [`RingManager`] actors.
//!
//! A `Clock` ticks at the interval specified by its [`Ticker`], counting
//! ticks since the owning actor was created. Unlike wall-clock time, the
//! ticker backing a `Clock` is injectable: production code drives it with
//! [`SystemTicker`] (a real timer), tests drive it with [`ManualTicker`] so
//! that heartbeat and peer-expiry scenarios (spec.md §8) run deterministically
//! instead of sleeping on real time.
//!
//! [`Tracker`]: ../tracker/struct.Tracker.html
//! [`RingManager`]: ../ring_manager/struct.RingManager.html
use fibers::sync::mpsc;
use fibers::time::timer::{self, Timeout};
use futures::{Async, Future, Poll, Stream};
use std::time::Duration;

use Error;

/// A tick count since an actor started.
pub type Tick = u64;

/// Something that yields `()` at (approximately) regular intervals.
///
/// [`SystemTicker`] and [`ManualTicker`] are the two implementations shipped
/// by this crate; user code can supply its own by implementing this trait
/// directly (e.g. to drive ticks from an external scheduler).
pub trait Ticker: Stream<Item = (), Error = Error> + Send {}
impl<T> Ticker for T where T: Stream<Item = (), Error = Error> + Send {}

/// A [`Ticker`] backed by a real timer, firing every `interval`.
///
/// [`Ticker`]: ./trait.Ticker.html
#[derive(Debug)]
pub struct SystemTicker {
    interval: Duration,
    timeout: Timeout,
}
impl SystemTicker {
    /// Makes a new `SystemTicker` that fires every `interval`.
    pub fn new(interval: Duration) -> Self {
        SystemTicker {
            interval,
            timeout: timer::timeout(interval),
        }
    }
}
impl Stream for SystemTicker {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        if track!(self.timeout.poll().map_err(Error::from))?.is_ready() {
            self.timeout = timer::timeout(self.interval);
            Ok(Async::Ready(Some(())))
        } else {
            Ok(Async::NotReady)
        }
    }
}

/// A [`Ticker`] driven explicitly by test code via a [`ManualTickHandle`].
///
/// [`Ticker`]: ./trait.Ticker.html
/// [`ManualTickHandle`]: ./struct.ManualTickHandle.html
#[derive(Debug)]
pub struct ManualTicker {
    rx: mpsc::Receiver<()>,
}
impl Stream for ManualTicker {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        Ok(self.rx.poll().expect("Never fails"))
    }
}

/// The sending half of a [`ManualTicker`], used by tests to advance a
/// `Clock` without waiting on wall-clock time.
///
/// [`ManualTicker`]: ./struct.ManualTicker.html
#[derive(Debug, Clone)]
pub struct ManualTickHandle {
    tx: mpsc::Sender<()>,
}
impl ManualTickHandle {
    /// Makes a connected `(ManualTickHandle, ManualTicker)` pair.
    pub fn new() -> (Self, ManualTicker) {
        let (tx, rx) = mpsc::channel();
        (ManualTickHandle { tx }, ManualTicker { rx })
    }

    /// Fires one tick.
    pub fn tick(&self) {
        let _ = self.tx.send(());
    }
}

/// Counts ticks produced by a [`Ticker`].
///
/// [`Ticker`]: ./trait.Ticker.html
#[derive(Debug)]
pub struct Clock<T> {
    ticks: Tick,
    ticker: T,
}
impl<T: Ticker> Clock<T> {
    /// Wraps `ticker` in a tick counter.
    pub fn new(ticker: T) -> Self {
        Clock { ticks: 0, ticker }
    }

    /// Returns the number of ticks elapsed since creation.
    pub fn ticks(&self) -> Tick {
        self.ticks
    }
}
impl<T: Ticker> Stream for Clock<T> {
    type Item = Tick;
    type Error = Error;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        match track!(self.ticker.poll())? {
            Async::Ready(Some(())) => {
                self.ticks += 1;
                Ok(Async::Ready(Some(self.ticks)))
            }
            Async::Ready(None) => Ok(Async::Ready(None)),
            Async::NotReady => Ok(Async::NotReady),
        }
    }
}

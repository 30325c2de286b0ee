use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent, MouseEvent};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum CapacityEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, mouse, resize)
pub trait CapacityEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<CapacityEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<CapacityEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) => CapacityEvent::Key(key),
                Ok(CtEvent::Mouse(mouse)) => CapacityEvent::Mouse(mouse),
                Ok(CtEvent::Resize(_, _)) => CapacityEvent::Resize,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("terminal event reader stopped: {e}");
                    break;
                }
            };
            if tx.send(forwarded).is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<CapacityEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Roughly 60 updates per second.
    pub fn frame() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<CapacityEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<CapacityEvent>) -> Self {
        Self { rx }
    }
}

impl CapacityEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<CapacityEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time.
///
/// Ticks are scheduled against a deadline, so a steady stream of input
/// (e.g. key repeat) cannot starve the simulation.
pub struct Runner<E: CapacityEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    next_tick: Cell<Instant>,
}

impl<E: CapacityEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        let next_tick = Cell::new(Instant::now() + ticker.interval());
        Self {
            event_source,
            ticker,
            next_tick,
        }
    }

    /// Blocks until the next tick deadline and returns the next event, or Tick
    /// once the deadline has passed.
    pub fn step(&self) -> CapacityEvent {
        let now = Instant::now();
        let deadline = self.next_tick.get();
        if now >= deadline {
            self.schedule_after(deadline, now);
            return CapacityEvent::Tick;
        }

        match self.event_source.recv_timeout(deadline - now) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => {
                self.schedule_after(deadline, Instant::now());
                CapacityEvent::Tick
            }
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                self.schedule_after(deadline, Instant::now());
                CapacityEvent::Tick
            }
        }
    }

    fn schedule_after(&self, deadline: Instant, now: Instant) {
        let next = deadline + self.ticker.interval();
        // Skip missed ticks rather than firing them back to back.
        self.next_tick
            .set(if next <= now { now + self.ticker.interval() } else { next });
    }
}

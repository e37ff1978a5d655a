//! Running a [`System`] on a background thread.
//!
//! A [`Runner`] owns the system behind a mutex and drives it from a dedicated
//! simulation thread. The thread has three states:
//! - **stopped**: it idles, waking every [`RunnerConfig::idle_delay`] to check for commands,
//! - **running**: it steps the system, sleeping [`RunnerConfig::slow_delay`] between
//!   steps in slow mode,
//! - **paused**: like stopped, but resumable where it left off.
//!
//! When a CPU halts at a breakpoint, the runner pauses itself and posts [`SimEvent::Break`].
//! When an instruction fails, it stops and posts [`SimEvent::Error`]. Events are read from
//! [`Runner::events`]; the simulation thread never waits for them to be handled.
//!
//! ```no_run
//! use niisim::sim::runner::{Runner, SimEvent};
//! use niisim::sim::System;
//!
//! let mut sys = System::default();
//! sys.load_sdf_file("de2.sdf").unwrap();
//! sys.load_elf_file("program.elf").unwrap();
//!
//! let runner = Runner::spawn(sys, Default::default());
//! runner.start(false);
//! match runner.events().recv() {
//!     Ok(SimEvent::Break(addr)) => println!("halted at {addr:#010x}"),
//!     Ok(SimEvent::Error(e)) => println!("{e}"),
//!     Err(_) => {}
//! }
//! runner.close();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as cbc;

use super::{SimErr, System};

/// Steps taken per lock of the system while running at full speed.
const STEPS_PER_LOCK: usize = 256;

/// Timing configuration for a [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Delay between steps in slow mode.
    ///
    /// By default, this is 2 ms.
    pub slow_delay: Duration,

    /// How long the thread sleeps between checks while stopped or paused.
    ///
    /// Commands wake it early, so this only bounds how long an idle thread goes unchecked.
    /// By default, this is 200 ms.
    pub idle_delay: Duration,

    /// Whether to start in slow mode.
    ///
    /// By default, this flag is `false`.
    pub slow: bool,
}
impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            slow_delay: Duration::from_millis(2),
            idle_delay: Duration::from_millis(200),
            slow: false,
        }
    }
}

/// A notification from the simulation thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A CPU halted before the instruction at this address. The runner is paused.
    Break(u32),
    /// An instruction failed. The runner is stopped.
    Error(SimErr),
}

#[derive(Debug)]
struct Shared {
    system: Mutex<System>,
    running: AtomicBool,
    paused: AtomicBool,
    quitting: AtomicBool,
    slow: AtomicBool,
}
impl Shared {
    fn lock(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(PoisonError::into_inner)
    }
    fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.paused.load(Ordering::Acquire)
    }
}

/// Runs a [`System`] on a background thread.
#[derive(Debug)]
pub struct Runner {
    shared: Arc<Shared>,
    wake: cbc::Sender<()>,
    events: cbc::Receiver<SimEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Runner {
    /// Moves the system onto a new simulation thread. The thread starts stopped.
    pub fn spawn(system: System, config: RunnerConfig) -> Self {
        let shared = Arc::new(Shared {
            system: Mutex::new(system),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            quitting: AtomicBool::new(false),
            slow: AtomicBool::new(config.slow),
        });
        let (wake_tx, wake_rx) = cbc::bounded(1);
        let (event_tx, event_rx) = cbc::unbounded();

        let handle = std::thread::spawn({
            let shared = Arc::clone(&shared);
            move || run_loop(&shared, &wake_rx, &event_tx, config)
        });

        Self { shared, wake: wake_tx, events: event_rx, handle: Some(handle) }
    }

    fn notify(&self) {
        // a wakeup already queued is just as good
        let _ = self.wake.try_send(());
    }

    /// Starts running, unless already running or no program is loaded.
    ///
    /// Returns whether the runner is now running.
    pub fn start(&self, paused: bool) -> bool {
        if !self.shared.lock().is_loaded() { return false; }

        if !self.shared.running.load(Ordering::Acquire) {
            log::info!("simulation started{}", if paused { " (paused)" } else { "" });
            self.shared.paused.store(paused, Ordering::Release);
            self.shared.running.store(true, Ordering::Release);
            self.notify();
        }
        true
    }

    /// Pauses a running simulation.
    pub fn pause(&self) {
        if self.shared.running.load(Ordering::Acquire) {
            log::debug!("simulation paused");
            self.shared.paused.store(true, Ordering::Release);
        }
    }

    /// Resumes a paused simulation.
    pub fn unpause(&self) {
        if self.shared.running.load(Ordering::Acquire) && self.shared.paused.swap(false, Ordering::AcqRel) {
            log::debug!("simulation unpaused");
            self.notify();
        }
    }

    /// Stops the simulation.
    ///
    /// Once this returns, the simulation thread takes no more steps until restarted.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            log::info!("simulation stopped");
        }
        self.shared.paused.store(false, Ordering::Release);

        // waits out a step in progress
        drop(self.shared.lock());
    }

    /// Whether the simulation is running (possibly paused).
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
    /// Whether the simulation is paused.
    pub fn is_paused(&self) -> bool {
        self.is_running() && self.shared.paused.load(Ordering::Acquire)
    }

    /// Switches between slow (delayed) and full speed stepping.
    pub fn set_slow(&self, slow: bool) {
        self.shared.slow.store(slow, Ordering::Release);
    }

    /// The queue of notifications from the simulation thread.
    pub fn events(&self) -> &cbc::Receiver<SimEvent> {
        &self.events
    }

    /// Runs `f` with exclusive access to the system.
    ///
    /// The simulation thread is blocked while `f` runs, so this is safe for quick
    /// queries and edits (registers, breakpoints, input) even while running.
    pub fn with_system<R>(&self, f: impl FnOnce(&mut System) -> R) -> R {
        f(&mut self.shared.lock())
    }

    /// Stops the simulation, then runs `f` with exclusive access to the system.
    ///
    /// Use this for loading a new system description or program.
    pub fn reconfigure<R>(&self, f: impl FnOnce(&mut System) -> R) -> R {
        self.stop();
        self.with_system(f)
    }

    /// Stops the simulation and joins the simulation thread.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else { return };

        self.stop();
        self.shared.quitting.store(true, Ordering::Release);
        self.notify();
        if handle.join().is_err() {
            log::warn!("simulation thread panicked");
        }
    }
}
impl Drop for Runner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(shared: &Shared, wake: &cbc::Receiver<()>, events: &cbc::Sender<SimEvent>, config: RunnerConfig) {
    log::debug!("simulation thread started");

    while !shared.quitting.load(Ordering::Acquire) {
        if !shared.is_active() {
            // woken early by any command
            let _ = wake.recv_timeout(config.idle_delay);
            continue;
        }

        let slow = shared.slow.load(Ordering::Acquire);
        let batch = if slow { 1 } else { STEPS_PER_LOCK };
        let mut event = None;
        {
            let mut sys = shared.lock();
            for _ in 0..batch {
                // stop() may have landed while waiting for the lock
                if !shared.is_active() { break; }

                match sys.step() {
                    Ok(None) => {},
                    Ok(Some(addr)) => {
                        log::info!("break at {addr:#010x}");
                        shared.paused.store(true, Ordering::Release);
                        event = Some(SimEvent::Break(addr));
                        break;
                    },
                    Err(e) => {
                        log::info!("simulation halted on error: {e}");
                        shared.running.store(false, Ordering::Release);
                        shared.paused.store(false, Ordering::Release);
                        event = Some(SimEvent::Error(e));
                        break;
                    }
                }
            }
        }

        if let Some(event) = event {
            // the runner holds the receiver for as long as this thread lives
            let _ = events.send(event);
        }
        if slow {
            std::thread::sleep(config.slow_delay);
        }
    }

    log::debug!("simulation thread exiting");
}

//! Breakpoints and stepping.
//!
//! The key type here is [`SteppingController`], which the CPU consults before every
//! instruction fetch to decide whether execution should halt.
//!
//! The controller tracks:
//! - explicit breakpoints, reference counted by address (several source lines can
//!   resolve to the same address, so each address keeps a count of how many times
//!   it was added),
//! - source boundaries, the addresses where a source statement begins
//!   (taken from the program's debug info),
//! - the call depth, incremented on every call and decremented on every return,
//! - the active [`DebugMode`].
//!
//! # Stepping
//!
//! | mode                            | halts at                                                            |
//! |---------------------------------|---------------------------------------------------------------------|
//! | [`DebugMode::Continue`]         | explicit breakpoints                                                |
//! | [`DebugMode::StepInto`]         | the next source boundary or explicit breakpoint                     |
//! | [`DebugMode::StepOver`]         | like step into, but not while deeper than where the step started    |
//! | [`DebugMode::StepReturn`]       | explicit breakpoints, then like step into once the frame returns    |
//! | [`DebugMode::StepInstruction`]  | every instruction                                                   |
//!
//! A step over or step return that sees the call depth drop below where it started
//! switches itself to step into, so it stops at the first boundary after the return.
//! Step over still honors explicit breakpoints inside callees.

use std::collections::{BTreeMap, BTreeSet};

/// The active stepping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebugMode {
    /// Run until an explicit breakpoint.
    #[default]
    Continue,
    /// Halt at the next source statement.
    StepInto,
    /// Halt at the next source statement of the current frame.
    StepOver,
    /// Halt at the next source statement after the current frame returns.
    StepReturn,
    /// Halt at the next instruction.
    StepInstruction,
}
impl std::fmt::Display for DebugMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebugMode::Continue        => f.write_str("Continue"),
            DebugMode::StepInto        => f.write_str("Step Into"),
            DebugMode::StepOver        => f.write_str("Step Over"),
            DebugMode::StepReturn      => f.write_str("Step Return"),
            DebugMode::StepInstruction => f.write_str("Step Instruction"),
        }
    }
}

/// Decides, per fetched address, whether execution should halt.
#[derive(Debug, Default)]
pub struct SteppingController {
    mode: DebugMode,

    /// Current call depth.
    ///
    /// This is signed, since a program can return out of frames it never entered
    /// (e.g. returning from the entry point).
    depth: i32,
    /// Depth when the current step over/step return started.
    frame_snapshot: i32,

    breakpoints: BTreeMap<u32, u32>,
    boundaries: BTreeSet<u32>,
}

impl SteppingController {
    /// Creates a controller in [`DebugMode::Continue`] with no breakpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// The active stepping mode.
    pub fn mode(&self) -> DebugMode {
        self.mode
    }

    /// The current call depth.
    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Whether execution should halt before fetching `addr`.
    pub fn should_halt(&self, addr: u32) -> bool {
        let explicit = self.has_breakpoint(addr);

        match self.mode {
            DebugMode::Continue | DebugMode::StepReturn => explicit,
            DebugMode::StepOver if explicit => true,
            DebugMode::StepOver if self.frame_snapshot < self.depth => false,
            DebugMode::StepOver | DebugMode::StepInto => explicit || self.boundaries.contains(&addr),
            DebugMode::StepInstruction => true,
        }
    }

    /// Selects a stepping mode.
    ///
    /// Step over and step return remember the current depth as the frame to step within.
    pub fn resume(&mut self, mode: DebugMode) {
        log::debug!("stepping mode: {mode}");
        self.mode = mode;
        if matches!(mode, DebugMode::StepOver | DebugMode::StepReturn) {
            self.frame_snapshot = self.depth;
        }
    }

    /// Records a call.
    pub fn enter(&mut self) {
        self.depth += 1;
    }

    /// Records a return.
    pub fn ret(&mut self) {
        self.depth -= 1;
        if matches!(self.mode, DebugMode::StepOver | DebugMode::StepReturn) && self.depth < self.frame_snapshot {
            self.resume(DebugMode::StepInto);
        }
    }

    /// Resets the call depth, e.g. when the CPU is reset.
    pub fn reset_depth(&mut self) {
        self.depth = 0;
        self.frame_snapshot = 0;
    }

    /// Adds one reference to a breakpoint at `addr`.
    ///
    /// Returns `true` if this created the breakpoint.
    pub fn add_breakpoint(&mut self, addr: u32) -> bool {
        let count = self.breakpoints.entry(addr).or_default();
        *count += 1;
        *count == 1
    }

    /// Removes one reference to a breakpoint at `addr`.
    ///
    /// Returns `true` if this removed the last reference (and so the breakpoint).
    pub fn remove_breakpoint(&mut self, addr: u32) -> bool {
        let Some(count) = self.breakpoints.get_mut(&addr) else { return false };
        *count -= 1;
        if *count == 0 {
            self.breakpoints.remove(&addr);
            true
        } else {
            false
        }
    }

    /// Whether an explicit breakpoint is set at `addr`.
    pub fn has_breakpoint(&self, addr: u32) -> bool {
        self.breakpoints.contains_key(&addr)
    }

    /// All addresses with an explicit breakpoint.
    pub fn breakpoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.breakpoints.keys().copied()
    }

    /// Removes every explicit breakpoint.
    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Replaces the set of source boundaries.
    pub fn set_source_boundaries(&mut self, addrs: impl IntoIterator<Item = u32>) {
        self.boundaries = addrs.into_iter().collect();
    }
}

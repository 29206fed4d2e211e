//! Probe request pool
//!
//! A probe is a one-shot request into the camera pipeline to harvest the
//! current parameters of a module. The pipeline answers asynchronously, on
//! its own thread, through the [`ProbeCompleter`] carried by the request.
//!
//! # Architecture
//!
//! ```text
//!  session thread                     pipeline thread
//!  ──────────────                     ───────────────
//!  acquire() ─► ProbeToken
//!  submit()  ─► ProbeRequest ───────► CameraPipeline::submit_probe
//!  wait() ◄── condvar ◄── slot ◄───── ProbeCompleter::complete
//!   (≤ 1 s)               (registry converts the snapshot here)
//! ```
//!
//! The pool has a fixed number of slots. `acquire` never blocks; when every
//! slot is in flight it fails with [`TuningError::PoolExhausted`]. A waiter
//! that times out leaves its slot in flight and marked abandoned; the late
//! completion, whenever it arrives, recycles the slot and drops the result.
//!
//! # Cookies
//!
//! ```text
//!  63      48 47      32 31        8 7     1  0
//!  generation   slot      module id   unused  filled
//! ```
//!
//! The pipeline sets [`PROBE_FILLED`] when it wrote the snapshot.

use crate::error::{Result, TuningError};
use crate::params::ParamRegistry;
use crate::pipeline::{CameraPipeline, PipelineControl};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Number of probes that may be in flight at once
pub const PROBE_POOL_SIZE: usize = 4;

/// How long a GET waits for the pipeline
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Cookie bit set by the pipeline when the snapshot was filled
pub const PROBE_FILLED: u64 = 0x1;

fn make_cookie(generation: u16, slot: usize, module_id: u32) -> u64 {
    (u64::from(generation) << 48) | ((slot as u64 & 0xFFFF) << 32) | (u64::from(module_id) << 8)
}

fn cookie_slot(cookie: u64) -> usize {
    ((cookie >> 32) & 0xFFFF) as usize
}

/// Lifecycle of one pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Free,
    InFlight,
    Completed,
}

#[derive(Debug)]
struct Slot {
    state: TokenState,
    cookie: u64,
    module_id: u32,
    generation: u16,
    abandoned: bool,
    result: Vec<u8>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: TokenState::Free,
            cookie: 0,
            module_id: 0,
            generation: 0,
            abandoned: false,
            result: Vec::new(),
        }
    }

    fn recycle(&mut self) {
        self.state = TokenState::Free;
        self.abandoned = false;
        self.result = Vec::new();
    }
}

struct PoolShared {
    slots: Mutex<Vec<Slot>>,
    completed: Condvar,
    registry: Arc<ParamRegistry>,
    timeout: Duration,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A reserved slot that has not been submitted yet
#[derive(Debug)]
pub struct ProbeToken {
    slot: usize,
}

impl ProbeToken {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// A submitted probe awaiting its completion
#[derive(Debug)]
pub struct PendingProbe {
    slot: usize,
    cookie: u64,
    module_id: u32,
}

impl PendingProbe {
    pub fn cookie(&self) -> u64 {
        self.cookie
    }
}

/// What a waiter got back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Wire image of the fresh snapshot; empty if the pipeline did not fill it
    Completed(Vec<u8>),
    TimedOut,
    /// Released by shutdown before completion
    Abandoned,
}

/// Bounded pool of probe slots shared by all sessions
#[derive(Clone)]
pub struct ProbeRequestPool {
    shared: Arc<PoolShared>,
}

impl ProbeRequestPool {
    pub fn new(registry: Arc<ParamRegistry>) -> Self {
        Self::with_limits(registry, PROBE_POOL_SIZE, PROBE_TIMEOUT)
    }

    pub fn with_limits(registry: Arc<ParamRegistry>, capacity: usize, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                slots: Mutex::new((0..capacity).map(|_| Slot::new()).collect()),
                completed: Condvar::new(),
                registry,
                timeout,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    /// Slots not currently free
    pub fn in_flight(&self) -> usize {
        self.shared
            .lock()
            .iter()
            .filter(|s| s.state != TokenState::Free)
            .count()
    }

    /// Reserve a slot without blocking
    pub fn acquire(&self) -> Result<ProbeToken> {
        let mut slots = self.shared.lock();
        let slot = slots
            .iter()
            .position(|s| s.state == TokenState::Free)
            .ok_or(TuningError::PoolExhausted)?;

        let entry = &mut slots[slot];
        entry.state = TokenState::InFlight;
        entry.abandoned = false;
        entry.generation = entry.generation.wrapping_add(1);
        entry.cookie = make_cookie(entry.generation, slot, 0);
        Ok(ProbeToken { slot })
    }

    /// Hand a reserved slot to the pipeline to probe `module_id`
    pub fn submit(
        &self,
        token: ProbeToken,
        module_id: u32,
        pipeline: &dyn CameraPipeline,
    ) -> Result<PendingProbe> {
        let descriptor = match self.shared.registry.descriptor(module_id) {
            Some(d) => d,
            None => {
                self.release(token.slot);
                return Err(TuningError::UnknownModule(module_id));
            }
        };

        let cookie = {
            let mut slots = self.shared.lock();
            let entry = &mut slots[token.slot];
            entry.cookie = make_cookie(entry.generation, token.slot, module_id);
            entry.module_id = module_id;
            entry.cookie
        };

        let request = ProbeRequest {
            cookie,
            module_id,
            control: descriptor.control,
            internal_size: descriptor.internal_size,
            completer: self.completer(),
            answered: false,
        };

        tracing::trace!("Submitting probe {:#018x} for {}", cookie, descriptor.name);
        if let Err(e) = pipeline.submit_probe(request) {
            self.release(token.slot);
            return Err(e);
        }

        Ok(PendingProbe {
            slot: token.slot,
            cookie,
            module_id,
        })
    }

    /// Block until the probe completes or the pool timeout elapses
    pub fn wait(&self, pending: PendingProbe) -> ProbeOutcome {
        let started = Instant::now();
        let slots = self.shared.lock();
        let (mut slots, _) = self
            .shared
            .completed
            .wait_timeout_while(slots, self.shared.timeout, |slots| {
                let s = &slots[pending.slot];
                s.cookie == pending.cookie && s.state == TokenState::InFlight
            })
            .unwrap_or_else(PoisonError::into_inner);

        let entry = &mut slots[pending.slot];
        if entry.cookie != pending.cookie {
            return ProbeOutcome::Abandoned;
        }
        match entry.state {
            TokenState::Completed => {
                let result = std::mem::take(&mut entry.result);
                entry.recycle();
                ProbeOutcome::Completed(result)
            }
            TokenState::InFlight => {
                entry.abandoned = true;
                tracing::warn!(
                    "Probe for module {} timed out after {:?}",
                    pending.module_id,
                    started.elapsed()
                );
                ProbeOutcome::TimedOut
            }
            TokenState::Free => ProbeOutcome::Abandoned,
        }
    }

    /// Acquire, submit and wait in one call
    pub fn fetch(&self, module_id: u32, pipeline: &dyn CameraPipeline) -> Result<Vec<u8>> {
        let token = self.acquire()?;
        let pending = self.submit(token, module_id, pipeline)?;
        match self.wait(pending) {
            ProbeOutcome::Completed(wire) => Ok(wire),
            ProbeOutcome::TimedOut => Err(TuningError::ProbeTimeout {
                module_id,
                waited_ms: self.shared.timeout.as_millis() as u64,
            }),
            ProbeOutcome::Abandoned => Err(TuningError::Shutdown),
        }
    }

    /// Handle the pipeline uses to post completions
    pub fn completer(&self) -> ProbeCompleter {
        ProbeCompleter {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Free every slot and wake all waiters; used once at shutdown
    pub fn abandon_all(&self) {
        let mut slots = self.shared.lock();
        let busy = slots.iter().filter(|s| s.state != TokenState::Free).count();
        for slot in slots.iter_mut() {
            slot.recycle();
        }
        drop(slots);
        self.shared.completed.notify_all();
        if busy > 0 {
            tracing::info!("Abandoned {} in-flight probe(s)", busy);
        }
    }

    fn release(&self, slot: usize) {
        let mut slots = self.shared.lock();
        if let Some(entry) = slots.get_mut(slot) {
            entry.recycle();
        }
    }
}

impl fmt::Debug for ProbeRequestPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeRequestPool")
            .field("in_flight", &self.in_flight())
            .field("timeout", &self.shared.timeout)
            .finish()
    }
}

/// Cloneable handle through which the pipeline answers probes
#[derive(Clone)]
pub struct ProbeCompleter {
    shared: Weak<PoolShared>,
}

impl fmt::Debug for ProbeCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeCompleter")
            .field("attached", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl ProbeCompleter {
    /// Deliver the outcome of the probe identified by `cookie`. Runs on the
    /// pipeline's thread.
    pub fn complete(&self, cookie: u64, snapshot: &[u8]) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        let mut slots = shared.lock();
        let Some(entry) = slots.get_mut(cookie_slot(cookie)) else {
            tracing::warn!("Completion for unknown probe cookie {:#018x}", cookie);
            return;
        };
        if entry.state != TokenState::InFlight || entry.cookie != (cookie & !PROBE_FILLED) {
            tracing::debug!("Ignoring stale probe completion {:#018x}", cookie);
            return;
        }
        if entry.abandoned {
            tracing::debug!("Late completion for module {} recycled", entry.module_id);
            entry.recycle();
            return;
        }

        entry.result = if cookie & PROBE_FILLED != 0 {
            match shared.registry.complete_probe(entry.module_id, snapshot) {
                Ok(wire) => wire,
                Err(e) => {
                    tracing::warn!("Failed to convert probe result: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        entry.state = TokenState::Completed;
        drop(slots);
        shared.completed.notify_all();
    }
}

/// One probe handed to the pipeline
#[derive(Debug)]
pub struct ProbeRequest {
    pub cookie: u64,
    pub module_id: u32,
    pub control: PipelineControl,
    /// Size of the internal snapshot the pipeline should deliver
    pub internal_size: usize,
    completer: ProbeCompleter,
    answered: bool,
}

impl ProbeRequest {
    /// Answer with a filled snapshot
    pub fn complete(mut self, snapshot: &[u8]) {
        self.answered = true;
        self.completer.complete(self.cookie | PROBE_FILLED, snapshot);
    }

    /// Answer without data; the waiter gets an empty result
    pub fn complete_empty(mut self) {
        self.answered = true;
        self.completer.complete(self.cookie, &[]);
    }
}

/// A request the pipeline discards unanswered completes empty, so its slot
/// is recycled instead of staying in flight until shutdown.
impl Drop for ProbeRequest {
    fn drop(&mut self) {
        if !self.answered {
            tracing::debug!("Probe {:#018x} dropped unanswered", self.cookie);
            self.completer.complete(self.cookie, &[]);
        }
    }
}

//! Frame handoff between the capture engine, its interrupt and the consumer loop.
//!
//! States:
//!
//! ```text
//! Idle      receive gate closed, no target armed
//! Armed     frame pointer holds the target, receive gate open, waiting for completion
//! Draining  a completion is being harvested (or the consumer is retargeting)
//! ```
//!
//! A completion is handled as one harvest-and-rearm step: close the receive gate, read the
//! frame pointer to learn which buffer was filled, write the queued next target (which also
//! acknowledges the interrupt on controllers that couple the two), publish the filled buffer
//! and reopen the gate. The frame pointer read has to come before the rearm write, otherwise
//! the identity of the filled buffer is gone.
//!
//! The interrupt handler and the main loop share a `FrameHandoff` (normally a `static`). All
//! shared state is in atomics; each buffer slot is a single word so a handle is published or
//! taken in one operation.

use crate::d5m::controller::{Controller, Mmio};
use crate::error::{ProtocolViolation, WaitError};
use crate::frame_buf::BufferHandle;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use embedded_hal::blocking::delay::DelayUs;
use rtt_target::rprintln;

/// Granularity of `wait_for_frame`, in microseconds.
pub const POLL_INTERVAL_US: u32 = 100;

/// Handoff state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum State {
    Idle = 0,
    Armed = 1,
    Draining = 2,
}

impl State {
    fn from_u8(raw: u8) -> State {
        match raw {
            1 => State::Armed,
            2 => State::Draining,
            _ => State::Idle,
        }
    }
}

/// One buffer handle or nothing, in a single atomic word. Handles are even, bit 0 marks the
/// slot as occupied.
struct Slot(AtomicU32);

const EMPTY: u32 = 0;
const OCCUPIED: u32 = 1;

impl Slot {
    const fn new() -> Self {
        Slot(AtomicU32::new(EMPTY))
    }

    fn decode(raw: u32) -> Option<BufferHandle> {
        if raw & OCCUPIED != 0 {
            BufferHandle::new(raw & !OCCUPIED)
        } else {
            None
        }
    }

    fn put(&self, handle: BufferHandle) -> Option<BufferHandle> {
        Self::decode(self.0.swap(handle.addr() | OCCUPIED, Ordering::AcqRel))
    }

    fn take(&self) -> Option<BufferHandle> {
        Self::decode(self.0.swap(EMPTY, Ordering::AcqRel))
    }

    /// Empty the slot only if it still holds `handle`.
    fn take_if(&self, handle: BufferHandle) -> bool {
        self.0
            .compare_exchange(
                handle.addr() | OCCUPIED,
                EMPTY,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn peek(&self) -> Option<BufferHandle> {
        Self::decode(self.0.load(Ordering::Acquire))
    }

    fn holds(&self, handle: BufferHandle) -> bool {
        self.peek() == Some(handle)
    }
}

/// State shared between the interrupt handler and the consumer.
pub struct CaptureSession {
    state: AtomicU8,
    /// Current capture target.
    armed: Slot,
    /// Target to rearm with on the next completion.
    next: Slot,
    /// Filled buffer waiting for the consumer.
    ready: Slot,
    /// Buffer the consumer is reading.
    held: Slot,
    cancelled: AtomicBool,
    frames: AtomicU32,
    overruns: AtomicU32,
}

impl CaptureSession {
    pub const fn new() -> Self {
        CaptureSession {
            state: AtomicU8::new(State::Idle as u8),
            armed: Slot::new(),
            next: Slot::new(),
            ready: Slot::new(),
            held: Slot::new(),
            cancelled: AtomicBool::new(false),
            frames: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
        }
    }

    fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn claim(&self, from: State) -> bool {
        self.state
            .compare_exchange(
                from as u8,
                State::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

/// How the consumer learns that a frame completed.
pub trait FrameNotifier {
    /// Program the controller for this notification style.
    fn attach<R: Mmio>(&mut self, controller: &Controller<R>);

    /// Give the notifier a chance to drive completion. Returns `true` if a harvested frame is
    /// waiting for the consumer.
    fn service<R: Mmio>(&mut self, handoff: &FrameHandoff<R>) -> bool;
}

/// Push notification: the interrupt handler calls `FrameHandoff::on_interrupt`, the consumer
/// only watches for the published frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct InterruptNotifier;

impl FrameNotifier for InterruptNotifier {
    fn attach<R: Mmio>(&mut self, controller: &Controller<R>) {
        controller.set_interrupt_enabled(true);
    }

    fn service<R: Mmio>(&mut self, handoff: &FrameHandoff<R>) -> bool {
        handoff.pending().is_some()
    }
}

/// Pull notification: the consumer checks the status bit and runs the harvest itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct PollNotifier;

impl FrameNotifier for PollNotifier {
    fn attach<R: Mmio>(&mut self, controller: &Controller<R>) {
        controller.set_interrupt_enabled(false);
    }

    fn service<R: Mmio>(&mut self, handoff: &FrameHandoff<R>) -> bool {
        handoff.poll();
        handoff.pending().is_some()
    }
}

/// Double-buffered frame handoff over a camera controller.
pub struct FrameHandoff<R> {
    controller: Controller<R>,
    session: CaptureSession,
}

impl<R> FrameHandoff<R> {
    /// Usable in a `static` so the interrupt handler can reach it.
    pub const fn new(controller: Controller<R>) -> Self {
        FrameHandoff {
            controller,
            session: CaptureSession::new(),
        }
    }

    pub fn controller(&self) -> &Controller<R> {
        &self.controller
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    /// Current capture target.
    pub fn armed(&self) -> Option<BufferHandle> {
        self.session.armed.peek()
    }

    /// Target queued for the next rearm.
    pub fn queued(&self) -> Option<BufferHandle> {
        self.session.next.peek()
    }

    /// Filled buffer not yet taken by the consumer.
    pub fn pending(&self) -> Option<BufferHandle> {
        self.session.ready.peek()
    }

    /// Buffer the consumer is currently reading.
    pub fn held(&self) -> Option<BufferHandle> {
        self.session.held.peek()
    }

    /// Completions harvested since creation, overruns included.
    pub fn frames(&self) -> u32 {
        self.session.frames.load(Ordering::Relaxed)
    }

    /// Completions dropped because the previous frame was still unconsumed.
    pub fn overruns(&self) -> u32 {
        self.session.overruns.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.session.cancelled.load(Ordering::Acquire)
    }

    fn check_free(&self, buffer: BufferHandle) -> Result<(), ProtocolViolation> {
        if self.session.held.holds(buffer) || self.session.ready.holds(buffer) {
            Err(ProtocolViolation::BufferInUse(buffer))
        } else {
            Ok(())
        }
    }
}

impl<R: Mmio> FrameHandoff<R> {
    /// Program the interrupt mask for `notifier` and clear a previous cancel.
    pub fn start<N: FrameNotifier>(&self, notifier: &mut N) {
        self.session.cancelled.store(false, Ordering::Release);
        notifier.attach(&self.controller);
    }

    /// Make `buffer` the capture target and open the receive gate.
    ///
    /// Arming while already armed, before the previous target completed, retargets the engine:
    /// whatever was being captured into the previous target is discarded and no completion
    /// will be reported for it, even one already pending in the status register. This is the
    /// defined behaviour, not an error.
    pub fn arm(&self, buffer: BufferHandle) -> Result<(), ProtocolViolation> {
        self.check_free(buffer)?;

        let retarget = loop {
            match self.session.state() {
                State::Draining => return Err(ProtocolViolation::DrainInProgress),
                State::Idle => {
                    if self.session.claim(State::Idle) {
                        break false;
                    }
                }
                State::Armed => {
                    // Stop the engine before moving the target under it
                    self.controller.disable_receive();
                    if self.session.claim(State::Armed) {
                        break true;
                    }
                }
            }
        };

        // Any completion still pending belongs to the previous target
        self.controller.acknowledge();
        self.controller.set_target_buffer(buffer.addr());
        let previous = self.session.armed.put(buffer);
        if retarget {
            if let Some(old) = previous.filter(|&old| old != buffer) {
                rprintln!("Retargeted capture, discarding {:?}", old);
            }
        }

        // The armed buffer can't also be the rearm target
        self.session.next.take_if(buffer);

        self.session.cancelled.store(false, Ordering::Release);
        self.session.set_state(State::Armed);
        self.controller.enable_receive();
        Ok(())
    }

    /// Queue the buffer to rearm with when the current target completes. Replaces a previously
    /// queued buffer.
    pub fn queue_next(&self, buffer: BufferHandle) -> Result<(), ProtocolViolation> {
        self.check_free(buffer)?;
        if self.session.armed.holds(buffer) {
            return Err(ProtocolViolation::BufferInUse(buffer));
        }
        self.session.next.put(buffer);
        Ok(())
    }

    /// Interrupt handler entry point. Short and non-blocking; returns `true` if a frame was
    /// published to the consumer.
    pub fn on_interrupt(&self) -> bool {
        self.harvest()
    }

    /// Polling path: harvest if the controller reports a completed frame.
    pub fn poll(&self) -> bool {
        if self.controller.frame_ready() {
            self.harvest()
        } else {
            false
        }
    }

    fn harvest(&self) -> bool {
        let session = &self.session;

        if !session.claim(State::Armed) {
            // Nothing armed, or the consumer is retargeting: the completion belongs to a
            // discarded target
            self.controller.acknowledge();
            return false;
        }

        self.controller.disable_receive();

        // Before the rearm write, which overwrites it
        let filled = self.controller.target_buffer();
        session.frames.fetch_add(1, Ordering::Relaxed);

        // Only this routine fills `ready`; the consumer can only empty it
        let published = match BufferHandle::new(filled) {
            Some(handle) if session.ready.peek().is_none() => {
                session.ready.put(handle);
                true
            }
            _ => false,
        };

        let target = if published {
            session.next.take()
        } else {
            // Previous frame still unconsumed: drop this one and capture into the same buffer
            session.overruns.fetch_add(1, Ordering::Relaxed);
            BufferHandle::new(filled)
        };

        match target {
            Some(next) => {
                self.controller.rearm(next.addr());
                session.armed.put(next);
                session.set_state(State::Armed);
                self.controller.enable_receive();
            }
            None => {
                // Nothing to rearm with, stall until the consumer arms again
                self.controller.acknowledge();
                session.armed.take();
                session.set_state(State::Idle);
            }
        }

        published
    }

    /// Take ownership of the published frame. The consumer may hold one buffer at a time.
    pub fn take(&self) -> Result<BufferHandle, ProtocolViolation> {
        if let Some(held) = self.session.held.peek() {
            return Err(ProtocolViolation::BufferInUse(held));
        }
        let handle = self
            .session
            .ready
            .take()
            .ok_or(ProtocolViolation::NoPendingFrame)?;
        self.session.held.put(handle);
        Ok(handle)
    }

    /// Hand back a buffer obtained from `take`, without reusing it.
    pub fn release(&self, buffer: BufferHandle) -> Result<(), ProtocolViolation> {
        if self.session.held.take_if(buffer) {
            Ok(())
        } else {
            Err(ProtocolViolation::NotHeld(buffer))
        }
    }

    /// Hand back a consumed buffer as the next capture target. Arms it directly if the engine
    /// stalled for lack of a target. This is the ping-pong step.
    pub fn recycle(&self, buffer: BufferHandle) -> Result<(), ProtocolViolation> {
        self.release(buffer)?;
        self.queue_next(buffer)?;

        // A completion may have found no target just before the queue above
        loop {
            match self.session.state() {
                State::Armed => return Ok(()),
                State::Draining => core::hint::spin_loop(),
                State::Idle => {
                    return match self.session.next.take() {
                        Some(next) => self.arm(next),
                        None => Ok(()),
                    };
                }
            }
        }
    }

    /// Wait until a frame is published and take it, checking every `POLL_INTERVAL_US`.
    pub fn wait_for_frame<N, D>(
        &self,
        notifier: &mut N,
        delay: &mut D,
        timeout_us: u32,
    ) -> Result<BufferHandle, WaitError>
    where
        N: FrameNotifier,
        D: DelayUs<u32>,
    {
        if let Some(held) = self.held() {
            return Err(WaitError::Protocol(ProtocolViolation::BufferInUse(held)));
        }

        let mut waited: u32 = 0;
        loop {
            if self.is_cancelled() {
                rprintln!("Frame wait cancelled");
                return Err(WaitError::Cancelled);
            }

            if notifier.service(self) {
                match self.take() {
                    Ok(handle) => return Ok(handle),
                    Err(ProtocolViolation::NoPendingFrame) => {}
                    Err(v) => return Err(WaitError::Protocol(v)),
                }
            }

            if waited >= timeout_us {
                rprintln!("No frame after {} us", timeout_us);
                return Err(WaitError::Timeout);
            }

            let step = POLL_INTERVAL_US.min(timeout_us - waited);
            delay.delay_us(step);
            waited += step;
        }
    }

    /// Abort capture: mask the interrupt, close the receive gate, drop any pending completion and
    /// make any wait return `Cancelled`. A published frame stays takeable.
    ///
    /// May run concurrently with the interrupt handler or the poll path. It waits for a harvest
    /// in progress to finish, so it must not be called from a handler that can preempt `arm`
    /// or `recycle` on the same core.
    pub fn cancel(&self) {
        self.session.cancelled.store(true, Ordering::Release);
        self.controller.set_interrupt_enabled(false);

        loop {
            match self.session.state() {
                State::Draining => core::hint::spin_loop(),
                state => {
                    if self.session.claim(state) {
                        break;
                    }
                }
            }
        }

        self.controller.disable_receive();
        self.controller.acknowledge();
        self.session.next.take();
        self.session.armed.take();
        self.session.set_state(State::Idle);
    }
}

//! Channel objects and multi-way select
//!
//! A non-nil `chan` word points at a [`ChanObject`]. Elements travel as owned
//! byte copies over a crossbeam channel; closing is signalled on a second,
//! payload-free channel whose only sender is dropped by [`ChanObject::close`].
//! Waiting on both channels at once lets blocked senders and receivers wake
//! up when the channel is closed.

use crate::error::{RuntimeError, RuntimeResult};
use crate::heap;
use crate::types::Type;
use crossbeam::channel::{self, Receiver, Select, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// One element in flight
struct Payload(Box<[u64]>);

impl Payload {
    /// Copy `size` bytes from `src`
    unsafe fn copy_from(src: *const u8, size: usize) -> Self {
        let mut buf = vec![0u64; ((size + 7) / 8).max(1)].into_boxed_slice();
        heap::memmove(buf.as_mut_ptr() as *mut u8, src, size);
        Payload(buf)
    }

    /// Copy the element to `dst`
    unsafe fn copy_to(&self, dst: *mut u8, size: usize) {
        heap::memmove(dst, self.0.as_ptr() as *const u8, size);
    }
}

/// Channel with runtime-typed elements
pub struct ChanObject {
    elem: &'static Type,
    cap: usize,
    tx: Sender<Payload>,
    rx: Receiver<Payload>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    closed: AtomicBool,
}

impl fmt::Debug for ChanObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChanObject")
            .field("elem", &self.elem)
            .field("capacity", &self.cap)
            .field("length", &self.rx.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChanObject {
    /// Create a channel of `elem` values with buffer capacity `cap` (0 = unbuffered)
    pub fn new(elem: &'static Type, cap: usize) -> Self {
        let (tx, rx) = channel::bounded(cap);
        let (close_tx, close_rx) = channel::bounded(0);
        Self {
            elem,
            cap,
            tx,
            rx,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Bytes a buffer of `cap` elements of `elem` can occupy when full,
    /// or `None` if that overflows
    pub fn buffer_bytes(elem: &Type, cap: usize) -> Option<usize> {
        let slot = std::mem::size_of::<usize>() + std::mem::size_of::<Payload>() + elem.size();
        cap.checked_mul(slot)
    }

    /// Allocate a channel and return its word
    pub fn alloc(elem: &'static Type, cap: usize) -> usize {
        Box::leak(Box::new(Self::new(elem, cap))) as *const ChanObject as usize
    }

    /// Decode a channel word; `None` for the nil channel
    ///
    /// # Safety
    ///
    /// A non-zero `word` must have been produced by [`ChanObject::alloc`].
    pub unsafe fn from_word<'a>(word: usize) -> Option<&'a ChanObject> {
        (word as *const ChanObject).as_ref()
    }

    /// Element type
    pub fn elem_type(&self) -> &'static Type {
        self.elem
    }

    /// Get buffer capacity
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Get number of buffered elements
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no elements are buffered
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Check if channel is closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the channel, waking every blocked sender and receiver
    pub fn close(&self) -> RuntimeResult<()> {
        let mut close_tx = self.close_tx.lock();
        if close_tx.is_none() {
            return Err(RuntimeError::CloseOfClosed);
        }
        self.closed.store(true, Ordering::Release);
        *close_tx = None;
        tracing::debug!(elem = %self.elem, buffered = self.rx.len(), "closed channel");
        Ok(())
    }

    /// Send the element at `val`
    ///
    /// Returns `Ok(false)` when `block` is unset and the send could not
    /// proceed immediately.
    ///
    /// # Safety
    ///
    /// `val` must point at a live value of the element type.
    pub unsafe fn send(&self, val: *const u8, block: bool) -> RuntimeResult<bool> {
        if self.is_closed() {
            return Err(RuntimeError::SendOnClosed);
        }
        let payload = Payload::copy_from(val, self.elem.size());

        if !block {
            return match self.tx.try_send(payload) {
                Ok(()) => Ok(true),
                Err(TrySendError::Full(_)) => Ok(false),
                Err(TrySendError::Disconnected(_)) => Err(RuntimeError::SendOnClosed),
            };
        }

        let mut sel = Select::new();
        let send_op = sel.send(&self.tx);
        sel.recv(&self.close_rx);
        let op = sel.select();
        if op.index() == send_op {
            op.send(&self.tx, payload)
                .map_err(|_| RuntimeError::SendOnClosed)?;
            Ok(true)
        } else {
            let _ = op.recv(&self.close_rx);
            Err(RuntimeError::SendOnClosed)
        }
    }

    /// Receive into `dst`
    ///
    /// Returns `None` when `block` is unset and nothing is ready,
    /// `Some(true)` for a sent value and `Some(false)` (with `dst` zeroed)
    /// once the channel is closed and drained.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of the element size.
    pub unsafe fn recv(&self, dst: *mut u8, block: bool) -> Option<bool> {
        if !block {
            return match self.rx.try_recv() {
                Ok(p) => {
                    p.copy_to(dst, self.elem.size());
                    Some(true)
                }
                Err(TryRecvError::Empty) if !self.is_closed() => None,
                Err(_) => Some(self.drain_or_zero(dst)),
            };
        }

        let mut sel = Select::new();
        let recv_op = sel.recv(&self.rx);
        sel.recv(&self.close_rx);
        let op = sel.select();
        if op.index() == recv_op {
            match op.recv(&self.rx) {
                Ok(p) => {
                    p.copy_to(dst, self.elem.size());
                    Some(true)
                }
                Err(_) => Some(self.drain_or_zero(dst)),
            }
        } else {
            let _ = op.recv(&self.close_rx);
            Some(self.drain_or_zero(dst))
        }
    }

    /// On a closed channel: take a still-buffered element, or zero `dst`
    unsafe fn drain_or_zero(&self, dst: *mut u8) -> bool {
        match self.rx.try_recv() {
            Ok(p) => {
                p.copy_to(dst, self.elem.size());
                true
            }
            Err(_) => {
                heap::memclr(dst, self.elem.size());
                false
            }
        }
    }
}

/// Block the calling thread forever (operations on nil channels)
pub fn block_forever() -> ! {
    tracing::warn!("blocking forever on an operation that can never proceed");
    loop {
        std::thread::park();
    }
}

/// One case of a [`select`]
#[derive(Debug, Clone, Copy)]
pub enum SelectOp {
    /// Send the element at `val` on `chan`
    Send {
        /// Channel (None = nil channel, never ready)
        chan: Option<&'static ChanObject>,
        /// Element to send
        val: *const u8,
    },
    /// Receive from `chan` into `dst`
    Recv {
        /// Channel (None = nil channel, never ready)
        chan: Option<&'static ChanObject>,
        /// Destination for the element
        dst: *mut u8,
    },
}

/// Outcome of a [`select`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected {
    /// Index of the case that proceeded (None = nothing ready, non-blocking only)
    pub index: Option<usize>,
    /// For receive cases: whether the element came from a real send
    pub recv_ok: bool,
}

#[derive(Clone, Copy)]
enum Action {
    Send,
    SendClosed,
    Recv,
    RecvClosed,
}

/// Wait until one of `ops` can proceed and perform it
///
/// Among simultaneously ready cases one is chosen uniformly at random.
/// Without `block`, returns `index: None` when no case is ready.
///
/// # Safety
///
/// Every `val` / `dst` pointer must be valid for the element size of its channel.
pub unsafe fn select(ops: &[SelectOp], block: bool) -> RuntimeResult<Selected> {
    let mut sel = Select::new();
    let mut actions: Vec<(usize, Action, &'static ChanObject)> = Vec::with_capacity(ops.len() * 2);
    let mut payloads: Vec<Option<Payload>> = Vec::with_capacity(ops.len());

    for (i, op) in ops.iter().enumerate() {
        match *op {
            SelectOp::Send { chan: Some(c), val } => {
                // A closed channel only faults if its case is the one chosen
                if c.is_closed() {
                    payloads.push(None);
                } else {
                    payloads.push(Some(Payload::copy_from(val, c.elem.size())));
                    sel.send(&c.tx);
                    actions.push((i, Action::Send, c));
                }
                sel.recv(&c.close_rx);
                actions.push((i, Action::SendClosed, c));
            }
            SelectOp::Recv { chan: Some(c), .. } => {
                payloads.push(None);
                sel.recv(&c.rx);
                actions.push((i, Action::Recv, c));
                sel.recv(&c.close_rx);
                actions.push((i, Action::RecvClosed, c));
            }
            _ => payloads.push(None),
        }
    }

    if actions.is_empty() {
        if block {
            tracing::warn!(cases = ops.len(), "select with no live case");
            block_forever();
        }
        return Ok(Selected {
            index: None,
            recv_ok: false,
        });
    }

    let op = if block {
        sel.select()
    } else {
        match sel.try_select() {
            Ok(op) => op,
            Err(_) => {
                return Ok(Selected {
                    index: None,
                    recv_ok: false,
                })
            }
        }
    };

    let (case, action, chan) = actions[op.index()];
    let mut recv_ok = false;
    match action {
        Action::Send => {
            let payload = payloads[case].take().ok_or(RuntimeError::SendOnClosed)?;
            op.send(&chan.tx, payload)
                .map_err(|_| RuntimeError::SendOnClosed)?;
        }
        Action::SendClosed => {
            let _ = op.recv(&chan.close_rx);
            return Err(RuntimeError::SendOnClosed);
        }
        Action::Recv => {
            let SelectOp::Recv { dst, .. } = ops[case] else {
                unreachable!("receive action for a send case");
            };
            recv_ok = match op.recv(&chan.rx) {
                Ok(p) => {
                    p.copy_to(dst, chan.elem.size());
                    true
                }
                Err(_) => chan.drain_or_zero(dst),
            };
        }
        Action::RecvClosed => {
            let _ = op.recv(&chan.close_rx);
            let SelectOp::Recv { dst, .. } = ops[case] else {
                unreachable!("receive action for a send case");
            };
            recv_ok = chan.drain_or_zero(dst);
        }
    }

    tracing::trace!(case, recv_ok, "select chose case");
    Ok(Selected {
        index: Some(case),
        recv_ok,
    })
}

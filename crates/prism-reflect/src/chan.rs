//! Channel operations and multi-way select

use crate::error::{ReflectError, ReflectResult};
use crate::value::{Flag, Value};
use prism_runtime::chan::{self, block_forever, SelectOp};
use prism_runtime::{heap, ChanObject, Kind, RuntimeError, Type};

impl Value {
    fn chan_object(&self) -> Option<&'static ChanObject> {
        // SAFETY: non-zero channel words come from ChanObject::alloc
        unsafe { ChanObject::from_word(self.ptr_word()) }
    }

    fn chan_type(&self, method: &'static str) -> ReflectResult<&'static Type> {
        self.must_be(method, Kind::Chan)?;
        self.must_be_exported(method)?;
        self.rtype(method)
    }

    /// Send `x`, blocking until a receiver or buffer slot is available
    ///
    /// Sending on a nil channel blocks forever.
    pub fn send(&self, x: Value) -> ReflectResult<()> {
        self.send_impl("Value::send", x, false).map(|_| ())
    }

    /// Send `x` if that can happen without blocking
    pub fn try_send(&self, x: Value) -> ReflectResult<bool> {
        self.send_impl("Value::try_send", x, true)
    }

    fn send_impl(&self, method: &'static str, x: Value, nb: bool) -> ReflectResult<bool> {
        let t = self.chan_type(method)?;
        let dir = t.chan_dir();
        if !dir.can_send() {
            return Err(ReflectError::WrongChannelDirection { method, dir });
        }
        x.must_be_exported(method)?;
        let x = x.assign_to("reflect.Value.Send", t.elem())?;

        let Some(c) = self.chan_object() else {
            if nb {
                return Ok(false);
            }
            block_forever();
        };
        // SAFETY: x has the channel's element type
        Ok(unsafe { c.send(x.data_ptr(), !nb)? })
    }

    /// Receive a value, blocking until one arrives or the channel closes
    ///
    /// The flag is false when the value is the zero value of a closed channel.
    pub fn recv(&self) -> ReflectResult<(Value, bool)> {
        self.recv_impl("Value::recv", false)
    }

    /// Receive a value if one is ready; the invalid Value otherwise
    pub fn try_recv(&self) -> ReflectResult<(Value, bool)> {
        self.recv_impl("Value::try_recv", true)
    }

    fn recv_impl(&self, method: &'static str, nb: bool) -> ReflectResult<(Value, bool)> {
        let t = self.chan_type(method)?;
        let dir = t.chan_dir();
        if !dir.can_recv() {
            return Err(ReflectError::WrongChannelDirection { method, dir });
        }

        let Some(c) = self.chan_object() else {
            if nb {
                return Ok((Value::INVALID, false));
            }
            block_forever();
        };
        let elem = t.elem();
        let p = heap::alloc(elem);
        // SAFETY: p is fresh storage of the element type
        Ok(match unsafe { c.recv(p, !nb) } {
            None => (Value::INVALID, false),
            Some(ok) => (unsafe { Value::from_storage(elem, p, Flag::EMPTY) }, ok),
        })
    }

    /// Close the channel
    pub fn close(&self) -> ReflectResult<()> {
        let t = self.chan_type("Value::close")?;
        let dir = t.chan_dir();
        if !dir.can_send() {
            return Err(ReflectError::WrongChannelDirection {
                method: "Value::close",
                dir,
            });
        }
        let c = self.chan_object().ok_or(RuntimeError::CloseOfNil)?;
        c.close()?;
        Ok(())
    }
}

/// Direction of a [`SelectCase`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectDir {
    /// Send `SelectCase::send` on `SelectCase::chan`
    Send,
    /// Receive from `SelectCase::chan`
    Recv,
    /// Run when no other case is ready
    Default,
}

/// One case of a [`select`]
///
/// An invalid `chan` makes the case inert, like a nil channel.
#[derive(Debug, Clone, Copy)]
pub struct SelectCase {
    /// Direction
    pub dir: SelectDir,
    /// Channel to operate on
    pub chan: Value,
    /// Value to send (send cases only)
    pub send: Value,
}

impl SelectCase {
    /// Send `val` on `chan`
    pub fn send(chan: Value, val: Value) -> Self {
        Self {
            dir: SelectDir::Send,
            chan,
            send: val,
        }
    }

    /// Receive from `chan`
    pub fn recv(chan: Value) -> Self {
        Self {
            dir: SelectDir::Recv,
            chan,
            send: Value::INVALID,
        }
    }

    /// The default case
    pub fn default_case() -> Self {
        Self {
            dir: SelectDir::Default,
            chan: Value::INVALID,
            send: Value::INVALID,
        }
    }
}

fn invalid_case(index: usize, reason: &str) -> ReflectError {
    ReflectError::InvalidSelectCase {
        index,
        reason: reason.to_string(),
    }
}

/// Wait for one of `cases` to proceed and run it
///
/// Blocks unless a default case is present. Among ready cases one is picked
/// at random. Returns the chosen index and, for receive cases, the received
/// value and whether it came from a real send.
pub fn select(cases: &[SelectCase]) -> ReflectResult<(usize, Value, bool)> {
    let mut ops = Vec::with_capacity(cases.len());
    let mut dsts: Vec<Option<(&'static Type, *mut u8)>> = vec![None; cases.len()];
    let mut default_index = None;

    for (i, case) in cases.iter().enumerate() {
        match case.dir {
            SelectDir::Default => {
                if default_index.is_some() {
                    return Err(invalid_case(i, "multiple default cases"));
                }
                if case.chan.is_valid() {
                    return Err(invalid_case(i, "default case has Chan value"));
                }
                if case.send.is_valid() {
                    return Err(invalid_case(i, "default case has Send value"));
                }
                default_index = Some(i);
                ops.push(SelectOp::Recv {
                    chan: None,
                    dst: std::ptr::null_mut(),
                });
            }
            SelectDir::Send => {
                let ch = case.chan;
                if !ch.is_valid() {
                    ops.push(SelectOp::Send {
                        chan: None,
                        val: std::ptr::null(),
                    });
                    continue;
                }
                let t = ch.chan_type("reflect.Select")?;
                if !t.chan_dir().can_send() {
                    return Err(invalid_case(i, "send case using receive-only channel"));
                }
                let v = case.send;
                if !v.is_valid() {
                    return Err(invalid_case(i, "send case missing Send value"));
                }
                v.must_be_exported("reflect.Select")?;
                let v = v.assign_to("reflect.Select", t.elem())?;
                let val = heap::alloc(t.elem());
                // SAFETY: val is fresh storage of the element type
                unsafe { v.write_to(val) };
                ops.push(SelectOp::Send {
                    chan: ch.chan_object(),
                    val,
                });
            }
            SelectDir::Recv => {
                if case.send.is_valid() {
                    return Err(invalid_case(i, "receive case has Send value"));
                }
                let ch = case.chan;
                if !ch.is_valid() {
                    ops.push(SelectOp::Recv {
                        chan: None,
                        dst: std::ptr::null_mut(),
                    });
                    continue;
                }
                let t = ch.chan_type("reflect.Select")?;
                if !t.chan_dir().can_recv() {
                    return Err(invalid_case(i, "receive case using send-only channel"));
                }
                let dst = heap::alloc(t.elem());
                dsts[i] = Some((t.elem(), dst));
                ops.push(SelectOp::Recv {
                    chan: ch.chan_object(),
                    dst,
                });
            }
        }
    }

    // SAFETY: every op pointer is fresh storage of its channel's element type
    let selected = unsafe { chan::select(&ops, default_index.is_none())? };
    let Some(index) = selected.index.or(default_index) else {
        // Only reachable when blocking, which never returns without a case
        unreachable!("blocking select returned without a case");
    };
    Ok(match dsts[index] {
        // SAFETY: the receive wrote (or zeroed) the element at dst
        Some((elem, dst)) if selected.index.is_some() => (
            index,
            unsafe { Value::from_storage(elem, dst, Flag::EMPTY) },
            selected.recv_ok,
        ),
        _ => (index, Value::INVALID, false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{make_chan, zero};
    use prism_runtime::types::{chan_of, INT};
    use prism_runtime::ChanDir;

    #[test]
    fn test_direction_checks() {
        let recv_only = zero(chan_of(ChanDir::Recv, &INT));
        assert_eq!(
            recv_only.send(Value::of(1isize)).unwrap_err(),
            ReflectError::WrongChannelDirection {
                method: "Value::send",
                dir: ChanDir::Recv
            }
        );
        let send_only = zero(chan_of(ChanDir::Send, &INT));
        assert!(matches!(
            send_only.try_recv(),
            Err(ReflectError::WrongChannelDirection { .. })
        ));
    }

    #[test]
    fn test_nil_channel_non_blocking() {
        let c = zero(chan_of(ChanDir::Both, &INT));
        assert!(!c.try_send(Value::of(1isize)).unwrap());
        let (v, ok) = c.try_recv().unwrap();
        assert!(!v.is_valid());
        assert!(!ok);
        assert_eq!(
            c.close().unwrap_err(),
            ReflectError::Runtime(RuntimeError::CloseOfNil)
        );
    }

    #[test]
    fn test_buffered_send_recv_close() {
        let c = make_chan(chan_of(ChanDir::Both, &INT), 2).unwrap();
        c.send(Value::of(5isize)).unwrap();
        assert_eq!(c.len().unwrap(), 1);
        c.close().unwrap();
        let (v, ok) = c.recv().unwrap();
        assert!(ok);
        assert_eq!(v.int().unwrap(), 5);
        let (v, ok) = c.recv().unwrap();
        assert!(!ok);
        assert_eq!(v.int().unwrap(), 0);
        assert_eq!(
            c.close().unwrap_err(),
            ReflectError::Runtime(RuntimeError::CloseOfClosed)
        );
    }

    #[test]
    fn test_select_validation() {
        let cases = [SelectCase::default_case(), SelectCase::default_case()];
        assert!(matches!(
            select(&cases),
            Err(ReflectError::InvalidSelectCase { index: 1, .. })
        ));
        let c = make_chan(chan_of(ChanDir::Both, &INT), 1).unwrap();
        let cases = [SelectCase::send(c, Value::INVALID)];
        assert!(matches!(
            select(&cases),
            Err(ReflectError::InvalidSelectCase { index: 0, .. })
        ));
    }
}

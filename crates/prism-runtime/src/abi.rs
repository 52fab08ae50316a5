//! Call frames
//!
//! Every callable body (native functions, methods, `make_func` glue) has the
//! same shape: it receives one contiguous argument frame and writes its
//! results back into the same frame.
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────────────────────────────────┐  offset 0
//! │ receiver word (methods only)        │
//! ├─────────────────────────────────────┤
//! │ param₀   (aligned to its type)      │
//! │ param₁                              │
//! │ ...                                 │
//! ├─────────────────────────────────────┤  ret_offset (word aligned)
//! │ result₀  (aligned to its type)      │
//! │ ...                                 │
//! └─────────────────────────────────────┘  size (word aligned)
//! ```
//!
//! All raw memory traffic of a dynamic call goes through [`Frame`].

use crate::header::{Complex128, Complex64, SliceHeader, StringHeader};
use crate::iface::{Eface, Iface};
use crate::types::{Kind, Type, PTR_SIZE};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A callable body operating on an argument frame
pub type Code = Arc<dyn Fn(&mut Frame) + Send + Sync>;

/// Position of one value inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Byte offset from the start of the frame
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
    /// Alignment in bytes
    pub align: usize,
    /// Whether the slot holds pointers
    pub pointer: bool,
}

impl Slot {
    fn of(offset: usize, typ: &Type) -> Self {
        Self {
            offset,
            size: typ.size(),
            align: typ.align(),
            pointer: typ.has_pointers(),
        }
    }
}

/// Frame layout for one function type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    /// Receiver word, present for method bodies
    pub receiver: Option<Slot>,
    /// Parameter slots in order
    pub params: Vec<Slot>,
    /// Result slots in order
    pub results: Vec<Slot>,
    /// Offset of the first result
    pub ret_offset: usize,
    /// Total frame size
    pub size: usize,
}

fn align_up(n: usize, align: usize) -> usize {
    let align = align.max(1);
    (n + align - 1) / align * align
}

impl FrameLayout {
    fn compute(ftyp: &Type, receiver: bool) -> Self {
        let mut offset = 0;
        let receiver = if receiver {
            offset = PTR_SIZE;
            Some(Slot {
                offset: 0,
                size: PTR_SIZE,
                align: PTR_SIZE,
                pointer: true,
            })
        } else {
            None
        };

        let mut params = Vec::with_capacity(ftyp.num_in());
        for t in ftyp.params() {
            offset = align_up(offset, t.align());
            params.push(Slot::of(offset, t));
            offset += t.size();
        }

        offset = align_up(offset, PTR_SIZE);
        let ret_offset = offset;

        let mut results = Vec::with_capacity(ftyp.num_out());
        for t in ftyp.results() {
            offset = align_up(offset, t.align());
            results.push(Slot::of(offset, t));
            offset += t.size();
        }

        Self {
            receiver,
            params,
            results,
            ret_offset,
            size: align_up(offset, PTR_SIZE),
        }
    }
}

static LAYOUTS: Lazy<RwLock<FxHashMap<(usize, bool), Arc<FrameLayout>>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// Frame layout of `ftyp`, with a leading receiver word when `receiver` is set
///
/// Layouts are computed once per (function type, receiver) pair.
///
/// # Panics
///
/// Panics if `ftyp` is not a function type.
pub fn func_layout(ftyp: &'static Type, receiver: bool) -> Arc<FrameLayout> {
    assert_eq!(ftyp.kind(), Kind::Func, "func_layout of non-func type {}", ftyp);
    let key = (ftyp as *const Type as usize, receiver);
    if let Some(layout) = LAYOUTS.read().get(&key) {
        return layout.clone();
    }
    let layout = Arc::new(FrameLayout::compute(ftyp, receiver));
    LAYOUTS.write().entry(key).or_insert(layout).clone()
}

/// Plain data that is valid for every bit pattern and may be read from a frame
///
/// # Safety
///
/// Implementors must be `Copy`, contain no references and accept any byte
/// pattern of their size.
pub unsafe trait FrameData: Copy {}

macro_rules! frame_data {
    ($($t:ty),* $(,)?) => {
        $(unsafe impl FrameData for $t {})*
    };
}

frame_data!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64,
    Complex64, Complex128, StringHeader, SliceHeader, Eface, Iface,
);

/// An argument frame
///
/// Owns a word-aligned, zeroed buffer sized by its [`FrameLayout`].
pub struct Frame {
    layout: Arc<FrameLayout>,
    buf: Box<[u64]>,
}

impl Frame {
    /// Create a zeroed frame for the given layout
    pub fn new(layout: Arc<FrameLayout>) -> Self {
        let words = (layout.size + 7) / 8;
        Self {
            buf: vec![0u64; words.max(1)].into_boxed_slice(),
            layout,
        }
    }

    /// Create a zeroed frame for calling `ftyp`
    pub fn for_func(ftyp: &'static Type, receiver: bool) -> Self {
        Self::new(func_layout(ftyp, receiver))
    }

    /// The frame's layout
    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Raw pointer to `offset` within the frame
    ///
    /// # Panics
    ///
    /// Panics if `offset` is past the end of the frame.
    pub fn addr(&mut self, offset: usize) -> *mut u8 {
        assert!(offset <= self.layout.size, "frame offset {} out of range", offset);
        // SAFETY: offset is within (or one past) the buffer
        unsafe { (self.buf.as_mut_ptr() as *mut u8).add(offset) }
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the buffer is at least layout.size bytes long
        unsafe { std::slice::from_raw_parts(self.buf.as_ptr() as *const u8, self.layout.size) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let size = self.layout.size;
        // SAFETY: the buffer is at least layout.size bytes long
        unsafe { std::slice::from_raw_parts_mut(self.buf.as_mut_ptr() as *mut u8, size) }
    }

    /// Copy `dst.len()` bytes starting at `offset` out of the frame
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.bytes()[offset..offset + dst.len()]);
    }

    /// Copy `src` into the frame at `offset`
    pub fn write_at(&mut self, offset: usize, src: &[u8]) {
        self.bytes_mut()[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Copy `size` bytes from raw memory into the frame at `offset`
    ///
    /// # Safety
    ///
    /// `src` must be valid for reads of `size` bytes.
    pub unsafe fn write_from(&mut self, offset: usize, src: *const u8, size: usize) {
        if size == 0 {
            return;
        }
        self.write_at(offset, std::slice::from_raw_parts(src, size));
    }

    /// Copy `size` bytes from the frame at `offset` into raw memory
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of `size` bytes.
    pub unsafe fn read_into(&self, offset: usize, dst: *mut u8, size: usize) {
        if size == 0 {
            return;
        }
        self.read_at(offset, std::slice::from_raw_parts_mut(dst, size));
    }

    fn load<T: FrameData>(&self, slot: Slot) -> T {
        assert_eq!(
            std::mem::size_of::<T>(),
            slot.size,
            "frame slot holds {} bytes",
            slot.size
        );
        let bytes = &self.bytes()[slot.offset..slot.offset + slot.size];
        // SAFETY: in bounds, T accepts any bit pattern
        unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) }
    }

    fn store<T: Copy>(&mut self, slot: Slot, value: T) {
        assert_eq!(
            std::mem::size_of::<T>(),
            slot.size,
            "frame slot holds {} bytes",
            slot.size
        );
        let bytes = &mut self.bytes_mut()[slot.offset..slot.offset + slot.size];
        // SAFETY: in bounds
        unsafe { std::ptr::write_unaligned(bytes.as_mut_ptr() as *mut T, value) }
    }

    /// Slot of parameter `i`
    pub fn param_slot(&self, i: usize) -> Slot {
        self.layout.params[i]
    }

    /// Slot of result `i`
    pub fn result_slot(&self, i: usize) -> Slot {
        self.layout.results[i]
    }

    /// Read parameter `i`
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range or `T` has the wrong size.
    pub fn param<T: FrameData>(&self, i: usize) -> T {
        self.load(self.layout.params[i])
    }

    /// Read a `bool` parameter
    pub fn param_bool(&self, i: usize) -> bool {
        self.load::<u8>(self.layout.params[i]) != 0
    }

    /// Write parameter `i`
    pub fn set_param<T: Copy>(&mut self, i: usize, value: T) {
        let slot = self.layout.params[i];
        self.store(slot, value)
    }

    /// Read result `i`
    pub fn result<T: FrameData>(&self, i: usize) -> T {
        self.load(self.layout.results[i])
    }

    /// Write result `i`
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range or `T` has the wrong size.
    pub fn set_result<T: Copy>(&mut self, i: usize, value: T) {
        let slot = self.layout.results[i];
        self.store(slot, value)
    }

    /// The receiver word (zero when the layout has no receiver)
    pub fn receiver_word(&self) -> usize {
        match self.layout.receiver {
            Some(slot) => self.load(slot),
            None => 0,
        }
    }

    /// Replace the receiver word
    ///
    /// # Panics
    ///
    /// Panics if the layout has no receiver slot.
    pub fn set_receiver_word(&mut self, word: usize) {
        let slot = self.layout.receiver.expect("frame has no receiver slot");
        self.store(slot, word)
    }

    /// Copy every parameter from `src`, slot by slot
    ///
    /// Both frames must describe the same parameter types; receivers may differ.
    pub fn copy_params_from(&mut self, src: &Frame) {
        let layout = self.layout.clone();
        for (d, s) in layout.params.iter().zip(src.layout.params.iter()) {
            let bytes = &src.bytes()[s.offset..s.offset + s.size];
            self.bytes_mut()[d.offset..d.offset + d.size].copy_from_slice(bytes);
        }
    }

    /// Copy every result from `src`, slot by slot
    pub fn copy_results_from(&mut self, src: &Frame) {
        let layout = self.layout.clone();
        for (d, s) in layout.results.iter().zip(src.layout.results.iter()) {
            let bytes = &src.bytes()[s.offset..s.offset + s.size];
            self.bytes_mut()[d.offset..d.offset + d.size].copy_from_slice(bytes);
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("size", &self.layout.size)
            .field("params", &self.layout.params.len())
            .field("results", &self.layout.results.len())
            .field("receiver", &self.layout.receiver.is_some())
            .finish()
    }
}

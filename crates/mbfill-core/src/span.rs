//! Buffer handles and fill element types.

use std::fmt;
use std::marker::PhantomData;

/// Byte width of a fill element. Every buffer of one call shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementWidth {
    W1,
    W2,
    W4,
    W8,
}

impl ElementWidth {
    pub fn bytes(self) -> usize {
        match self {
            ElementWidth::W1 => 1,
            ElementWidth::W2 => 2,
            ElementWidth::W4 => 4,
            ElementWidth::W8 => 8,
        }
    }

    /// Suffix of the device kernel that stores elements of this width.
    pub fn kernel_suffix(self) -> &'static str {
        match self {
            ElementWidth::W1 => "b8",
            ElementWidth::W2 => "b16",
            ElementWidth::W4 => "b32",
            ElementWidth::W8 => "b64",
        }
    }
}

/// Plain fixed-width value that can be written into a device buffer.
pub trait FillElement: bytemuck::Pod + Send + Sync + fmt::Debug + 'static {
    const WIDTH: ElementWidth;
}

macro_rules! impl_fill_element {
    ($($t:ty => $w:ident),* $(,)?) => {
        $(impl FillElement for $t {
            const WIDTH: ElementWidth = ElementWidth::$w;
        })*
    };
}

impl_fill_element! {
    u8 => W1, i8 => W1,
    u16 => W2, i16 => W2,
    u32 => W4, i32 => W4, f32 => W4,
    u64 => W8, i64 => W8, f64 => W8,
}

/// A caller-owned, mutable region of `len` elements on some device.
///
/// The span is only a handle: it does not own or free the memory. A fill
/// writes through it asynchronously, so the region must stay valid until
/// the stream the fill was enqueued on has been synchronized.
pub struct DeviceSpan<T> {
    addr: u64,
    len: usize,
    _marker: PhantomData<*mut T>,
}

// Spans are plain addresses; exclusivity is promised by the unsafe constructors.
unsafe impl<T: Send> Send for DeviceSpan<T> {}
unsafe impl<T: Sync> Sync for DeviceSpan<T> {}

impl<T> Clone for DeviceSpan<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DeviceSpan<T> {}

impl<T> fmt::Debug for DeviceSpan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSpan")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("len", &self.len)
            .finish()
    }
}

impl<T> DeviceSpan<T> {
    /// A null, zero-length span. Contributes no work.
    pub const fn empty() -> Self {
        Self { addr: 0, len: 0, _marker: PhantomData }
    }

    /// Wrap a raw device address.
    ///
    /// # Safety
    /// If `len > 0`, `addr` must point to at least `len` properly aligned,
    /// mutable elements of `T` that nothing else reads or writes until the
    /// stream used for the fill is synchronized.
    pub unsafe fn from_raw_parts(addr: u64, len: usize) -> Self {
        Self { addr, len, _marker: PhantomData }
    }

    /// Wrap a host slice, for the host backend.
    ///
    /// # Safety
    /// The slice must outlive every fill that uses the span, up to and
    /// including the synchronization of the stream it was enqueued on.
    pub unsafe fn from_host_slice(slice: &mut [T]) -> Self {
        Self::from_raw_parts(slice.as_mut_ptr() as u64, slice.len())
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_null(&self) -> bool {
        self.addr == 0
    }

    /// Size of the region in bytes, or `None` if it does not fit a `usize`.
    pub fn size_bytes(&self) -> Option<usize> {
        self.len.checked_mul(std::mem::size_of::<T>())
    }
}

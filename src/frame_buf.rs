//! Frame buffers shared with the capture engine.
//!
//! A `BufferHandle` is the identity of a buffer: the address written into the controller's
//! frame pointer register. A `FrameBuffer` is a bounds-checked view of the pixels behind a
//! handle. `PingPong` lays out the two buffers used for double buffering.

use crate::d5m::{FRAME_HEIGHT, FRAME_PIXELS, FRAME_SIZE, FRAME_WIDTH};
use core::fmt;
use embedded_graphics::pixelcolor::{raw::RawU16, Rgb565};
use rtt_target::{rprint, rprintln};

/// Fill value used to detect whether the capture engine wrote anything at all.
pub const SENTINEL: u16 = 0xDEAD;

/// Address of a frame buffer as seen by the capture engine. Always even, so bit 0 is free for
/// the handoff slots to use as an occupancy marker.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    /// Returns `None` for odd addresses, which can't hold 16-bit pixels.
    pub const fn new(addr: u32) -> Option<Self> {
        if addr & 1 == 0 {
            Some(BufferHandle(addr))
        } else {
            None
        }
    }

    pub const fn addr(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferHandle({:#010X})", self.0)
    }
}

/// Pixel coordinates outside the frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutOfBounds {
    pub x: usize,
    pub y: usize,
}

/// A 320x240 RGB565 frame. Pixels are accessed with volatile loads and stores since the
/// capture engine writes behind the compiler's back.
pub struct FrameBuffer<'a> {
    handle: BufferHandle,
    pixels: &'a mut [u16],
}

impl<'a> FrameBuffer<'a> {
    /// View `pixels` as the frame identified by `handle`. Returns `None` unless the slice holds
    /// exactly one frame.
    pub fn new(handle: BufferHandle, pixels: &'a mut [u16]) -> Option<Self> {
        if pixels.len() == FRAME_PIXELS {
            Some(FrameBuffer { handle, pixels })
        } else {
            None
        }
    }

    /// Map the frame buffer located at the handle's address.
    ///
    /// # Safety
    ///
    /// The handle must address `FRAME_SIZE` bytes of memory that stay valid for the program's
    /// lifetime, and the caller must own the buffer (not armed as a capture target) for as long
    /// as the view is used.
    pub unsafe fn at(handle: BufferHandle) -> FrameBuffer<'static> {
        let ptr = handle.addr() as usize as *mut u16;
        let pixels = core::slice::from_raw_parts_mut(ptr, FRAME_PIXELS);
        FrameBuffer { handle, pixels }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    fn index(x: usize, y: usize) -> Result<usize, OutOfBounds> {
        if x < FRAME_WIDTH as usize && y < FRAME_HEIGHT as usize {
            Ok(x + FRAME_WIDTH as usize * y)
        } else {
            Err(OutOfBounds { x, y })
        }
    }

    fn load(&self, i: usize) -> u16 {
        debug_assert!(i < self.pixels.len());
        // Safety: index is in bounds of the slice
        unsafe { core::ptr::read_volatile(self.pixels.as_ptr().add(i)) }
    }

    fn store(&mut self, i: usize, val: u16) {
        debug_assert!(i < self.pixels.len());
        // Safety: index is in bounds of the slice
        unsafe { core::ptr::write_volatile(self.pixels.as_mut_ptr().add(i), val) }
    }

    /// Raw RGB565 value at (`x`, `y`).
    pub fn get_pixel(&self, x: usize, y: usize) -> Option<u16> {
        Self::index(x, y).ok().map(|i| self.load(i))
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, val: u16) -> Result<(), OutOfBounds> {
        let i = Self::index(x, y)?;
        self.store(i, val);
        Ok(())
    }

    /// Pixel at (`x`, `y`) decoded as red [15:11], green [10:5], blue [4:0].
    pub fn color(&self, x: usize, y: usize) -> Option<Rgb565> {
        self.get_pixel(x, y).map(|raw| Rgb565::from(RawU16::new(raw)))
    }

    /// Overwrite every pixel with `val`, typically `SENTINEL` before handing the buffer back.
    pub fn fill(&mut self, val: u16) {
        for i in 0..FRAME_PIXELS {
            self.store(i, val);
        }
    }

    /// First pixel (linear index and value) that is not `expected`.
    pub fn first_difference(&self, expected: u16) -> Option<(usize, u16)> {
        (0..FRAME_PIXELS)
            .map(|i| (i, self.load(i)))
            .find(|&(_, pix)| pix != expected)
    }

    /// Whether anything in the frame differs from `expected`.
    pub fn differs_from(&self, expected: u16) -> bool {
        match self.first_difference(expected) {
            Some((i, pix)) => {
                rprintln!("difference found at image[{}] = {:x}", i, pix);
                true
            }
            None => false,
        }
    }

    /// Print a `dx` by `dy` window starting at (`x0`, `y0`) as hex, clipped to the frame.
    pub fn log_window(&self, x0: usize, y0: usize, dx: usize, dy: usize) {
        for y in y0..y0.saturating_add(dy).min(FRAME_HEIGHT as usize) {
            for x in x0..x0.saturating_add(dx).min(FRAME_WIDTH as usize) {
                if let Some(pix) = self.get_pixel(x, y) {
                    rprint!("{:04x} ", pix);
                }
            }
            rprintln!("");
        }
    }
}

/// Two frame buffers laid out back to back, alternated between the capture engine and the
/// consumer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PingPong {
    /// Base address of the first buffer. This field does not change after calling `new`.
    mem_base: u32,

    /// Size of a single frame in bytes. This field does not change after calling `new`.
    frame_size: u32,
}

impl PingPong {
    /// Two 320x240 RGB565 frames starting at `base`.
    pub fn new(base: u32) -> Option<Self> {
        Self::with_frame_size(base, FRAME_SIZE)
    }

    /// Two frames of `frame_size` bytes starting at `base`. Both must be even.
    pub fn with_frame_size(base: u32, frame_size: u32) -> Option<Self> {
        if base & 1 != 0 || frame_size & 1 != 0 || frame_size == 0 {
            return None;
        }
        base.checked_add(frame_size)?;

        Some(PingPong {
            mem_base: base,
            frame_size,
        })
    }

    /// Convert an index into a handle, alternating between the two buffers.
    pub fn get(&self, index: u32) -> BufferHandle {
        BufferHandle(self.mem_base + (index % 2) * self.frame_size)
    }

    pub fn first(&self) -> BufferHandle {
        self.get(0)
    }

    pub fn second(&self) -> BufferHandle {
        self.get(1)
    }

    /// The partner of `handle`, or `None` if it is not one of the pair.
    pub fn other(&self, handle: BufferHandle) -> Option<BufferHandle> {
        if handle == self.first() {
            Some(self.second())
        } else if handle == self.second() {
            Some(self.first())
        } else {
            None
        }
    }

    /// Walk both buffers in order.
    pub fn iter(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        (0..2).map(move |i| self.get(i))
    }
}

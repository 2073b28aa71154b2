/// Misuse of the frame allocator.
///
/// Each of these means a frame's ownership has been lost track of; there is
/// nothing sensible to continue with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameFault {
    #[error("{op}: frame address {addr:#x} is not page aligned")]
    Misaligned { op: &'static str, addr: usize },
    #[error("{op}: frame address {addr:#x} is outside the managed pool")]
    OutOfRange { op: &'static str, addr: usize },
    #[error("kfree: double free of frame {addr:#x}")]
    DoubleFree { addr: usize },
    #[error("kfree: frame {addr:#x} is shared by {count} owners")]
    SharedFree { addr: usize, count: u8 },
    #[error("increment: frame {addr:#x} is not allocated")]
    IncrementFree { addr: usize },
    #[error("increment: reference count overflow for frame {addr:#x}")]
    RefcountOverflow { addr: usize },
    #[error("decrement: reference count underflow for frame {addr:#x}")]
    RefcountUnderflow { addr: usize },
}

/// A memory region that cannot host a frame pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("region end {end:#x} is not above its start {start:#x}")]
    Inverted { start: usize, end: usize },
    #[error("region {start:#x}..{end:#x} is too small to hold a single frame")]
    TooSmall { start: usize, end: usize },
}

/// Report `fault` and stop.
#[cold]
#[track_caller]
pub fn fault(fault: FrameFault) -> ! {
    log::error!("kalloc: {fault}");
    panic!("{fault}");
}

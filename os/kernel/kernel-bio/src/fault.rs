/// Invariant violations in the buffer cache.
///
/// None of these can be handled by the caller: each one means the pool is
/// undersized or a buffer is being used outside its locking protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BioFault {
    #[error("bget: no buffers for block {blockno} on dev {dev}")]
    NoBuffers { dev: u32, blockno: u32 },
    #[error("{op}: buffer for block {blockno} on dev {dev} is not locked by the caller")]
    NotHolding {
        op: &'static str,
        dev: u32,
        blockno: u32,
    },
    #[error("{op}: reference count underflow for block {blockno} on dev {dev}")]
    RefcountUnderflow {
        op: &'static str,
        dev: u32,
        blockno: u32,
    },
    #[error("{op}: buffer belongs to a different cache")]
    ForeignBuffer { op: &'static str },
}

/// Report `fault` and stop.
#[cold]
#[track_caller]
pub fn fault(fault: BioFault) -> ! {
    log::error!("bcache: {fault}");
    panic!("{fault}");
}

//! # Block I/O Parameters

/// Maximum number of blocks any single file-system operation writes.
pub const MAX_OP_BLOCKS: usize = 10;

/// Size of a disk block in bytes.
///
/// The disk driver transfers exactly this many bytes per request.
pub const BLOCK_SIZE: usize = 1024;

/// Number of buffers in the block cache.
pub const NBUF: usize = MAX_OP_BLOCKS * 3;

/// Number of hash buckets the block cache is sharded into.
///
/// A prime count spreads sequential block numbers evenly.
pub const NBUCKET: usize = 13;

/// Device number of the file system root disk.
pub const ROOT_DEV: u32 = 1;

const _: () = {
    assert!(BLOCK_SIZE.is_power_of_two());
    assert!(BLOCK_SIZE.is_multiple_of(512));
    assert!(NBUCKET > 0);
    assert!(NBUF >= NBUCKET);
};

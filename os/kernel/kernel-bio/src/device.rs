use kernel_info::bio::BLOCK_SIZE;

/// Payload of one cached disk block.
pub type BlockData = [u8; BLOCK_SIZE];

/// The disk driver, as seen by the buffer cache.
///
/// Requests are synchronous: the call returns once the transfer is complete,
/// and may block the calling task until then. Transfer failures are the
/// driver's business and never surface here.
pub trait BlockDevice: Sync {
    /// Fill `data` with block `blockno` of device `dev`.
    fn read_block(&self, dev: u32, blockno: u32, data: &mut BlockData);

    /// Write `data` to block `blockno` of device `dev`.
    fn write_block(&self, dev: u32, blockno: u32, data: &BlockData);
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    #[inline]
    fn read_block(&self, dev: u32, blockno: u32, data: &mut BlockData) {
        (**self).read_block(dev, blockno, data);
    }

    #[inline]
    fn write_block(&self, dev: u32, blockno: u32, data: &BlockData) {
        (**self).write_block(dev, blockno, data);
    }
}

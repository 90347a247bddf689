/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// Fixed-size block storage addressed by block number.
///
/// Modelled on the classic `read_block`/`write_block` device interface, with the
/// difference that nothing here touches real media: blocks live for as long as
/// the store does. A block that was never written (or was cleared) has no
/// payload at all, which lets callers tell an unowned slot from a zero-filled one.
pub trait BlockStorage {
    /// Size in bytes of every block in the store.
    fn block_size(&self) -> usize;
    /// The total number of blocks available in the store.
    fn block_count(&self) -> usize;
    /// Returns the payload held by the block, if any.
    fn read_block(&self, blocknr: BlockNumber) -> Option<&[u8]>;
    /// Writes provided buffer into the specified block number, replacing any
    /// previous payload.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range, or a buffer larger than one
    /// block, will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;
    /// Drops whatever the block holds. Out of range block numbers are ignored.
    fn clear_block(&mut self, blocknr: BlockNumber);
}

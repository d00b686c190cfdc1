/// Fixed block size on the wire: 16 KiB (§4.1).
pub const BLOCK_LENGTH: u32 = 16 * 1024;

/// Sessions are expected to honor these watermarks when calling
/// `pick_blocks` (§6); the scheduler itself does not enforce them, it
/// only hands them out as shared configuration.
pub const LOW_WATERMARK: usize = 5;
pub const HIGH_WATERMARK: usize = 30;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Size of a block, in bytes, used by `chunkify` (§4.1).
    pub block_length: u32,
    pub low_watermark: usize,
    pub high_watermark: usize,
    /// Capacity of the actor's command mailbox.
    pub mailbox_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            block_length: BLOCK_LENGTH,
            low_watermark: LOW_WATERMARK,
            high_watermark: HIGH_WATERMARK,
            mailbox_capacity: 200,
        }
    }
}

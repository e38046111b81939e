use crate::utils::ByteSize;

/// Point-in-time heap numbers, for diagnostics and tests.
#[derive(Clone, Copy, Debug)]
pub struct HeapStatistics {
    pub pool_size: u32,
    pub top: u32,
    /// High-water mark of the settled objects after the last full collection;
    /// where the next incremental sweep starts.
    pub last_top: u32,
    pub free: u32,
    pub total_collections: usize,
    pub full_collections: usize,
}

impl std::fmt::Display for HeapStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Heap statistics:")?;
        writeln!(
            f,
            "  Pool used: {} of {}",
            ByteSize(self.top as usize),
            ByteSize(self.pool_size as usize)
        )?;
        writeln!(f, "  Free: {}", ByteSize(self.free as usize))?;
        writeln!(
            f,
            "  Settled after last full collection: {}",
            ByteSize(self.last_top as usize)
        )?;
        writeln!(
            f,
            "  Collections: {} ({} full)",
            self.total_collections, self.full_collections
        )?;
        Ok(())
    }
}

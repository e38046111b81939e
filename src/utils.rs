#[inline(always)]
pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !align.wrapping_sub(1)
}

#[inline(always)]
pub const fn align_up(addr: usize, align: usize) -> usize {
    align_down(addr + align - 1, align)
}

#[inline(always)]
pub const fn is_aligned(addr: usize, align: usize) -> bool {
    addr & align.wrapping_sub(1) == 0
}

/// Byte count that prints with a unit suffix. Pools top out at a few dozen
/// kilobytes, so there is no bucket past mebibytes.
pub struct ByteSize(pub usize);

impl std::fmt::Display for ByteSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const KIB: usize = 1 << 10;
        const MIB: usize = 1 << 20;
        match self.0 {
            bytes if bytes < KIB => write!(f, "{}B", bytes),
            bytes if bytes < MIB => write!(f, "{:.1}KiB", bytes as f64 / KIB as f64),
            bytes => write!(f, "{:.1}MiB", bytes as f64 / MIB as f64),
        }
    }
}

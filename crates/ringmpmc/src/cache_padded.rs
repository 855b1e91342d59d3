/// Destructive interference size assumed for the target.
///
/// x86_64 prefetches cache lines in adjacent pairs and Apple/ARM64 big cores use
/// 128-byte lines, so both get 128; everything else gets 64.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub const INTERFERENCE_SIZE: usize = 128;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub const INTERFERENCE_SIZE: usize = 64;

/// Wrapper that places `T` alone on its own interference-sized block, so two
/// cursors spun on by different threads never share a line.
#[cfg_attr(
    any(target_arch = "x86_64", target_arch = "aarch64"),
    repr(C, align(128))
)]
#[cfg_attr(
    not(any(target_arch = "x86_64", target_arch = "aarch64")),
    repr(C, align(64))
)]
#[derive(Debug, Default)]
pub(crate) struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> std::ops::DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

use std::collections::{BTreeMap, HashMap};

/// Estimates how many bytes a cached value occupies.
///
/// The cache keeps a running total of these estimates and compares it against
/// its memory budget. The default implementation counts only the inline size
/// of the value, so types owning heap data should override it.
///
/// # Examples
///
/// ```
/// use reqshape_core::MemoryEstimator;
///
/// struct Body {
///     bytes: Vec<u8>,
/// }
///
/// impl MemoryEstimator for Body {
///     fn estimate_memory(&self) -> usize {
///         std::mem::size_of::<Self>() + self.bytes.capacity()
///     }
/// }
///
/// let body = Body { bytes: vec![0; 128] };
/// assert!(body.estimate_memory() >= 128);
/// ```
pub trait MemoryEstimator {
    /// Estimated footprint in bytes, heap allocations included.
    fn estimate_memory(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

/// Types with no heap data: the inline size is the whole footprint.
macro_rules! inline_only {
    ($($ty:ty),* $(,)?) => {
        $(impl MemoryEstimator for $ty {})*
    };
}

inline_only!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, (),
    std::time::Duration, std::time::SystemTime,
);

impl MemoryEstimator for &'static str {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + self.len()
    }
}

impl MemoryEstimator for String {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + self.capacity()
    }
}

impl<T: MemoryEstimator> MemoryEstimator for Vec<T> {
    fn estimate_memory(&self) -> usize {
        let spare = (self.capacity() - self.len()) * std::mem::size_of::<T>();
        std::mem::size_of::<Self>()
            + spare
            + self.iter().map(|item| item.estimate_memory()).sum::<usize>()
    }
}

impl<T: MemoryEstimator> MemoryEstimator for Option<T> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>()
            + match self {
                Some(val) => val.estimate_memory(),
                None => 0,
            }
    }
}

impl<T: MemoryEstimator> MemoryEstimator for Box<T> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + (**self).estimate_memory()
    }
}

impl<T1: MemoryEstimator, T2: MemoryEstimator> MemoryEstimator for (T1, T2) {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + self.0.estimate_memory() + self.1.estimate_memory()
    }
}

// Header maps: key and value heap data plus a rough per-node overhead.
const MAP_NODE_OVERHEAD: usize = 2 * std::mem::size_of::<usize>();

impl<K: MemoryEstimator, V: MemoryEstimator> MemoryEstimator for BTreeMap<K, V> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .iter()
                .map(|(k, v)| k.estimate_memory() + v.estimate_memory() + MAP_NODE_OVERHEAD)
                .sum::<usize>()
    }
}

impl<K: MemoryEstimator, V: MemoryEstimator, S> MemoryEstimator for HashMap<K, V, S> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>()
            + self
                .iter()
                .map(|(k, v)| k.estimate_memory() + v.estimate_memory() + MAP_NODE_OVERHEAD)
                .sum::<usize>()
    }
}

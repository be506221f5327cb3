/// Estimates how many bytes a stored key or value occupies.
///
/// The in-memory tier sums this over resident elements to report
/// `in_memory_size_in_bytes`. The default only counts the inline size, so
/// types owning heap data should override it.
///
/// # Examples
///
/// ```
/// use tiercache_core::MemoryEstimator;
///
/// struct Profile {
///     name: String,
///     avatar: Vec<u8>,
/// }
///
/// impl MemoryEstimator for Profile {
///     fn estimate_memory(&self) -> usize {
///         std::mem::size_of::<Self>() + self.name.capacity() + self.avatar.capacity()
///     }
/// }
///
/// let p = Profile { name: "ada".into(), avatar: vec![0; 64] };
/// assert!(p.estimate_memory() >= 64);
/// ```
pub trait MemoryEstimator {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

macro_rules! inline_only {
    ($($t:ty),* $(,)?) => {
        $(impl MemoryEstimator for $t {})*
    };
}

inline_only!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, ());

impl MemoryEstimator for String {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + self.capacity()
    }
}

impl MemoryEstimator for &'static str {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + self.len()
    }
}

impl<T: MemoryEstimator> MemoryEstimator for Vec<T> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + self.iter().map(|item| item.estimate_memory()).sum::<usize>()
    }
}

impl<T: MemoryEstimator> MemoryEstimator for Option<T> {
    fn estimate_memory(&self) -> usize {
        std::mem::size_of::<Self>() + self.as_ref().map_or(0, |v| v.estimate_memory())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_types() {
        assert_eq!(42i32.estimate_memory(), std::mem::size_of::<i32>());
        assert_eq!(7u64.estimate_memory(), 8);
    }

    #[test]
    fn test_string_counts_capacity() {
        let s = String::with_capacity(100);
        assert_eq!(s.estimate_memory(), std::mem::size_of::<String>() + 100);
    }

    #[test]
    fn test_nested_collections() {
        let v = vec![Some(1u8), None];
        let expected = std::mem::size_of::<Vec<Option<u8>>>() + 2 * std::mem::size_of::<Option<u8>>() + 1;
        assert_eq!(v.estimate_memory(), expected);
    }
}

use crate::Element;

/// Decides whether two elements hold "the same" value for conditional
/// operations (`replace_if`, `remove_element`).
///
/// Any `Fn(&Element<K, V>, &Element<K, V>) -> bool` is a comparator.
///
/// ```
/// use tiercache_core::{DefaultElementValueComparator, Element, ElementValueComparator};
///
/// let a = Element::new("k", "Hello".to_string());
/// let b = Element::new("k", "hello".to_string());
/// assert!(!DefaultElementValueComparator.equals(&a, &b));
///
/// let case_insensitive = |x: &Element<&str, String>, y: &Element<&str, String>| {
///     x.value().eq_ignore_ascii_case(y.value())
/// };
/// assert!(case_insensitive.equals(&a, &b));
/// ```
pub trait ElementValueComparator<K, V> {
    fn equals(&self, a: &Element<K, V>, b: &Element<K, V>) -> bool;
}

/// Compares values with `PartialEq`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultElementValueComparator;

impl<K, V: PartialEq> ElementValueComparator<K, V> for DefaultElementValueComparator {
    fn equals(&self, a: &Element<K, V>, b: &Element<K, V>) -> bool {
        a.value() == b.value()
    }
}

/// Matches only the exact same stored instance, by version.
#[derive(Clone, Copy, Debug, Default)]
pub struct VersionComparator;

impl<K, V> ElementValueComparator<K, V> for VersionComparator {
    fn equals(&self, a: &Element<K, V>, b: &Element<K, V>) -> bool {
        a.version() == b.version()
    }
}

impl<K, V, F> ElementValueComparator<K, V> for F
where
    F: Fn(&Element<K, V>, &Element<K, V>) -> bool,
{
    fn equals(&self, a: &Element<K, V>, b: &Element<K, V>) -> bool {
        self(a, b)
    }
}

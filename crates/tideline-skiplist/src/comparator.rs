use std::cmp::Ordering;
use std::marker::PhantomData;

use seekable_iterator::Comparator;

/// A [`Comparator`] that simply defers to `P`'s own [`Ord`] implementation.
///
/// The natural choice whenever the priority type already has a sensible total order; custom
/// comparators are only needed to invert that order, compare by a derived key, or otherwise
/// override it.
pub struct OrdComparator<P>(PhantomData<fn(&P, &P) -> Ordering>);

impl<P> OrdComparator<P> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<P> Default for OrdComparator<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for OrdComparator<P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<P> Copy for OrdComparator<P> {}

impl<P: Ord> Comparator<P> for OrdComparator<P> {
    fn cmp(&self, lhs: &P, rhs: &P) -> Ordering {
        Ord::cmp(lhs, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_ord() {
        let cmp = OrdComparator::<i32>::new();
        assert_eq!(cmp.cmp(&1, &2), Ordering::Less);
        assert_eq!(cmp.cmp(&2, &2), Ordering::Equal);
        assert_eq!(cmp.cmp(&3, &2), Ordering::Greater);
    }
}

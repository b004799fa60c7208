use std::ops::Deref;

/// A newtype wrapper limiting the number of characters a decoded string may
/// contain. `MAX` is a character count, not a byte count.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Bounded<T, const MAX: usize>(pub T);

impl<T, const MAX: usize> Bounded<T, MAX> {
    /// The maximum number of characters allowed.
    pub const MAX: usize = MAX;

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Bounded<U, MAX> {
        Bounded(f(self.0))
    }
}

impl<T, const MAX: usize> Deref for Bounded<T, MAX> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T, const MAX: usize> From<T> for Bounded<T, MAX> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

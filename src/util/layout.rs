//! Layout utilities.

/// Align a size up to the given alignment.
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// Align a size up, returning `None` on arithmetic overflow.
#[inline]
pub fn align_up_checked(size: usize, align: usize) -> Option<usize> {
    Some(size.checked_add(align - 1)? & !(align - 1))
}

/// Calculate padding needed to align a size.
#[inline]
pub const fn padding_for(size: usize, align: usize) -> usize {
    let aligned = align_up(size, align);
    aligned - size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn test_align_up_checked_overflow() {
        assert_eq!(align_up_checked(usize::MAX - 3, 16), None);
        assert_eq!(align_up_checked(48, 16), Some(48));
    }

    #[test]
    fn test_padding_for() {
        assert_eq!(padding_for(0, 16), 0);
        assert_eq!(padding_for(1, 16), 15);
        assert_eq!(padding_for(16, 16), 0);
    }
}

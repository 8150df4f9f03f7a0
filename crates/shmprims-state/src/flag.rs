//! Role flag of a triple buffer.
//!
//! ```text
//!   bit 7    unused, always 0
//!   bit 6    new data committed since the last snapshot
//!   bits 5-4 write slot
//!   bits 3-2 clean slot
//!   bits 1-0 snapshot slot
//! ```
//!
//! The three slot indices always form a permutation of {0, 1, 2}. Both
//! transitions only swap two of them, so any flag reached from
//! [`RoleFlag::INITIAL`] stays valid.

/// Bit set by the writer on commit and cleared by the reader on snapshot.
pub const NEW_DATA: u8 = 0x40;

const WRITE_MASK: u8 = 0x30;
const CLEAN_MASK: u8 = 0x0C;
const SNAP_MASK: u8 = 0x03;

/// Decoded view of the role byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleFlag(u8);

impl RoleFlag {
    /// Write slot 0, clean slot 1, snapshot slot 2, no new data.
    pub const INITIAL: RoleFlag = RoleFlag(0x06);

    pub const fn from_bits(bits: u8) -> Self {
        RoleFlag(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn write_slot(self) -> usize {
        ((self.0 & WRITE_MASK) >> 4) as usize
    }

    pub const fn clean_slot(self) -> usize {
        ((self.0 & CLEAN_MASK) >> 2) as usize
    }

    pub const fn snapshot_slot(self) -> usize {
        (self.0 & SNAP_MASK) as usize
    }

    pub const fn has_new_data(self) -> bool {
        self.0 & NEW_DATA != 0
    }

    /// Flag after a commit: write and clean swap, new data is set.
    pub const fn flipped(self) -> Self {
        let b = self.0;
        RoleFlag(NEW_DATA | ((b & CLEAN_MASK) << 2) | ((b & WRITE_MASK) >> 2) | (b & SNAP_MASK))
    }

    /// Flag after a snapshot: clean and snapshot swap, new data is cleared.
    ///
    /// `None` if nothing was committed since the last snapshot.
    pub const fn snapped(self) -> Option<Self> {
        let b = self.0;
        if b & NEW_DATA == 0 {
            return None;
        }
        Some(RoleFlag(
            (b & WRITE_MASK) | ((b & SNAP_MASK) << 2) | ((b & CLEAN_MASK) >> 2),
        ))
    }

    /// True if the slot indices form a permutation and no unused bit is set.
    pub const fn is_valid(self) -> bool {
        if self.0 & 0x80 != 0 {
            return false;
        }
        let (w, c, s) = (self.write_slot(), self.clean_slot(), self.snapshot_slot());
        w < 3 && c < 3 && s < 3 && w != c && c != s && w != s
    }
}

impl Default for RoleFlag {
    fn default() -> Self {
        RoleFlag::INITIAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_valid() -> Vec<RoleFlag> {
        (0..=u8::MAX)
            .map(RoleFlag::from_bits)
            .filter(|f| f.is_valid())
            .collect()
    }

    #[test]
    fn initial_roles() {
        let flag = RoleFlag::INITIAL;
        assert_eq!(flag.bits(), 0x06);
        assert_eq!(
            (flag.write_slot(), flag.clean_slot(), flag.snapshot_slot()),
            (0, 1, 2)
        );
        assert!(!flag.has_new_data());
        assert!(flag.is_valid());
    }

    #[test]
    fn exactly_twelve_valid_flags() {
        // 3! role permutations, with and without new data.
        assert_eq!(all_valid().len(), 12);
    }

    #[test]
    fn flip_swaps_write_and_clean() {
        let flipped = RoleFlag::INITIAL.flipped();
        assert_eq!(flipped.bits(), 0x52);
        assert_eq!(
            (flipped.write_slot(), flipped.clean_slot(), flipped.snapshot_slot()),
            (1, 0, 2)
        );
        assert!(flipped.has_new_data());
    }

    #[test]
    fn snapshot_swaps_clean_and_snapshot() {
        let snapped = RoleFlag::INITIAL.flipped().snapped().unwrap();
        assert_eq!(
            (snapped.write_slot(), snapped.clean_slot(), snapped.snapshot_slot()),
            (1, 2, 0)
        );
        assert!(!snapped.has_new_data());
        assert_eq!(snapped.snapped(), None);
    }

    #[test]
    fn transitions_preserve_permutation() {
        for flag in all_valid() {
            assert!(flag.flipped().is_valid(), "{flag:?}");
            if let Some(next) = flag.snapped() {
                assert!(next.is_valid(), "{flag:?}");
                assert_eq!(next.write_slot(), flag.write_slot());
            }
            assert_eq!(flag.flipped().snapshot_slot(), flag.snapshot_slot());
        }
    }

    #[test]
    fn rejects_broken_flags() {
        assert!(!RoleFlag::from_bits(0x00).is_valid());
        assert!(!RoleFlag::from_bits(0x3F).is_valid());
        assert!(!RoleFlag::from_bits(0x86).is_valid());
        assert!(!RoleFlag::from_bits(0x15).is_valid());
    }
}

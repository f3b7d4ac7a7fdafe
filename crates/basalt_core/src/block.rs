//! # Block Identities
//!
//! The block type tags and their stable integer identities. The integer
//! values are part of the wire contract (the render mesh carries them as a
//! per-triangle float); visuals are resolved client-side.

/// A voxel block type.
///
/// The discriminants are stable and must never be reordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockType {
    /// Empty space.
    #[default]
    Air = 0,
    /// Base rock.
    Stone = 1,
    /// Subsurface soil.
    Dirt = 2,
    /// Exposed soil surface.
    Grass = 3,
    /// Desert and beach surface.
    Sand = 4,
    /// Cold-peak surface.
    Snow = 5,
    /// Loose rock on deep cave floors.
    Gravel = 6,
    /// Reserved for tree trunks.
    Wood = 7,
    /// Reserved for tree canopies.
    Leaves = 8,
}

impl BlockType {
    /// Number of defined block types.
    pub const COUNT: usize = 9;

    /// Returns the stable integer identity.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts from the stable integer identity.
    ///
    /// Unknown values map to `Air` so decoding is total.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Stone,
            2 => Self::Dirt,
            3 => Self::Grass,
            4 => Self::Sand,
            5 => Self::Snow,
            6 => Self::Gravel,
            7 => Self::Wood,
            8 => Self::Leaves,
            _ => Self::Air,
        }
    }

    /// Returns true for any non-air block.
    #[inline]
    #[must_use]
    pub const fn is_solid(self) -> bool {
        !matches!(self, Self::Air)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_round_trip() {
        for id in 0..BlockType::COUNT as u8 {
            assert_eq!(BlockType::from_u8(id).as_u8(), id);
        }
    }

    #[test]
    fn test_unknown_decodes_to_air() {
        assert_eq!(BlockType::from_u8(200), BlockType::Air);
    }

    #[test]
    fn test_solidity() {
        assert!(!BlockType::Air.is_solid());
        assert!(BlockType::Stone.is_solid());
        assert!(BlockType::Leaves.is_solid());
    }
}

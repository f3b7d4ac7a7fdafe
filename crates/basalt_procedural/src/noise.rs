//! # Simplex Noise
//!
//! Deterministic, seed-parameterized scalar noise in 2D and 3D.
//!
//! ## Determinism Guarantee
//!
//! Given the same `WorldSeed`, every sampler in this module produces
//! **bit-identical** values on any platform, any time. The permutation
//! table is shuffled by a seed-derived xorshift64, and the kernels are
//! plain `f64` arithmetic with no platform intrinsics. This backend is the
//! fixed project-level noise choice; everything downstream (density,
//! meshes, the seam contract) depends on it staying put.

/// World seed for deterministic generation.
///
/// All procedural generation derives from this single value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldSeed(u64);

impl WorldSeed {
    /// Creates a new world seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Returns the raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives an independent sub-seed for a specific purpose.
    ///
    /// Each noise channel (continent, temperature, caves, ...) gets its own
    /// stream so channels never correlate.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        // FNV-1a style mixing
        let mut hash = self.0;
        hash ^= purpose;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }
}

impl Default for WorldSeed {
    fn default() -> Self {
        Self(69_420)
    }
}

/// Seed-shuffled permutation table shared by the 2D and 3D kernels.
struct PermutationTable {
    /// 256 entries, doubled so corner hashing never wraps an index.
    perm: [u8; 512],
}

impl PermutationTable {
    fn new(seed: WorldSeed) -> Self {
        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().take(256).enumerate() {
            *slot = i as u8;
        }

        // Fisher-Yates with deterministic xorshift64
        let mut state = seed.value() | 1;
        for i in (1..256).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = (state as usize) % (i + 1);
            perm.swap(i, j);
        }

        for i in 0..256 {
            perm[256 + i] = perm[i];
        }

        Self { perm }
    }

    #[inline]
    fn get(&self, index: usize) -> usize {
        self.perm[index & 511] as usize
    }
}

/// 12 gradient directions for the 2D kernel.
const GRAD2: [[f64; 2]; 12] = [
    [1.0, 0.0],
    [1.0, 1.0],
    [0.0, 1.0],
    [-1.0, 1.0],
    [-1.0, 0.0],
    [-1.0, -1.0],
    [0.0, -1.0],
    [1.0, -1.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [-1.0, 0.0],
    [0.0, -1.0],
];

/// 12 gradient directions for the 3D kernel (the edges of a cube).
const GRAD3: [[f64; 3]; 12] = [
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [-1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, -1.0],
    [0.0, -1.0, -1.0],
];

/// Simplex noise sampler with 2D and 3D kernels.
///
/// Values are in `[-1, 1]`. Sampling is a pure function: no allocation,
/// no interior mutability, `Send + Sync`.
pub struct SimplexNoise {
    table: PermutationTable,
}

impl SimplexNoise {
    /// 2D skew factor, `(sqrt(3) - 1) / 2`.
    const F2: f64 = 0.366_025_403_784_438_6;
    /// 2D unskew factor, `(3 - sqrt(3)) / 6`.
    const G2: f64 = 0.211_324_865_405_187_1;
    /// 3D skew factor, `1 / 3`.
    const F3: f64 = 1.0 / 3.0;
    /// 3D unskew factor, `1 / 6`.
    const G3: f64 = 1.0 / 6.0;

    /// Creates a sampler from a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            table: PermutationTable::new(seed),
        }
    }

    /// Samples 2D noise. Returns a value in `[-1, 1]`.
    #[must_use]
    pub fn sample2(&self, x: f64, z: f64) -> f64 {
        let skew = (x + z) * Self::F2;
        let i = fast_floor(x + skew);
        let j = fast_floor(z + skew);

        let unskew = f64::from(i + j) * Self::G2;
        let x0 = x - (f64::from(i) - unskew);
        let z0 = z - (f64::from(j) - unskew);

        // Which triangle of the skewed cell are we in?
        let (i1, j1) = if x0 > z0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - f64::from(i1) + Self::G2;
        let z1 = z0 - f64::from(j1) + Self::G2;
        let x2 = x0 - 1.0 + 2.0 * Self::G2;
        let z2 = z0 - 1.0 + 2.0 * Self::G2;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;

        let g0 = self.table.get(ii + self.table.get(jj));
        let g1 = self.table.get(ii + i1 as usize + self.table.get(jj + j1 as usize));
        let g2 = self.table.get(ii + 1 + self.table.get(jj + 1));

        let n0 = corner2(x0, z0, &GRAD2[g0 % 12]);
        let n1 = corner2(x1, z1, &GRAD2[g1 % 12]);
        let n2 = corner2(x2, z2, &GRAD2[g2 % 12]);

        // 70.0 normalizes the kernel sum to [-1, 1]
        70.0 * (n0 + n1 + n2)
    }

    /// Samples 3D noise. Returns a value in `[-1, 1]`.
    #[must_use]
    #[allow(clippy::many_single_char_names, clippy::similar_names)]
    pub fn sample3(&self, x: f64, y: f64, z: f64) -> f64 {
        let skew = (x + y + z) * Self::F3;
        let i = fast_floor(x + skew);
        let j = fast_floor(y + skew);
        let k = fast_floor(z + skew);

        let unskew = f64::from(i + j + k) * Self::G3;
        let x0 = x - (f64::from(i) - unskew);
        let y0 = y - (f64::from(j) - unskew);
        let z0 = z - (f64::from(k) - unskew);

        // Rank the displacements to pick the simplex traversal order.
        let (i1, j1, k1, i2, j2, k2) = if x0 >= y0 {
            if y0 >= z0 {
                (1, 0, 0, 1, 1, 0)
            } else if x0 >= z0 {
                (1, 0, 0, 1, 0, 1)
            } else {
                (0, 0, 1, 1, 0, 1)
            }
        } else if y0 < z0 {
            (0, 0, 1, 0, 1, 1)
        } else if x0 < z0 {
            (0, 1, 0, 0, 1, 1)
        } else {
            (0, 1, 0, 1, 1, 0)
        };

        let x1 = x0 - f64::from(i1) + Self::G3;
        let y1 = y0 - f64::from(j1) + Self::G3;
        let z1 = z0 - f64::from(k1) + Self::G3;
        let x2 = x0 - f64::from(i2) + 2.0 * Self::G3;
        let y2 = y0 - f64::from(j2) + 2.0 * Self::G3;
        let z2 = z0 - f64::from(k2) + 2.0 * Self::G3;
        let x3 = x0 - 1.0 + 3.0 * Self::G3;
        let y3 = y0 - 1.0 + 3.0 * Self::G3;
        let z3 = z0 - 1.0 + 3.0 * Self::G3;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let kk = (k & 255) as usize;

        let g0 = self.table.get(ii + self.table.get(jj + self.table.get(kk)));
        let g1 = self.table.get(
            ii + i1 as usize + self.table.get(jj + j1 as usize + self.table.get(kk + k1 as usize)),
        );
        let g2 = self.table.get(
            ii + i2 as usize + self.table.get(jj + j2 as usize + self.table.get(kk + k2 as usize)),
        );
        let g3 = self.table.get(ii + 1 + self.table.get(jj + 1 + self.table.get(kk + 1)));

        let n0 = corner3(x0, y0, z0, &GRAD3[g0 % 12]);
        let n1 = corner3(x1, y1, z1, &GRAD3[g1 % 12]);
        let n2 = corner3(x2, y2, z2, &GRAD3[g2 % 12]);
        let n3 = corner3(x3, y3, z3, &GRAD3[g3 % 12]);

        // 32.0 normalizes the kernel sum to [-1, 1]
        32.0 * (n0 + n1 + n2 + n3)
    }

    /// Fractal (octaved) 2D noise, normalized to roughly `[-1, 1]`.
    #[must_use]
    pub fn octaved2(&self, x: f64, z: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_amplitude = 0.0;

        for _ in 0..octaves {
            total += self.sample2(x * frequency, z * frequency) * amplitude;
            max_amplitude += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        total / max_amplitude
    }

    /// Fractal (octaved) 3D noise, normalized to roughly `[-1, 1]`.
    #[must_use]
    pub fn octaved3(
        &self,
        x: f64,
        y: f64,
        z: f64,
        octaves: u32,
        persistence: f64,
        lacunarity: f64,
    ) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_amplitude = 0.0;

        for _ in 0..octaves {
            total += self.sample3(x * frequency, y * frequency, z * frequency) * amplitude;
            max_amplitude += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        total / max_amplitude
    }

    /// Ridged 2D noise in `[0, 1]`, sharp crests. Used for mountain height.
    #[must_use]
    pub fn ridged2(&self, x: f64, z: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_amplitude = 0.0;

        for _ in 0..octaves {
            let ridge = 1.0 - self.sample2(x * frequency, z * frequency).abs();
            total += ridge * ridge * amplitude;
            max_amplitude += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        total / max_amplitude
    }
}

/// Contribution of one 2D simplex corner.
#[inline]
fn corner2(x: f64, z: f64, grad: &[f64; 2]) -> f64 {
    let t = 0.5 - x * x - z * z;
    if t < 0.0 {
        0.0
    } else {
        let t2 = t * t;
        t2 * t2 * (grad[0] * x + grad[1] * z)
    }
}

/// Contribution of one 3D simplex corner.
#[inline]
fn corner3(x: f64, y: f64, z: f64, grad: &[f64; 3]) -> f64 {
    let t = 0.6 - x * x - y * y - z * z;
    if t < 0.0 {
        0.0
    } else {
        let t2 = t * t;
        t2 * t2 * (grad[0] * x + grad[1] * y + grad[2] * z)
    }
}

/// Floor to `i32` without the `f64::floor` call overhead.
#[inline]
fn fast_floor(x: f64) -> i32 {
    let xi = x as i32;
    if x < f64::from(xi) {
        xi - 1
    } else {
        xi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism_2d() {
        let a = SimplexNoise::new(WorldSeed::new(12_345));
        let b = SimplexNoise::new(WorldSeed::new(12_345));

        for i in 0..200 {
            let x = f64::from(i) * 0.37 - 20.0;
            let z = f64::from(i) * 0.53 - 35.0;
            assert_eq!(a.sample2(x, z), b.sample2(x, z));
        }
    }

    #[test]
    fn test_determinism_3d() {
        let a = SimplexNoise::new(WorldSeed::new(77));
        let b = SimplexNoise::new(WorldSeed::new(77));

        for i in 0..200 {
            let x = f64::from(i) * 0.11 - 9.0;
            let y = f64::from(i) * 0.23 - 17.0;
            let z = f64::from(i) * 0.31 - 4.0;
            assert_eq!(a.sample3(x, y, z), b.sample3(x, y, z));
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let a = SimplexNoise::new(WorldSeed::new(1));
        let b = SimplexNoise::new(WorldSeed::new(2));
        assert_ne!(a.sample2(100.0, 100.0), b.sample2(100.0, 100.0));
        assert_ne!(a.sample3(10.0, 20.0, 30.0), b.sample3(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_range_2d() {
        let noise = SimplexNoise::new(WorldSeed::new(42));
        for i in 0..10_000 {
            let x = f64::from(i) * 0.17 - 850.0;
            let z = f64::from(i) * 0.29 - 1450.0;
            let v = noise.sample2(x, z);
            assert!((-1.0..=1.0).contains(&v), "2D value {v} out of range");
        }
    }

    #[test]
    fn test_range_3d() {
        let noise = SimplexNoise::new(WorldSeed::new(42));
        for i in 0..10_000 {
            let x = f64::from(i) * 0.13 - 650.0;
            let y = f64::from(i) * 0.07 - 350.0;
            let z = f64::from(i) * 0.19 - 950.0;
            let v = noise.sample3(x, y, z);
            assert!((-1.0..=1.0).contains(&v), "3D value {v} out of range");
        }
    }

    #[test]
    fn test_continuity_3d() {
        let noise = SimplexNoise::new(WorldSeed::new(42));
        let delta = 0.001;
        let v = noise.sample3(31.5, 12.25, -8.75);

        assert!((v - noise.sample3(31.5 + delta, 12.25, -8.75)).abs() < 0.01);
        assert!((v - noise.sample3(31.5, 12.25 + delta, -8.75)).abs() < 0.01);
        assert!((v - noise.sample3(31.5, 12.25, -8.75 + delta)).abs() < 0.01);
    }

    #[test]
    fn test_seed_derivation_streams() {
        let base = WorldSeed::new(42);
        assert_ne!(base.derive(1), base.derive(2));
        assert_eq!(base.derive(1), base.derive(1));
        assert_ne!(base.derive(1), base);
    }

    #[test]
    fn test_ridged_nonnegative() {
        let noise = SimplexNoise::new(WorldSeed::new(9));
        for i in 0..1000 {
            let v = noise.ridged2(f64::from(i) * 0.4, f64::from(i) * 0.6, 3, 0.5, 2.0);
            assert!(v >= 0.0);
        }
    }

    #[test]
    fn test_octaved_range() {
        let noise = SimplexNoise::new(WorldSeed::new(42));
        let v2 = noise.octaved2(100.0, 100.0, 6, 0.5, 2.0);
        let v3 = noise.octaved3(100.0, 50.0, 100.0, 4, 0.5, 2.0);
        assert!((-1.5..=1.5).contains(&v2));
        assert!((-1.5..=1.5).contains(&v3));
    }
}

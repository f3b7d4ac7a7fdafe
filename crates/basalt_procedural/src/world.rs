//! # World Context
//!
//! The single value that owns the seed, every noise channel, the biome
//! model, and the edit overlay. All generation queries go through it; there
//! are no process-wide statics. One instance exists per server and is
//! shared behind an `Arc`.
//!
//! Density is composed in four steps: a smooth gradient falling away from
//! the blended surface height, a depth-faded 3D perturbation, depth-banded
//! cave carving driven by pairs of independent 3D fields through a smooth
//! threshold, and finally the summed edit-overlay deltas. Bedrock and sky
//! clamps bound the whole field. Every step is continuous in `(x, y, z)`,
//! which is what the cross-chunk seam contract rests on.

use basalt_core::{BlockType, ISO_LEVEL, Y_BEDROCK, Y_SKY};

use crate::biome::{smoothstep, Biome, ClimateSampler};
use crate::column::ColumnData;
use crate::edits::{EditOverlay, EditSnapshot};
use crate::noise::{SimplexNoise, WorldSeed};

/// Density value returned inside the bedrock clamp.
pub const DENSITY_SOLID: f32 = 3.0;

/// Density value returned inside the sky clamp.
pub const DENSITY_AIR: f32 = -3.0;

/// Slope of the surface gradient (density units per block of depth).
const SURFACE_K: f32 = 1.0 / 16.0;

/// Amplitude of the depth-faded 3D perturbation.
const PERTURB_AMPLITUDE: f32 = 0.5;

/// XYZ frequency of the perturbation field.
const PERTURB_SCALE: f64 = 0.045;

/// Frequencies for the three independent cave fields.
const CAVE_SCALES: [f64; 3] = [0.040, 0.045, 0.030];

/// Half-width of the smooth threshold edge for cave carving.
const CAVE_EDGE: f32 = 0.08;

/// Feather width of the cave depth-band masks, in blocks.
const BAND_FEATHER: f32 = 2.0;

/// Depth of the dirt layer under exposed grass.
const DIRT_DEPTH: f32 = 4.0;

/// Mountain surface turns to snow above this Y (jittered per column).
const SNOW_LINE: f32 = 55.0;

/// Surfaces at or below this height (jittered) read as beach sand.
const BEACH_LEVEL: f32 = 4.0;

/// Cave floors below this Y read as gravel instead of stone.
const GRAVEL_CEILING: i32 = 24;

/// Smooth threshold: `0` below `t - s`, `1` above `t + s`, Hermite between.
#[inline]
#[must_use]
pub fn smooth_threshold(v: f32, t: f32, s: f32) -> f32 {
    smoothstep(t - s, t + s, v)
}

/// Seed-owned generation state for one world.
pub struct WorldContext {
    seed: WorldSeed,
    climate: ClimateSampler,
    perturb: SimplexNoise,
    cave_fields: [SimplexNoise; 3],
    detail: SimplexNoise,
    edits: EditOverlay,
}

impl WorldContext {
    /// Creates the context for a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            seed,
            climate: ClimateSampler::new(seed),
            perturb: SimplexNoise::new(seed.derive(20)),
            cave_fields: [
                SimplexNoise::new(seed.derive(30)),
                SimplexNoise::new(seed.derive(31)),
                SimplexNoise::new(seed.derive(32)),
            ],
            detail: SimplexNoise::new(seed.derive(40)),
            edits: EditOverlay::new(),
        }
    }

    /// The world seed.
    #[inline]
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.seed
    }

    /// The edit overlay.
    #[inline]
    #[must_use]
    pub const fn edits(&self) -> &EditOverlay {
        &self.edits
    }

    /// Records a carve sphere and returns the new overlay generation.
    pub fn apply_edit(&self, center: (i32, i32, i32), radius: f32, strength: f32) -> u64 {
        self.edits.apply(center, radius, strength)
    }

    /// Derived data for the column at `(x, z)`.
    ///
    /// Pure in `(x, z, seed)`; never reads neighbor columns.
    #[must_use]
    pub fn column_data(&self, x: i32, z: i32) -> ColumnData {
        let fx = f64::from(x);
        let fz = f64::from(z);
        let weights = self.climate.weights(fx, fz);
        ColumnData {
            height: self.climate.surface_height(fx, fz, &weights),
            dominant: weights.dominant(),
            cave_intensity: ClimateSampler::cave_intensity(&weights),
            weights,
        }
    }

    /// Density at a world point, including live overlay edits.
    ///
    /// Total over all inputs; out-of-range `y` returns the clamped
    /// constants. `> 0.5` is solid, `< 0.5` is air.
    #[must_use]
    pub fn sample_density(&self, x: i32, y: i32, z: i32) -> f32 {
        let column = self.column_data(x, z);
        let base = self.base_density(&column, f64::from(x), f64::from(y), f64::from(z));
        self.finish_density(base + self.edits.delta_at(f64::from(x), f64::from(y), f64::from(z)), y)
    }

    /// Density with a precomputed column and an edit snapshot.
    ///
    /// The fast path for chunk and mesh builds: the caller looks the column
    /// up once per `(x, z)` and snapshots the overlay once per build.
    #[must_use]
    pub fn sample_density_with(
        &self,
        column: &ColumnData,
        snapshot: &EditSnapshot,
        x: i32,
        y: i32,
        z: i32,
    ) -> f32 {
        let base = self.base_density(column, f64::from(x), f64::from(y), f64::from(z));
        self.finish_density(base + snapshot.delta_at(f64::from(x), f64::from(y), f64::from(z)), y)
    }

    /// Density with a precomputed column, against the live overlay.
    ///
    /// Used by the chunk manager's apron sampling, where the caller has a
    /// cached column but no build snapshot.
    #[must_use]
    pub fn sample_density_live(&self, column: &ColumnData, x: i32, y: i32, z: i32) -> f32 {
        let base = self.base_density(column, f64::from(x), f64::from(y), f64::from(z));
        self.finish_density(base + self.edits.delta_at(f64::from(x), f64::from(y), f64::from(z)), y)
    }

    /// Applies the bedrock and sky clamps.
    #[inline]
    fn finish_density(&self, d: f32, y: i32) -> f32 {
        if y <= Y_BEDROCK {
            DENSITY_SOLID
        } else if y >= Y_SKY {
            DENSITY_AIR
        } else {
            d
        }
    }

    /// Edit-free density composition.
    fn base_density(&self, column: &ColumnData, x: f64, y: f64, z: f64) -> f32 {
        let depth = column.depth_below_surface(y as f32);

        // Surface gradient, clamped so far-field values stay bounded.
        let mut d = depth
            .mul_add(SURFACE_K, ISO_LEVEL)
            .clamp(DENSITY_AIR, DENSITY_SOLID);

        // 3D perturbation, faded out near the surface so it cannot erode
        // the crust, growing with depth to roughen cave surroundings.
        let fade = smoothstep(2.0, 18.0, depth);
        if fade > 0.0 {
            let n = self.perturb.octaved3(
                x * PERTURB_SCALE,
                y * PERTURB_SCALE,
                z * PERTURB_SCALE,
                3,
                0.5,
                2.0,
            ) as f32;
            d += n * PERTURB_AMPLITUDE * fade;
        }

        d - self.cave_carve(column, x, y, z, depth)
    }

    /// Layered cave subtraction across the depth bands.
    fn cave_carve(&self, column: &ColumnData, x: f64, y: f64, z: f64, depth: f32) -> f32 {
        if depth <= 0.0 {
            return 0.0;
        }

        let na = self.cave_field(0, x, y, z);
        let nb = self.cave_field(1, x, y, z);
        let nc = self.cave_field(2, x, y, z);

        let yf = y as f32;
        let surface = column.height;

        // (field pair, lower y, upper y, threshold, strength)
        let shallow = band_mask(yf, surface - 20.0, surface) * carve(na, nb, 0.30, 2.0);
        let mid = band_mask(yf, 30.0, surface - 20.0) * carve(na, nb, 0.18, 4.0);
        let deep = band_mask(yf, 0.0, 30.0) * carve(nb, nc, 0.12, 4.5);
        let ultra = band_mask(yf, Y_BEDROCK as f32, 0.0) * carve(na, nc, 0.10, 5.0);
        let abyss = (1.0 - smoothstep(-34.0, -30.0, yf)) * carve(nb, nc, 0.20, 3.5);

        (shallow + mid + deep + ultra + abyss) * column.cave_intensity
    }

    /// One cave field sample in `[-1, 1]`.
    #[inline]
    fn cave_field(&self, index: usize, x: f64, y: f64, z: f64) -> f32 {
        let scale = CAVE_SCALES[index];
        self.cave_fields[index].sample3(x * scale, y * scale, z * scale) as f32
    }

    /// Block classification at a world point.
    ///
    /// Pure in `(x, y, z, seed, edits)`. This is the standalone form; bulk
    /// paths use [`Self::classify`] with densities they already have.
    #[must_use]
    pub fn block_type_at(&self, x: i32, y: i32, z: i32) -> BlockType {
        let column = self.column_data(x, z);
        let here = self.sample_density(x, y, z);
        let above = self.sample_density(x, y + 1, z);
        self.classify(&column, x, y, z, here, above)
    }

    /// Block classification from known densities.
    ///
    /// `here` decides solidity; `above` distinguishes exposed surfaces and
    /// cave floors.
    #[must_use]
    pub fn classify(
        &self,
        column: &ColumnData,
        x: i32,
        y: i32,
        z: i32,
        here: f32,
        above: f32,
    ) -> BlockType {
        if here < ISO_LEVEL {
            return BlockType::Air;
        }

        let depth = column.height - y as f32;
        let jitter = self.detail.sample2(f64::from(x) * 0.05, f64::from(z) * 0.05) as f32;
        let exposed = above < ISO_LEVEL;

        // Exposed crust within one block of the surface height.
        if depth.abs() < 1.0 && exposed {
            if column.dominant == Biome::Desert {
                return BlockType::Sand;
            }
            if column.dominant == Biome::Mountains && y as f32 > SNOW_LINE + jitter * 4.0 {
                return BlockType::Snow;
            }
            if column.height <= BEACH_LEVEL + jitter {
                return BlockType::Sand;
            }
            return BlockType::Grass;
        }

        // Thin soil band under the crust.
        if depth < DIRT_DEPTH {
            return if column.dominant == Biome::Desert {
                BlockType::Sand
            } else {
                BlockType::Dirt
            };
        }

        // Cave floors deep down collect loose rock.
        if exposed && y < GRAVEL_CEILING {
            return BlockType::Gravel;
        }

        BlockType::Stone
    }
}

/// Smooth membership mask for `y` in `[lo, hi]` with feathered edges.
#[inline]
fn band_mask(y: f32, lo: f32, hi: f32) -> f32 {
    if hi <= lo {
        return 0.0;
    }
    smoothstep(lo - BAND_FEATHER, lo + BAND_FEATHER, y)
        * (1.0 - smoothstep(hi - BAND_FEATHER, hi + BAND_FEATHER, y))
}

/// Carve amount when two independent fields both clear the threshold.
#[inline]
fn carve(n1: f32, n2: f32, threshold: f32, strength: f32) -> f32 {
    smooth_threshold(n1, threshold, CAVE_EDGE) * smooth_threshold(n2, threshold, CAVE_EDGE) * strength
}

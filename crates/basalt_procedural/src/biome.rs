//! # Biome Model
//!
//! Blends climate channels into a smooth four-way partition of unity.
//!
//! Surface height is a *weighted blend* of per-biome height profiles, not a
//! hard classification, so terrain never steps at a biome border. The
//! dominant tag is only used for block classification (sand vs grass vs
//! snow); the heights themselves always blend.

use crate::noise::{SimplexNoise, WorldSeed};

/// Biome tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Biome {
    /// Flat grassland.
    Plains = 0,
    /// Rolling, humid woodland.
    Forest = 1,
    /// Hot, dry sand flats.
    Desert = 2,
    /// Ridged high terrain.
    Mountains = 3,
}

impl Biome {
    /// Number of biomes.
    pub const COUNT: usize = 4;

    /// All biomes, indexable by weight slot.
    pub const ALL: [Self; Self::COUNT] = [Self::Plains, Self::Forest, Self::Desert, Self::Mountains];
}

/// Per-biome generation profile.
#[derive(Clone, Copy, Debug)]
pub struct BiomeProfile {
    /// Mean surface height in world units.
    pub base_height: f32,
    /// Height channel amplitude in world units.
    pub amplitude: f32,
    /// Multiplier on cave carving strength.
    pub cave_intensity: f32,
}

/// Profiles indexed by `Biome as usize`.
pub const BIOME_PROFILES: [BiomeProfile; Biome::COUNT] = [
    // Plains
    BiomeProfile {
        base_height: 14.0,
        amplitude: 8.0,
        cave_intensity: 1.0,
    },
    // Forest
    BiomeProfile {
        base_height: 22.0,
        amplitude: 12.0,
        cave_intensity: 1.0,
    },
    // Desert
    BiomeProfile {
        base_height: 12.0,
        amplitude: 9.0,
        cave_intensity: 0.8,
    },
    // Mountains
    BiomeProfile {
        base_height: 46.0,
        amplitude: 52.0,
        cave_intensity: 1.3,
    },
];

/// A smooth partition of unity over the four biomes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiomeWeights(pub [f32; Biome::COUNT]);

impl BiomeWeights {
    /// Weight of a specific biome.
    #[inline]
    #[must_use]
    pub fn get(&self, biome: Biome) -> f32 {
        self.0[biome as usize]
    }

    /// The biome with the largest weight.
    #[must_use]
    pub fn dominant(&self) -> Biome {
        let mut best = Biome::Plains;
        let mut best_w = self.0[0];
        for biome in Biome::ALL {
            let w = self.0[biome as usize];
            if w > best_w {
                best_w = w;
                best = biome;
            }
        }
        best
    }

    /// Sum of all weights (1.0 up to rounding).
    #[inline]
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }
}

/// Climate channels blended into biome weights and surface height.
///
/// Every channel derives its own seed stream, so channels never correlate.
pub struct ClimateSampler {
    /// Continent-scale elevation channel.
    continent: SimplexNoise,
    /// Temperature channel.
    temperature: SimplexNoise,
    /// Humidity channel.
    humidity: SimplexNoise,
    /// Per-biome height detail channels, indexed by `Biome as usize`.
    height_channels: [SimplexNoise; Biome::COUNT],
}

impl ClimateSampler {
    const CONTINENT_SCALE: f64 = 0.0015;
    const TEMPERATURE_SCALE: f64 = 0.0008;
    const HUMIDITY_SCALE: f64 = 0.0012;

    /// Per-biome height channel scales (plains, forest, desert, mountains).
    const HEIGHT_SCALES: [f64; Biome::COUNT] = [0.008, 0.010, 0.009, 0.004];

    /// Floor affinity keeping the partition denominator away from zero.
    const PLAINS_FLOOR: f32 = 0.25;

    /// Creates a sampler from the world seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            continent: SimplexNoise::new(seed.derive(1)),
            temperature: SimplexNoise::new(seed.derive(2)),
            humidity: SimplexNoise::new(seed.derive(3)),
            height_channels: [
                SimplexNoise::new(seed.derive(10)),
                SimplexNoise::new(seed.derive(11)),
                SimplexNoise::new(seed.derive(12)),
                SimplexNoise::new(seed.derive(13)),
            ],
        }
    }

    /// Continent-scale elevation in `[-1, 1]`.
    #[must_use]
    pub fn continent_at(&self, x: f64, z: f64) -> f64 {
        self.continent.octaved2(
            x * Self::CONTINENT_SCALE,
            z * Self::CONTINENT_SCALE,
            4,
            0.5,
            2.0,
        )
    }

    /// Temperature in `[-1, 1]`, cooled by continental elevation.
    #[must_use]
    pub fn temperature_at(&self, x: f64, z: f64, continent: f64) -> f64 {
        let base = self.temperature.sample2(
            x * Self::TEMPERATURE_SCALE,
            z * Self::TEMPERATURE_SCALE,
        );
        (base - continent.max(0.0) * 0.4).clamp(-1.0, 1.0)
    }

    /// Humidity in `[-1, 1]`.
    #[must_use]
    pub fn humidity_at(&self, x: f64, z: f64) -> f64 {
        self.humidity.octaved2(
            x * Self::HUMIDITY_SCALE,
            z * Self::HUMIDITY_SCALE,
            4,
            0.5,
            2.0,
        )
    }

    /// Biome weights at a world column. Always sums to 1.
    #[must_use]
    pub fn weights(&self, x: f64, z: f64) -> BiomeWeights {
        let continent = self.continent_at(x, z);
        let temperature = self.temperature_at(x, z, continent);
        let humidity = self.humidity_at(x, z);

        // Raw affinities, each smooth in the climate inputs.
        let mountains = smoothstep(0.15, 0.55, continent as f32);
        let desert = smoothstep(0.15, 0.50, temperature as f32)
            * smoothstep(0.05, 0.45, -humidity as f32);
        let forest = smoothstep(-0.05, 0.35, humidity as f32)
            * smoothstep(-0.50, 0.10, temperature as f32);
        let plains = Self::PLAINS_FLOOR;

        let sum = plains + forest + desert + mountains;
        BiomeWeights([plains / sum, forest / sum, desert / sum, mountains / sum])
    }

    /// Height-channel noise for one biome, in `[-1, 1]`.
    #[must_use]
    fn height_channel(&self, biome: Biome, x: f64, z: f64) -> f64 {
        let idx = biome as usize;
        let scale = Self::HEIGHT_SCALES[idx];
        match biome {
            // Sharp crests for mountains, rolling fractals elsewhere.
            Biome::Mountains => {
                let ridged = self.height_channels[idx].ridged2(x * scale, z * scale, 4, 0.5, 2.0);
                ridged.mul_add(2.0, -1.0)
            }
            _ => self.height_channels[idx].octaved2(x * scale, z * scale, 4, 0.5, 2.0),
        }
    }

    /// Blended surface height at a world column.
    #[must_use]
    pub fn surface_height(&self, x: f64, z: f64, weights: &BiomeWeights) -> f32 {
        let mut height = 0.0f32;
        for biome in Biome::ALL {
            let w = weights.get(biome);
            if w <= 0.0 {
                continue;
            }
            let profile = BIOME_PROFILES[biome as usize];
            let detail = self.height_channel(biome, x, z) as f32;
            height += w * profile.amplitude.mul_add(detail, profile.base_height);
        }
        height
    }

    /// Blended cave-intensity multiplier at a world column.
    #[must_use]
    pub fn cave_intensity(weights: &BiomeWeights) -> f32 {
        let mut intensity = 0.0f32;
        for biome in Biome::ALL {
            intensity += weights.get(biome) * BIOME_PROFILES[biome as usize].cave_intensity;
        }
        intensity
    }
}

/// Hermite smoothstep: 0 below `edge0`, 1 above `edge1`.
#[inline]
#[must_use]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

//! Published empirical constants used by the erosion models.
//!
//! These encode externally published models (RUSLE, GEOS3, the Sentinel-2 FCover
//! network, s2cloudless masking settings). Bump [`MODEL_CONSTANTS_VERSION`] whenever
//! any value changes.

pub const MODEL_CONSTANTS_VERSION: &str = "1.0.0";

/// Soil erodibility (K) model
pub mod soil {
    /// Upper clamps applied to covariates before classification (percent)
    pub const MAX_SAND_PCT: f32 = 20.0;
    pub const MAX_SILT_PCT: f32 = 70.0;
    pub const MAX_ORGANIC_MATTER_PCT: f32 = 4.0;

    /// Packing density = bulk density + PACKING_CLAY_COEFF * clay
    pub const PACKING_CLAY_COEFF: f32 = 0.009;
    pub const PACKING_LOW_LIMIT: f32 = 1.40;
    pub const PACKING_HIGH_LIMIT: f32 = 1.75;

    /// Organic soil threshold: OM >= 20% at 0% clay up to OM >= 30% at 50% clay
    pub const ORGANIC_CLAY_RANGE: (f32, f32) = (0.0, 50.0);
    pub const ORGANIC_OM_RANGE: (f32, f32) = (20.0, 30.0);

    /// Adjusted Ksat class limits, bottom-up (6 -> 1)
    pub const KSAT_VERY_SLOW_MAX: f32 = 2.4384;
    pub const KSAT_SLOW_MAX: f32 = 4.8768;
    pub const KSAT_MODERATE_LOW_MAX: f32 = 12.192;
    pub const KSAT_MODERATE_MAX: f32 = 48.768;
    pub const KSAT_MODERATE_FAST_MAX: f32 = 146.304;

    pub const K_TEXTURE_COEFF: f64 = 2.1e-4;
    pub const K_TEXTURE_EXPONENT: f64 = 1.14;
    pub const K_OM_OFFSET: f64 = 12.0;
    pub const K_STRUCTURE_COEFF: f64 = 3.25;
    pub const K_PERMEABILITY_COEFF: f64 = 2.5;
    /// US customary to SI (t ha h ha-1 MJ-1 mm-1)
    pub const K_SI_CONVERSION: f64 = 0.1317;

    /// Soil organic carbon to soil organic matter
    pub const SOC_TO_SOM: f32 = 1.72;

    /// Regions covered by the high-resolution regional soil dataset
    pub const REGIONAL_DATASET_REGIONS: &[&str] = &[
        "Abyei", "Algeria", "Angola", "Benin", "Botswana", "Burkina Faso", "Burundi", "Cameroon",
        "Cape Verde", "Central African Republic", "Chad", "Comoros", "Congo", "Côte d'Ivoire",
        "Democratic Republic of the Congo", "Djibouti", "Egypt", "Eritrea", "Ethiopia",
        "Equatorial Guinea", "Gabon", "Gambia", "Ghana", "Guinea", "Guinea-Bissau", "Kenya", "Lesotho",
        "Liberia", "Libya", "Madagascar", "Malawi", "Mali", "Mauritania", "Mauritius", "Morocco",
        "Mozambique", "Namibia", "Niger", "Nigeria", "Rwanda", "Sao Tome and Principe", "Senegal",
        "Seychelles", "Sierra Leone", "Somalia", "South Africa", "South Sudan", "Sudan", "Swaziland",
        "Togo", "Tunisia", "Uganda", "United Republic of Tanzania", "Western Sahara", "Zambia",
        "Zimbabwe",
    ];
}

/// Slope length and steepness (LS) model
pub mod terrain {
    pub const MAX_CONTRIBUTING_AREA_M2: f32 = 4000.0;
    pub const DEFAULT_CELL_SIZE_M: f32 = 30.0;
    pub const UNIT_PLOT_LENGTH_M: f32 = 22.13;
    pub const BETA_DIVISOR: f32 = 0.0896;
    pub const BETA_SLOPE_EXPONENT: f32 = 0.8;
    pub const BETA_OFFSET: f32 = 0.56;
    /// tan(slope) threshold between mild and steep S equations (9 %)
    pub const STEEPNESS_TAN_THRESHOLD: f32 = 0.09;
    pub const MILD_S: (f32, f32) = (10.8, 0.03);
    pub const STEEP_S: (f32, f32) = (16.8, -0.5);

    /// Aspect bins (lower exclusive, upper inclusive, degrees) and their
    /// flow-path multiplier: true = diagonal (sqrt 2), false = cardinal.
    /// The second bin upper edge is 77.5 in the published model.
    pub const ASPECT_BINS: [(f32, f32, bool); 8] = [
        (22.5, 77.5, true),
        (77.5, 112.5, false),
        (112.5, 157.5, true),
        (157.5, 202.5, false),
        (202.5, 247.5, true),
        (247.5, 292.5, false),
        (292.5, 337.5, true),
        (337.5, 360.0, false),
    ];

    /// Bare-soil frequency is only reported on slopes up to this steepness
    pub const MAX_BARE_SOIL_SLOPE_DEG: f32 = 26.6;
}

/// Cloud and shadow masking (s2cloudless settings)
pub mod cloud {
    pub const CLOUD_PROBABILITY_THRESHOLD: f32 = 40.0;
    pub const MAX_CLOUDY_PIXEL_PERCENTAGE: f64 = 60.0;
    pub const NIR_DARK_THRESHOLD: f32 = 0.15;
    pub const SHADOW_PROJECTION_PX: usize = 10;
    pub const BUFFER_M: f64 = 50.0;
    pub const MASK_RESOLUTION_M: f64 = 60.0;
    pub const OPENING_RADIUS_PX: f64 = 2.0;
}

/// GEOS3 bare soil rule
pub mod geos3 {
    pub const NDVI_RANGE: (f32, f32) = (-0.25, 0.25);
    pub const NBR2_RANGE: (f32, f32) = (-0.3, 0.1);
    pub const VNSIR_MAX: f32 = 0.9;
}

/// Sentinel-2 FCover network (SNAP biophysical processor weights)
pub mod fcover {
    /// Input bands in network order
    pub const INPUT_BANDS: [&str; 8] = ["B3", "B4", "B5", "B6", "B7", "B8A", "B11", "B12"];

    /// (min, max) normalisation for the 8 bands, then cos(view zenith), cos(sun zenith)
    pub const INPUT_NORMALISATION: [(f64, f64); 10] = [
        (0.0, 0.253061520472),
        (0.0, 0.290393577911),
        (0.0, 0.305398915249),
        (0.00663797254225, 0.608900395798),
        (0.0139727270189, 0.753827384323),
        (0.0266901380821, 0.782011770669),
        (0.0163880741923, 0.493761397883),
        (0.0, 0.49302598446),
        (0.918595400582, 0.999999999991),
        (0.342022871159, 0.936206429175),
    ];

    /// Hidden layer weights; inputs ordered as the 8 bands then view, sun, relative azimuth
    pub const HIDDEN_WEIGHTS: [[f64; 11]; 5] = [
        [
            -0.156854264841, 0.124234528462, 0.235625516229, -1.8323910258, -0.217188969888,
            5.06933958064, -0.887578008155, -1.0808468167, -0.0323167041864, -0.224476137359,
            -0.195523962947,
        ],
        [
            -0.220824927842, 1.28595395487, 0.703139486363, -1.34481216665, -1.96881267559,
            -1.45444681639, 1.02737560043, -0.12494641532, 0.0802762437265, -0.198705918577,
            0.108527100527,
        ],
        [
            -0.409688743281, 1.08858884766, 0.36284522554, 0.0369390509705, -0.348012590003,
            -2.0035261881, 0.0410357601757, 1.22373853174, -0.0124082778287, -0.282223364524,
            0.0994993117557,
        ],
        [
            -0.188970957866, -0.0358621840833, 0.00551248528107, 1.35391570802, -0.739689896116,
            -2.21719530107, 0.313216124198, 1.5020168915, 1.21530490195, -0.421938358618,
            1.48852484547,
        ],
        [
            2.49293993709, -4.40511331388, -1.91062012624, -0.703174115575, -0.215104721138,
            -0.972151494818, -0.930752241278, 1.2143441876, -0.521665460192, -0.445755955598,
            0.344111873777,
        ],
    ];

    pub const HIDDEN_BIAS: [f64; 5] = [
        -1.45261652206,
        -1.70417477557,
        1.02168965849,
        -0.498002810205,
        -3.88922154789,
    ];

    pub const OUTPUT_WEIGHTS: [f64; 5] = [
        0.23080586765,
        -0.333655484884,
        -0.499418292325,
        0.0472484396749,
        -0.0798516540739,
    ];

    pub const OUTPUT_BIAS: f64 = -0.0967998147811;

    pub const OUTPUT_DENORMALISATION: (f64, f64) = (0.000181230723879, 0.999638214715);

    /// Fallback viewing geometry when per-band metadata is missing (degrees)
    pub const DEFAULT_INCIDENCE_AZIMUTH_DEG: f64 = 102.5;
    pub const DEFAULT_INCIDENCE_ZENITH_DEG: f64 = 10.4;
}

/// Time series handling
pub mod time {
    /// Average month length used to derive interval lengths
    pub const AVERAGE_MONTH_DAYS: f64 = 30.4375;
    pub const DAYS_PER_YEAR: f64 = 365.25;
    pub const DEFAULT_INTERVAL_DAYS: f64 = 30.0;
    pub const DEFAULT_HARMONICS: usize = 4;
    pub const GEOMEDIAN_MAX_ITERATIONS: usize = 100;
    pub const GEOMEDIAN_TOLERANCE: f64 = 1e-6;
}

/// Sustainability factor
pub mod sustainability {
    pub const LAND_USE_SCALE: f32 = 10.0;
    pub const LAND_USE_RANGE: (f32, f32) = (5.0, 8.0);
    /// S at or above this is treated as non-restorable bare surface
    pub const MAX_RESTORABLE_S: f32 = 0.9;
    pub const PERMANENT_BARE_FREQUENCY: f32 = 0.95;
}

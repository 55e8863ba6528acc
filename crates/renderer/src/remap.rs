//! CPU reference of the distortion math evaluated per pixel on the GPU.
//!
//! The WGSL in `shaders/effect.wgsl` mirrors these functions term for term;
//! keeping the reference here lets the invariants (center singularity guard,
//! factor clamps, edge fade) be asserted without a GPU.
//!
//! All coordinates are normalized UVs in `[0, 1]²` with the distortion
//! center fixed at `(0.5, 0.5)`.

use crate::params::EffectKind;

pub const DISTORTION_CENTER: [f32; 2] = [0.5, 0.5];

/// Radii below this leave the UV untouched so the math never divides by or
/// normalizes a near-zero vector.
pub const CENTER_EPSILON: f32 = 1e-3;

/// Radial magnification for the two-term fisheye, clamped to `[0.1, 3.0]`.
pub fn fisheye_hq_factor(strength: f32, r: f32) -> f32 {
    let s = strength * 2.0;
    let r2 = r * r;
    (1.0 + s * 0.5 * r2 + s * 0.1 * r2 * r2).clamp(0.1, 3.0)
}

/// Single-term fisheye variant, clamped to `[0.2, 2.5]`.
pub fn fisheye_fast_factor(strength: f32, r: f32) -> f32 {
    (1.0 + strength * 1.5 * r * r).clamp(0.2, 2.5)
}

/// Maps an output UV to the source UV the active effect samples.
pub fn distort_uv(effect: EffectKind, strength: f32, time: f32, uv: [f32; 2]) -> [f32; 2] {
    let dx = uv[0] - DISTORTION_CENTER[0];
    let dy = uv[1] - DISTORTION_CENTER[1];
    let r = (dx * dx + dy * dy).sqrt();

    match effect {
        EffectKind::None => uv,
        EffectKind::FisheyeHq => {
            if r < CENTER_EPSILON {
                return uv;
            }
            let factor = fisheye_hq_factor(strength, r);
            [
                DISTORTION_CENTER[0] + dx * factor,
                DISTORTION_CENTER[1] + dy * factor,
            ]
        }
        EffectKind::FisheyeFast => {
            if r < CENTER_EPSILON {
                return uv;
            }
            let factor = fisheye_fast_factor(strength, r);
            [
                DISTORTION_CENTER[0] + dx * factor,
                DISTORTION_CENTER[1] + dy * factor,
            ]
        }
        EffectKind::Ripple => {
            // A zero-length direction vector means no displacement at the
            // exact center.
            if r < CENTER_EPSILON {
                return uv;
            }
            let ripple = (r * 30.0 - time * 5.0).sin() * strength * 0.02;
            [uv[0] + dx / r * ripple, uv[1] + dy / r * ripple]
        }
        EffectKind::Swirl => {
            let angle = dy.atan2(dx) + strength * (1.0 - r) * (time * 2.0).sin();
            [
                DISTORTION_CENTER[0] + r * angle.cos(),
                DISTORTION_CENTER[1] + r * angle.sin(),
            ]
        }
    }
}

/// Brightness weight applied to the sampled color at a distorted UV.
///
/// UVs outside the unit square contribute nothing (opaque black). The two
/// fisheye variants additionally fade the periphery to black instead of
/// hard-clipping at the edge.
pub fn sample_weight(effect: EffectKind, distorted: [f32; 2]) -> f32 {
    let inside = (0.0..=1.0).contains(&distorted[0]) && (0.0..=1.0).contains(&distorted[1]);
    if !inside {
        return 0.0;
    }
    match effect {
        EffectKind::FisheyeHq | EffectKind::FisheyeFast => {
            let dx = distorted[0] - DISTORTION_CENTER[0];
            let dy = distorted[1] - DISTORTION_CENTER[1];
            1.0 - smoothstep(0.4, 0.7, (dx * dx + dy * dy).sqrt())
        }
        _ => 1.0,
    }
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRENGTHS: [f32; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

    #[test]
    fn center_is_a_fixed_point_for_every_effect() {
        for effect in EffectKind::ALL {
            for strength in STRENGTHS {
                let out = distort_uv(effect, strength, 1.3, DISTORTION_CENTER);
                assert_eq!(out, DISTORTION_CENTER, "{effect} moved the center");
            }
        }
    }

    #[test]
    fn fisheye_factors_stay_within_their_clamps() {
        for strength in STRENGTHS {
            for step in 0..=200 {
                let r = step as f32 * 0.01;
                let hq = fisheye_hq_factor(strength, r);
                assert!((0.1..=3.0).contains(&hq), "hq factor {hq} at r={r}");
                let fast = fisheye_fast_factor(strength, r);
                assert!((0.2..=2.5).contains(&fast), "fast factor {fast} at r={r}");
            }
        }
    }

    #[test]
    fn zero_strength_fisheye_is_identity() {
        let uv = [0.8, 0.3];
        let out = distort_uv(EffectKind::FisheyeHq, 0.0, 0.0, uv);
        assert!((out[0] - uv[0]).abs() < 1e-6);
        assert!((out[1] - uv[1]).abs() < 1e-6);
    }

    #[test]
    fn swirl_preserves_radius() {
        for strength in STRENGTHS {
            let uv = [0.7, 0.6];
            let out = distort_uv(EffectKind::Swirl, strength, 0.9, uv);
            let r_in = ((uv[0] - 0.5f32).powi(2) + (uv[1] - 0.5f32).powi(2)).sqrt();
            let r_out = ((out[0] - 0.5f32).powi(2) + (out[1] - 0.5f32).powi(2)).sqrt();
            assert!((r_in - r_out).abs() < 1e-5);
        }
    }

    #[test]
    fn ripple_displacement_is_bounded_by_strength() {
        let uv = [0.9, 0.2];
        let out = distort_uv(EffectKind::Ripple, 1.0, 2.0, uv);
        let shift = ((out[0] - uv[0]).powi(2) + (out[1] - uv[1]).powi(2)).sqrt();
        assert!(shift <= 0.02 + 1e-6);
    }

    #[test]
    fn out_of_range_uv_contributes_nothing() {
        assert_eq!(sample_weight(EffectKind::FisheyeHq, [1.2, 0.5]), 0.0);
        assert_eq!(sample_weight(EffectKind::None, [-0.01, 0.5]), 0.0);
        assert_eq!(sample_weight(EffectKind::None, [0.5, 0.5]), 1.0);
    }

    #[test]
    fn fisheye_periphery_fades_smoothly() {
        let center_weight = sample_weight(EffectKind::FisheyeFast, [0.5, 0.5]);
        assert!((center_weight - 1.0).abs() < 1e-6);
        // Past the 0.7 radius everything is black even inside the square.
        let corner_weight = sample_weight(EffectKind::FisheyeFast, [0.99, 0.99]);
        assert_eq!(corner_weight, 0.0);
        // Between the smoothstep edges the fade is strictly decreasing.
        let near = sample_weight(EffectKind::FisheyeHq, [0.95, 0.5]);
        let nearer = sample_weight(EffectKind::FisheyeHq, [0.92, 0.5]);
        assert!(near < nearer);
        assert!(near > 0.0);
    }

    #[test]
    fn non_fisheye_effects_skip_the_edge_fade() {
        assert_eq!(sample_weight(EffectKind::Swirl, [0.95, 0.95]), 1.0);
        assert_eq!(sample_weight(EffectKind::Ripple, [0.05, 0.05]), 1.0);
    }
}

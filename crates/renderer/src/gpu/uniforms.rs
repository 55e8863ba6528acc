use bytemuck::{Pod, Zeroable};

use crate::remap::DISTORTION_CENTER;

/// Per-frame parameter block for the effect pipeline.
///
/// Field order and padding match the `DistortionUniforms` struct in
/// `shaders/effect.wgsl`; the block is rebuilt before every effect draw and
/// read by the GPU only during that draw, so there is no cross-frame
/// aliasing to worry about.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct DistortionUniforms {
    pub resolution: [f32; 2],
    pub center: [f32; 2],
    pub time: f32,
    pub strength: f32,
    pub effect_kind: u32,
    pub _pad: u32,
}

impl DistortionUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32],
            center: DISTORTION_CENTER,
            time: 0.0,
            strength: 0.0,
            effect_kind: 0,
            _pad: 0,
        }
    }

    /// Rebuilds the block from the current state. The center is fixed.
    pub fn update(
        &mut self,
        effect_kind: u32,
        strength: f32,
        time_seconds: f32,
        width: u32,
        height: u32,
    ) {
        self.resolution = [width as f32, height as f32];
        self.time = time_seconds;
        self.strength = strength;
        self.effect_kind = effect_kind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_layout_matches_wgsl_expectations() {
        assert_eq!(std::mem::size_of::<DistortionUniforms>(), 32);
        assert_eq!(std::mem::size_of::<DistortionUniforms>() % 16, 0);
    }

    #[test]
    fn repeated_updates_differ_only_in_time() {
        let mut first = DistortionUniforms::new(1280, 720);
        let mut second = DistortionUniforms::new(1280, 720);
        first.update(2, 0.75, 1.0, 1280, 720);
        second.update(2, 0.75, 1.5, 1280, 720);

        assert_ne!(first.time, second.time);
        second.time = first.time;
        assert_eq!(first, second);
    }

    #[test]
    fn center_never_moves() {
        let mut uniforms = DistortionUniforms::new(64, 64);
        uniforms.update(4, 1.0, 9.0, 320, 240);
        assert_eq!(uniforms.center, DISTORTION_CENTER);
    }
}

use std::sync::{Arc, Mutex};

/// Distortions the effect pipeline can evaluate.
///
/// The discriminant order matches the `effect_kind` switch in the WGSL
/// fragment shader; `shader_id` is the only place the mapping lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectKind {
    #[default]
    None,
    FisheyeHq,
    FisheyeFast,
    Ripple,
    Swirl,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::None,
        EffectKind::FisheyeHq,
        EffectKind::FisheyeFast,
        EffectKind::Ripple,
        EffectKind::Swirl,
    ];

    /// Value written into the uniform block for the effect shader's switch.
    pub fn shader_id(self) -> u32 {
        match self {
            EffectKind::None => 0,
            EffectKind::FisheyeHq => 1,
            EffectKind::FisheyeFast => 2,
            EffectKind::Ripple => 3,
            EffectKind::Swirl => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EffectKind::None => "none",
            EffectKind::FisheyeHq => "fisheye-hq",
            EffectKind::FisheyeFast => "fisheye-fast",
            EffectKind::Ripple => "ripple",
            EffectKind::Swirl => "swirl",
        }
    }
}

impl std::str::FromStr for EffectKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EffectKind::ALL
            .into_iter()
            .find(|kind| kind.label() == value)
            .ok_or_else(|| format!("unknown effect '{value}'"))
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Active distortion selection, read once per frame by the engine.
///
/// Strength is always stored clamped to `[0, 1]`; out-of-range inputs are
/// clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParameters {
    pub effect: EffectKind,
    strength: f32,
    pub passthrough: bool,
}

impl EffectParameters {
    pub fn new(effect: EffectKind, strength: f32) -> Self {
        Self {
            effect,
            strength: strength.clamp(0.0, 1.0),
            passthrough: false,
        }
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength.clamp(0.0, 1.0);
    }
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self::new(EffectKind::None, 0.5)
    }
}

/// Shared cell holding the effect parameters.
///
/// Every mutation goes through these methods, so writes are serialized on
/// one lock; readers copy the whole struct out in a single acquisition and
/// never see a half-applied update.
#[derive(Clone)]
pub struct SharedParams {
    inner: Arc<Mutex<EffectParameters>>,
}

impl SharedParams {
    pub fn new(initial: EffectParameters) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set_effect(&self, effect: EffectKind, strength: f32) {
        let mut params = self.lock();
        params.effect = effect;
        params.set_strength(strength);
    }

    pub fn set_strength(&self, strength: f32) {
        self.lock().set_strength(strength);
    }

    pub fn set_passthrough(&self, enabled: bool) {
        self.lock().passthrough = enabled;
    }

    pub fn snapshot(&self) -> EffectParameters {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EffectParameters> {
        self.inner.lock().expect("effect parameter lock poisoned")
    }
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new(EffectParameters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_is_clamped_on_every_write_path() {
        let mut params = EffectParameters::new(EffectKind::Ripple, 1.7);
        assert_eq!(params.strength(), 1.0);
        params.set_strength(-0.2);
        assert_eq!(params.strength(), 0.0);
        params.set_strength(0.25);
        assert_eq!(params.strength(), 0.25);

        let shared = SharedParams::default();
        shared.set_effect(EffectKind::Swirl, 5.0);
        assert_eq!(shared.snapshot().strength(), 1.0);
        shared.set_strength(f32::NEG_INFINITY);
        assert_eq!(shared.snapshot().strength(), 0.0);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let shared = SharedParams::default();
        let before = shared.snapshot();
        shared.set_effect(EffectKind::FisheyeHq, 0.75);
        assert_eq!(before.effect, EffectKind::None);
        assert_eq!(shared.snapshot().effect, EffectKind::FisheyeHq);
    }

    #[test]
    fn effect_labels_round_trip() {
        for kind in EffectKind::ALL {
            assert_eq!(kind.label().parse::<EffectKind>().unwrap(), kind);
        }
        assert!("vortex".parse::<EffectKind>().is_err());
    }
}

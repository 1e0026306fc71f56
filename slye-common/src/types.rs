#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point or direction in presentation space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "[f64; 3]", into = "[f64; 3]")
)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(value: [f64; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(value: Vec3) -> Self {
        value.to_array()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn get(&self, mode: TransformMode) -> Vec3 {
        match mode {
            TransformMode::Translate => self.position,
            TransformMode::Rotate => self.rotation,
            TransformMode::Scale => self.scale,
        }
    }

    pub fn set(&mut self, mode: TransformMode, value: Vec3) {
        match mode {
            TransformMode::Translate => self.position = value,
            TransformMode::Rotate => self.rotation = value,
            TransformMode::Scale => self.scale = value,
        }
    }
}

/// Which of the three transform vectors an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum TransformMode {
    Translate,
    Rotate,
    Scale,
}

/// Position/rotation/scale capability shared by steps and components.
pub trait Transformable {
    fn transform(&self) -> &Transform;
    fn transform_mut(&mut self) -> &mut Transform;

    fn position(&self) -> Vec3 {
        self.transform().position
    }

    fn rotation(&self) -> Vec3 {
        self.transform().rotation
    }

    fn scale(&self) -> Vec3 {
        self.transform().scale
    }

    fn set_position(&mut self, x: f64, y: f64, z: f64) {
        self.transform_mut().position = Vec3::new(x, y, z);
    }

    fn set_rotation(&mut self, x: f64, y: f64, z: f64) {
        self.transform_mut().rotation = Vec3::new(x, y, z);
    }

    fn set_scale(&mut self, x: f64, y: f64, z: f64) {
        self.transform_mut().scale = Vec3::new(x, y, z);
    }

    fn set_transform(&mut self, transform: Transform) {
        *self.transform_mut() = transform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(Transform);

    impl Transformable for Probe {
        fn transform(&self) -> &Transform {
            &self.0
        }

        fn transform_mut(&mut self) -> &mut Transform {
            &mut self.0
        }
    }

    #[test]
    fn test_default_transform() {
        let probe = Probe(Transform::default());
        assert_eq!(probe.position(), Vec3::ZERO);
        assert_eq!(probe.rotation(), Vec3::ZERO);
        assert_eq!(probe.scale(), Vec3::ONE);
    }

    #[test]
    fn test_mode_get_set() {
        let mut probe = Probe(Transform::default());
        probe.set_rotation(0.5, 1.0, 1.5);
        probe
            .transform_mut()
            .set(TransformMode::Scale, Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(
            probe.transform().get(TransformMode::Rotate),
            Vec3::new(0.5, 1.0, 1.5)
        );
        assert_eq!(probe.scale(), Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(probe.position(), Vec3::ZERO);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_vec3_serializes_as_array() {
        let json = serde_json::to_string(&Vec3::new(1.0, 2.5, -3.0)).unwrap();
        assert_eq!(json, "[1.0,2.5,-3.0]");
        let back: Vec3 = serde_json::from_str("[4, 5, 6]").unwrap();
        assert_eq!(back, Vec3::new(4.0, 5.0, 6.0));
    }
}

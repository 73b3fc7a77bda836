//! Minimal mutable scene graph recorded by the capture pipeline.
//!
//! The recorder never owns the scene; the host passes the export root into
//! every call, mutates it freely between ticks, and keeps ownership
//! throughout.

use glam::{Quat, Vec3};

/// Local TRS transform of a scene node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Surface material reference carried by a node.
///
/// Materials are exported once per recording session, on the first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 3],
}

/// One node in the recorded scene hierarchy.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    /// Inactive nodes are exported as invisible rather than skipped.
    pub active: bool,
    pub material: Option<Material>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            active: true,
            material: None,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }
}

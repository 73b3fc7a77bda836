//! Per-sample export glue between the scene graph and the scene document.

use glam::Quat;

use crate::record::document::{MaterialRecord, PrimSample, SceneDocument};
use crate::scene::SceneNode;

/// Scene units are meters; usd archives are authored in centimeters.
const UNIT_SCALE: f32 = 100.0;

/// Axis-basis conversion convention applied during export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BasisTransform {
    /// Bake the conversion into every sample.
    #[default]
    SlowAndSafe,
    /// Express the conversion as a negative scale on the root.
    FastWithNegativeScale,
    None,
}

/// How node activity is exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivePolicy {
    /// Inactive nodes become invisible prims.
    #[default]
    ExportAsVisibility,
    /// Node activity is ignored; everything exports as visible.
    Ignore,
}

/// Export configuration mutated in place across a recording session.
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub basis: BasisTransform,
    /// True only until the first sample of a session lands.
    pub export_materials: bool,
    pub active_policy: ActivePolicy,
}

impl ExportContext {
    pub fn new() -> Self {
        Self {
            basis: BasisTransform::SlowAndSafe,
            export_materials: true,
            active_policy: ActivePolicy::ExportAsVisibility,
        }
    }
}

impl Default for ExportContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("scene serialization failed: {0}")]
    Serialize(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Seam to the external scene-graph serializer.
pub trait SampleExporter: Send {
    /// Write one sample of `root` into `doc` at the document's current time.
    fn export(
        &mut self,
        root: &SceneNode,
        ctx: &ExportContext,
        doc: &mut SceneDocument,
    ) -> Result<(), ExportError>;
}

/// Default exporter: flattens the hierarchy into prim samples.
#[derive(Debug, Default)]
pub struct UsdSampleExporter;

impl SampleExporter for UsdSampleExporter {
    fn export(
        &mut self,
        root: &SceneNode,
        ctx: &ExportContext,
        doc: &mut SceneDocument,
    ) -> Result<(), ExportError> {
        let mut prims = Vec::new();
        flatten(root, "", ctx, &mut prims);
        if ctx.export_materials {
            let mut materials = Vec::new();
            collect_materials(root, "", &mut materials);
            for material in materials {
                doc.add_material(material);
            }
        }
        doc.push_frame(prims);
        Ok(())
    }
}

fn flatten(node: &SceneNode, parent_path: &str, ctx: &ExportContext, out: &mut Vec<PrimSample>) {
    let path = format!("{parent_path}/{}", sanitize_prim_name(&node.name));
    let visible = match ctx.active_policy {
        ActivePolicy::ExportAsVisibility => node.active,
        ActivePolicy::Ignore => true,
    };
    out.push(PrimSample {
        path: path.clone(),
        translation: node.transform.translation,
        rotation: node.transform.rotation,
        scale: node.transform.scale,
        visible,
    });
    for child in &node.children {
        flatten(child, &path, ctx, out);
    }
}

fn collect_materials(node: &SceneNode, parent_path: &str, out: &mut Vec<MaterialRecord>) {
    let path = format!("{parent_path}/{}", sanitize_prim_name(&node.name));
    if let Some(material) = &node.material {
        out.push(MaterialRecord {
            prim_path: path.clone(),
            name: material.name.clone(),
            base_color: material.base_color,
        });
    }
    for child in &node.children {
        collect_materials(child, &path, out);
    }
}

fn sanitize_prim_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Run `f` with the export root scaled to centimeters and optionally twisted
/// 180 degrees around the up axis, restoring the prior scale and rotation
/// unconditionally afterwards.
pub fn with_export_transform<T>(
    root: &mut SceneNode,
    flip_axis: bool,
    f: impl FnOnce(&SceneNode) -> T,
) -> T {
    let prior_scale = root.transform.scale;
    let prior_rotation = root.transform.rotation;

    root.transform.scale = prior_scale * UNIT_SCALE;
    if flip_axis {
        root.transform.rotation = prior_rotation * Quat::from_rotation_y(std::f32::consts::PI);
    }

    let out = f(root);

    root.transform.scale = prior_scale;
    root.transform.rotation = prior_rotation;
    out
}

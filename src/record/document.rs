//! In-progress scene document written during a recording session.
//!
//! The document buffers frame samples in memory and flushes once at save,
//! either as usda-style text or as a compact binary container. It is owned
//! exclusively by the active recording session and consumed by `save`.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use glam::{Mat4, Quat, Vec3};

/// On-disk flavor of the scene document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Human-readable, `.usda` extension.
    Text,
    /// Compact binary, `.usdc` extension.
    Binary,
}

impl DocumentFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Text => "usda",
            DocumentFormat::Binary => "usdc",
        }
    }
}

/// Transform and visibility of one prim at one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimSample {
    /// Absolute prim path, e.g. `/Chair/Seat`.
    pub path: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub visible: bool,
}

/// Material reference recorded once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub prim_path: String,
    pub name: String,
    pub base_color: [f32; 3],
}

#[derive(Debug)]
struct FrameSample {
    /// `None` marks an untimed sample; the document then carries a static
    /// value instead of a time sample.
    time: Option<f64>,
    prims: Vec<PrimSample>,
}

/// Mutable scene file handle bound to its timing metadata at creation.
#[derive(Debug)]
pub struct SceneDocument {
    path: PathBuf,
    format: DocumentFormat,
    frame_rate: f64,
    start_time: f64,
    end_time: f64,
    time: Option<f64>,
    materials: Vec<MaterialRecord>,
    frames: Vec<FrameSample>,
}

impl SceneDocument {
    /// Open a new document at `path`, creating parent directories. The end
    /// time code is `floor(frame_rate * record_secs)`.
    pub fn create(
        path: PathBuf,
        format: DocumentFormat,
        frame_rate: f64,
        record_secs: f64,
    ) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            format,
            frame_rate,
            start_time: 0.0,
            end_time: (frame_rate * record_secs).floor(),
            time: None,
            materials: Vec::new(),
            frames: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Set the time code that subsequent frames are stamped with; `None`
    /// stamps them as untimed.
    pub fn set_time(&mut self, time: Option<f64>) {
        self.time = time;
    }

    pub fn sample_count(&self) -> usize {
        self.frames.len()
    }

    pub fn add_material(&mut self, material: MaterialRecord) {
        self.materials.push(material);
    }

    /// Append one frame of prim samples at the current time code.
    pub fn push_frame(&mut self, prims: Vec<PrimSample>) {
        self.frames.push(FrameSample {
            time: self.time,
            prims,
        });
    }

    /// Flush the document to disk and close it. Runs exactly once; the
    /// parent directory must still exist.
    pub fn save(self) -> io::Result<PathBuf> {
        let file = fs::File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        match self.format {
            DocumentFormat::Text => self.write_text(&mut writer)?,
            DocumentFormat::Binary => self.write_binary(&mut writer)?,
        }
        writer.flush()?;
        Ok(self.path)
    }

    fn write_text(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "#usda 1.0")?;
        writeln!(w, "(")?;
        writeln!(w, "    startTimeCode = {}", self.start_time)?;
        writeln!(w, "    endTimeCode = {}", self.end_time)?;
        writeln!(w, "    timeCodesPerSecond = {}", self.frame_rate)?;
        writeln!(w, ")")?;

        if !self.materials.is_empty() {
            writeln!(w)?;
            writeln!(w, "def Scope \"Materials\"")?;
            writeln!(w, "{{")?;
            for material in &self.materials {
                let [r, g, b] = material.base_color;
                writeln!(w, "    def Material \"{}\"", material.name)?;
                writeln!(w, "    {{")?;
                writeln!(w, "        color3f inputs:diffuseColor = ({r}, {g}, {b})")?;
                writeln!(w, "        custom string bound = \"{}\"", material.prim_path)?;
                writeln!(w, "    }}")?;
            }
            writeln!(w, "}}")?;
        }

        for prim in self.collect_prims() {
            writeln!(w)?;
            self.write_text_prim(w, &prim)?;
        }
        Ok(())
    }

    /// Prim paths in order of first appearance across all frames.
    fn collect_prims(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for frame in &self.frames {
            for prim in &frame.prims {
                if !paths.contains(&prim.path) {
                    paths.push(prim.path.clone());
                }
            }
        }
        paths
    }

    fn write_text_prim(&self, w: &mut impl Write, path: &str) -> io::Result<()> {
        let name = path.rsplit('/').next().unwrap_or(path);
        writeln!(w, "def Xform \"{name}\" (")?;
        writeln!(w, "    custom string primPath = \"{path}\"")?;
        writeln!(w, ")")?;
        writeln!(w, "{{")?;

        let mut static_sample: Option<&PrimSample> = None;
        let mut timed: Vec<(f64, &PrimSample)> = Vec::new();
        for frame in &self.frames {
            let Some(prim) = frame.prims.iter().find(|p| p.path == path) else {
                continue;
            };
            match frame.time {
                Some(t) => timed.push((t, prim)),
                None => static_sample = Some(prim),
            }
        }

        if let Some(prim) = static_sample {
            writeln!(
                w,
                "    matrix4d xformOp:transform = {}",
                format_matrix(prim)
            )?;
            let token = visibility_token(prim.visible);
            writeln!(w, "    token visibility = \"{token}\"")?;
        }
        if !timed.is_empty() {
            writeln!(w, "    matrix4d xformOp:transform.timeSamples = {{")?;
            for (t, prim) in &timed {
                writeln!(w, "        {t}: {},", format_matrix(prim))?;
            }
            writeln!(w, "    }}")?;
            writeln!(w, "    token visibility.timeSamples = {{")?;
            for (t, prim) in &timed {
                let token = visibility_token(prim.visible);
                writeln!(w, "        {t}: \"{token}\",")?;
            }
            writeln!(w, "    }}")?;
        }
        writeln!(w, "    uniform token[] xformOpOrder = [\"xformOp:transform\"]")?;
        writeln!(w, "}}")?;
        Ok(())
    }

    fn write_binary(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(BINARY_MAGIC)?;
        w.write_all(&1u16.to_le_bytes())?;
        w.write_all(&self.frame_rate.to_le_bytes())?;
        w.write_all(&self.start_time.to_le_bytes())?;
        w.write_all(&self.end_time.to_le_bytes())?;

        write_u32(w, self.materials.len())?;
        for material in &self.materials {
            write_str(w, &material.prim_path)?;
            write_str(w, &material.name)?;
            for channel in material.base_color {
                w.write_all(&channel.to_le_bytes())?;
            }
        }

        write_u32(w, self.frames.len())?;
        for frame in &self.frames {
            match frame.time {
                Some(t) => {
                    w.write_all(&[1])?;
                    w.write_all(&t.to_le_bytes())?;
                }
                None => w.write_all(&[0])?,
            }
            write_u32(w, frame.prims.len())?;
            for prim in &frame.prims {
                write_str(w, &prim.path)?;
                let (t, r, s) = (prim.translation, prim.rotation, prim.scale);
                let components = [t.x, t.y, t.z, r.x, r.y, r.z, r.w, s.x, s.y, s.z];
                for component in components {
                    w.write_all(&component.to_le_bytes())?;
                }
                w.write_all(&[u8::from(prim.visible)])?;
            }
        }
        Ok(())
    }
}

pub(crate) const BINARY_MAGIC: &[u8; 8] = b"USDSTNDC";

fn write_u32(w: &mut impl Write, value: usize) -> io::Result<()> {
    w.write_all(&(value as u32).to_le_bytes())
}

fn write_str(w: &mut impl Write, value: &str) -> io::Result<()> {
    write_u32(w, value.len())?;
    w.write_all(value.as_bytes())
}

fn visibility_token(visible: bool) -> &'static str {
    if visible {
        "inherited"
    } else {
        "invisible"
    }
}

fn format_matrix(prim: &PrimSample) -> String {
    let matrix = Mat4::from_scale_rotation_translation(
        prim.scale,
        prim.rotation,
        prim.translation,
    );
    let rows: Vec<String> = matrix
        .transpose()
        .to_cols_array_2d()
        .iter()
        .map(|row| format!("({}, {}, {}, {})", row[0], row[1], row[2], row[3]))
        .collect();
    format!("( {} )", rows.join(", "))
}

pub mod config;
pub mod record;
pub mod scene;
pub mod serve;

pub use config::{Config, FrameRate, RecordSettings, ServerSettings};
pub use record::{RecordError, RecordState, SampleClock, SceneRecorder};
pub use scene::{Material, SceneNode, Transform};
pub use serve::{CatalogServer, ServeError, ServerConfig};

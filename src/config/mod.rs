mod settings;

pub use settings::{Config, FrameRate, RecordSettings, ServerSettings};

// Application state management

pub mod config;
pub mod context;
pub mod events;
pub mod settings;

pub use config::ConfigManager;
pub use context::AppContext;
pub use events::{AppEvent, EventReceiver, EventSender, UpdatePhase, UpdateProgress};
pub use settings::{SettingsStore, Theme};

mod settings;

pub use settings::{
    DestinationConfig, ExportConfig, RetryConfig, Settings, SlackConfig, load_settings,
};

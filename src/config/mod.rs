mod settings;

pub use settings::{
    BackendSettings, LogNotifierSettings, NotifiersSettings, SchedulerSettings, Settings,
};

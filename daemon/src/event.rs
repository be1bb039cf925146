use crate::config::{ApplicationConfig, Config};

pub enum DaemonEvent {
    /// A watched game executable appeared in the process list.
    GameStarted(ApplicationConfig),
    /// The previously active game exited.
    GameStopped,
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// The show/hide hotkey was pressed.
    ToggleRequested,
    /// Ctrl+C received; tear the session down and exit.
    Shutdown,
}

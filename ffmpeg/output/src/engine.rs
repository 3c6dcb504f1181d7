/*!
    Process-wide codec engine setup.
*/

use std::sync::OnceLock;

use ffmpeg_next::util::log::{self, Level as LogLevel};
use tracing::{Level, debug, error};

use ffmpeg_types::{Result, StreamError};

static INIT: OnceLock<Result<()>> = OnceLock::new();

/**
    Handle proving that the codec engine has been initialized.

    The engine is global to the process. Creating an `Engine` runs the
    one-time setup on first use and is free afterwards, so a handle can be
    obtained wherever one is needed.
*/
#[derive(Clone, Copy, Debug)]
pub struct Engine {
    _private: (),
}

impl Engine {
    /**
        Initialize the codec engine, or return the handle if that already
        happened.
    */
    pub fn init() -> Result<Self> {
        let result = *INIT.get_or_init(|| {
            ffmpeg_next::init().map_err(|e| {
                error!(error = %e, "Failed to initialize codec engine");
                StreamError::Unknown
            })?;
            log::set_level(LogLevel::Warning);
            debug!("Codec engine initialized");
            Ok(())
        });
        result.map(|()| Self { _private: () })
    }

    /**
        Set how chatty the engine's own logging is on stderr.
    */
    pub fn set_log_level(&self, level: Level) {
        log::set_level(engine_log_level(level));
    }
}

fn engine_log_level(level: Level) -> LogLevel {
    if level == Level::ERROR {
        LogLevel::Error
    } else if level == Level::WARN {
        LogLevel::Warning
    } else if level == Level::INFO {
        LogLevel::Info
    } else if level == Level::DEBUG {
        LogLevel::Verbose
    } else {
        LogLevel::Debug
    }
}

//! Triangle application
//!
//! Opens a window and draws the triangle until the window is closed.
//! Settings are read from `jubilant.toml` in the working directory when it
//! exists.

use jubilant::prelude::*;

const CONFIG_PATH: &str = "jubilant.toml";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load_or_default(CONFIG_PATH)?;
    logging::init(&config.log_level);

    log::info!("Starting jubilant triangle");

    let result = TriangleApp::new(&config).and_then(|mut app| app.run());

    match result {
        Ok(summary) => {
            log::info!("Triangle finished after {} frame(s)", summary.frames_presented);
            Ok(())
        }
        Err(e) => {
            log::error!("Application error: {}", e);
            Err(e.into())
        }
    }
}

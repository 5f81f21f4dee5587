//! Vulkan probe
//!
//! Prints how many instance extensions and layers the loader reports, then
//! exits.

use jubilant::foundation::logging;
use jubilant::render::vulkan::{load_entry, InstanceProbe};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("warn");

    let entry = load_entry()?;
    let probe = InstanceProbe::query(&entry)?;

    println!("{} extensions supported", probe.extensions.len());
    for name in &probe.extensions {
        log::debug!("extension: {}", name);
    }
    println!("{} layers available", probe.layers.len());
    for name in &probe.layers {
        log::debug!("layer: {}", name);
    }

    Ok(())
}

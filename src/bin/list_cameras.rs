//! list_cameras - print the local capture devices a sensor can bind to.

use anyhow::Result;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let devices = camera_sensor::list_local_devices()?;
    if devices.is_empty() {
        if cfg!(feature = "ingest-v4l2") {
            println!("no local cameras found");
        } else {
            println!("no local cameras (built without the ingest-v4l2 feature)");
        }
        return Ok(());
    }
    for device in devices {
        println!("{}\t{}\t{}", device.index, device.path.display(), device.name);
    }
    Ok(())
}

use std::thread;
use std::time::Duration;

use clap::Parser;
use htu21df::Htu21df;
use linux_embedded_hal::{Delay, I2cdev};

/// Periodically read an HTU21D-F on a Linux I2C bus
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to I2C bus (e.g., /dev/i2c-1)
    #[arg(short, long, default_value = "/dev/i2c-1")]
    path: String,

    /// Milliseconds between readings
    #[arg(short, long, default_value_t = 1000)]
    interval: u64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    log::info!("Opening bus: {}", args.path);
    let dev = I2cdev::new(&args.path).expect("Failed to open I2C device");

    let mut htu = Htu21df::new(Delay);
    if let Err(e) = htu.begin(dev) {
        log::error!("Could not start sensor: {}", e);
        std::process::exit(1);
    }

    loop {
        match htu.read_temperature() {
            Ok(t) => log::info!("Temp: {:.2} °C", t),
            Err(e) => log::warn!("Temperature read failed: {}", e),
        }
        match htu.read_humidity() {
            Ok(h) => log::info!("Humidity: {:.2}%", h),
            Err(e) => log::warn!("Humidity read failed: {}", e),
        }
        thread::sleep(Duration::from_millis(args.interval));
    }
}

//! Replays a raw bus capture through the controller and logs the
//! resulting device state.
//!
//! ```text
//! poolbus-replay capture.bin
//! RUST_LOG=poolbus=trace poolbus-replay capture.bin
//! ```
//!
//! Built with `--features serial`, a device path (`/dev/ttyUSB0`,
//! `COM3`) opens the port instead and logs every state change until
//! Ctrl-C.

use poolbus::{Controller, FileConnection, JsonCodec, PoolbusError};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), PoolbusError> {
    poolbus::init_logging();

    let source = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "capture.bin".to_string());

    #[cfg(feature = "serial")]
    let result = if source.starts_with("/dev/") || source.starts_with("COM") {
        live::run(&source).await
    } else {
        replay(&source)
    };
    #[cfg(not(feature = "serial"))]
    let result = replay(&source);

    result
}

fn replay(path: &str) -> Result<(), PoolbusError> {
    let mut controller = Controller::new(FileConnection::new(path));
    info!(path, "replaying capture");

    let mut polls = 0u64;
    while !controller.connection().is_exhausted() {
        controller.poll_once()?;
        polls += 1;
    }

    let document = controller.reported_document(&JsonCodec)?;
    info!(
        polls,
        stats = %controller.stats(),
        state = %String::from_utf8_lossy(&document),
        "replay finished"
    );
    Ok(())
}

#[cfg(feature = "serial")]
mod live {
    use poolbus::{
        Controller, ControllerConfig, DeviceState, JsonCodec, PollConfig, PoolbusError,
        SerialConfig, SerialConnection, StateSink, encode_reported,
    };
    use tokio::sync::mpsc;
    use tracing::info;

    /// Logs each published state as a reported-state document.
    struct LogSink;

    impl StateSink for LogSink {
        fn publish(&mut self, state: &DeviceState) -> Result<(), PoolbusError> {
            let document = encode_reported(&JsonCodec, state)?;
            info!(state = %String::from_utf8_lossy(&document), "state changed");
            Ok(())
        }
    }

    pub async fn run(device: &str) -> Result<(), PoolbusError> {
        let serial = SerialConfig::for_device(device);
        let config = ControllerConfig {
            poll: PollConfig::from_read_timeout(serial.read_timeout),
            ..Default::default()
        };
        let mut controller = Controller::with_config(SerialConnection::new(serial), config);

        // No desired-state source in the demo; the loop only polls.
        let (_desired_tx, desired_rx) = mpsc::channel(1);
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        info!(device, "listening");
        controller.run(desired_rx, &mut LogSink, shutdown).await
    }
}

use clap::Parser;
use std::panic::{self, PanicHookInfo};
use tilt2mqtt::app::{self, Options, RealScanner};
use tilt2mqtt::logging;
use tilt2mqtt::mqtt::{MqttPublisher, MqttSettings};

/// Exit codes for the application
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

fn mqtt_settings(options: &Options) -> MqttSettings {
    let credentials = match (&options.mqtt_username, &options.mqtt_password) {
        (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        (None, None) => None,
        _ => {
            log::warn!("MQTT username and password must both be set; connecting anonymously");
            None
        }
    };

    MqttSettings {
        host: options.mqtt_host.clone(),
        port: options.mqtt_port,
        credentials,
        client_id: "tilt2mqtt".to_string(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    if let Err(error) = logging::init(options.verbose, Some(&options.log_file)) {
        eprintln!("error: failed to set up logging: {}", error);
        std::process::exit(EXIT_ERROR);
    }

    let publisher = MqttPublisher::connect(&mqtt_settings(&options));
    let scanner = RealScanner;

    // run() loops until killed; reaching here means scanning could not start
    if let Err(why) = app::run(options, &scanner, &publisher).await {
        eprintln!("error: {}", why);
        std::process::exit(EXIT_ERROR);
    }
}

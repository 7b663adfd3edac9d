use log::error;

use igmp_relay::cli;
use igmp_relay::iface::{IgmpListener, InterfaceBinding};
use igmp_relay::session::SessionController;

fn main() {
    let config = match cli::parse_args(std::env::args()) {
        Ok(Some(config)) => config,
        Ok(None) => return,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.log_level);

    if let Err(e) = run(config) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn run(config: cli::Config) -> Result<(), igmp_relay::RelayError> {
    let udpxy_binding = InterfaceBinding::resolve(&config.udpxy_interface)?;
    let stream_binding = InterfaceBinding::resolve(&config.stream_interface)?;

    let mut listener = IgmpListener::new(&config.stream_interface)?;
    let mut controller = SessionController::new(config, udpxy_binding, stream_binding);

    controller.run(&mut listener);
    Ok(())
}

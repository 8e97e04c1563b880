use std::process::ExitCode;

use log::{error, LevelFilter};
use simple_logger::SimpleLogger;

use ls8_emulator::server::{run_server, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = SimpleLogger::new().with_level(LevelFilter::Info).env().init() {
        eprintln!("warning: logging disabled: {}", err);
    }

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(1);
        }
    };

    run_server(config).await;
    ExitCode::SUCCESS
}

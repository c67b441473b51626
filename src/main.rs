use std::env;

use log::LevelFilter;
use nesette::{nes::Nes, screen};

fn main() {
    setup_logging().expect("logger setup failed");
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).expect("pass a .nes file path to run");

    let nes = Nes::load(path).expect("failed to load cartridge");
    screen::run(nes);
}

fn setup_logging() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.target(),
                record.level(),
                message
            ))
        })
        .level(LevelFilter::Info)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

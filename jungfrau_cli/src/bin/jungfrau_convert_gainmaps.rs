use clap::{Arg, Command};
use std::path::PathBuf;

use libjungfrau::detector::Detector;
use libjungfrau::gain_maps::convert_gain_maps;

fn main() {
    let matches = Command::new("jungfrau_convert_gainmaps")
        .about("Stack per-module vendor gain calibration files into a gains.h5")
        .arg(
            Arg::new("detector")
                .long("detector")
                .required(true)
                .help("Detector name, e.g. JF07T32V01"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .default_value("gains.h5")
                .help("Output gain map file"),
        )
        .arg(
            Arg::new("modules")
                .required(true)
                .num_args(1..)
                .help("Per-module vendor gain files, in module order"),
        )
        .get_matches();

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logger!");

    let detector = match matches
        .get_one::<String>("detector")
        .expect("required arg")
        .parse::<Detector>()
    {
        Ok(detector) => detector,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let module_files: Vec<PathBuf> = matches
        .get_many::<String>("modules")
        .expect("required arg")
        .map(PathBuf::from)
        .collect();
    let output = PathBuf::from(matches.get_one::<String>("output").expect("has default"));

    log::info!(
        "Converting {} module gain files for {detector}...",
        module_files.len()
    );

    if let Err(e) = convert_gain_maps(&module_files, &detector, &output) {
        log::error!("Gain map conversion failed with error: {e}");
        std::process::exit(1);
    }

    log::info!("Done.");
}

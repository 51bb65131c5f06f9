use clap::{Arg, ArgAction, Command};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use libjungfrau::client::DetectorClient;
use libjungfrau::config::AcquisitionSettings;
use libjungfrau::process::run_acquisition;

fn default_filename() -> String {
    let format = time::format_description::parse("[year][month][day]_[hour][minute]")
        .expect("valid time format");
    let date_string = time::OffsetDateTime::now_utc()
        .format(&format)
        .expect("formattable time");
    format!("run_{date_string}.h5")
}

fn make_template_config(path: &Path) {
    let settings = AcquisitionSettings::default();
    let yaml_str = serde_yaml::to_string(&settings).expect("serializable settings");
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn main() {
    let matches = Command::new("jungfrau_run")
        .about("Record a data run through the detector integration service")
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Path to a yaml settings file"),
        )
        .arg(Arg::new("api").long("api").help("Address of the detector integration service"))
        .arg(
            Arg::new("filename")
                .long("filename")
                .help("Output file name (defaults to run_<date>.h5)"),
        )
        .arg(Arg::new("directory").long("directory").help("Output directory"))
        .arg(
            Arg::new("uid")
                .long("uid")
                .value_parser(clap::value_parser!(u32))
                .help("User ID which needs to own the file"),
        )
        .arg(
            Arg::new("exptime")
                .long("exptime")
                .value_parser(clap::value_parser!(f64))
                .help("Integration time in seconds"),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .value_parser(clap::value_parser!(usize))
                .help("Number of frames"),
        )
        .arg(
            Arg::new("save")
                .long("save")
                .action(ArgAction::SetTrue)
                .help("Save the data file"),
        )
        .arg(
            Arg::new("gain")
                .long("gain")
                .help("File containing gain corrections for the online viewer"),
        )
        .arg(
            Arg::new("pede")
                .long("pede")
                .help("File containing pedestal corrections for the online viewer"),
        )
        .get_matches();

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logger!");

    if let Some(("new", _)) = matches.subcommand() {
        let config_path = PathBuf::from(
            matches
                .get_one::<String>("config")
                .map(String::as_str)
                .unwrap_or("jungfrau_run.yaml"),
        );
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // start from the config file, if given, and let the flags override it
    let mut settings = match matches.get_one::<String>("config") {
        Some(config_path) => match AcquisitionSettings::read_config_file(Path::new(config_path)) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        },
        None => AcquisitionSettings::default(),
    };

    if let Some(api) = matches.get_one::<String>("api") {
        settings.api_address = api.clone();
    }
    if let Some(directory) = matches.get_one::<String>("directory") {
        settings.directory = PathBuf::from(directory);
    }
    if let Some(filename) = matches.get_one::<String>("filename") {
        settings.filename = filename.clone();
    }
    if let Some(uid) = matches.get_one::<u32>("uid") {
        settings.uid = *uid;
    }
    if let Some(exptime) = matches.get_one::<f64>("exptime") {
        settings.exptime = *exptime;
    }
    if let Some(frames) = matches.get_one::<usize>("frames") {
        settings.n_frames = *frames;
    }
    if matches.get_flag("save") {
        settings.save = true;
    }
    if let Some(gain) = matches.get_one::<String>("gain") {
        settings.gain_file = Some(PathBuf::from(gain));
    }
    if let Some(pede) = matches.get_one::<String>("pede") {
        settings.pedestal_file = Some(PathBuf::from(pede));
    }
    if settings.filename.is_empty() {
        settings.filename = default_filename();
    }

    log::info!("Output file: {}", settings.output_file().display());
    log::info!(
        "Frames: {}  Exposure: {}s  Save: {}",
        settings.n_frames,
        settings.exptime,
        settings.save
    );

    let client = DetectorClient::new(&settings.api_address);

    if let Err(e) = run_acquisition(&client, &settings) {
        log::error!("Acquisition failed with error: {e}");
        std::process::exit(1);
    }
}

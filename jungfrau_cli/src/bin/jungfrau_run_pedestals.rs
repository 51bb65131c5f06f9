use clap::{Arg, Command};

use libjungfrau::client::DetectorClient;
use libjungfrau::process::{run_pedestal_acquisition, PedestalRunSettings};

fn default_filename() -> String {
    let format = time::format_description::parse("[year][month][day]_[hour][minute]")
        .expect("valid time format");
    let date_string = time::OffsetDateTime::now_utc()
        .format(&format)
        .expect("formattable time");
    format!("pedestal_{date_string}.h5")
}

fn main() {
    let matches = Command::new("jungfrau_run_pedestals")
        .about("Record a pedestal run, stepping the detector through its gain stages")
        .arg(
            Arg::new("api")
                .long("api")
                .default_value("http://sf-daq-1:10000")
                .help("Address of the detector integration service"),
        )
        .arg(
            Arg::new("filename")
                .long("filename")
                .help("Output file name (defaults to pedestal_<date>.h5)"),
        )
        .arg(
            Arg::new("directory")
                .long("directory")
                .default_value(".")
                .help("Output directory"),
        )
        .arg(
            Arg::new("uid")
                .long("uid")
                .value_parser(clap::value_parser!(u32))
                .default_value("16582")
                .help("User ID which needs to own the file"),
        )
        .arg(
            Arg::new("period")
                .long("period")
                .value_parser(clap::value_parser!(f64))
                .default_value("0.01")
                .help("Period in seconds (default is 10Hz - 0.01)"),
        )
        .arg(
            Arg::new("exptime")
                .long("exptime")
                .value_parser(clap::value_parser!(f64))
                .default_value("0.000010")
                .help("Integration time in seconds (default 0.000010 - 10us)"),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .value_parser(clap::value_parser!(usize))
                .default_value("10000")
                .help("Number of pedestal frames"),
        )
        .arg(
            Arg::new("trigger")
                .long("trigger")
                .value_parser(clap::value_parser!(usize))
                .default_value("1")
                .help("Run with the trigger; the period is ignored in this case (default - 1 (yes))"),
        )
        .get_matches();

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logger!");

    let filename = matches
        .get_one::<String>("filename")
        .cloned()
        .unwrap_or_else(default_filename);
    let directory = matches.get_one::<String>("directory").expect("has default");

    let settings = PedestalRunSettings {
        output_file: format!("{directory}/{filename}"),
        uid: *matches.get_one::<u32>("uid").expect("has default"),
        period: *matches.get_one::<f64>("period").expect("has default"),
        exptime: *matches.get_one::<f64>("exptime").expect("has default"),
        n_frames: *matches.get_one::<usize>("frames").expect("has default"),
        trigger: *matches.get_one::<usize>("trigger").expect("has default") > 0,
    };

    let client = DetectorClient::new(matches.get_one::<String>("api").expect("has default"));

    if let Err(e) = run_pedestal_acquisition(&client, &settings) {
        log::error!("Pedestal run failed with error: {e}");
        std::process::exit(1);
    }
}

use clap::{Arg, ArgAction, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::PathBuf;
use std::sync::mpsc::channel;

use libjungfrau::pedestal::{GainSchedule, PedestalSettings};
use libjungfrau::process::{build_pedestals, PedestalProcessSettings};
use libjungfrau::worker_status::ProcessPhase;

fn main() {
    let matches = Command::new("jungfrau_create_pedestals")
        .about("Derive pedestal corrections and a pixel mask from a pedestal run")
        .arg(
            Arg::new("filename")
                .long("filename")
                .default_value("pedestal.h5")
                .help("Raw pedestal run file"),
        )
        .arg(
            Arg::new("directory")
                .long("directory")
                .default_value("./")
                .help("Output directory for the pedestal and pixel mask file"),
        )
        .arg(
            Arg::new("number-frames")
                .long("number-frames")
                .value_parser(clap::value_parser!(usize))
                .default_value("1000000")
                .help("Analyze only the first this many frames"),
        )
        .arg(
            Arg::new("frames-average")
                .long("frames-average")
                .value_parser(clap::value_parser!(usize))
                .default_value("1000")
                .help("Average each gain over the last this many frames, reducing the weight of earlier ones"),
        )
        .arg(
            Arg::new("x-test-pixel")
                .long("x-test-pixel")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("x position of the test pixel traced in the log"),
        )
        .arg(
            Arg::new("y-test-pixel")
                .long("y-test-pixel")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("y position of the test pixel traced in the log"),
        )
        .arg(
            Arg::new("frames-g0")
                .long("frames-g0")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("Treat the run as taken with the first frames-g0 frames in gain0, then frames-g1 in gain1, frames-g2 in gain2 and frames-hg0 in high G0"),
        )
        .arg(
            Arg::new("frames-g1")
                .long("frames-g1")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("Forced number of gain1 frames"),
        )
        .arg(
            Arg::new("frames-g2")
                .long("frames-g2")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("Forced number of gain2 frames"),
        )
        .arg(
            Arg::new("frames-hg0")
                .long("frames-hg0")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("Forced number of high G0 frames"),
        )
        .arg(
            Arg::new("gain-check")
                .long("gain-check")
                .value_parser(clap::value_parser!(usize))
                .default_value("1")
                .help("Check that the gain setting in each module matches the general gain switch (0 - don't check)"),
        )
        .arg(
            Arg::new("add-pixel-mask")
                .long("add-pixel-mask")
                .help("Merge additional masked pixels from the specified file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Enable debug output"),
        )
        .get_matches();

    let filename = PathBuf::from(matches.get_one::<String>("filename").expect("has default"));
    let directory = PathBuf::from(matches.get_one::<String>("directory").expect("has default"));

    let level = if matches.get_flag("verbose") {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    // terminal output plus a log file next to the results
    let log_path = directory.join("jungfrau_create_pedestals.log");
    let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];
    if let Ok(log_file) = std::fs::File::create(&log_path) {
        loggers.push(simplelog::WriteLogger::new(
            level,
            simplelog::Config::default(),
            log_file,
        ));
    }
    let logger = simplelog::CombinedLogger::new(loggers);

    let pb_manager = MultiProgress::new();
    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    if !filename.is_file() {
        log::error!("Pedestal file {} not found, exit", filename.display());
        std::process::exit(1);
    }

    let schedule = GainSchedule {
        frames_g0: *matches.get_one::<usize>("frames-g0").expect("has default"),
        frames_g1: *matches.get_one::<usize>("frames-g1").expect("has default"),
        frames_g2: *matches.get_one::<usize>("frames-g2").expect("has default"),
        frames_hg0: *matches.get_one::<usize>("frames-hg0").expect("has default"),
    };

    let settings = PedestalProcessSettings {
        filename,
        directory,
        number_frames: *matches
            .get_one::<usize>("number-frames")
            .expect("has default"),
        additional_mask: matches.get_one::<String>("add-pixel-mask").map(PathBuf::from),
        pedestal: PedestalSettings {
            frames_average: *matches
                .get_one::<usize>("frames-average")
                .expect("has default"),
            gain_check: *matches.get_one::<usize>("gain-check").expect("has default") > 0,
            schedule: if schedule.is_empty() {
                None
            } else {
                Some(schedule)
            },
            test_pixel: (
                *matches.get_one::<usize>("y-test-pixel").expect("has default"),
                *matches.get_one::<usize>("x-test-pixel").expect("has default"),
            ),
        },
    };

    let pb = pb_manager.add(ProgressBar::new(100));
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan} {pos:>3}% {msg}").expect("valid template"),
    );

    let (tx, rx) = channel();
    let handle = std::thread::spawn(move || build_pedestals(&settings, &tx));

    // the channel closes when the worker drops its sender
    for status in rx {
        pb.set_position((status.progress * 100.0) as u64);
        if status.phase == ProcessPhase::Writing {
            pb.set_message("writing result file");
        }
    }
    pb.finish();

    match handle.join() {
        Ok(Ok(output)) => log::info!("Pedestal corrections written to {}", output.display()),
        Ok(Err(e)) => {
            log::error!("Creating pedestals failed with error: {e}");
            std::process::exit(1);
        }
        Err(_) => {
            log::error!("Failed to join the analysis task!");
            std::process::exit(1);
        }
    }
}

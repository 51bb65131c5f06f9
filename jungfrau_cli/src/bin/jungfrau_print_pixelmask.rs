use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

use libjungfrau::constants::{MASK_BIT_EXTERNAL, MASK_BIT_ZERO_RMS};

fn mask_bit_label(bit: u32) -> String {
    match bit {
        0 => String::from("gain bits disagreed with the G0 setting"),
        1 => String::from("gain bits disagreed with the G1 setting"),
        3 => String::from("gain bits disagreed with the G2 setting"),
        4 => String::from("gain bits disagreed with the HG0 setting"),
        MASK_BIT_EXTERNAL => String::from("flagged by an externally supplied mask"),
        bit if (MASK_BIT_ZERO_RMS..MASK_BIT_ZERO_RMS + 4).contains(&bit) => {
            let plane = ["G0", "G1", "G2", "HG0"][(bit - MASK_BIT_ZERO_RMS) as usize];
            format!("zero RMS (dead) in plane {plane}")
        }
        _ => String::from("unused"),
    }
}

fn main() {
    let matches = Command::new("jungfrau_print_pixelmask")
        .about("Print the pixel mask of a processed pedestal file")
        .arg(
            Arg::new("file")
                .required(true)
                .help("Processed pedestal file (.res.h5)"),
        )
        .arg(
            Arg::new("coordinates")
                .long("coordinates")
                .action(ArgAction::SetTrue)
                .help("List the coordinates of every masked pixel"),
        )
        .get_matches();

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logger!");

    let path = PathBuf::from(matches.get_one::<String>("file").expect("required arg"));

    let mask = match (|| {
        let file = hdf5::File::open(&path)?;
        file.dataset("pixel_mask")?.read_2d::<i32>()
    })() {
        Ok(mask) => mask,
        Err(e) => {
            log::error!("Could not read pixel mask from {}: {e}", path.display());
            std::process::exit(1);
        }
    };

    let total = mask.len();
    let good = mask.iter().filter(|&&flags| flags == 0).count();
    println!("{}", path.display());
    println!("  shape: {:?}", mask.dim());
    println!(
        "  good pixels: {good} from {total} in total ({} bad pixels)",
        total - good
    );

    for bit in 0..10u32 {
        let count = mask
            .iter()
            .filter(|&&flags| flags as u32 & (1 << bit) != 0)
            .count();
        if count > 0 {
            println!("  bit {bit:>2}: {count:>9} pixels - {}", mask_bit_label(bit));
        }
    }

    if matches.get_flag("coordinates") {
        for ((y, x), &flags) in mask.indexed_iter() {
            if flags != 0 {
                println!("{y} {x} {flags:#b}");
            }
        }
    }
}

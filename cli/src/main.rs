extern crate clap;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate log;
extern crate serde_json;
extern crate vmdisk;

mod errors;

use self::errors::CliError;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{Level, LevelFilter};
use std::{
    fs,
    path::{Path, PathBuf},
    process::exit,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use vmdisk::{
    DiskImage, DiskResizer, GuestType, ImageFormat, ResizeConfig, ResizeReport, ResizeStrategy,
    StorageBacking, StorageDevice, GIB, KIB, MIB, TIB,
};

fn main() {
    let image_args = || {
        vec![
            Arg::with_name("image")
                .short("i")
                .long("image")
                .help("path of the disk image")
                .takes_value(true)
                .required(true),
            Arg::with_name("format")
                .short("f")
                .long("format")
                .help("format of the disk image, inferred from its extension by default")
                .takes_value(true)
                .possible_values(&["raw", "dmg", "sparse", "asif"]),
        ]
    };

    let expansion_args = || {
        vec![
            Arg::with_name("guest")
                .short("g")
                .long("guest")
                .help("operating system on the disk: only Mac guests have their partitions expanded")
                .takes_value(true)
                .possible_values(&["mac", "linux"])
                .default_value("mac"),
            Arg::with_name("assume-non-apfs")
                .long("assume-non-apfs")
                .help("leave the partition layout and APFS containers untouched"),
            Arg::with_name("nudge-shrink")
                .long("nudge-shrink")
                .help("MiB to shrink a container by when correcting its capacity ceiling")
                .takes_value(true),
            Arg::with_name("nudge-tolerance")
                .long("nudge-tolerance")
                .help("MiB a container's ceiling may fall short of its physical store")
                .takes_value(true),
        ]
    };

    let matches = App::new("vmdisk")
        .about("grows virtual machine disk images and the APFS containers within them")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("log more detail; may be repeated")
                .multiple(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("resize")
                .about("grows a disk image to a new size")
                .args(&image_args())
                .arg(
                    Arg::with_name("size")
                        .short("s")
                        .long("size")
                        .help("new size in bytes, or with a B, K, M, G or T suffix")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("strategy")
                        .long("strategy")
                        .help("grow the file in place, or copy it into a larger image")
                        .takes_value(true)
                        .possible_values(&["in-place", "larger"]),
                )
                .args(&expansion_args()),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("reports the current size of a disk image")
                .args(&image_args()),
        )
        .subcommand(
            SubCommand::with_name("reconcile")
                .about("grows every managed image which is smaller than its declared size")
                .arg(
                    Arg::with_name("devices")
                        .short("d")
                        .long("devices")
                        .help("JSON file describing the storage devices, updated in place")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("dir")
                        .long("dir")
                        .help("directory holding the managed images")
                        .takes_value(true)
                        .required(true),
                )
                .args(&expansion_args()),
        )
        .get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let warnings = Arc::new(AtomicUsize::new(0));
    {
        let warnings = warnings.clone();
        if let Err(err) = vmdisk::log(level, move |level, _message| {
            if level <= Level::Warn {
                warnings.fetch_add(1, Ordering::SeqCst);
            }
        }) {
            eprintln!("failed to initialize logging: {}", err);
        }
    }

    let result = match matches.subcommand() {
        ("resize", Some(matches)) => resize(matches),
        ("info", Some(matches)) => info(matches),
        ("reconcile", Some(matches)) => reconcile(matches),
        _ => Ok(()),
    };

    let warnings = warnings.load(Ordering::SeqCst);
    if warnings != 0 {
        match vmdisk::log_path() {
            Some(path) => eprintln!("vmdisk: {} warning(s) were logged to {}", warnings, path.display()),
            None => eprintln!("vmdisk: {} warning(s) were logged", warnings),
        }
    }

    exit(match result {
        Ok(()) => 0,
        Err(why) => {
            eprintln!("vmdisk: {}", why);
            1
        }
    });
}

fn required<'a>(matches: &'a ArgMatches, arg: &'static str) -> Result<&'a str, CliError> {
    matches.value_of(arg).ok_or(CliError::MissingArg { arg })
}

/// Parses a byte count, which may carry a binary unit suffix.
fn parse_size(input: &str) -> Result<u64, CliError> {
    let invalid = || CliError::InvalidSize { size: input.into() };
    let trimmed = input.trim();
    let split = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or_else(|| trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let multiplier = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => KIB,
        "M" | "MB" | "MIB" => MIB,
        "G" | "GB" | "GIB" => GIB,
        "T" | "TB" | "TIB" => TIB,
        _ => return Err(invalid()),
    };

    number.parse::<u64>().ok().and_then(|n| n.checked_mul(multiplier)).ok_or_else(invalid)
}

fn parse_mib(matches: &ArgMatches, arg: &str) -> Result<Option<u64>, CliError> {
    match matches.value_of(arg) {
        Some(value) => value
            .parse::<u64>()
            .ok()
            .and_then(|mib| mib.checked_mul(MIB))
            .map(Some)
            .ok_or_else(|| CliError::ArgNaN { arg: value.into() }),
        None => Ok(None),
    }
}

fn config(matches: &ArgMatches) -> Result<ResizeConfig, CliError> {
    let mut config = ResizeConfig::default();
    config.assume_non_apfs = matches.is_present("assume-non-apfs");
    if let Some(shrink) = parse_mib(matches, "nudge-shrink")? {
        config.nudge_shrink = shrink;
    }
    if let Some(tolerance) = parse_mib(matches, "nudge-tolerance")? {
        config.nudge_tolerance = tolerance;
    }

    Ok(config)
}

fn guest(matches: &ArgMatches) -> Result<GuestType, CliError> {
    Ok(matches.value_of("guest").unwrap_or("mac").parse::<GuestType>()?)
}

fn disk_image(matches: &ArgMatches) -> Result<DiskImage, CliError> {
    let path = PathBuf::from(required(matches, "image")?);
    let format = match matches.value_of("format") {
        Some(format) => format.parse::<ImageFormat>()?,
        None => path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse::<ImageFormat>().ok())
            .ok_or_else(|| CliError::UnknownFormat { path: path.clone() })?,
    };

    Ok(DiskImage::new(path, format, 0))
}

fn print_report(name: &str, report: &ResizeReport) {
    println!(
        "{}: grew from {} to {} bytes ({}); partitions {}",
        name, report.previous_size, report.new_size, report.strategy, report.partitions
    );
}

fn resize(matches: &ArgMatches) -> Result<(), CliError> {
    let image = disk_image(matches)?;
    let size = parse_size(required(matches, "size")?)?;
    let strategy = match matches.value_of("strategy") {
        Some(strategy) => Some(strategy.parse::<ResizeStrategy>()?),
        None => None,
    };

    let resizer = DiskResizer::new(config(matches)?);
    let report = resizer.resize(&image, size, strategy, guest(matches)?)?;
    print_report(&image.path.display().to_string(), &report);
    Ok(())
}

fn info(matches: &ArgMatches) -> Result<(), CliError> {
    let image = disk_image(matches)?;
    let resizer = DiskResizer::new(ResizeConfig::default());
    let size = resizer.current_size(&image)?;

    println!("path:      {}", image.path.display());
    println!("format:    {}", image.format);
    println!("size:      {} bytes", size);
    println!("resizable: {}", image.format.supports_resize());
    if image.format.supports_resize() {
        println!("strategy:  {}", image.format.recommended_strategy());
    }

    Ok(())
}

fn reconcile(matches: &ArgMatches) -> Result<(), CliError> {
    let descriptors = Path::new(required(matches, "devices")?);
    let dir = Path::new(required(matches, "dir")?);

    let json = fs::read_to_string(descriptors)
        .map_err(|why| CliError::Read { path: descriptors.to_path_buf(), why })?;
    let mut devices: Vec<StorageDevice> = serde_json::from_str(&json)
        .map_err(|why| CliError::Descriptors { path: descriptors.to_path_buf(), why })?;

    let resizer = DiskResizer::new(config(matches)?);
    let reconciled = resizer.reconcile(&devices, dir, guest(matches)?)?;
    if reconciled.is_empty() {
        println!("every image already matches its declared size");
        return Ok(());
    }

    for grown in reconciled {
        print_report(&grown.device, &grown.report);
        if let Some(device) = devices.iter_mut().find(|device| device.id == grown.device) {
            device.backing = StorageBacking::Managed(grown.image);
        }
    }

    let json = serde_json::to_string_pretty(&devices)
        .map_err(|why| CliError::Descriptors { path: descriptors.to_path_buf(), why })?;
    fs::write(descriptors, json).map_err(|why| CliError::Write { path: descriptors.to_path_buf(), why })
}

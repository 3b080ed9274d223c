//! A CLI tool for inspecting Siemens PET raw data files (`.ptd`):
//! where their DICOM header lies, what kind of data they hold,
//! and which series they belong to.
use clap::{Parser, Subcommand, ValueEnum};
use dicom_core::{DataDictionary, Tag};
use dicom_dictionary_std::StandardDataDictionary;
use medimage_raw::classify::{Arity, MarkerComponent};
use medimage_raw::formats::{self, EXTENSION};
use medimage_raw::sample::SampleFile;
use medimage_raw::{
    classify_paths, group_series, BatchOptions, DicomObjectDecoder, HeaderDecoder,
    ImageTypePolicy, PetRawFormat, RawDataFile, ScanDecoder,
};
use snafu::prelude::*;
use snafu::{Report, Whatever};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect Siemens PET raw data files
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// verbose mode
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the kind of raw data in each file
    Classify {
        #[command(flatten)]
        input: Input,
    },
    /// Print the header location and header elements of each file
    Dump {
        #[command(flatten)]
        input: Input,
        /// header elements to print, by tag or keyword
        /// (example: "SeriesNumber" or "(0020,0011)");
        /// all elements are printed if none is given
        #[arg(short = 't', long = "tag", value_parser = parse_tag)]
        tags: Vec<Tag>,
        /// how to decode the header
        #[arg(long = "decoder", default_value = "scan")]
        decoder: Decoder,
    },
    /// Group files into series and print them
    Series {
        #[command(flatten)]
        input: Input,
    },
    /// Write synthetic raw data files
    Sample {
        /// the directory to write the files to
        out_dir: PathBuf,
        /// the formats to write (all single-file formats by default)
        #[arg(short = 'f', long = "format")]
        formats: Vec<PetRawFormat>,
        /// the number of payload bytes in each file
        #[arg(long = "payload-length", default_value = "2048")]
        payload_len: usize,
    },
}

/// Files to inspect and how to classify them.
#[derive(Debug, clap::Args)]
struct Input {
    /// the raw data file(s) or directories to read
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// only accept Image Types of exactly three components
    #[arg(long = "strict")]
    strict: bool,
    /// the Image Type component holding the format marker
    #[arg(long = "marker", default_value = "third")]
    marker: Marker,
    /// only accept files of these formats
    #[arg(short = 'e', long = "expect")]
    expect: Vec<PetRawFormat>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum Marker {
    Third,
    Last,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum Decoder {
    /// the raw element scanner
    Scan,
    /// the full DICOM parser
    Dicom,
}

fn parse_tag(s: &str) -> Result<Tag, String> {
    StandardDataDictionary
        .parse_tag(s)
        .ok_or_else(|| format!("unknown tag `{}`", s))
}

impl Input {
    fn policy(&self) -> ImageTypePolicy {
        ImageTypePolicy::new()
            .arity(if self.strict {
                Arity::ExactlyThree
            } else {
                Arity::AtLeastThree
            })
            .marker(match self.marker {
                Marker::Third => MarkerComponent::Third,
                Marker::Last => MarkerComponent::Last,
            })
    }

    fn options(&self) -> BatchOptions {
        let options = BatchOptions::new().policy(self.policy());
        if self.expect.is_empty() {
            options
        } else {
            options.expect(self.expect.iter().copied())
        }
    }

    /// Collect the files to inspect,
    /// looking for `.ptd` files in directories.
    fn paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for file in &self.files {
            if file.is_dir() {
                for entry in WalkDir::new(file.as_path())
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|f| !f.file_type().is_dir())
                    .filter(|f| f.path().extension() == Some(OsStr::new(EXTENSION)))
                {
                    paths.push(entry.into_path());
                }
            } else {
                paths.push(file.clone());
            }
        }
        paths
    }
}

fn main() {
    run().unwrap_or_else(|e| {
        eprintln!("{}", Report::from_error(e));
        std::process::exit(-2);
    });
}

fn run() -> Result<(), Whatever> {
    let App { verbose, command } = App::parse();

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::from_level(level).into())
                    .from_env_lossy(),
            )
            .with_writer(std::io::stderr)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    match command {
        Command::Classify { input } => classify(&input),
        Command::Dump {
            input,
            tags,
            decoder,
        } => dump(&input, &tags, decoder),
        Command::Series { input } => series(&input),
        Command::Sample {
            out_dir,
            formats,
            payload_len,
        } => sample(&out_dir, &formats, payload_len),
    }
}

fn classify(input: &Input) -> Result<(), Whatever> {
    let (classified, leftovers) = classify_paths(input.paths(), &input.options());
    for item in &classified {
        println!("{}: {}", item.file.path().display(), item.format);
    }
    for path in &leftovers {
        println!("{}: not recognised", path.display());
    }
    info!(
        "{} file(s) classified, {} set aside",
        classified.len(),
        leftovers.len()
    );
    Ok(())
}

fn dump(input: &Input, tags: &[Tag], decoder: Decoder) -> Result<(), Whatever> {
    let decoder: Box<dyn HeaderDecoder> = match decoder {
        Decoder::Scan => Box::new(ScanDecoder),
        Decoder::Dicom => Box::new(DicomObjectDecoder::new()),
    };
    let tags = (!tags.is_empty()).then_some(tags);
    let (classified, leftovers) = classify_paths(input.paths(), &input.options());

    let mut errors = 0;
    for item in classified {
        if let Err(e) = dump_file(&item.file, input.policy(), tags, &*decoder) {
            error!("{}", Report::from_error(e));
            errors += 1;
        }
    }
    for path in &leftovers {
        warn!("{} is not a recognised raw data file", path.display());
    }
    if errors > 0 {
        whatever!("Could not dump {} file(s)", errors);
    }
    Ok(())
}

fn dump_file(
    file: &RawDataFile,
    policy: ImageTypePolicy,
    tags: Option<&[Tag]>,
    decoder: &dyn HeaderDecoder,
) -> Result<(), medimage_raw::Error> {
    let image_type = file.image_type_with(policy)?;
    let format = image_type.format();
    let entry = formats::entry(format);
    println!("{}:", file.path().display());
    println!("  format: {} ({})", format, entry.identifier);
    println!(
        "  header: {} at {}",
        file.layout()?,
        file.dicom_header_limits()?
    );
    println!("  image type: {}", image_type);
    for (tag, value) in file.read_metadata(decoder, tags)? {
        let alias = StandardDataDictionary
            .by_tag(tag)
            .map(|entry| entry.alias)
            .unwrap_or("«Unknown Attribute»");
        println!("  {} {:<32} {}", tag, alias, value);
    }
    Ok(())
}

fn series(input: &Input) -> Result<(), Whatever> {
    let (series, leftovers) = group_series(input.paths(), &input.options());
    for s in &series {
        println!("{} ({}, {} file(s))", s.key, s.format(), s.len());
        for member in &s.members {
            println!(
                "  {} {} {}",
                member.acquisition_time.as_deref().unwrap_or("-"),
                member.format,
                member.file.path().display()
            );
        }
    }
    for path in &leftovers {
        println!("{}: not in any series", path.display());
    }
    Ok(())
}

fn sample(out_dir: &Path, formats: &[PetRawFormat], payload_len: usize) -> Result<(), Whatever> {
    std::fs::create_dir_all(out_dir)
        .with_whatever_context(|_| format!("Could not create {}", out_dir.display()))?;

    let formats: Vec<PetRawFormat> = if formats.is_empty() {
        formats::REGISTRY
            .iter()
            .filter(|entry| !entry.markers.is_empty())
            .map(|entry| entry.format)
            .collect()
    } else {
        formats.to_vec()
    };

    for (i, format) in formats.into_iter().enumerate() {
        let path = SampleFile::new(format)
            .payload_len(payload_len)
            .write_to(out_dir, i)
            .with_whatever_context(|_| format!("Could not write {} sample", format))?;
        println!("{}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{parse_tag, App};
    use clap::CommandFactory;
    use dicom_core::Tag;

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }

    #[test]
    fn tags_by_keyword_or_number() {
        assert_eq!(parse_tag("SeriesNumber").unwrap(), Tag(0x0020, 0x0011));
        assert_eq!(parse_tag("(0008,0008)").unwrap(), Tag(0x0008, 0x0008));
        assert!(parse_tag("NotAKeyword").is_err());
    }
}

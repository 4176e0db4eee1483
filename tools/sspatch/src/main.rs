use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{Level, error};
use tracing_subscriber::util::SubscriberInitExt;

use sspatch::{ExtractOptions, Image, PatchOptions};

const DEFAULT_DIR: &str = "sstables";

#[derive(Parser)]
#[command(name = "sspatch")]
#[command(version, about = "Shapeshifter wavetable bank tool", long_about = None)]
struct Cli {
    /// More log output (repeat for debug and trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump all 128 wavetable slots of an image to a directory
    Extract {
        /// Path to the EEPROM image
        image: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = DEFAULT_DIR)]
        dir: PathBuf,

        /// Refuse images whose slots contain long runs of one byte value
        #[arg(long)]
        check_runs: bool,

        /// Also write previews/NNN_<name>.wav for each slot
        #[arg(long)]
        wav: bool,
    },

    /// Write a directory of wavetables into an image
    Patch {
        /// Path to the EEPROM image
        image: PathBuf,

        /// Directory of wavetable files
        #[arg(short, long, default_value = DEFAULT_DIR)]
        dir: PathBuf,

        /// Where to write the patched image (defaults to overwriting IMAGE)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Take slot names from the filenames
        #[arg(long)]
        rename: bool,

        /// Shorten names longer than 6 characters instead of failing
        #[arg(long, requires = "rename")]
        truncate_names: bool,
    },

    /// Encode a full wavetable directory as Intel HEX
    Hex {
        /// Directory of wavetable files
        #[arg(short, long, default_value = DEFAULT_DIR)]
        dir: PathBuf,

        /// Output file (defaults to <DIR>.hex)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the name table and the data area as <DIR>_names.hex and <DIR>_waves.hex
        #[arg(long, conflicts_with = "output")]
        split: bool,
    },
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .compact()
        .finish()
        .init();
}

fn load_image(path: &Path) -> anyhow::Result<Image> {
    Image::load(path).with_context(|| format!("Failed to load image {}", path.display()))
}

/// `<dir><suffix>` next to the directory, e.g. `sstables.hex`
fn sibling_path(dir: &Path, suffix: &str) -> anyhow::Result<PathBuf> {
    let named = match dir.file_name() {
        Some(_) => dir.to_path_buf(),
        // `.`, `..` and friends: name the output after the real directory
        None => dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", dir.display()))?,
    };

    let Some(file_name) = named.file_name() else {
        anyhow::bail!("Cannot name hex output after {}, pass --output", dir.display());
    };
    let mut name = file_name.to_os_string();
    name.push(suffix);
    Ok(named.with_file_name(name))
}

fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Extract {
            image,
            dir,
            check_runs,
            wav,
        } => {
            let img = load_image(&image)?;
            let options = ExtractOptions {
                check_runs,
                wav_previews: wav,
            };
            let written = sspatch::extract(&img, &dir, &options)
                .with_context(|| format!("Failed to extract {}", image.display()))?;
            println!("Wrote {} wavetables to {}", written.len(), dir.display());
        }

        Commands::Patch {
            image,
            dir,
            output,
            rename,
            truncate_names,
        } => {
            let img = load_image(&image)?;
            let options = PatchOptions {
                rename,
                truncate_names,
            };
            let patched = sspatch::patch(&img, &dir, &options)
                .with_context(|| format!("Failed to patch from {}", dir.display()))?;

            let out = output.unwrap_or(image);
            patched
                .save(&out)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote patched image to {}", out.display());
        }

        Commands::Hex { dir, output, split } => {
            if split {
                let regions = sspatch::encode_regions(&dir)
                    .with_context(|| format!("Failed to encode {}", dir.display()))?;
                for (suffix, stream) in [("_names.hex", &regions.names), ("_waves.hex", &regions.waves)] {
                    let out = sibling_path(&dir, suffix)?;
                    stream
                        .write_to(&out)
                        .with_context(|| format!("Failed to write {}", out.display()))?;
                    println!("Wrote {}", out.display());
                }
            } else {
                let stream = sspatch::encode(&dir)
                    .with_context(|| format!("Failed to encode {}", dir.display()))?;
                let out = match output {
                    Some(out) => out,
                    None => sibling_path(&dir, ".hex")?,
                };
                stream
                    .write_to(&out)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                println!("Wrote {}", out.display());
            }
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli.command) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn hex_outputs_sit_next_to_the_directory() {
        assert_eq!(
            sibling_path(Path::new("sstables"), ".hex").unwrap(),
            PathBuf::from("sstables.hex")
        );
        assert_eq!(
            sibling_path(Path::new("banks/factory/"), "_waves.hex").unwrap(),
            PathBuf::from("banks/factory_waves.hex")
        );
    }

    #[test]
    fn hex_output_for_dot_dirs_uses_the_real_name() {
        let tmp = tempfile::tempdir().unwrap();
        let bank = tmp.path().join("factory");
        std::fs::create_dir_all(bank.join("sub")).unwrap();

        let expected = tmp.path().canonicalize().unwrap().join("factory.hex");
        assert_eq!(sibling_path(&bank.join("sub").join(".."), ".hex").unwrap(), expected);

        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        let mut name = cwd.file_name().unwrap().to_os_string();
        name.push(".hex");
        assert_eq!(sibling_path(Path::new("."), ".hex").unwrap(), cwd.with_file_name(name));
    }

    #[test]
    fn hex_output_for_root_needs_explicit_path() {
        assert!(sibling_path(Path::new("/"), ".hex").is_err());
    }

    #[test]
    fn patch_defaults_to_in_place() {
        let cli = Cli::parse_from(["sspatch", "-vv", "patch", "bank.bin"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Patch { dir, output, .. } => {
                assert_eq!(dir, PathBuf::from(DEFAULT_DIR));
                assert!(output.is_none());
            }
            _ => panic!("expected patch"),
        }
    }
}

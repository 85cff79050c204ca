//! `fatsh`: run one filesystem command against raw disk-image files.
//!
//! ```text
//! fatsh <image>[,<image>...] <command> [args]
//! ```
//!
//! Each image is one drive, numbered in the order given. Every drive is
//! mounted; commands act on partition `FATSH_PARTITION` (default 0).
//! `FATSH_LOG` sets the log level (default `warn`).

mod image;
mod logger;

use std::fmt;
use std::io::Write;
use std::process::ExitCode;

use fat_engine::format::{self, FormatOptions};
use fat_engine::{FilesystemContext, FsError, SECTOR_SIZE};

use crate::image::ImageDisks;

/// First sector of the partition `mkfs --partitioned` creates.
const PARTITION_START: u64 = 2048;

fn print_usage() {
    eprintln!("Usage: fatsh <image>[,<image>...] <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  info                     mounted partitions");
    eprintln!("  ls [path]                list a directory (default /)");
    eprintln!("  cat <path>               print a file");
    eprintln!("  put <host-file> <path>   copy a host file in");
    eprintln!("  write <path> <text...>   write text to a file");
    eprintln!("  mkdir <path>             create a directory");
    eprintln!("  rm <path>                delete a file or empty directory");
    eprintln!("  mv <path> <name>         rename within the same directory");
    eprintln!("  chain <path>             show the clusters of a file");
    eprintln!("  mkfs <size-MiB> [--partitioned] [--spc N] [--label L]");
    eprintln!();
    eprintln!("Environment: FATSH_LOG=<error|warn|info|debug|trace>, FATSH_PARTITION=<index>");
}

// ─── Errors ───────────────────────────────────────────────────────────────────

enum CliError {
    Usage(String),
    Fs(FsError),
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Fs(e) => write!(f, "{e}"),
            CliError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl From<FsError> for CliError {
    fn from(e: FsError) -> Self {
        CliError::Fs(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

fn usage(msg: impl Into<String>) -> CliError {
    CliError::Usage(msg.into())
}

// ─── Configuration ────────────────────────────────────────────────────────────

struct Config {
    images:    Vec<String>,
    command:   String,
    args:      Vec<String>,
    partition: usize,
}

impl Config {
    fn from_args(mut args: Vec<String>, partition_var: Option<String>) -> Result<Self, CliError> {
        if args.len() < 2 {
            return Err(usage("missing image or command"));
        }
        let images: Vec<String> = args.remove(0).split(',').map(str::to_string).collect();
        if images.iter().any(String::is_empty) {
            return Err(usage("empty image path"));
        }
        let command = args.remove(0);
        let partition = match partition_var {
            Some(v) => v.trim().parse().map_err(|_| usage(format!("FATSH_PARTITION: bad index '{v}'")))?,
            None => 0,
        };
        Ok(Self { images, command, args, partition })
    }

    fn arg(&self, i: usize, what: &str) -> Result<&str, CliError> {
        self.args
            .get(i)
            .map(String::as_str)
            .ok_or_else(|| usage(format!("{}: missing {what}", self.command)))
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

fn mount_all(cfg: &Config) -> Result<FilesystemContext<ImageDisks>, CliError> {
    let mut fs = FilesystemContext::new(ImageDisks::open(&cfg.images)?);
    for drive in 0..cfg.images.len() {
        if let Err(e) = fs.mount(drive as u8) {
            log::warn!("{}: {e}", cfg.images[drive]);
        }
    }
    if fs.partitions().is_empty() {
        return Err(CliError::Fs(FsError::NoVolume));
    }
    Ok(fs)
}

fn mkfs(cfg: &Config) -> Result<(), CliError> {
    let size_mib: u64 = cfg
        .arg(0, "size in MiB")?
        .parse()
        .map_err(|_| usage("mkfs: size must be a whole number of MiB"))?;
    let mut opts = FormatOptions::new();
    let mut partitioned = false;
    let mut rest = cfg.args[1..].iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--partitioned" => partitioned = true,
            "--spc" => {
                let n = rest
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| usage("mkfs: --spc needs a number"))?;
                opts = opts.sectors_per_cluster(n);
            }
            "--label" => {
                let label = rest.next().ok_or_else(|| usage("mkfs: --label needs a value"))?;
                opts = opts.volume_label(pad_label(label)?);
            }
            other => return Err(usage(format!("mkfs: unknown option '{other}'"))),
        }
    }

    let sectors = size_mib * 1024 * 1024 / SECTOR_SIZE as u64;
    let mut disk = ImageDisks::create(&cfg.images[0], sectors * SECTOR_SIZE as u64)?;
    let part = if partitioned {
        let count = sectors.checked_sub(PARTITION_START).filter(|&n| n > 0).ok_or(FsError::InvalidLayout)?;
        let count32 = u32::try_from(count).map_err(|_| FsError::InvalidLayout)?;
        format::write_partition_table(&mut disk, 0, &[(PARTITION_START as u32, count32)])?;
        format::format_volume(&mut disk, 0, PARTITION_START, count, &opts)?
    } else {
        format::format_volume(&mut disk, 0, 0, sectors, &opts)?
    };
    println!("{part}");
    Ok(())
}

/// Volume labels are stored upper-cased and space-padded to 11 bytes.
fn pad_label(label: &str) -> Result<[u8; 11], CliError> {
    if label.len() > 11 || !label.is_ascii() {
        return Err(usage("mkfs: label must be at most 11 ASCII characters"));
    }
    let mut out = [b' '; 11];
    for (dst, b) in out.iter_mut().zip(label.bytes()) {
        *dst = b.to_ascii_uppercase();
    }
    Ok(out)
}

fn run(cfg: &Config) -> Result<(), CliError> {
    if cfg.command == "mkfs" {
        return mkfs(cfg);
    }
    let mut fs = mount_all(cfg)?;
    let part = cfg.partition;
    fs.partition(part)?;

    match cfg.command.as_str() {
        "info" => {
            for i in 0..fs.partitions().len() {
                println!("{i}: {}", fs.partition_info(i)?);
            }
        }
        "ls" => {
            let path = cfg.args.first().map_or("/", String::as_str);
            for h in fs.list_directory(part, 0, path)? {
                if h.is_dir() {
                    println!("<DIR>         {}", h.name);
                } else {
                    println!("{:>12}  {}", h.size, h.name);
                }
            }
        }
        "cat" => {
            let h = fs.get_file(part, 0, cfg.arg(0, "path")?)?;
            let data = fs.read_file(&h)?;
            std::io::stdout().write_all(&data)?;
        }
        "put" => {
            let data = std::fs::read(cfg.arg(0, "host file")?)?;
            let h = fs.write_file(part, 0, cfg.arg(1, "path")?, &data)?;
            println!("{} bytes -> {}", h.size, h.name);
        }
        "write" => {
            let path = cfg.arg(0, "path")?;
            let text = cfg.args[1..].join(" ");
            fs.write_file(part, 0, path, text.as_bytes())?;
        }
        "mkdir" => {
            let cluster = fs.new_directory(part, 0, cfg.arg(0, "path")?)?;
            println!("cluster {cluster}");
        }
        "rm" => fs.delete_entry(part, 0, cfg.arg(0, "path")?)?,
        "mv" => fs.rename_entry(part, 0, cfg.arg(0, "path")?, cfg.arg(1, "new name")?)?,
        "chain" => {
            let h = fs.get_file(part, 0, cfg.arg(0, "path")?)?;
            let chain = fs.chain_of(&h)?;
            let links: Vec<String> = chain.iter().map(u32::to_string).collect();
            if links.is_empty() {
                println!("(no clusters)");
            } else {
                println!("{} -> END ({} clusters)", links.join(" -> "), chain.len());
            }
        }
        other => return Err(usage(format!("unknown command '{other}'"))),
    }
    Ok(())
}

fn main() -> ExitCode {
    let level = match std::env::var("FATSH_LOG") {
        Ok(v) => logger::parse_level(&v).unwrap_or(logger::DEFAULT_LEVEL),
        Err(_) => logger::DEFAULT_LEVEL,
    };
    if let Err(e) = logger::init(level) {
        eprintln!("fatsh: logger: {e}");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = match Config::from_args(args, std::env::var("FATSH_PARTITION").ok()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("fatsh: {e}");
            print_usage();
            return ExitCode::from(2);
        }
    };

    match run(&cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ CliError::Usage(_)) => {
            eprintln!("fatsh: {e}");
            print_usage();
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("fatsh: {}: {e}", cfg.command);
            ExitCode::FAILURE
        }
    }
}

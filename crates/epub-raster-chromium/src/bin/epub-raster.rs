use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use epub_raster::{open_book_with_options, ExtractOptions};
use epub_raster_chromium::{ChromiumOptions, ChromiumSession};
use epub_raster_render::{
    check_output_dir, prepare_output_dir, PaginationOptions, Paginator, PngPageWriter,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Default)]
struct Args {
    epub_path: PathBuf,
    out_dir: PathBuf,
    config: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    threshold: Option<u8>,
    text_size: Option<String>,
    probe_settle_ms: Option<u64>,
    capture_settle_ms: Option<u64>,
    manifest: bool,
    chrome: Option<PathBuf>,
    no_sandbox: bool,
    work_dir: Option<PathBuf>,
}

impl Args {
    fn pagination_options(&self) -> Result<PaginationOptions, String> {
        let mut opts = match self.config.as_ref() {
            Some(path) => PaginationOptions::from_json_file(path).map_err(|e| e.to_string())?,
            None => PaginationOptions::default(),
        };
        if let Some(width) = self.width {
            opts.width = width;
        }
        if let Some(height) = self.height {
            opts.base_height = height;
        }
        if let Some(threshold) = self.threshold {
            opts.threshold = threshold;
        }
        if let Some(text_size) = self.text_size.as_ref() {
            opts.text_size = text_size.clone();
        }
        if let Some(ms) = self.probe_settle_ms {
            opts.probe_settle_ms = ms;
        }
        if let Some(ms) = self.capture_settle_ms {
            opts.capture_settle_ms = ms;
        }
        Ok(opts.normalized())
    }
}

fn main() -> ExitCode {
    init_logging();
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) if msg == HELP_REQUESTED => {
            println!("{}", help_text());
            ExitCode::SUCCESS
        }
        Err(msg) => {
            eprintln!("error: {}", msg);
            eprintln!("{}", help_text());
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: Vec<String>) -> Result<(), String> {
    let cli = parse_args(args)?;
    let opts = cli.pagination_options()?;
    let paginator = Paginator::new(opts).map_err(|e| e.to_string())?;
    let opts = paginator.options();

    check_output_dir(&cli.out_dir).map_err(|e| e.to_string())?;

    let started = Instant::now();
    let mut extract = ExtractOptions::default();
    if let Some(dir) = cli.work_dir.as_ref() {
        extract = extract.with_work_dir(dir);
    }
    let book = open_book_with_options(&cli.epub_path, extract)
        .map_err(|e| format!("{}: {}", cli.epub_path.display(), e))?;
    if book.content_documents().is_empty() {
        log::warn!("no readable documents in the spine");
    }
    prepare_output_dir(&cli.out_dir).map_err(|e| e.to_string())?;

    let mut browser = ChromiumOptions::default()
        .with_window(opts.width, opts.base_height)
        .with_sandbox(!cli.no_sandbox);
    if let Some(chrome) = cli.chrome.as_ref() {
        browser = browser.with_executable(chrome);
    }
    let mut session = ChromiumSession::launch(&browser).map_err(|e| e.to_string())?;

    let mut writer =
        PngPageWriter::new(&cli.out_dir, opts.width, opts.threshold).with_manifest(cli.manifest);
    let summary = paginator
        .paginate_all(&mut session, &mut writer, book.content_documents())
        .map_err(|e| e.to_string())?;
    let written = writer.finish().map_err(|e| e.to_string())?;
    session.close().map_err(|e| e.to_string())?;

    let forced: usize = summary.documents.iter().map(|d| d.forced_pages).sum();
    if forced > 0 {
        log::warn!("{} pages had no clean break and were cut at the floor", forced);
    }
    if let Some(path) = written.manifest.as_ref() {
        log::info!("Wrote manifest {}", path.display());
    }
    println!(
        "Done. Created {} PNG files in {} ({:.1}s)",
        written.files.len(),
        cli.out_dir.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

const HELP_REQUESTED: &str = "help requested";

fn help_text() -> &'static str {
    "usage: epub-raster <EPUB> <OUTDIR> [options]

options:
  --width N               page width in pixels (default 758)
  --height N              maximum page height in pixels (default 940)
  --threshold N           white threshold 0-255 (default 220)
  --text-size EXPR        forced body font size, e.g. 16px or 1.2em (default 16px)
  --probe-settle-ms N     wait before each probe capture (default 50)
  --capture-settle-ms N   wait before each page capture (default 100)
  --config FILE           JSON pagination settings; flags override it
  --manifest              also write pages.json
  --chrome PATH           browser executable
  --no-sandbox            disable the browser sandbox (containers)
  --work-dir DIR          extract the archive here instead of a temp dir

RUST_LOG controls log verbosity (default info)."
}

fn parse_args(args: Vec<String>) -> Result<Args, String> {
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h") {
        return Err(HELP_REQUESTED.to_string());
    }

    let mut cfg = Args::default();
    let mut positional = Vec::new();
    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--width" => {
                cfg.width = Some(parse_value(&args, i, "--width")?);
                i += 2;
            }
            "--height" => {
                cfg.height = Some(parse_value(&args, i, "--height")?);
                i += 2;
            }
            "--threshold" => {
                cfg.threshold = Some(parse_value(&args, i, "--threshold")?);
                i += 2;
            }
            "--text-size" => {
                let v = args
                    .get(i + 1)
                    .ok_or_else(|| "--text-size requires a value".to_string())?;
                cfg.text_size = Some(v.clone());
                i += 2;
            }
            "--probe-settle-ms" => {
                cfg.probe_settle_ms = Some(parse_value(&args, i, "--probe-settle-ms")?);
                i += 2;
            }
            "--capture-settle-ms" => {
                cfg.capture_settle_ms = Some(parse_value(&args, i, "--capture-settle-ms")?);
                i += 2;
            }
            "--config" => {
                cfg.config = Some(parse_value(&args, i, "--config")?);
                i += 2;
            }
            "--chrome" => {
                cfg.chrome = Some(parse_value(&args, i, "--chrome")?);
                i += 2;
            }
            "--work-dir" => {
                cfg.work_dir = Some(parse_value(&args, i, "--work-dir")?);
                i += 2;
            }
            "--manifest" => {
                cfg.manifest = true;
                i += 1;
            }
            "--no-sandbox" => {
                cfg.no_sandbox = true;
                i += 1;
            }
            "--help" | "-h" => return Err(HELP_REQUESTED.to_string()),
            other if other.starts_with("--") => {
                return Err(format!("unknown option '{}'", other));
            }
            other => {
                positional.push(other.to_string());
                i += 1;
            }
        }
    }

    match positional.as_slice() {
        [epub, out] => {
            cfg.epub_path = PathBuf::from(epub);
            cfg.out_dir = PathBuf::from(out);
        }
        [] | [_] => return Err("expected <EPUB> and <OUTDIR>".to_string()),
        _ => {
            return Err(format!(
                "unexpected argument '{}'",
                positional.get(2).map(String::as_str).unwrap_or_default()
            ))
        }
    }
    Ok(cfg)
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, String> {
    let v = args
        .get(i + 1)
        .ok_or_else(|| format!("{} requires a value", flag))?;
    v.parse::<T>()
        .map_err(|_| format!("invalid {} value '{}'", flag, v))
}

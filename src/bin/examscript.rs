//! CLI binary for examscript.
//!
//! A thin shim over the library crate that maps CLI flags to `PortalConfig`,
//! runs the login → select → paginate flow, and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use examscript::{
    auth, download, select, Credentials, ImageDirSink, PortalClient, PortalConfig,
    SubjectDownload,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List the subjects available for your course
  examscript --roll 2100290100001 --list

  # Download one subject into ./out/
  examscript --roll 2100290100001 --subject KAS103 -o out

  # Download every listed subject
  examscript --roll 2100290100001 --all -o out

  # Portal republished under a new prefix this season
  examscript --roll 2100290100001 --path-prefix /AKTUWINTER --subject KAS103

  # Machine-readable summary
  examscript --roll 2100290100001 --subject KAS103 --json > result.json

ENVIRONMENT VARIABLES:
  EXAMSCRIPT_ROLL       Roll number (alternative to --roll)
  EXAMSCRIPT_PASSWORD   Portal password; prompted on stdin when unset
  EXAMSCRIPT_OUTPUT     Output directory (alternative to -o)

NOTES:
  The portal only answers for the account's own scripts; one session per
  run, nothing is stored besides the downloaded documents. Pages are paced
  with a fixed delay — a 30-page script takes at least 9 seconds by design.
"#;

/// Download scanned answer scripts from the AKTU exam portal.
#[derive(Parser, Debug)]
#[command(
    name = "examscript",
    version,
    about = "Download scanned answer scripts from the AKTU exam portal",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Student roll number.
    #[arg(long, env = "EXAMSCRIPT_ROLL")]
    roll: String,

    /// Portal password. Prompted on stdin when neither flag nor env is set.
    #[arg(long, env = "EXAMSCRIPT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Course name as shown in the portal dropdown.
    #[arg(long, default_value = "BTECH")]
    course: String,

    /// Subject code to download, e.g. KAS103.
    #[arg(long, conflicts_with_all = ["all", "list"])]
    subject: Option<String>,

    /// Download every listed subject.
    #[arg(long, conflicts_with = "list")]
    all: bool,

    /// List available subjects and exit.
    #[arg(long)]
    list: bool,

    /// Directory to write documents into.
    #[arg(short, long, env = "EXAMSCRIPT_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Maximum pages to fetch per subject.
    #[arg(long, default_value_t = 36)]
    ceiling: u32,

    /// Delay between page fetches in milliseconds.
    #[arg(long, default_value_t = 300)]
    delay_ms: u64,

    /// Portal origin override.
    #[arg(long)]
    base_url: Option<String>,

    /// Portal deployment prefix override, e.g. /AKTUSUMMER.
    #[arg(long)]
    path_prefix: Option<String>,

    /// Output structured JSON summaries instead of text.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "examscript=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = PortalConfig::builder()
        .page_ceiling(cli.ceiling)
        .inter_page_delay_ms(cli.delay_ms);
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.as_str());
    }
    if let Some(ref prefix) = cli.path_prefix {
        builder = builder.path_prefix(prefix.as_str());
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Login ────────────────────────────────────────────────────────────
    let password = match cli.password.clone() {
        Some(p) => p,
        None => prompt_password()?,
    };
    let creds = Credentials::new(cli.roll.clone(), password);

    let client = PortalClient::new(config).context("Failed to set up the HTTP client")?;
    auth::login(&client, &creds).await.context("Login failed")?;

    let courses = select::list_courses(&client)
        .await
        .context("Could not list courses (wrong password?)")?;
    let course = select::find_handle(&courses, &cli.course)?.clone();

    // ── List-only mode ───────────────────────────────────────────────────
    if cli.list {
        let course_response = select::select_course(&client, &course).await?;
        let subjects = select::list_subjects(&course_response)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&subjects)?);
        } else {
            println!("{}", bold(&format!("{} subjects:", subjects.len())));
            for s in &subjects {
                println!("  {}  {}", cyan(&s.code), s.name);
            }
        }
        return Ok(());
    }

    // ── Download ─────────────────────────────────────────────────────────
    if cli.all {
        let roll = cli.roll.clone();
        let out = cli.output.clone();
        let results = download::download_all(
            &client,
            &course,
            |subject| Box::new(ImageDirSink::new(subject_dir(&out, &roll, &subject.code))),
            None,
        )
        .await
        .context("Could not list subjects")?;

        let mut failed = 0usize;
        let mut summaries = Vec::new();
        for (code, outcome) in results {
            match outcome {
                Ok(dl) => {
                    if !cli.quiet && !cli.json {
                        print_summary(&dl);
                    }
                    write_marks_sidecar(&cli.output, &cli.roll, &dl);
                    summaries.push(dl);
                }
                Err(e) => {
                    failed += 1;
                    eprintln!("{} {}  {}", red("✗"), bold(&code), e);
                }
            }
        }
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        } else if !cli.quiet {
            eprintln!(
                "{} {}/{} subjects downloaded",
                if failed == 0 { green("✔") } else { cyan("⚠") },
                bold(&summaries.len().to_string()),
                summaries.len() + failed,
            );
        }
        if summaries.is_empty() && failed > 0 {
            bail!("every subject failed");
        }
        return Ok(());
    }

    let Some(subject_code) = cli.subject.clone() else {
        bail!("pass --subject CODE, --all, or --list");
    };

    let spinner = (!cli.quiet && !cli.json).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("{subject_code} — fetching pages…"));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let mut sink = ImageDirSink::new(subject_dir(&cli.output, &cli.roll, &subject_code));
    let result = download::download_one(&client, &course, &subject_code, &mut sink, None).await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let dl = result?;

    write_marks_sidecar(&cli.output, &cli.roll, &dl);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&dl)?);
    } else if !cli.quiet {
        print_summary(&dl);
    }
    Ok(())
}

/// Per-subject output directory: `<out>/<roll>_<code>`.
fn subject_dir(out: &Path, roll: &str, code: &str) -> PathBuf {
    out.join(format!("{roll}_{code}"))
}

/// Read the password from stdin (plain echo; for non-interactive use set
/// EXAMSCRIPT_PASSWORD instead).
fn prompt_password() -> Result<String> {
    eprint!("Password: ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("empty password");
    }
    Ok(password)
}

fn print_summary(dl: &SubjectDownload) {
    match (&dl.document, dl.pages) {
        (Some(doc), _) => eprintln!(
            "{} {}  {} pages  {}  →  {}",
            green("✔"),
            bold(&dl.subject_code),
            dl.pages,
            dim(&format!("{}ms", dl.duration_ms)),
            bold(&doc.path.display().to_string()),
        ),
        (None, 0) => eprintln!(
            "{} {}  no pages ({})",
            cyan("⚠"),
            bold(&dl.subject_code),
            dl.stop
        ),
        (None, n) => eprintln!(
            "{} {}  {} pages retrieved but no document assembled",
            cyan("⚠"),
            bold(&dl.subject_code),
            n
        ),
    }
}

/// Write the marks breakdown next to the document, when one was extracted.
fn write_marks_sidecar(out: &Path, roll: &str, dl: &SubjectDownload) {
    let Some(ref marks) = dl.marks else { return };
    let dir = subject_dir(out, roll, &dl.subject_code);
    std::fs::create_dir_all(&dir).ok();
    let path = dir.join(format!("{}_marks.csv", dl.subject_code));
    if let Err(e) = std::fs::write(&path, marks.to_csv()) {
        eprintln!(
            "{} could not write marks sidecar {}: {e}",
            cyan("⚠"),
            path.display()
        );
    }
}

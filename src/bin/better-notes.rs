//! CLI binary for better-notes.
//!
//! A thin shim over the library crate: maps flags to `NotesConfig`, runs one
//! submission (or an interactive session), prints the note and writes the PDF.

use anyhow::{bail, Context, Result};
use better_notes::stream::DEFAULT_WORD_DELAY;
use better_notes::{
    load_image, pace_words, ImageTransport, NoteStyle, NotesConfig, NotesPipeline,
    NotesProgressCallback, ProgressCallback, RenderedArtifact, RendererKind, Session,
};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr while the model thinks and the PDF renders.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn spin(&self, prefix: &str, msg: String) {
        if self.bar.is_finished() {
            self.bar.reset();
        }
        self.bar.set_prefix(prefix.to_string());
        self.bar.set_message(msg);
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn elapsed(&self) -> String {
        let started = self.started.lock().ok().and_then(|s| *s);
        match started {
            Some(t) => dim(&format!("{:.1}s", t.elapsed().as_secs_f64())),
            None => String::new(),
        }
    }
}

impl NotesProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, style: NoteStyle) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.spin("Reading", format!("note as {}…", style));
    }

    fn on_generation_complete(&self, markdown_len: usize, failed: bool) {
        if failed {
            self.bar
                .println(format!("  {} {}", red("✗"), red("The model did not answer; using placeholder text")));
        } else {
            self.bar.println(format!(
                "  {} Note written  {}  {}",
                green("✓"),
                dim(&format!("{markdown_len} bytes")),
                self.elapsed()
            ));
        }
    }

    fn on_render_attempt(&self, engine: &str) {
        if let Ok(mut s) = self.started.lock() {
            s.get_or_insert_with(Instant::now);
        }
        self.spin("Rendering", format!("PDF with {}…", engine));
    }

    fn on_render_complete(&self, engine: &str, pdf_len: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "  {} PDF ready ({})  {}  {}",
            green("✓"),
            cyan(engine),
            dim(&format!("{pdf_len} bytes")),
            self.elapsed()
        );
    }

    fn on_render_error(&self, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("  {} {}", red("✗"), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Rewrite a photographed page as clean notes (PDF next to the photo)
  better-notes lecture.jpg

  # Solve the exercises on a worksheet, keep the markdown too
  better-notes --style solve-exercises worksheet.png -o answers.pdf --markdown-out answers.md

  # Render locally instead of calling the render service
  better-notes --renderer local notes.jpg

  # Upload the photo to the Gemini file store instead of inlining it
  better-notes --provider gemini --model gemini-2.0-flash --transport upload notes.jpg

  # Interactive session: change style and re-download without re-uploading
  better-notes --interactive notes.jpg

STYLES:
  rewrite          A-student rewrite with a quiz and a "Remember" section (default)
  define-terms     Two tables: definitions and simple examples
  parody           Absurd, emoji-filled retelling that still covers every point
  solve-exercises  Step-by-step solutions with highlighted answers

INTERACTIVE COMMANDS:
  image <path>     select a new photo (arms it for submission)
  clear            forget the photo and the cached note
  style <name>     change style (re-arms a pending photo)
  submit           generate the note and render it
  download [path]  render the cached note again and save it
  show             print the session state and the cached note
  quit             leave

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY       OpenAI API key
  ANTHROPIC_API_KEY    Anthropic API key
  GEMINI_API_KEY       Google Gemini API key (also used by --transport upload)
  NOTES_LLM_PROVIDER   Override provider (openai, anthropic, gemini, ollama)
  NOTES_MODEL          Override model ID
  NOTES_RENDER_ENDPOINT  Render service URL (default https://md-to-pdf.fly.dev)
"#;

/// Turn photos of handwritten notes into Markdown and PDF using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "better-notes",
    version,
    about = "Turn photos of handwritten notes into Markdown and PDF using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Photo of the note (JPEG or PNG).
    image: Option<PathBuf>,

    /// Note style: rewrite, define-terms, parody, solve-exercises.
    #[arg(short, long, env = "NOTES_STYLE", default_value = "rewrite", value_parser = parse_style)]
    style: NoteStyle,

    /// Write the PDF here. Default: the photo's name with a .pdf extension.
    #[arg(short, long, env = "NOTES_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write the generated markdown to this file.
    #[arg(long, env = "NOTES_MARKDOWN_OUT")]
    markdown_out: Option<PathBuf>,

    /// PDF renderer: remote service or local typesetter.
    #[arg(long, env = "NOTES_RENDERER", value_enum, default_value = "remote")]
    renderer: RendererArg,

    /// Render service URL.
    #[arg(long, env = "NOTES_RENDER_ENDPOINT")]
    render_endpoint: Option<String>,

    /// How the photo reaches the model: inline base64 or file-store upload.
    #[arg(long, env = "NOTES_TRANSPORT", value_enum, default_value = "inline")]
    transport: TransportArg,

    /// LLM model ID (e.g. gpt-4.1-mini, gemini-2.0-flash).
    #[arg(long, env = "NOTES_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(long, env = "NOTES_LLM_PROVIDER")]
    provider: Option<String>,

    /// API key for the provider; exported to its key variable.
    #[arg(long, env = "NOTES_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Temperature override (0.0–2.0). Default: the style's own.
    #[arg(long, env = "NOTES_TEMPERATURE")]
    temperature: Option<f32>,

    /// Nucleus sampling override (0.0–1.0). Default: the style's own.
    #[arg(long, env = "NOTES_TOP_P")]
    top_p: Option<f32>,

    /// Max LLM output tokens.
    #[arg(long, env = "NOTES_MAX_TOKENS", default_value_t = 3072)]
    max_tokens: usize,

    /// Return whatever the fallback engine sends, even if it is not a PDF.
    #[arg(long, env = "NOTES_NO_VALIDATE_PDF")]
    no_validate_pdf: bool,

    /// Print the note at once instead of word by word.
    #[arg(long, env = "NOTES_NO_PACING")]
    no_pacing: bool,

    /// Start an interactive session.
    #[arg(short, long)]
    interactive: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "NOTES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "NOTES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum RendererArg {
    Remote,
    Local,
}

impl From<RendererArg> for RendererKind {
    fn from(v: RendererArg) -> Self {
        match v {
            RendererArg::Remote => RendererKind::Remote,
            RendererArg::Local => RendererKind::Local,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum TransportArg {
    Inline,
    Upload,
}

impl From<TransportArg> for ImageTransport {
    fn from(v: TransportArg) -> Self {
        match v {
            TransportArg::Inline => ImageTransport::Inline,
            TransportArg::Upload => ImageTransport::Upload,
        }
    }
}

fn parse_style(s: &str) -> std::result::Result<NoteStyle, String> {
    s.parse()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers normal feedback, so library INFO logs only show
    // with -v.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // The key is exported while the process is still single-threaded.
    if let Some(ref key) = cli.api_key {
        export_api_key(cli.provider.as_deref(), key);
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let progress: Option<ProgressCallback> = if cli.quiet {
        None
    } else {
        Some(CliProgressCallback::new() as Arc<dyn NotesProgressCallback>)
    };
    let config = build_config(&cli, progress)?;
    let pipeline = NotesPipeline::from_config(config).context("Failed to set up the note pipeline")?;

    let mut session = Session::with_style(cli.style);
    if let Some(ref path) = cli.image {
        let request = load_image(path, cli.style)
            .await
            .with_context(|| format!("Failed to load {}", path.display()))?;
        session.select_image(Some(request));
    }

    if cli.interactive {
        return run_interactive(&cli, &pipeline, session).await;
    }

    let Some(ref image) = cli.image else {
        bail!("No image given. Pass a photo of your notes, or use --interactive.");
    };
    let (session, result) = pipeline.submit(session).await;
    if let Some(note) = session.note() {
        emit_note(&cli, &note.markdown_text).await?;
    }
    let artifact = result.context("Could not produce a PDF")?;
    let out = cli.output.clone().unwrap_or_else(|| image.with_extension("pdf"));
    save_pdf(&cli, &artifact, &out).await
}

/// Map CLI args to `NotesConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<NotesConfig> {
    let mut builder = NotesConfig::builder()
        .max_tokens(cli.max_tokens)
        .renderer(cli.renderer.clone().into())
        .image_transport(cli.transport.clone().into())
        .validate_pdf(!cli.no_validate_pdf);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(name) = provider_for(cli) {
        builder = builder.provider_name(name);
    }
    if let Some(ref url) = cli.render_endpoint {
        builder = builder.render_endpoint(url);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(p) = cli.top_p {
        builder = builder.top_p(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// The provider to request. An `--api-key` without `--provider` means OpenAI.
fn provider_for(cli: &Cli) -> Option<String> {
    match (&cli.provider, &cli.api_key) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(_)) => Some("openai".to_string()),
        (None, None) => None,
    }
}

/// Environment variable holding the API key for `provider`.
fn key_var_for(provider: Option<&str>) -> &'static str {
    match provider.map(|p| p.to_lowercase()).as_deref() {
        Some("anthropic") => "ANTHROPIC_API_KEY",
        Some("gemini") | Some("google") => "GEMINI_API_KEY",
        Some("azure") => "AZURE_OPENAI_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

fn export_api_key(provider: Option<&str>, key: &str) {
    let var = key_var_for(provider);
    tracing::debug!("Exporting --api-key as {}", var);
    std::env::set_var(var, key);
}

/// Print the note to stdout (paced unless disabled) and optionally save it.
async fn emit_note(cli: &Cli, markdown: &str) -> Result<()> {
    if let Some(ref path) = cli.markdown_out {
        tokio::fs::write(path, markdown)
            .await
            .with_context(|| format!("Failed to write markdown to {}", path.display()))?;
    }
    if cli.quiet {
        return Ok(());
    }

    let delay = if cli.no_pacing {
        Duration::ZERO
    } else {
        DEFAULT_WORD_DELAY
    };
    let mut words = pace_words(markdown, delay);
    let mut stdout = io::stdout();
    while let Some(chunk) = words.next().await {
        stdout
            .write_all(chunk.as_bytes())
            .context("Failed to write to stdout")?;
        stdout.flush().ok();
    }
    if !markdown.ends_with('\n') {
        stdout.write_all(b"\n").ok();
    }
    Ok(())
}

async fn save_pdf(cli: &Cli, artifact: &RenderedArtifact, path: &Path) -> Result<()> {
    artifact
        .write_to(path)
        .await
        .with_context(|| format!("Failed to save PDF to {}", path.display()))?;
    if !cli.quiet {
        eprintln!(
            "{}  {}  →  {}",
            green("✔"),
            dim(&format!("{} engine", artifact.engine_used)),
            bold(&path.display().to_string())
        );
    }
    Ok(())
}

// ── Interactive session ──────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Command {
    Image(PathBuf),
    Clear,
    Style(NoteStyle),
    Submit,
    Download(Option<PathBuf>),
    Show,
    Quit,
}

fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let line = line.trim();
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (line, ""),
    };
    match cmd.to_lowercase().as_str() {
        "image" | "photo" if !arg.is_empty() => Ok(Command::Image(PathBuf::from(arg))),
        "image" | "photo" => Err("usage: image <path>".into()),
        "clear" => Ok(Command::Clear),
        "style" => arg.parse().map(Command::Style),
        "submit" | "s" => Ok(Command::Submit),
        "download" | "d" => Ok(Command::Download(
            (!arg.is_empty()).then(|| PathBuf::from(arg)),
        )),
        "show" => Ok(Command::Show),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}' (see --help)")),
    }
}

fn default_pdf_path(cli: &Cli, session: &Session) -> PathBuf {
    if let Some(ref out) = cli.output {
        return out.clone();
    }
    session
        .note()
        .map(|n| Path::new(&n.source_request.source_name).with_extension("pdf"))
        .unwrap_or_else(|| PathBuf::from("notes.pdf"))
}

async fn run_interactive(cli: &Cli, pipeline: &NotesPipeline, mut session: Session) -> Result<()> {
    eprintln!(
        "{} interactive session, style {}. Commands: image, clear, style, submit, download, show, quit",
        bold("better-notes"),
        cyan(session.style().as_str())
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("{} ", cyan("›"));
        io::stderr().flush().ok();
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(c) => c,
            Err(msg) => {
                eprintln!("{}", red(&msg));
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Image(path) => match load_image(&path, session.style()).await {
                Ok(request) => {
                    session.select_image(Some(request));
                    eprintln!("{} {} ready to submit", green("✓"), path.display());
                }
                Err(e) => eprintln!("{}", red(&e.to_string())),
            },
            Command::Clear => {
                session.clear();
                eprintln!("{}", dim("cleared"));
            }
            Command::Style(style) => {
                session.change_style(style);
                eprintln!("style set to {}", cyan(style.as_str()));
            }
            Command::Submit => {
                let (next, result) = pipeline.submit(session).await;
                session = next;
                if let Some(note) = session.note() {
                    emit_note(cli, &note.markdown_text).await?;
                }
                match result {
                    Ok(artifact) => {
                        let path = default_pdf_path(cli, &session);
                        if let Err(e) = save_pdf(cli, &artifact, &path).await {
                            eprintln!("{}", red(&format!("{e:#}")));
                        }
                    }
                    Err(e) => eprintln!("{}", red(&e.to_string())),
                }
            }
            Command::Download(path) => {
                let (next, result) = pipeline.download(session).await;
                session = next;
                match result {
                    Ok(artifact) => {
                        let path = path.unwrap_or_else(|| default_pdf_path(cli, &session));
                        if let Err(e) = save_pdf(cli, &artifact, &path).await {
                            eprintln!("{}", red(&format!("{e:#}")));
                        }
                    }
                    Err(e) => eprintln!("{}", red(&e.to_string())),
                }
            }
            Command::Show => {
                eprintln!("phase: {:?}  style: {}", session.phase(), session.style());
                if let Some(req) = session.pending_image() {
                    eprintln!("photo: {}", req.source_name);
                }
                if let Some(err) = session.last_render_error() {
                    eprintln!("last render error: {}", red(err));
                }
                if let Some(note) = session.note() {
                    println!("{}", note.markdown_text.trim_end());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("image notes.jpg"), Ok(Command::Image("notes.jpg".into())));
        assert_eq!(parse_command("style solve-exercises"), Ok(Command::Style(NoteStyle::SolveExercises)));
        assert_eq!(parse_command("download"), Ok(Command::Download(None)));
        assert_eq!(parse_command("download out/a.pdf"), Ok(Command::Download(Some("out/a.pdf".into()))));
        assert_eq!(parse_command("  SUBMIT "), Ok(Command::Submit));
        assert!(parse_command("image").is_err());
        assert!(parse_command("style sonnet").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn provider_flag_reads_documented_variable() {
        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "provider")
            .unwrap();
        assert_eq!(arg.get_env(), Some(OsStr::new("NOTES_LLM_PROVIDER")));
        assert!(AFTER_HELP.contains("NOTES_LLM_PROVIDER"));
    }

    #[test]
    fn api_key_goes_to_provider_variable() {
        assert_eq!(key_var_for(Some("Anthropic")), "ANTHROPIC_API_KEY");
        assert_eq!(key_var_for(Some("gemini")), "GEMINI_API_KEY");
        assert_eq!(key_var_for(None), "OPENAI_API_KEY");
    }

    #[test]
    fn cli_maps_to_config() {
        let cli = Cli::parse_from([
            "better-notes",
            "--style",
            "parody",
            "--renderer",
            "local",
            "--temperature",
            "0.8",
            "--no-validate-pdf",
            "photo.png",
        ]);
        assert_eq!(cli.style, NoteStyle::Parody);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.renderer, RendererKind::Local);
        assert_eq!(config.temperature, Some(0.8));
        assert!(!config.validate_pdf);
    }
}

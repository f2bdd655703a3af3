use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use meshgen_contracts::data_uri::DataUri;
use meshgen_contracts::events::EventWriter;
use meshgen_contracts::request::{
    AnimationRequest, AnimationStyle, GenerationRequest, StylePreset,
};
use meshgen_contracts::runs::receipts::sanitize_payload;
use meshgen_contracts::GenerationError;
use meshgen_engine::{
    artifact_file_name, load_media_file, load_source_image, CancelToken, GenerationResult,
    Studio, StudioAction, StudioConfig,
};
use uuid::Uuid;

const EXIT_FAILURE: i32 = 1;
const EXIT_INVALID_INPUT: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "meshgen",
    version,
    about = "Turn a photo into a 3D mesh, preview and animation"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a mesh (plus preview) from a photo.
    Generate(GenerateArgs),
    /// Animate a previously generated mesh.
    Animate(AnimateArgs),
    /// List style presets and animation styles.
    Styles,
    /// List known models and whether their backend is configured.
    Models,
}

#[derive(Debug, Args)]
struct PollArgs {
    /// Seconds between status checks.
    #[arg(long)]
    poll_interval: Option<f64>,
    /// Give up after this many seconds of polling.
    #[arg(long)]
    max_wait: Option<f64>,
    /// Give up after this many status checks.
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    style: String,
    #[arg(long)]
    prompt: Option<String>,
    /// Animation the mesh is meant for; hinted to the model.
    #[arg(long)]
    animation: Option<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    poll: PollArgs,
}

#[derive(Debug, Parser)]
struct AnimateArgs {
    /// Mesh file (`.obj`, `.gltf`, `.glb`) or a file holding a data URI.
    #[arg(long)]
    mesh: PathBuf,
    #[arg(long)]
    preview: Option<PathBuf>,
    #[arg(long)]
    style: String,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    poll: PollArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("meshgen error: {err:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    // a missing .env is normal
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args, StudioConfig::from_env()),
        Command::Animate(args) => run_animate(args, StudioConfig::from_env()),
        Command::Styles => {
            print!("{}", styles_listing());
            Ok(0)
        }
        Command::Models => {
            let studio = Studio::new(StudioConfig::from_env(), EventWriter::disabled(session_id()));
            print!("{}", models_listing(&studio));
            Ok(0)
        }
    }
}

fn run_generate(args: GenerateArgs, config: StudioConfig) -> Result<i32> {
    let request = match generation_request(&args) {
        Ok(request) => request,
        Err(err) => return Ok(report_failure(StudioAction::Generate, &err)),
    };
    let studio = build_studio(
        config,
        &args.out,
        args.events.as_deref(),
        args.model.clone(),
        &args.poll,
    );
    eprintln!(
        "meshgen: generating a {} mesh from {}",
        request.style.id(),
        args.image.display()
    );
    finish(
        StudioAction::Generate,
        studio.generate_model(&request, &CancelToken::new()),
        &args.out,
    )
}

fn run_animate(args: AnimateArgs, config: StudioConfig) -> Result<i32> {
    let request = match animation_request(&args) {
        Ok(request) => request,
        Err(err) => return Ok(report_failure(StudioAction::Animate, &err)),
    };
    let studio = build_studio(
        config,
        &args.out,
        args.events.as_deref(),
        args.model.clone(),
        &args.poll,
    );
    eprintln!(
        "meshgen: creating a {} animation of {}",
        request.style.id(),
        args.mesh.display()
    );
    finish(
        StudioAction::Animate,
        studio.animate(&request, &CancelToken::new()),
        &args.out,
    )
}

fn generation_request(args: &GenerateArgs) -> Result<GenerationRequest> {
    let style: StylePreset = args.style.parse()?;
    let animation = args
        .animation
        .as_deref()
        .map(str::parse::<AnimationStyle>)
        .transpose()?;
    let image = load_source_image(&args.image)?;
    Ok(GenerationRequest::new(image, style)
        .with_prompt(args.prompt.clone())
        .with_animation(animation))
}

fn animation_request(args: &AnimateArgs) -> Result<AnimationRequest> {
    let style: AnimationStyle = args.style.parse()?;
    let mesh = load_media_file(&args.mesh)?;
    let preview = args
        .preview
        .as_deref()
        .map(load_media_file)
        .transpose()?;
    Ok(AnimationRequest::new(mesh, style)?
        .with_preview(preview)
        .with_prompt(args.prompt.clone()))
}

fn build_studio(
    config: StudioConfig,
    out_dir: &Path,
    events: Option<&Path>,
    model: Option<String>,
    poll: &PollArgs,
) -> Studio {
    let events_path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out_dir.join("events.jsonl"));
    let mut config =
        config.with_poll_overrides(poll.poll_interval, poll.max_wait, poll.max_attempts);
    if config.receipts_dir.is_none() {
        config.receipts_dir = Some(out_dir.join("receipts"));
    }
    Studio::new(config, EventWriter::new(events_path, session_id())).with_model(model)
}

fn finish(
    action: StudioAction,
    outcome: Result<GenerationResult, GenerationError>,
    out_dir: &Path,
) -> Result<i32> {
    let result = match outcome {
        Ok(result) => result,
        Err(err) => return Ok(report_failure(action, &anyhow::Error::new(err))),
    };
    for warning in &result.warnings {
        eprintln!("meshgen warning: {warning}");
    }
    for path in save_outputs(out_dir, &result)? {
        println!("{}", path.display());
    }
    Ok(0)
}

/// Writes every output next to a `result.json` summary and returns the
/// written media paths.
fn save_outputs(out_dir: &Path, result: &GenerationResult) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let mut written = Vec::new();
    for (kind, uri) in result.outputs() {
        let decoded = DataUri::parse(uri)?;
        let path = out_dir.join(artifact_file_name(result.action, kind, &decoded.mime));
        fs::write(&path, &decoded.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    let summary = sanitize_payload(&serde_json::to_value(result)?);
    let summary_path = out_dir.join("result.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;
    Ok(written)
}

/// Prints one line for a failed request and picks the exit code.
fn report_failure(action: StudioAction, err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<GenerationError>() {
        Some(generation) => {
            eprintln!("meshgen error: {}", generation.user_message(action.label()));
            if generation.is_validation() {
                EXIT_INVALID_INPUT
            } else {
                EXIT_FAILURE
            }
        }
        None => {
            eprintln!("meshgen error: {} failed: {err:#}", action.label());
            EXIT_FAILURE
        }
    }
}

fn styles_listing() -> String {
    let mut out = String::from("Styles:\n");
    for style in StylePreset::ALL {
        out.push_str(&format!(
            "  {:<12} {}: {}\n",
            style.id(),
            style.label(),
            style.description()
        ));
    }
    out.push_str("Animations:\n");
    for animation in AnimationStyle::ALL {
        out.push_str(&format!("  {}\n", animation.id()));
    }
    out
}

fn models_listing(studio: &Studio) -> String {
    let mut out = String::new();
    for (spec, configured) in studio.models() {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            spec.name,
            spec.backend,
            spec.capabilities.join(","),
            if configured { "ready" } else { "needs GEMINI_API_KEY" }
        ));
    }
    out
}

fn session_id() -> String {
    format!("meshgen-{}", Uuid::new_v4())
}

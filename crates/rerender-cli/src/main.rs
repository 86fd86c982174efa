use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rerender_contracts::chat::{parse_intent, Intent, SESSION_HELP_COMMANDS};
use rerender_contracts::events::{new_session_id, EventWriter};
use rerender_contracts::{AspectRatio, FidelityMode, ImageSlot, StyleMetadata};
use rerender_engine::{
    build_service, EditOutcome, PipelineController, PipelineState, ServiceConfig,
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "rerender",
    version,
    about = "Re-render a subject photo in the style of a reference image"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session driven by slash commands.
    Session(SessionArgs),
    /// Decode, re-render and optionally edit once, then write the result.
    Run(RunArgs),
    /// Print the style metadata decoded from a reference image.
    Decode(DecodeArgs),
}

#[derive(Debug, Clone, Args)]
struct ServiceArgs {
    #[arg(long)]
    decode_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    /// Per-request timeout in seconds (15-600).
    #[arg(long, default_value_t = 120.0)]
    timeout: f64,
    #[arg(long, default_value_t = 0)]
    transport_retries: usize,
    /// Tracing filter, e.g. `info` or `rerender_engine=debug`. Falls back to
    /// RUST_LOG, then `warn`.
    #[arg(long)]
    log_level: Option<String>,
    /// Append JSONL session events to this file.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    reference: PathBuf,
    #[arg(long)]
    subject: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "realistic")]
    fidelity: FidelityMode,
    #[arg(long, default_value = "auto")]
    ratio: AspectRatio,
    /// Edit instruction applied to the result; repeat to chain edits.
    #[arg(long = "edit")]
    edits: Vec<String>,
    #[arg(long)]
    metadata_out: Option<PathBuf>,
    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Debug, Parser)]
struct DecodeArgs {
    #[arg(long)]
    reference: PathBuf,
    #[command(flatten)]
    service: ServiceArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("rerender error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Session(args) => {
            run_session(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
        Command::Decode(args) => run_decode(args),
    }
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|err| anyhow!("invalid --log-level '{level}': {err}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn build_controller(args: &ServiceArgs) -> Result<PipelineController> {
    init_tracing(args.log_level.as_deref())?;
    let mut config = ServiceConfig::from_env()
        .with_models(args.decode_model.clone(), args.image_model.clone())
        .with_request_timeout_secs(args.timeout)
        .with_transport_retries(args.transport_retries);
    if let Some(api_base) = args.api_base.as_deref() {
        config = config.with_api_base(api_base);
    }
    let (service, _models) = build_service(&config)?;

    let mut controller = PipelineController::new(service);
    if let Some(path) = args.events.as_ref() {
        let events = EventWriter::new(path, new_session_id());
        info!(path = %path.display(), session_id = events.session_id(), "writing session events");
        events.emit(
            "session_started",
            serde_json::Map::from_iter([
                ("service".to_string(), json!(controller.service_name())),
                ("pid".to_string(), json!(std::process::id())),
            ]),
        )?;
        controller = controller.with_events(events);
    }
    Ok(controller)
}

fn run_session(args: SessionArgs) -> Result<()> {
    let controller = build_controller(&args.service)?;
    let stdin = io::stdin();
    let mut line = String::new();

    println!(
        "Re-render session started ({}). Type /help for commands.",
        controller.service_name()
    );

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if intent.action == "quit" {
            break;
        }
        handle_intent(&controller, &intent)?;
    }
    Ok(())
}

fn handle_intent(controller: &PipelineController, intent: &Intent) -> Result<()> {
    match intent.action.as_str() {
        "noop" => {}
        "help" => {
            println!("Commands: {}", SESSION_HELP_COMMANDS.join(" "));
            println!("Plain text is applied to the result as an edit instruction.");
        }
        "set_reference" => {
            let Some(path) = intent.arg_str("path") else {
                println!("/ref requires a path");
                return Ok(());
            };
            println!("Decoding reference style...");
            match controller.load_reference(Path::new(path)) {
                Ok(()) => {
                    let state = controller.snapshot();
                    if let Some(metadata) = state.metadata() {
                        println!("Style: {}", metadata.art_style);
                    }
                    if let Some(ratio) = state.inferred_ratio() {
                        println!("Inferred aspect ratio: {ratio}");
                    }
                }
                Err(err) => println!("{err}"),
            }
        }
        "set_subject" => {
            let Some(path) = intent.arg_str("path") else {
                println!("/subject requires a path");
                return Ok(());
            };
            match controller.load_subject(Path::new(path)) {
                Ok(()) => println!("Subject set to {path}"),
                Err(err) => println!("{err}"),
            }
        }
        "set_fidelity" => match intent.arg_str("value").map(str::parse::<FidelityMode>) {
            Some(Ok(fidelity)) => {
                controller.set_fidelity(fidelity);
                println!("Fidelity: {}", fidelity.label());
            }
            Some(Err(err)) => println!("{err}"),
            None => println!("Fidelity: {}", controller.snapshot().fidelity().label()),
        },
        "set_ratio" => match intent.arg_str("value").map(str::parse::<AspectRatio>) {
            Some(Ok(ratio)) => {
                controller.set_aspect_ratio(ratio);
                println!("Aspect ratio: {}", ratio_label(&controller.snapshot()));
            }
            Some(Err(err)) => println!("{err}"),
            None => println!("Aspect ratio: {}", ratio_label(&controller.snapshot())),
        },
        "mimic" => {
            println!("Re-rendering...");
            match controller.run_mimic() {
                Ok(()) => println!("{}", result_line(&controller.snapshot())),
                Err(err) => println!("{err}"),
            }
        }
        "edit" => {
            let instruction = intent.prompt.as_deref().unwrap_or_default();
            match controller.run_edit(instruction) {
                Ok(EditOutcome::Applied) => println!("{}", result_line(&controller.snapshot())),
                Ok(EditOutcome::Skipped) => {
                    if controller.snapshot().result_image().is_empty() {
                        println!("Nothing to edit yet; run /mimic first.");
                    } else {
                        println!("/edit requires an instruction");
                    }
                }
                Err(err) => println!("{err}"),
            }
        }
        "save" => {
            let Some(path) = intent.arg_str("path") else {
                println!("/save requires a path");
                return Ok(());
            };
            match controller.save_result(Path::new(path)) {
                Ok(saved) => println!("Saved {}", saved.display()),
                Err(err) => println!("Save failed: {err:#}"),
            }
        }
        "status" => println!("{}", format_status(&controller.snapshot())),
        "metadata" => match controller.metadata() {
            Some(metadata) => {
                for (name, value) in metadata.fields() {
                    println!("{name}: {value}");
                }
            }
            None => println!("No style metadata yet."),
        },
        "reset" => {
            controller.reset();
            println!("Session reset.");
        }
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            println!("Unknown command /{command}. Type /help for commands.");
        }
        other => println!("Unhandled action {other}"),
    }
    Ok(())
}

fn run_once(args: RunArgs) -> Result<i32> {
    let controller = build_controller(&args.service)?;
    controller.set_fidelity(args.fidelity);
    controller.set_aspect_ratio(args.ratio);

    controller
        .load_reference(&args.reference)
        .context("reference decode failed")?;
    controller
        .load_subject(&args.subject)
        .context("subject could not be loaded")?;
    if let Some(path) = args.metadata_out.as_ref() {
        let metadata = controller
            .metadata()
            .ok_or_else(|| anyhow!("reference decode produced no metadata"))?;
        write_metadata(path, &metadata)?;
    }

    controller.run_mimic().context("re-render failed")?;
    for instruction in &args.edits {
        if controller.run_edit(instruction)? == EditOutcome::Skipped {
            println!("Skipped empty edit instruction");
        }
    }

    let saved = controller.save_result(&args.out)?;
    println!("{}", result_line(&controller.snapshot()));
    println!("Saved {}", saved.display());
    Ok(0)
}

fn run_decode(args: DecodeArgs) -> Result<i32> {
    let controller = build_controller(&args.service)?;
    controller.load_reference(&args.reference)?;
    let Some(metadata) = controller.metadata() else {
        bail!("reference decode produced no metadata");
    };
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(0)
}

fn write_metadata(path: &Path, metadata: &StyleMetadata) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(metadata)?;
    std::fs::write(path, format!("{body}\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

fn ratio_label(state: &PipelineState) -> String {
    if state.aspect_ratio().is_auto() {
        format!("AUTO ({})", state.resolved_ratio())
    } else {
        state.aspect_ratio().to_string()
    }
}

fn slot_label(slot: &ImageSlot) -> String {
    match slot.payload() {
        None => "empty".to_string(),
        Some(payload) => match payload.dimensions() {
            Some((width, height)) => {
                format!("{} {width}x{height}, {} bytes", payload.mime_type(), payload.len())
            }
            None => format!("{}, {} bytes", payload.mime_type(), payload.len()),
        },
    }
}

fn result_line(state: &PipelineState) -> String {
    format!("Result: {}", slot_label(state.result_image()))
}

fn format_status(state: &PipelineState) -> String {
    let mut lines = vec![
        format!("Reference: {}", slot_label(state.ref_image())),
        format!("Subject:   {}", slot_label(state.user_image())),
        format!("Result:    {}", slot_label(state.result_image())),
        format!(
            "Style:     {}",
            state
                .metadata()
                .map(|metadata| metadata.art_style.as_str())
                .unwrap_or(if state.is_decoding() { "decoding..." } else { "none" })
        ),
        format!("Fidelity:  {}", state.fidelity().label()),
        format!("Ratio:     {}", ratio_label(state)),
    ];
    if let Some(message) = state.error_message() {
        lines.push(format!("Error:     {message}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rerender_contracts::{AspectRatio, FidelityMode, ImagePayload, PipelineError};
    use rerender_engine::PipelineState;

    use super::{format_status, ratio_label, Cli, Command};

    #[test]
    fn run_defaults_to_realistic_and_auto() {
        let cli = Cli::try_parse_from([
            "rerender",
            "run",
            "--reference",
            "ref.png",
            "--subject",
            "me.jpg",
            "--out",
            "out.png",
            "--edit",
            "add rain",
            "--edit",
            "make it night",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.fidelity, FidelityMode::Realistic);
        assert_eq!(args.ratio, AspectRatio::Auto);
        assert_eq!(args.edits, vec!["add rain", "make it night"]);
        assert_eq!(args.service.timeout, 120.0);
        assert!(args.service.events.is_none());
    }

    #[test]
    fn run_rejects_unknown_ratio() {
        let parsed = Cli::try_parse_from([
            "rerender",
            "run",
            "--reference",
            "ref.png",
            "--subject",
            "me.jpg",
            "--out",
            "out.png",
            "--ratio",
            "2:1",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn ratio_label_shows_resolved_auto_ratio() {
        let mut state = PipelineState::new();
        assert_eq!(ratio_label(&state), "AUTO (1:1)");

        state.set_reference_image(
            ImagePayload::new(vec![1, 2, 3], "image/png").with_dimensions(Some((1920, 1080))),
        );
        assert_eq!(ratio_label(&state), "AUTO (16:9)");

        state.set_aspect_ratio(AspectRatio::Portrait3x4);
        assert_eq!(ratio_label(&state), "3:4");
    }

    #[test]
    fn status_reports_slots_and_error() {
        let mut state = PipelineState::new();
        state.set_user_image(ImagePayload::new(vec![0; 10], "image/jpeg"));
        let _ = state.begin_mimic();

        let status = format_status(&state);
        assert!(status.contains("Reference: empty"));
        assert!(status.contains("Subject:   image/jpeg, 10 bytes"));
        assert!(status.contains("Fidelity:  Realistic Blend"));
        assert!(status.contains(&format!("Error:     {}", PipelineError::MissingInput)));
    }
}

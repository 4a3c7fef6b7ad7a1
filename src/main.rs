//! vproute CLI
//!
//! Command-line interface for inspecting engine routing decisions.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use vproute::{
    caps::{CapsPreset, HwCaps},
    FrameStream, Request, Resolver, ResolverConfig, SessionContext, Submission,
};

#[derive(Parser)]
#[command(name = "vproute")]
#[command(about = "Video processing engine router - VEBOX, SFC and render")]
#[command(version)]
struct Cli {
    /// Log every resolver decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the capability table comes from
#[derive(clap::Args)]
struct CapsSource {
    /// Built-in capability preset
    #[arg(short, long, default_value = "reference")]
    preset: String,

    /// Capability table in TOML (overrides --preset)
    #[arg(long)]
    caps_file: Option<PathBuf>,
}

impl CapsSource {
    fn load(&self) -> anyhow::Result<HwCaps> {
        if let Some(path) = &self.caps_file {
            return HwCaps::load(path).with_context(|| format!("loading caps from {}", path.display()));
        }
        let preset = CapsPreset::from_name(&self.preset)
            .with_context(|| format!("unknown preset '{}' (see `vproute presets`)", self.preset))?;
        Ok(HwCaps::from(preset))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one frame request and print every submission
    Resolve {
        /// Request file (TOML)
        request: PathBuf,

        #[command(flatten)]
        caps: CapsSource,

        /// Resolver configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Resolve the same request for several consecutive frames
        #[arg(short, long, default_value = "1")]
        frames: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a capability table
    Caps {
        #[command(flatten)]
        caps: CapsSource,

        /// Dump the full table as TOML
        #[arg(long)]
        toml: bool,
    },

    /// List built-in capability presets
    Presets,

    /// Stream request files through one resolver session
    Replay {
        /// Request files, or directories of *.toml requests
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        caps: CapsSource,

        /// Resolver configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Requests queued ahead of the resolver
        #[arg(long, default_value = "4")]
        queue: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "vproute=debug" } else { "vproute=info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    match cli.command {
        Commands::Resolve {
            request,
            caps,
            config,
            frames,
            json,
        } => cmd_resolve(request, caps, config, frames, json),
        Commands::Caps { caps, toml } => cmd_caps(caps, toml),
        Commands::Presets => cmd_presets(),
        Commands::Replay {
            paths,
            caps,
            config,
            queue,
        } => cmd_replay(paths, caps, config, queue),
    }
}

fn build_resolver(caps: &CapsSource, config: Option<&Path>) -> anyhow::Result<Resolver> {
    let caps = caps.load()?;
    let config = match config {
        Some(path) => ResolverConfig::load(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => ResolverConfig::default(),
    };
    Ok(Resolver::with_config(caps, config)?)
}

fn cmd_resolve(
    request: PathBuf,
    caps: CapsSource,
    config: Option<PathBuf>,
    frames: u32,
    json: bool,
) -> anyhow::Result<()> {
    let resolver = build_resolver(&caps, config.as_deref())?;
    let request = Request::load(&request).with_context(|| format!("loading request {}", request.display()))?;
    let surfaces = request
        .inputs
        .iter()
        .map(|l| &l.surface)
        .chain(request.outputs.iter().map(|o| &o.surface));
    for surface in surfaces {
        if !resolver.caps().is_known(surface.format) {
            tracing::info!("{} is unknown to VEBOX and SFC, render only", surface.format);
        }
    }
    let mut session = SessionContext::new();

    let mut report = Vec::new();
    for frame in 0..frames.max(1) {
        let submissions = match resolver.resolve_frame(&request, &mut session) {
            Ok(submissions) => submissions,
            Err(e) if e.is_recoverable() => {
                return Err(anyhow::Error::new(e).context(format!(
                    "frame {} does not fit the '{}' engines; split the request or raise max_passes",
                    frame,
                    resolver.caps().name
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if json {
            report.push(serde_json::json!({
                "frame": frame,
                "submissions": submissions.iter().map(submission_json).collect::<Vec<_>>(),
            }));
        } else {
            print_frame(frame, &submissions);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn print_frame(frame: u32, submissions: &[Submission]) {
    println!("Frame {}", frame);
    println!("========");
    for (pass, submission) in submissions.iter().enumerate() {
        println!("  Pass {}: {}", pass, submission.engines);
        println!("    layers:   {:?}", submission.linked_layers);
        println!("    features: {}", submission.executed.describe());
        let flags = submission.caps.flags();
        if !flags.is_empty() {
            println!("    flags:    {}", flags.join(" "));
        }
        if let Some(surface) = &submission.intermediate {
            println!(
                "    writes:   {} {}x{} for the next pass",
                surface.format.name(),
                surface.width,
                surface.height
            );
        }
    }
    println!();
}

fn submission_json(submission: &Submission) -> serde_json::Value {
    let layers: Vec<_> = submission
        .executed
        .layers
        .iter()
        .map(|layer| {
            serde_json::json!({
                "linked_index": layer.linked_index,
                "surface": layer.surface,
                "features": layer
                    .filters
                    .iter()
                    .map(|f| serde_json::json!({ "kind": f.kind().name(), "engine": f.assigned_engine() }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    let outputs: Vec<_> = submission
        .executed
        .outputs
        .iter()
        .map(|output| {
            serde_json::json!({
                "surface": output.surface,
                "features": output
                    .filters
                    .iter()
                    .map(|f| serde_json::json!({ "kind": f.kind().name(), "engine": f.assigned_engine() }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    serde_json::json!({
        "engines": submission.engines,
        "last": submission.is_last(),
        "caps": submission.caps,
        "layers": layers,
        "outputs": outputs,
        "intermediate": submission.intermediate,
    })
}

fn cmd_caps(caps: CapsSource, toml: bool) -> anyhow::Result<()> {
    let hw = caps.load()?;
    if toml {
        print!("{}", hw.to_toml_string()?);
        return Ok(());
    }

    let name = if hw.name.is_empty() { "(unnamed)" } else { hw.name.as_str() };
    println!("Capability table: {}", name);
    println!("================\n");

    println!("=== SFC ===");
    if hw.sfc.is_empty() {
        println!("  not present");
    }
    for (format, entry) in hw.sfc.iter() {
        println!(
            "  {:<12} in:{:<3} out:{:<3} csc:{:<3} scale:{:<3} rot:{:<3} {}..{} x{:.3}..x{:.1}",
            format.name(),
            yes_no(entry.input),
            yes_no(entry.output),
            yes_no(entry.csc),
            yes_no(entry.scaling),
            yes_no(entry.rotation),
            entry.min_resolution,
            entry.max_resolution,
            entry.min_scaling_ratio,
            entry.max_scaling_ratio
        );
    }

    println!("\n=== VEBOX ===");
    if hw.vebox.is_empty() {
        println!("  not present");
    }
    for (format, entry) in hw.vebox.iter() {
        println!(
            "  {:<12} in:{:<3} out:{:<3} iecp:{:<3} dn:{:<3} di:{:<3} hdr:{:<3}",
            format.name(),
            yes_no(entry.input),
            yes_no(entry.output),
            yes_no(entry.iecp),
            yes_no(entry.denoise),
            yes_no(entry.deinterlace),
            yes_no(entry.hdr)
        );
    }

    let rules = &hw.rules;
    println!("\n=== Rules ===");
    println!("  SFC two-pass scaling: {}", yes_no(rules.sfc_multi_pass.enable));
    println!("  Composition layers:   {}", rules.fc.max_layers);
    println!("  Luma keys per pass:   {}", rules.fc.max_lumakeys);
    println!("  Procamp per pass:     {}", rules.fc.max_procamp);
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn cmd_presets() -> anyhow::Result<()> {
    println!("Capability Presets");
    println!("==================\n");

    for preset in CapsPreset::ALL {
        println!("  {:<14} {}", preset.name(), preset.description());
    }

    println!("\nUsage: vproute resolve request.toml --preset <name>");
    Ok(())
}

fn cmd_replay(paths: Vec<PathBuf>, caps: CapsSource, config: Option<PathBuf>, queue: usize) -> anyhow::Result<()> {
    let resolver = build_resolver(&caps, config.as_deref())?;
    let files = collect_requests(&paths)?;
    if files.is_empty() {
        anyhow::bail!("no request files found");
    }

    println!("Replaying {} request(s)", files.len());
    println!("=====================\n");

    let mut stream = FrameStream::spawn(resolver, queue)?;
    for file in &files {
        let request = Request::load(file).with_context(|| format!("loading request {}", file.display()))?;
        stream.submit(request)?;
    }

    let session = stream.session().clone();
    let mut failed = 0;
    for frame in stream.finish() {
        let name = files
            .get(frame.sequence as usize)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match frame.result {
            Ok(submissions) => {
                let chain: Vec<_> = submissions.iter().map(|s| s.engines.name()).collect();
                println!("  {:>4}  {:<40} {}", frame.sequence, name, chain.join(" -> "));
            }
            Err(e) => {
                failed += 1;
                println!("  {:>4}  {:<40} error: {}", frame.sequence, name, e);
            }
        }
    }

    println!("\nFrames resolved: {}", session.snapshot().frames());
    if failed > 0 {
        anyhow::bail!("{} frame(s) failed", failed);
    }
    Ok(())
}

fn collect_requests(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("reading {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

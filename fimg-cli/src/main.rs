// CLI application
use anyhow::Context;
use clap::Parser;
use fimg_core::compat::{CombineFunction, TexEnvMode};
use fimg_core::{ContextConfig, Primitive};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

mod commands;

use commands::{AttributeSpec, ShaderStage};

#[derive(Parser)]
#[command(name = "fimg")]
#[command(about = "FIMG-3DSE fixed-function emulation toolkit")]
#[command(version)]
struct Cli {
    /// Path to a JSON context configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print how a draw call is split into hardware batches
    Plan {
        /// Primitive type (points, line_strip, lines, triangle_strip, triangle_fan, triangles, ...)
        #[arg(short, long)]
        primitive: Primitive,

        /// Number of vertices (or indices) in the draw
        #[arg(short = 'n', long)]
        count: usize,

        /// Per-vertex attribute as TYPE:COMPONENTS, e.g. float:3 (repeatable)
        #[arg(short, long = "varying")]
        varying: Vec<AttributeSpec>,

        /// Constant attribute as TYPE:COMPONENTS (repeatable)
        #[arg(long = "constant")]
        constant: Vec<AttributeSpec>,
    },
    /// Assemble and disassemble the programs for a texture environment
    Shader {
        /// Environment mode per enabled texture unit, in unit order (repeatable)
        #[arg(short, long = "unit")]
        units: Vec<TexEnvMode>,

        /// RGB combiner function for units in combine mode
        #[arg(long)]
        rgb_function: Option<CombineFunction>,

        /// Alpha combiner function for units in combine mode
        #[arg(long)]
        alpha_function: Option<CombineFunction>,

        /// Which stage to print
        #[arg(long, value_enum, default_value = "both")]
        stage: ShaderStage,
    },
    /// Render a sequence of draws on the in-memory device and report statistics
    Demo {
        /// Number of draw calls
        #[arg(short, long, default_value = "64")]
        draws: usize,

        /// Vertices per draw call
        #[arg(short, long, default_value = "1000")]
        vertices: usize,

        /// Primitive type
        #[arg(short, long, default_value = "triangle_strip")]
        primitive: Primitive,
    },
    /// Write the effective configuration as JSON
    Config {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ContextConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ContextConfig::default(),
    };
    config.validate().context("Configuration rejected")?;
    log::debug!("using configuration {config:?}");

    match cli.command {
        Commands::Plan {
            primitive,
            count,
            varying,
            constant,
        } => {
            commands::plan(primitive, count, &varying, &constant)?;
        }
        Commands::Shader {
            units,
            rgb_function,
            alpha_function,
            stage,
        } => {
            commands::shader(&units, rgb_function, alpha_function, stage)?;
        }
        Commands::Demo {
            draws,
            vertices,
            primitive,
        } => {
            let pb = create_progress_bar(draws as u64)?;
            commands::demo(&config, primitive, draws, vertices, &pb)?;
        }
        Commands::Config { output } => match output {
            Some(path) => {
                config
                    .save(&path)
                    .with_context(|| format!("Failed to write configuration to {}", path.display()))?;
                println!("Configuration written to {}", path.display());
            }
            None => println!("{}", serde_json::to_string_pretty(&config)?),
        },
    }

    Ok(())
}

fn create_progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message("drawing");
    Ok(pb)
}

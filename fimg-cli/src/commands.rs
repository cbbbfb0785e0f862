// Subcommand implementations
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context};
use fimg_core::compat::{assembler, isa, Channel, CombineFunction, Fingerprint, TexEnvMode, MAX_TEXTURE_UNITS};
use fimg_core::host::batch::vertices_per_transfer;
use fimg_core::host::{calculate_batch_size, BatchPlanner, MAX_ATTRIBUTES};
use fimg_core::regs::{ColorFormat, DataType, TextureFormat};
use fimg_core::{
    AttributeFormat, AttributeSource, ClearMask, ContextConfig, DrawSummary, FixedFunctionState, Gpu,
    HardwareContext, MemoryDevice, Primitive, ShaderKind, TextureImage, VertexArrays,
};
use indicatif::ProgressBar;

/// `TYPE:COMPONENTS` attribute description from the command line.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec(pub AttributeFormat);

impl FromStr for AttributeSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (data_type, components) = s
            .split_once(':')
            .ok_or_else(|| format!("expected TYPE:COMPONENTS, got `{s}`"))?;
        let data_type = DataType::from_str(data_type).map_err(|e| e.to_string())?;
        let components: u8 = components
            .parse()
            .map_err(|_| format!("invalid component count `{components}`"))?;
        if !(1..=4).contains(&components) {
            return Err(format!("component count must be 1 to 4, got {components}"));
        }
        Ok(Self(AttributeFormat::new(data_type, components)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Both,
}

pub fn plan(primitive: Primitive, count: usize, varying: &[AttributeSpec], constant: &[AttributeSpec]) -> anyhow::Result<()> {
    if !primitive.is_supported() {
        bail!("{primitive} has no hardware path; decompose it before drawing");
    }
    if varying.len() + constant.len() > MAX_ATTRIBUTES {
        bail!("at most {MAX_ATTRIBUTES} attributes can be bound");
    }
    let default_position = [AttributeSpec(AttributeFormat::new(DataType::Float, 4))];
    let varying = if varying.is_empty() && constant.is_empty() {
        &default_position[..]
    } else {
        varying
    };

    let words_per_vertex: usize = varying.iter().map(|attribute| attribute.0.words()).sum();
    let batch_size = calculate_batch_size(primitive, words_per_vertex);
    let descriptor = primitive.descriptor();
    println!("primitive:        {primitive}");
    println!("words per vertex: {words_per_vertex} ({} constant attributes)", constant.len());
    println!("transfer:         {} vertices", vertices_per_transfer(words_per_vertex));
    println!(
        "batch size:       {batch_size} (min {}, overlap {}, extra {})",
        descriptor.min, descriptor.overlap, descriptor.extra
    );
    println!();
    println!("{:>5} {:>8} {:>6} {:>8} {:>9}", "batch", "start", "size", "emitted", "consumed");

    let mut summary = DrawSummary::default();
    for (i, batch) in BatchPlanner::new(primitive, words_per_vertex, count).enumerate() {
        println!(
            "{:>5} {:>8} {:>6} {:>8} {:>9}",
            i, batch.start, batch.size, batch.emitted, batch.consumed
        );
        summary.batches += 1;
        summary.vertices_submitted += batch.emitted;
        summary.vertices_consumed += batch.consumed;
    }
    if summary.batches == 0 {
        println!("nothing drawable");
    }
    println!();
    println!(
        "{} batches, {} vertices submitted, {} of {count} consumed",
        summary.batches, summary.vertices_submitted, summary.vertices_consumed
    );
    Ok(())
}

pub fn shader(
    units: &[TexEnvMode],
    rgb_function: Option<CombineFunction>,
    alpha_function: Option<CombineFunction>,
    stage: ShaderStage,
) -> anyhow::Result<()> {
    if units.len() > MAX_TEXTURE_UNITS {
        bail!("at most {MAX_TEXTURE_UNITS} texture units are available");
    }
    let mut state = FixedFunctionState::new();
    for (unit, mode) in units.iter().enumerate() {
        state.set_unit_enabled(unit, true)?;
        state.set_env_mode(unit, *mode)?;
        if let Some(function) = rgb_function {
            state.set_combine_function(unit, Channel::Rgb, function)?;
        }
        if let Some(function) = alpha_function {
            state
                .set_combine_function(unit, Channel::Alpha, function)
                .context("Invalid alpha combiner")?;
        }
    }

    let kinds: &[ShaderKind] = match stage {
        ShaderStage::Vertex => &[ShaderKind::Vertex],
        ShaderStage::Pixel => &[ShaderKind::Pixel],
        ShaderStage::Both => &[ShaderKind::Vertex, ShaderKind::Pixel],
    };
    for kind in kinds {
        let program = kind.assemble(&state);
        let fingerprint: Fingerprint = kind.fingerprint(&state);
        println!(
            "; {kind} program, fingerprint {fingerprint}, {} of {} instructions",
            program.len(),
            assembler::max_program_len(*kind)
        );
        print!("{}", isa::disassemble(&program, 0));
        println!();
    }
    Ok(())
}

/// Position and texture coordinate arrays for `count` vertices on a circle.
fn demo_vertices(count: usize) -> (Vec<u8>, Vec<u8>) {
    let mut positions = Vec::with_capacity(count * 16);
    let mut texcoords = Vec::with_capacity(count * 8);
    for i in 0..count {
        let angle = i as f32 / count.max(1) as f32 * std::f32::consts::TAU;
        let radius = if i % 2 == 0 { 0.9 } else { 0.5 };
        for value in [radius * angle.cos(), radius * angle.sin(), 0.0, 1.0] {
            positions.extend_from_slice(&value.to_ne_bytes());
        }
        for value in [angle.cos() * 0.5 + 0.5, angle.sin() * 0.5 + 0.5] {
            texcoords.extend_from_slice(&value.to_ne_bytes());
        }
    }
    (positions, texcoords)
}

pub fn demo(
    config: &ContextConfig,
    primitive: Primitive,
    draws: usize,
    vertices: usize,
    pb: &ProgressBar,
) -> anyhow::Result<()> {
    let gpu = Gpu::new(MemoryDevice::new());
    let mut ctx = HardwareContext::new(Arc::clone(&gpu), config.clone()).context("Failed to create context")?;
    ctx.bind_color_buffer(0x5000_0000, 800, 480, 800, ColorFormat::Rgb565);
    ctx.bind_texture(0, Some(TextureImage::new(0x5100_0000, 256, 256, TextureFormat::Rgb565)))?;
    ctx.set_attribute(0, DataType::Float, 4)?;
    ctx.set_attribute(1, DataType::UnsignedByte, 4)?;
    ctx.set_attribute(2, DataType::Float, 2)?;

    let (positions, texcoords) = demo_vertices(vertices);
    let color = [255u8, 128, 0, 255];
    let arrays = VertexArrays::new()
        .with(0, AttributeSource::from_pointer(&positions, 16))
        .with(1, AttributeSource::from_pointer(&color, 0))
        .with(2, AttributeSource::from_pointer(&texcoords, 8));

    let mut total = DrawSummary::default();
    ctx.state_mut().set_unit_enabled(0, true)?;
    for i in 0..draws {
        if i % 16 == 0 {
            ctx.clear(ClearMask::COLOR, [0.0, 0.0, 0.0, 1.0], 1.0)?;
        }
        let mode = TexEnvMode::ALL[i % TexEnvMode::ALL.len()];
        let state = ctx.state_mut();
        state.set_env_mode(0, mode)?;
        state.set_env_color(0, [i as f32 / draws as f32, 0.5, 0.5, 1.0])?;

        let summary = ctx
            .draw_arrays(primitive, 0, vertices, &arrays)
            .with_context(|| format!("Draw {i} failed"))?;
        total.batches += summary.batches;
        total.vertices_submitted += summary.vertices_submitted;
        total.vertices_consumed += summary.vertices_consumed;
        pb.inc(1);
    }
    ctx.finish()?;
    pb.finish_with_message("done");

    let stats = ctx.shader_stats();
    let recorded = gpu
        .acquire(config.lock_timeout())?
        .draws()
        .len();
    println!("draws:              {draws} ({recorded} hardware draw commands)");
    println!("batches:            {}", total.batches);
    println!("vertices submitted: {}", total.vertices_submitted);
    println!("vertices consumed:  {}", total.vertices_consumed);
    for (kind, cache) in [("vertex", stats.vertex), ("pixel", stats.pixel)] {
        println!(
            "{kind:<6} programs:    {} hits, {} misses, {} uploads",
            cache.hits, cache.misses, cache.uploads
        );
    }
    println!("constant uploads:   {}", stats.constant_uploads);
    Ok(())
}

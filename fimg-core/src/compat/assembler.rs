// Program assembly.
//
// Header block, then one block sequence per enabled texture unit in
// ascending order, then the footer. Block choice is a table lookup on the
// unit's environment; placement binds unit, argument and channel registers.

use super::blocks::{
    arg_block, env_block, function_block, Placement, Template, COMBINE_OUTPUT, PS_CLEAR, PS_FOOTER, PS_HEADER,
    PS_TEXLD, VS_CLEAR, VS_FOOTER, VS_HEADER, VS_TEXCOORD,
};
use super::isa::{Instruction, WriteMask};
use super::state::{CombineFunction, Combiner, FixedFunctionState, TexEnvMode, TextureUnitState, MAX_TEXTURE_UNITS};
use super::ShaderKind;

fn emit(program: &mut Vec<Instruction>, block: &[Template], at: &Placement) {
    program.extend(block.iter().map(|template| template.resolve(at)));
}

/// Vertex program for the enabled units of `state`.
pub fn assemble_vertex(state: &FixedFunctionState) -> Vec<Instruction> {
    let base = Placement::unit(0);
    let mut program = Vec::new();
    emit(&mut program, VS_HEADER, &base);
    for (unit, _) in enabled_units(state) {
        emit(&mut program, VS_TEXCOORD, &Placement::unit(unit));
    }
    emit(&mut program, VS_FOOTER, &base);
    program
}

/// Pixel program for the texture environments of `state`.
pub fn assemble_pixel(state: &FixedFunctionState) -> Vec<Instruction> {
    let base = Placement::unit(0);
    let mut program = Vec::new();
    emit(&mut program, PS_HEADER, &base);
    for (unit, config) in enabled_units(state) {
        let at = Placement::unit(unit);
        emit(&mut program, PS_TEXLD, &at);
        if config.mode == TexEnvMode::Combine {
            emit_combine(&mut program, unit, config);
        } else {
            emit(&mut program, env_block(config.mode), &at);
        }
    }
    emit(&mut program, PS_FOOTER, &base);
    program
}

/// Program for a stage's always-resident clear slot.
pub fn assemble_clear(kind: ShaderKind) -> Vec<Instruction> {
    let block = match kind {
        ShaderKind::Vertex => VS_CLEAR,
        ShaderKind::Pixel => PS_CLEAR,
    };
    let mut program = Vec::new();
    emit(&mut program, block, &Placement::unit(0));
    program
}

fn enabled_units(state: &FixedFunctionState) -> impl Iterator<Item = (u8, &TextureUnitState)> {
    state
        .units()
        .iter()
        .enumerate()
        .filter(|(_, unit)| unit.enabled)
        .map(|(i, unit)| (i as u8, unit))
}

fn emit_combine(program: &mut Vec<Instruction>, unit: u8, config: &TextureUnitState) {
    let rgb_mask = if config.rgb.function == CombineFunction::Dot3Rgba {
        WriteMask::XYZW
    } else {
        WriteMask::XYZ
    };
    emit_combiner(program, &config.rgb, Placement::combiner(unit, rgb_mask));
    if config.rgb.function != CombineFunction::Dot3Rgba {
        emit_combiner(program, &config.alpha, Placement::combiner(unit, WriteMask::W));
    }
    emit(program, COMBINE_OUTPUT, &Placement::unit(unit));
}

fn emit_combiner(program: &mut Vec<Instruction>, combiner: &Combiner, at: Placement) {
    for (i, arg) in combiner.args.iter().take(combiner.function.arity()).enumerate() {
        emit(program, arg_block(arg.operand), &at.argument(i as u8, arg.source));
    }
    emit(program, function_block(combiner.function), &at);
}

fn combine_len(rgb: CombineFunction, alpha: CombineFunction) -> usize {
    let half = |function: CombineFunction| function.arity() + function_block(function).len();
    let alpha_len = if rgb == CombineFunction::Dot3Rgba { 0 } else { half(alpha) };
    half(rgb) + alpha_len + COMBINE_OUTPUT.len()
}

/// Longest program the assembler can emit for a stage.
pub fn max_program_len(kind: ShaderKind) -> usize {
    match kind {
        ShaderKind::Vertex => VS_HEADER.len() + MAX_TEXTURE_UNITS * VS_TEXCOORD.len() + VS_FOOTER.len(),
        ShaderKind::Pixel => {
            let env = TexEnvMode::ALL.iter().map(|mode| env_block(*mode).len());
            let combine = CombineFunction::ALL.iter().flat_map(|rgb| {
                CombineFunction::ALL
                    .iter()
                    .filter(|alpha| !alpha.is_dot3())
                    .map(move |alpha| combine_len(*rgb, *alpha))
            });
            let per_unit = PS_TEXLD.len() + env.chain(combine).max().unwrap_or(0);
            PS_HEADER.len() + MAX_TEXTURE_UNITS * per_unit + PS_FOOTER.len()
        }
    }
}

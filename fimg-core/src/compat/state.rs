// Fixed-function state tracker.
//
// Holds the texture environment of every texture unit plus the transform and
// texture matrices, and records what changed since the shaders and constants
// were last reconciled with the hardware. Setters are idempotent: writing the
// current value raises no flag.

use bitvec::prelude::*;

use crate::error::{FimgError, Result};

/// Texture units the fixed-function emulation drives.
pub const MAX_TEXTURE_UNITS: usize = 2;

/// Row-major 4x4 matrix.
pub type Matrix4 = [[f32; 4]; 4];

pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

hw_enum! {
    /// Texture environment function.
    pub enum TexEnvMode: "texture environment mode" {
        Replace = 0 => "replace",
        Modulate = 1 => "modulate",
        Decal = 2 => "decal",
        Blend = 3 => "blend",
        Add = 4 => "add",
        Combine = 5 => "combine",
    }
}

hw_enum! {
    /// Combiner function of the COMBINE environment.
    pub enum CombineFunction: "combine function" {
        Replace = 0 => "replace",
        Modulate = 1 => "modulate",
        Add = 2 => "add",
        AddSigned = 3 => "add_signed",
        Interpolate = 4 => "interpolate",
        Subtract = 5 => "subtract",
        Dot3Rgb = 6 => "dot3_rgb",
        Dot3Rgba = 7 => "dot3_rgba",
    }
}

impl CombineFunction {
    /// Arguments the function reads.
    pub const fn arity(self) -> usize {
        match self {
            CombineFunction::Replace => 1,
            CombineFunction::Interpolate => 3,
            _ => 2,
        }
    }

    pub const fn is_dot3(self) -> bool {
        matches!(self, CombineFunction::Dot3Rgb | CombineFunction::Dot3Rgba)
    }
}

hw_enum! {
    /// Combiner argument source.
    pub enum ArgSource: "argument source" {
        Texture = 0 => "texture",
        Constant = 1 => "constant",
        PrimaryColor = 2 => "primary",
        Previous = 3 => "previous",
    }
}

hw_enum! {
    /// Combiner argument operand.
    pub enum ArgOperand: "argument operand" {
        SrcColor = 0 => "src_color",
        OneMinusSrcColor = 1 => "one_minus_src_color",
        SrcAlpha = 2 => "src_alpha",
        OneMinusSrcAlpha = 3 => "one_minus_src_alpha",
    }
}

impl ArgOperand {
    pub const fn is_alpha(self) -> bool {
        matches!(self, ArgOperand::SrcAlpha | ArgOperand::OneMinusSrcAlpha)
    }
}

hw_enum! {
    pub enum CombineScale: "combine scale" {
        One = 0 => "1",
        Two = 1 => "2",
        Four = 2 => "4",
    }
}

impl CombineScale {
    pub const fn factor(self) -> f32 {
        match self {
            CombineScale::One => 1.0,
            CombineScale::Two => 2.0,
            CombineScale::Four => 4.0,
        }
    }
}

/// Which half of the combiner a setter addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Rgb,
    Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CombineArg {
    pub source: ArgSource,
    pub operand: ArgOperand,
}

impl CombineArg {
    pub const fn new(source: ArgSource, operand: ArgOperand) -> Self {
        Self { source, operand }
    }
}

/// One half (RGB or alpha) of a COMBINE environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Combiner {
    pub function: CombineFunction,
    pub args: [CombineArg; 3],
    pub scale: CombineScale,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureUnitState {
    pub enabled: bool,
    pub mode: TexEnvMode,
    pub rgb: Combiner,
    pub alpha: Combiner,
    pub env_color: [f32; 4],
}

impl Default for TextureUnitState {
    fn default() -> Self {
        use ArgOperand::*;
        use ArgSource::*;
        Self {
            enabled: false,
            mode: TexEnvMode::Modulate,
            rgb: Combiner {
                function: CombineFunction::Modulate,
                args: [
                    CombineArg::new(Texture, SrcColor),
                    CombineArg::new(Previous, SrcColor),
                    CombineArg::new(Constant, SrcAlpha),
                ],
                scale: CombineScale::One,
            },
            alpha: Combiner {
                function: CombineFunction::Modulate,
                args: [
                    CombineArg::new(Texture, SrcAlpha),
                    CombineArg::new(Previous, SrcAlpha),
                    CombineArg::new(Constant, SrcAlpha),
                ],
                scale: CombineScale::One,
            },
            env_color: [0.0; 4],
        }
    }
}

impl TextureUnitState {
    pub fn combiner(&self, channel: Channel) -> &Combiner {
        match channel {
            Channel::Rgb => &self.rgb,
            Channel::Alpha => &self.alpha,
        }
    }

    fn combiner_mut(&mut self, channel: Channel) -> &mut Combiner {
        match channel {
            Channel::Rgb => &mut self.rgb,
            Channel::Alpha => &mut self.alpha,
        }
    }

    /// Scale constant uploaded next to the environment color.
    pub fn scale_vector(&self) -> [f32; 4] {
        let rgb = self.rgb.scale.factor();
        [rgb, rgb, rgb, self.alpha.scale.factor()]
    }
}

type UnitBits = BitArr!(for MAX_TEXTURE_UNITS, in u8, Lsb0);

/// Fixed-function state plus its dirty bookkeeping.
#[derive(Debug, Clone)]
pub struct FixedFunctionState {
    units: [TextureUnitState; MAX_TEXTURE_UNITS],
    transform: Matrix4,
    texture_matrices: [Matrix4; MAX_TEXTURE_UNITS],
    vertex_dirty: bool,
    pixel_dirty: bool,
    transform_dirty: bool,
    constants_dirty: UnitBits,
    texture_matrix_dirty: UnitBits,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedFunctionState {
    /// Fresh state. Everything starts dirty so the first flush programs
    /// the hardware completely.
    pub fn new() -> Self {
        let mut state = Self {
            units: [TextureUnitState::default(); MAX_TEXTURE_UNITS],
            transform: IDENTITY,
            texture_matrices: [IDENTITY; MAX_TEXTURE_UNITS],
            vertex_dirty: false,
            pixel_dirty: false,
            transform_dirty: false,
            constants_dirty: UnitBits::ZERO,
            texture_matrix_dirty: UnitBits::ZERO,
        };
        state.mark_all_dirty();
        state
    }

    fn check_unit(unit: usize) -> Result<()> {
        if unit < MAX_TEXTURE_UNITS {
            Ok(())
        } else {
            Err(FimgError::InvalidTextureUnit(unit))
        }
    }

    pub fn unit(&self, unit: usize) -> Option<&TextureUnitState> {
        self.units.get(unit)
    }

    pub fn units(&self) -> &[TextureUnitState; MAX_TEXTURE_UNITS] {
        &self.units
    }

    /// Bit `n` set when unit `n` is enabled.
    pub fn enabled_mask(&self) -> u32 {
        self.units
            .iter()
            .enumerate()
            .filter(|(_, unit)| unit.enabled)
            .fold(0, |mask, (i, _)| mask | 1 << i)
    }

    pub fn transform(&self) -> &Matrix4 {
        &self.transform
    }

    pub fn texture_matrix(&self, unit: usize) -> Option<&Matrix4> {
        self.texture_matrices.get(unit)
    }

    // -- program-affecting setters ------------------------------------------

    pub fn set_unit_enabled(&mut self, unit: usize, enabled: bool) -> Result<()> {
        Self::check_unit(unit)?;
        if self.units[unit].enabled != enabled {
            self.units[unit].enabled = enabled;
            self.vertex_dirty = true;
            self.pixel_dirty = true;
        }
        Ok(())
    }

    pub fn set_env_mode(&mut self, unit: usize, mode: TexEnvMode) -> Result<()> {
        Self::check_unit(unit)?;
        let changed = self.units[unit].mode != mode;
        self.units[unit].mode = mode;
        self.note_program_change(unit, changed);
        Ok(())
    }

    /// Set a combiner function. DOT3 only exists for the RGB half.
    pub fn set_combine_function(&mut self, unit: usize, channel: Channel, function: CombineFunction) -> Result<()> {
        Self::check_unit(unit)?;
        if channel == Channel::Alpha && function.is_dot3() {
            return Err(FimgError::InvalidState("DOT3 is not an alpha combiner function"));
        }
        let combiner = self.units[unit].combiner_mut(channel);
        let changed = combiner.function != function;
        combiner.function = function;
        self.note_program_change(unit, changed);
        Ok(())
    }

    pub fn set_combine_source(&mut self, unit: usize, channel: Channel, arg: usize, source: ArgSource) -> Result<()> {
        Self::check_unit(unit)?;
        let slot = Self::arg_slot(&mut self.units[unit], channel, arg)?;
        let changed = slot.source != source;
        slot.source = source;
        self.note_program_change(unit, changed);
        Ok(())
    }

    /// Set an argument operand. The alpha half only takes alpha operands.
    pub fn set_combine_operand(&mut self, unit: usize, channel: Channel, arg: usize, operand: ArgOperand) -> Result<()> {
        Self::check_unit(unit)?;
        if channel == Channel::Alpha && !operand.is_alpha() {
            return Err(FimgError::InvalidState("alpha combiner operands must read alpha"));
        }
        let slot = Self::arg_slot(&mut self.units[unit], channel, arg)?;
        let changed = slot.operand != operand;
        slot.operand = operand;
        self.note_program_change(unit, changed);
        Ok(())
    }

    fn arg_slot(unit: &mut TextureUnitState, channel: Channel, arg: usize) -> Result<&mut CombineArg> {
        unit.combiner_mut(channel)
            .args
            .get_mut(arg)
            .ok_or(FimgError::InvalidState("combiner argument index out of range"))
    }

    fn note_program_change(&mut self, unit: usize, changed: bool) {
        if changed && self.units[unit].enabled {
            self.pixel_dirty = true;
        }
    }

    // -- constant setters ---------------------------------------------------

    pub fn set_combine_scale(&mut self, unit: usize, channel: Channel, scale: CombineScale) -> Result<()> {
        Self::check_unit(unit)?;
        let combiner = self.units[unit].combiner_mut(channel);
        if combiner.scale != scale {
            combiner.scale = scale;
            self.constants_dirty.set(unit, true);
        }
        Ok(())
    }

    pub fn set_env_color(&mut self, unit: usize, color: [f32; 4]) -> Result<()> {
        Self::check_unit(unit)?;
        if self.units[unit].env_color != color {
            self.units[unit].env_color = color;
            self.constants_dirty.set(unit, true);
        }
        Ok(())
    }

    pub fn set_transform(&mut self, matrix: Matrix4) {
        if self.transform != matrix {
            self.transform = matrix;
            self.transform_dirty = true;
        }
    }

    pub fn set_texture_matrix(&mut self, unit: usize, matrix: Matrix4) -> Result<()> {
        Self::check_unit(unit)?;
        if self.texture_matrices[unit] != matrix {
            self.texture_matrices[unit] = matrix;
            self.texture_matrix_dirty.set(unit, true);
        }
        Ok(())
    }

    // -- dirty bookkeeping --------------------------------------------------

    pub fn vertex_dirty(&self) -> bool {
        self.vertex_dirty
    }

    pub fn pixel_dirty(&self) -> bool {
        self.pixel_dirty
    }

    pub fn constants_dirty(&self, unit: usize) -> bool {
        self.constants_dirty.get(unit).map(|bit| *bit).unwrap_or(false)
    }

    pub fn transform_dirty(&self) -> bool {
        self.transform_dirty
    }

    pub fn texture_matrix_dirty(&self, unit: usize) -> bool {
        self.texture_matrix_dirty.get(unit).map(|bit| *bit).unwrap_or(false)
    }

    /// Units whose environment constants need uploading.
    pub fn dirty_constant_units(&self) -> impl Iterator<Item = usize> + '_ {
        self.constants_dirty.iter_ones().filter(|unit| *unit < MAX_TEXTURE_UNITS)
    }

    /// Units whose texture matrix needs uploading.
    pub fn dirty_texture_matrices(&self) -> impl Iterator<Item = usize> + '_ {
        self.texture_matrix_dirty.iter_ones().filter(|unit| *unit < MAX_TEXTURE_UNITS)
    }

    pub fn clear_vertex_dirty(&mut self) {
        self.vertex_dirty = false;
    }

    pub fn clear_pixel_dirty(&mut self) {
        self.pixel_dirty = false;
    }

    pub fn clear_constants_dirty(&mut self, unit: usize) {
        self.constants_dirty.set(unit, false);
    }

    pub fn clear_transform_dirty(&mut self) {
        self.transform_dirty = false;
    }

    pub fn clear_texture_matrix_dirty(&mut self, unit: usize) {
        self.texture_matrix_dirty.set(unit, false);
    }

    /// Force both programs to be re-resolved on the next flush.
    pub fn mark_programs_dirty(&mut self) {
        self.vertex_dirty = true;
        self.pixel_dirty = true;
    }

    /// Force programs and every constant to be reloaded.
    pub fn mark_all_dirty(&mut self) {
        self.mark_programs_dirty();
        self.transform_dirty = true;
        for unit in 0..MAX_TEXTURE_UNITS {
            self.constants_dirty.set(unit, true);
            self.texture_matrix_dirty.set(unit, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_state() -> FixedFunctionState {
        let mut state = FixedFunctionState::new();
        state.clear_vertex_dirty();
        state.clear_pixel_dirty();
        state.clear_transform_dirty();
        for unit in 0..MAX_TEXTURE_UNITS {
            state.clear_constants_dirty(unit);
            state.clear_texture_matrix_dirty(unit);
        }
        state
    }

    #[test]
    fn new_state_is_fully_dirty() {
        let state = FixedFunctionState::new();
        assert!(state.vertex_dirty() && state.pixel_dirty() && state.transform_dirty());
        assert_eq!(state.dirty_constant_units().count(), MAX_TEXTURE_UNITS);
        assert_eq!(state.dirty_texture_matrices().count(), MAX_TEXTURE_UNITS);
    }

    #[test]
    fn same_value_is_a_no_op() {
        let mut state = clean_state();
        state.set_unit_enabled(0, true).unwrap();
        state.clear_vertex_dirty();
        state.clear_pixel_dirty();

        state.set_env_mode(0, TexEnvMode::Modulate).unwrap();
        state.set_unit_enabled(0, true).unwrap();
        state.set_env_color(0, [0.0; 4]).unwrap();
        assert!(!state.pixel_dirty());
        assert!(!state.vertex_dirty());
        assert!(!state.constants_dirty(0));
    }

    #[test]
    fn toggling_enable_dirties_both_programs() {
        let mut state = clean_state();
        state.set_unit_enabled(1, true).unwrap();
        assert!(state.vertex_dirty() && state.pixel_dirty());
        assert_eq!(state.enabled_mask(), 0b10);
    }

    #[test]
    fn changes_on_disabled_unit_do_not_dirty() {
        let mut state = clean_state();
        state.set_env_mode(0, TexEnvMode::Replace).unwrap();
        assert!(!state.pixel_dirty());

        state.set_unit_enabled(0, true).unwrap();
        state.clear_pixel_dirty();
        state.set_env_mode(0, TexEnvMode::Decal).unwrap();
        assert!(state.pixel_dirty());
        assert!(!state.constants_dirty(0));
    }

    #[test]
    fn constants_only_raise_constants_flag() {
        let mut state = clean_state();
        state.set_unit_enabled(0, true).unwrap();
        state.clear_pixel_dirty();
        state.clear_vertex_dirty();

        state.set_env_color(0, [1.0, 0.5, 0.25, 1.0]).unwrap();
        state.set_combine_scale(1, Channel::Alpha, CombineScale::Four).unwrap();
        assert!(!state.pixel_dirty());
        assert_eq!(state.dirty_constant_units().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(state.unit(1).unwrap().scale_vector(), [1.0, 1.0, 1.0, 4.0]);
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        let mut state = clean_state();
        assert!(matches!(
            state.set_combine_function(0, Channel::Alpha, CombineFunction::Dot3Rgba),
            Err(FimgError::InvalidState(_))
        ));
        assert!(state
            .set_combine_operand(0, Channel::Alpha, 0, ArgOperand::SrcColor)
            .is_err());
        assert!(state
            .set_combine_source(0, Channel::Rgb, 3, ArgSource::Texture)
            .is_err());
        assert!(matches!(
            state.set_unit_enabled(2, true),
            Err(FimgError::InvalidTextureUnit(2))
        ));
    }

    #[test]
    fn matrices_track_their_own_flags() {
        let mut state = clean_state();
        state.set_transform(IDENTITY);
        assert!(!state.transform_dirty());
        let mut scaled = IDENTITY;
        scaled[0][0] = 2.0;
        state.set_transform(scaled);
        state.set_texture_matrix(1, scaled).unwrap();
        assert!(state.transform_dirty());
        assert!(!state.texture_matrix_dirty(0));
        assert!(state.texture_matrix_dirty(1));
        assert!(!state.pixel_dirty() && !state.vertex_dirty());
    }

    #[test]
    fn enum_names_parse() {
        assert_eq!("combine".parse::<TexEnvMode>().unwrap(), TexEnvMode::Combine);
        assert_eq!("dot3_rgba".parse::<CombineFunction>().unwrap(), CombineFunction::Dot3Rgba);
        assert_eq!("4".parse::<CombineScale>().unwrap(), CombineScale::Four);
        assert_eq!(CombineFunction::Interpolate.arity(), 3);
    }
}

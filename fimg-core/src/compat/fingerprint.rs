// State fingerprints.
//
// A fingerprint packs exactly the fixed-function selectors that decide which
// instruction blocks get concatenated. Fields the generated code ignores are
// normalized to zero, so states that assemble to identical microcode compare
// equal. Constant values (environment color, scale) are deliberately absent.

use std::fmt;

use super::state::{CombineFunction, Combiner, FixedFunctionState, TexEnvMode, TextureUnitState, MAX_TEXTURE_UNITS};

// Per-unit word layout.
const ENABLED_BIT: u32 = 0;
const MODE_SHIFT: u32 = 1;
const RGB_FUNCTION_SHIFT: u32 = 4;
const ALPHA_FUNCTION_SHIFT: u32 = 7;
const RGB_SOURCES_SHIFT: u32 = 10;
const RGB_OPERANDS_SHIFT: u32 = 16;
const ALPHA_SOURCES_SHIFT: u32 = 22;
const ALPHA_OPERANDS_SHIFT: u32 = 28;

/// Cache key for one generated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint {
    /// One word per texture unit.
    pub units: [u32; MAX_TEXTURE_UNITS],
    /// Enabled-unit mask.
    pub summary: u32,
}

impl Fingerprint {
    /// Key of the pixel program for `state`.
    pub fn pixel(state: &FixedFunctionState) -> Self {
        let mut units = [0; MAX_TEXTURE_UNITS];
        for (word, unit) in units.iter_mut().zip(state.units()) {
            *word = unit_word(unit);
        }
        Self {
            units,
            summary: state.enabled_mask(),
        }
    }

    /// Key of the vertex program for `state`: only the set of enabled units
    /// changes vertex code.
    pub fn vertex(state: &FixedFunctionState) -> Self {
        Self {
            units: [0; MAX_TEXTURE_UNITS],
            summary: state.enabled_mask(),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.summary)?;
        for word in &self.units {
            write!(f, ":{word:08x}")?;
        }
        Ok(())
    }
}

fn unit_word(unit: &TextureUnitState) -> u32 {
    if !unit.enabled {
        return 0;
    }
    let mut word = 1 << ENABLED_BIT | (unit.mode.bits() as u32) << MODE_SHIFT;
    if unit.mode != TexEnvMode::Combine {
        return word;
    }

    word |= (unit.rgb.function.bits() as u32) << RGB_FUNCTION_SHIFT;
    let (sources, operands) = pack_args(&unit.rgb, 2);
    word |= sources << RGB_SOURCES_SHIFT | operands << RGB_OPERANDS_SHIFT;

    // DOT3_RGBA writes alpha from the RGB half; the alpha combiner is unused.
    if unit.rgb.function != CombineFunction::Dot3Rgba {
        word |= (unit.alpha.function.bits() as u32) << ALPHA_FUNCTION_SHIFT;
        // Alpha operands are SRC_ALPHA / ONE_MINUS_SRC_ALPHA: one bit each.
        let (sources, operands) = pack_args(&unit.alpha, 1);
        word |= sources << ALPHA_SOURCES_SHIFT | operands << ALPHA_OPERANDS_SHIFT;
    }
    word
}

/// Pack sources (2 bits each) and operands (`operand_width` bits each) of the
/// arguments the function reads. Unread arguments contribute zero.
fn pack_args(combiner: &Combiner, operand_width: u32) -> (u32, u32) {
    let operand_mask = (1 << operand_width) - 1;
    let mut sources = 0;
    let mut operands = 0;
    for (i, arg) in combiner.args.iter().take(combiner.function.arity()).enumerate() {
        let i = i as u32;
        sources |= (arg.source.bits() as u32) << (2 * i);
        operands |= (arg.operand.bits() as u32 & operand_mask) << (operand_width * i);
    }
    (sources, operands)
}

#[cfg(test)]
mod tests {
    use super::super::state::{ArgOperand, ArgSource, Channel, CombineScale};
    use super::*;

    fn with_unit0(configure: impl FnOnce(&mut FixedFunctionState)) -> FixedFunctionState {
        let mut state = FixedFunctionState::new();
        state.set_unit_enabled(0, true).unwrap();
        configure(&mut state);
        state
    }

    #[test]
    fn different_modes_differ() {
        let replace = with_unit0(|s| s.set_env_mode(0, TexEnvMode::Replace).unwrap());
        let modulate = with_unit0(|s| s.set_env_mode(0, TexEnvMode::Modulate).unwrap());
        assert_ne!(Fingerprint::pixel(&replace), Fingerprint::pixel(&modulate));
        assert_eq!(Fingerprint::vertex(&replace), Fingerprint::vertex(&modulate));
    }

    #[test]
    fn constants_do_not_change_fingerprint() {
        let plain = with_unit0(|_| {});
        let tinted = with_unit0(|s| {
            s.set_env_color(0, [0.2, 0.4, 0.6, 0.8]).unwrap();
            s.set_combine_scale(0, Channel::Rgb, CombineScale::Two).unwrap();
        });
        assert_eq!(Fingerprint::pixel(&plain), Fingerprint::pixel(&tinted));
    }

    #[test]
    fn combiner_selectors_ignored_outside_combine_mode() {
        let a = with_unit0(|s| s.set_env_mode(0, TexEnvMode::Blend).unwrap());
        let b = with_unit0(|s| {
            s.set_env_mode(0, TexEnvMode::Blend).unwrap();
            s.set_combine_function(0, Channel::Rgb, CombineFunction::Subtract).unwrap();
        });
        assert_eq!(Fingerprint::pixel(&a), Fingerprint::pixel(&b));
    }

    #[test]
    fn unread_arguments_are_ignored() {
        let base = |s: &mut FixedFunctionState| {
            s.set_env_mode(0, TexEnvMode::Combine).unwrap();
            s.set_combine_function(0, Channel::Rgb, CombineFunction::Replace).unwrap();
        };
        let a = with_unit0(base);
        let b = with_unit0(|s| {
            base(s);
            s.set_combine_source(0, Channel::Rgb, 1, ArgSource::PrimaryColor).unwrap();
        });
        let c = with_unit0(|s| {
            base(s);
            s.set_combine_source(0, Channel::Rgb, 0, ArgSource::PrimaryColor).unwrap();
        });
        assert_eq!(Fingerprint::pixel(&a), Fingerprint::pixel(&b));
        assert_ne!(Fingerprint::pixel(&a), Fingerprint::pixel(&c));
    }

    #[test]
    fn dot3_rgba_ignores_alpha_half() {
        let base = |s: &mut FixedFunctionState| {
            s.set_env_mode(0, TexEnvMode::Combine).unwrap();
            s.set_combine_function(0, Channel::Rgb, CombineFunction::Dot3Rgba).unwrap();
        };
        let a = with_unit0(base);
        let b = with_unit0(|s| {
            base(s);
            s.set_combine_function(0, Channel::Alpha, CombineFunction::Add).unwrap();
            s.set_combine_operand(0, Channel::Alpha, 0, ArgOperand::OneMinusSrcAlpha).unwrap();
        });
        assert_eq!(Fingerprint::pixel(&a), Fingerprint::pixel(&b));
    }

    #[test]
    fn operands_are_distinguished() {
        let base = |s: &mut FixedFunctionState| s.set_env_mode(0, TexEnvMode::Combine).unwrap();
        let a = with_unit0(base);
        let b = with_unit0(|s| {
            base(s);
            s.set_combine_operand(0, Channel::Rgb, 1, ArgOperand::OneMinusSrcColor).unwrap();
        });
        let c = with_unit0(|s| {
            base(s);
            s.set_combine_operand(0, Channel::Alpha, 1, ArgOperand::OneMinusSrcAlpha).unwrap();
        });
        let fa = Fingerprint::pixel(&a);
        assert_ne!(fa, Fingerprint::pixel(&b));
        assert_ne!(fa, Fingerprint::pixel(&c));
        assert_ne!(Fingerprint::pixel(&b), Fingerprint::pixel(&c));
    }

    #[test]
    fn disabled_units_fingerprint_to_zero() {
        let mut state = FixedFunctionState::new();
        state.set_env_mode(1, TexEnvMode::Add).unwrap();
        let fp = Fingerprint::pixel(&state);
        assert_eq!(fp, Fingerprint::default());
        assert_eq!(fp.to_string(), "00:00000000:00000000");
    }
}

//! Final touches before bundling: explicit branches, the `end` marker, and
//! the shader metadata derived from the instructions themselves.

use crate::visit::{InnerVisit, RefRole, Visitor};
use crate::{InstDef, Op, Ref, RegClass, Shader, StageInfo, cf};
use std::collections::BTreeSet;

pub fn finalize(shader: &mut Shader) -> bool {
    for (_, func_def) in shader.funcs.iter_mut() {
        cf::lower::lower_structured_cf(func_def);
        cf::lower::mark_end(func_def);
    }
    collect_usage(shader);
    true
}

#[derive(Default)]
struct UsageCollector {
    sysvals: BTreeSet<u32>,
    /// One past the highest `PixOut` register written.
    pixout_regs: u32,
    uses_atomics: bool,
    uses_barriers: bool,
    has_side_effects: bool,
}

impl<'a> Visitor<'a> for UsageCollector {
    fn visit_ref_use(&mut self, r: Ref, role: RefRole) {
        match (r.as_reg(), role) {
            (Some((RegClass::Special, idx)), RefRole::Use) => {
                self.sysvals.insert(idx);
            }
            (Some((RegClass::PixOut, idx)), RefRole::Def) => {
                self.pixout_regs = self.pixout_regs.max(idx + u32::from(r.lanes()));
            }
            _ => {}
        }
    }

    fn visit_inst_def(&mut self, inst_def: &'a InstDef) {
        match inst_def.op {
            Op::Atomic => {
                self.uses_atomics = true;
                self.has_side_effects = true;
            }
            Op::Barrier => self.uses_barriers = true,
            Op::St | Op::Emitpix | Op::Uvsw => self.has_side_effects = true,
            _ => {}
        }
        inst_def.inner_visit_with(self);
    }
}

/// Record what the shader reads and does in its [`ShaderInfo`](crate::ShaderInfo).
pub fn collect_usage(shader: &mut Shader) {
    let mut usage = UsageCollector::default();
    usage.visit_shader(shader);

    let info = &mut shader.info;
    info.sysvals.extend(usage.sysvals);
    info.uses_atomics |= usage.uses_atomics;
    info.uses_barriers |= usage.uses_barriers;
    info.has_side_effects |= usage.has_side_effects;
    if let StageInfo::Fragment { pixout_regs, .. } = &mut info.stage {
        *pixout_regs = (*pixout_regs).max(usage.pixout_regs);
    }
}

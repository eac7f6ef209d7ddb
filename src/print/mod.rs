//! Textual dumps of shaders, for debugging (see `TILIR_DEBUG`).
//!
//! The output is meant for humans only (there is no parser for it), and looks
//! like this (scalar form):
//!
//! ```text
//! fragment shader (scalar):
//!
//! func0 entrypoint() {
//!   block0:
//!     %0 = fadd 0x3f800000, c1
//!   if0 p0 {
//!     block1:
//!       o0 = mov %0
//!   }
//!   block2:
//! }
//! ```
//!
//! In bundled form, each `Block` lists its groups instead, with their offset,
//! length, instructions (by phase) and operand routing.

use crate::func_at::FuncAt;
use crate::{
    EntityDefs, EntityList, ExecCond, Func, InstCf, InstDef, InstGroup, IrForm, Node, NodeKind,
    Shader,
};
use itertools::Itertools as _;

/// Name of `node` in dumps (`block3`, `if0`, etc.).
pub fn node_name(nodes: &EntityDefs<Node>, node: Node) -> String {
    let node_def = &nodes[node];
    let kind = match node_def.kind {
        NodeKind::Block { .. } => "block",
        NodeKind::If { .. } => "if",
        NodeKind::Loop { .. } => "loop",
        NodeKind::Func { .. } => "func",
    };
    format!("{kind}{}", node_def.index)
}

/// Single-line form of an instruction, e.g. `%2 = fadd %0, c1`.
pub fn inst_to_string(nodes: &EntityDefs<Node>, inst_def: &InstDef) -> String {
    let dsts = if inst_def.dsts.is_empty() {
        String::new()
    } else {
        format!("{} = ", inst_def.dsts.iter().join(", "))
    };
    let mods: String = inst_def.mods.iter().map(|op_mod| format!(".{op_mod}")).collect();
    let operands = match &inst_def.cf {
        InstCf::None => inst_def.srcs.iter().join(", "),
        InstCf::Phi(srcs) => srcs
            .iter()
            .map(|src| format!("[{}: {}]", node_name(nodes, src.block), src.value))
            .join(", "),
        &InstCf::Target(target) => node_name(nodes, target),
    };
    let sep = if operands.is_empty() { "" } else { " " };
    let cond = match inst_def.exec_cond {
        ExecCond::Always => "",
        ExecCond::P0True => " if p0",
        ExecCond::P0False => " if !p0",
    };
    let end = if inst_def.end { " (end)" } else { "" };
    format!("{dsts}{}{mods}{sep}{operands}{cond}{end}", inst_def.op)
}

struct Printer<'a> {
    func_at: FuncAt<'a, ()>,
    indent: usize,
    out: String,
}

impl Printer<'_> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn name(&self, node: Node) -> String {
        node_name(self.func_at.nodes, node)
    }

    fn node(&mut self, node: Node) {
        let func_at = self.func_at.at(node);
        match func_at.def().kind {
            NodeKind::Block { .. } => {
                self.line(&format!("{}:", self.name(node)));
                self.indent += 1;
                match func_at.form {
                    IrForm::Scalar => {
                        for inst in func_at.at_insts() {
                            self.line(&inst_to_string(self.func_at.nodes, inst.def()));
                        }
                    }
                    IrForm::Bundled => {
                        for group in func_at.at_groups() {
                            self.group(group);
                        }
                    }
                }
                self.indent -= 1;
            }
            NodeKind::If { cond, then_body, else_body } => {
                self.line(&format!("{} {cond} {{", self.name(node)));
                self.body(then_body);
                if !else_body.is_empty() {
                    self.line("} else {");
                    self.body(else_body);
                }
                self.line("}");
            }
            NodeKind::Loop { body } => {
                self.line(&format!("{} {{", self.name(node)));
                self.body(body);
                self.line("}");
            }
            NodeKind::Func { body } => {
                for child in self.func_at.at(body) {
                    self.node(child.position);
                }
            }
        }
    }

    fn body(&mut self, body: EntityList<Node>) {
        self.indent += 1;
        for child in self.func_at.at(body) {
            self.node(child.position);
        }
        self.indent -= 1;
    }

    fn group(&mut self, group: FuncAt<'_, InstGroup>) {
        let group_def = group.def();
        self.line(&format!(
            "g{} @{:#x} ({} bytes):",
            group_def.index, group_def.offset, group_def.size.total
        ));
        self.indent += 1;
        for (phase, inst) in group.insts() {
            self.line(&format!("{}: {}", phase.name(), inst_to_string(self.func_at.nodes, inst.def())));
        }

        let io = &group_def.io;
        let srcs = io.srcs.iter().enumerate().filter(|(_, r)| !r.is_none()).map(|(i, r)| format!("s{i}={r}"));
        let iss = io.iss.iter().enumerate().filter_map(|(i, io)| Some(format!("is{i}={}", io.as_ref()?.name())));
        let dsts = io.dsts.iter().enumerate().filter(|(_, r)| !r.is_none()).map(|(i, r)| format!("w{i}={r}"));
        let routing = srcs.chain(iss).chain(dsts).join(" ");
        if !routing.is_empty() {
            self.line(&format!("io: {routing}"));
        }
        self.indent -= 1;
    }
}

/// Dump of a single function of `shader`.
pub fn func_to_string(shader: &Shader, func: Func) -> String {
    let func_def = &shader.funcs[func];
    let role = format!("{:?}", func_def.role).to_lowercase();
    let params = func_def.params.iter().map(|param| param.value).join(", ");
    let mut attrs = vec![];
    if shader.form() == IrForm::Bundled {
        attrs.push(format!("temps: {}", func_def.temps_used));
    }
    if let Some(offset) = func_def.binary_offset {
        attrs.push(format!("@{offset:#x}"));
    }
    let attrs = if attrs.is_empty() { String::new() } else { format!(" [{}]", attrs.iter().join(", ")) };

    let mut printer = Printer { func_at: shader.func_at(func).at(()), indent: 0, out: String::new() };
    printer.line(&format!("func{} {role}({params}){attrs} {{", func_def.index));
    printer.indent += 1;
    printer.node(func_def.root);
    printer.indent -= 1;
    printer.line("}");
    printer.out
}

/// Dump of all of `shader`, functions in binary order.
pub fn shader_to_string(shader: &Shader) -> String {
    let header = format!(
        "{} shader ({}):\n",
        format!("{:?}", shader.stage).to_lowercase(),
        format!("{:?}", shader.form()).to_lowercase()
    );
    let funcs = shader.funcs.keys().map(|func| format!("\n{}", func_to_string(shader, func)));
    [header].into_iter().chain(funcs).collect()
}

/// Classic offset-prefixed hex dump, 16 bytes per line.
pub fn hexdump(data: &[u8]) -> String {
    data.chunks(16)
        .enumerate()
        .map(|(i, chunk)| format!("{:06x}: {:02x}", i * 16, chunk.iter().format(" ")))
        .join("\n")
}

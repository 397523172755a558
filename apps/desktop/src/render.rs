//! Plain-text panels for the console front end.

use std::fmt::Write;

use client_core::{memory_window::ROW_WIDTH, Category, ViewState};

pub fn render_session(view: &ViewState) -> String {
    let mut out = String::new();
    if view.loaded() {
        let _ = writeln!(
            out,
            "[session] {} (checksum {:08x})",
            view.session.filename, view.session.checksum
        );
    } else {
        let _ = writeln!(out, "[session] no binary loaded");
    }
    if let Some(notice) = &view.notice {
        let _ = writeln!(out, "[notice] {notice}");
    }
    out
}

pub fn render_status(view: &ViewState) -> String {
    format!(
        "[status] {} trace={}\n",
        view.mode(),
        if view.run.trace_enabled { "on" } else { "off" }
    )
}

pub fn render_registers(view: &ViewState) -> String {
    let mut out = String::from("[registers]\n");
    for (index, value) in view.registers.iter() {
        let _ = write!(out, "r{index:<2} {value:08x}");
        out.push(if index % 4 == 3 { '\n' } else { ' ' });
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

pub fn render_flags(view: &ViewState) -> String {
    let flags: String = view
        .flags
        .named()
        .iter()
        .map(|(name, set)| if *set { *name } else { '-' })
        .collect();
    format!("[flags] {flags}\n")
}

pub fn render_memory(view: &ViewState) -> String {
    let memory = &view.memory;
    let mut out = format!(
        "[memory] offset {:08x} checksum {:08x}{}\n",
        memory.offset,
        memory.checksum,
        if memory.chunking { " (chunking)" } else { "" }
    );
    for row in &memory.window.rows {
        let _ = write!(out, "{:08x} ", row.address);
        for cell in row.padded_cells() {
            match cell {
                Some(byte) => {
                    let _ = write!(out, " {byte:02x}");
                }
                None => out.push_str("   "),
            }
        }
        for _ in row.pad as usize + row.cells.len()..ROW_WIDTH {
            out.push_str("   ");
        }
        out.push('\n');
    }
    out
}

pub fn render_stack(view: &ViewState) -> String {
    let mut out = format!("[stack] sp {:08x}\n", view.stack.sp);
    for entry in &view.stack.entries {
        let marker = if view.stack.is_current(entry) { '>' } else { ' ' };
        let _ = writeln!(out, "{marker} {:08x} {:08x}", entry.address, entry.value);
    }
    out
}

pub fn render_disassembly(view: &ViewState) -> String {
    let mut out = format!("[disassembly] pc {:08x}\n", view.disassembly.pc);
    for row in view.disassembly_rows() {
        let breakpoint = match (row.breakpoint, row.pending) {
            (true, false) => '*',
            (_, true) => '?',
            (false, false) => ' ',
        };
        let current = if row.current { '>' } else { ' ' };
        let _ = writeln!(
            out,
            "{breakpoint}{current} {:08x} {:08x} {}",
            row.instruction.address, row.instruction.encoded, row.instruction.text
        );
    }
    out
}

pub fn render_terminal(view: &ViewState) -> String {
    let terminal = &view.terminal;
    let mut out = String::from("[terminal]\n");
    out.push_str(&terminal.buffer);
    if !terminal.buffer.is_empty() && !terminal.buffer.ends_with('\n') {
        out.push('\n');
    }
    if let Some(prompt) = &terminal.prompt {
        let _ = writeln!(
            out,
            "[prompt {}/{}] {}",
            prompt.input.len(),
            prompt.max_length,
            prompt.input
        );
    }
    out
}

/// The panel that shows `category`.
pub fn render_category(view: &ViewState, category: Category) -> String {
    match category {
        Category::Session => render_session(view),
        Category::Registers => render_registers(view),
        Category::Flags => render_flags(view),
        Category::Memory => render_memory(view),
        Category::Stack => render_stack(view),
        Category::Disassembly => render_disassembly(view),
        Category::Terminal => render_terminal(view),
        Category::RunMode => render_status(view),
    }
}

pub fn render_view(view: &ViewState) -> String {
    Category::ALL
        .iter()
        .map(|category| render_category(view, *category))
        .collect()
}

#[cfg(test)]
mod tests {
    use client_core::memory_window::window;
    use shared::domain::{DisassembledInstruction, DisassemblyWindow, RegisterFile};

    use super::*;

    #[test]
    fn memory_rows_use_eight_digit_addresses_and_blank_padding() {
        let mut view = ViewState::default();
        view.memory.offset = 20;
        view.memory.window = window(&(0u8..40).collect::<Vec<_>>(), 20);

        let text = render_memory(&view);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("[memory] offset 00000014"));
        assert!(lines[1].starts_with("00000010 "));
        assert!(lines[1].ends_with("00 01 02 03"));
        assert!(lines[4].starts_with("00000040  24 25 26 27"));
    }

    #[test]
    fn disassembly_marks_breakpoints_and_pc() {
        let view = ViewState {
            disassembly: DisassemblyWindow {
                pc: 0x8000,
                instructions: vec![DisassembledInstruction {
                    has_breakpoint: true,
                    address: 0x8000,
                    encoded: 0xe3a0_0001,
                    text: "mov r0, #1".into(),
                }],
            },
            ..ViewState::default()
        };

        // Breakpoint membership comes from the set, not the raw instruction flag.
        let text = render_disassembly(&view);
        assert!(text.contains(" > 00008000 e3a00001 mov r0, #1"));
    }

    #[test]
    fn registers_wrap_every_four() {
        let view = ViewState {
            registers: RegisterFile(vec![0xdead_beef; 5]),
            ..ViewState::default()
        };
        let text = render_registers(&view);
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("r0  deadbeef"));
    }
}

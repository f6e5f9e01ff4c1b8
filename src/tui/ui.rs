//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::cpu::cache::{Access, Cache};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: code, machine state, program output and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_console(frame, left_chunks[2], app);
    draw_status(frame, left_chunks[3], app);

    // Right side: caches, memory and help
    let cpu = app.sim.cpu();
    let cache_height = |cache: &Cache| (cache.lines().len().min(16) + 3) as u16;
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(cache_height(&cpu.icache)),
            Constraint::Length(cache_height(&cpu.dcache)),
            Constraint::Min(6),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_cache(frame, right_chunks[0], &cpu.icache, Color::Blue);
    draw_cache(frame, right_chunks[1], &cpu.dcache, Color::LightBlue);
    draw_memory(frame, right_chunks[2], app);
    draw_help(frame, right_chunks[3]);
}

/// Draw disassembly view around the PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));
    let breakpoints = app.sim.breakpoints();

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if breakpoints.contains(*addr) { "●" } else { " " };
            let text = format!("{}x{:04X}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if breakpoints.contains(*addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw the register file, condition code and cycle latches.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu = app.sim.cpu();
    let regs = &cpu.regs;
    let latches = &cpu.latches;
    let value = Style::default().fg(Color::White);

    let gpr_line = |range: std::ops::Range<u8>| {
        let spans: Vec<Span> = range
            .flat_map(|r| {
                [
                    Span::raw(format!("R{}: ", r)),
                    Span::styled(format!("x{:04X}  ", regs.get(r)), value),
                ]
            })
            .collect();
        Line::from(spans)
    };

    let content = vec![
        gpr_line(0..4),
        gpr_line(4..8),
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("x{:04X}", regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw("  IR: "),
            Span::styled(format!("x{:04X}", latches.ir), value),
            Span::raw("  CC: "),
            Span::styled(regs.cc.to_string(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("MAR: "),
            Span::styled(format!("x{:04X}", latches.mar), value),
            Span::raw("  MDR: "),
            Span::styled(format!("x{:04X}", latches.mdr), value),
            Span::raw("  BEN: "),
            Span::styled(format!("{}", latches.ben as u8), value),
        ]),
        Line::from(vec![
            Span::raw("ALU: "),
            Span::styled(
                format!("A=x{:04X} B=x{:04X} R=x{:04X}", latches.alu.a, latches.alu.b, latches.alu.r),
                value,
            ),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", cpu.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", app.sim.state()),
                if app.running {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                }),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw one cache: a row per line, last accessed line highlighted.
fn draw_cache(frame: &mut Frame, area: Rect, cache: &Cache, color: Color) {
    let stats = cache.stats();
    let last = cache.last_access().map(|(offset, access)| (cache.locate(offset).0, access));

    let mut items: Vec<ListItem> = cache
        .lines()
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let text = format!(
                "{:>3}  V:{} D:{}  tag {:>4X}  x{:04X}",
                i, line.valid as u8, line.dirty as u8, line.tag, line.data
            );
            let style = match last {
                Some((index, access)) if index == i => match access {
                    Access::Hit => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                    _ => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                },
                _ if line.valid => Style::default().fg(Color::White),
                _ => Style::default().fg(Color::DarkGray),
            };
            ListItem::new(text).style(style)
        })
        .collect();

    let rate = stats
        .hit_rate()
        .map(|r| format!("{:.0}%", r * 100.0))
        .unwrap_or_else(|| "-".into());
    items.insert(0, ListItem::new(format!(
        "hits {}  misses {}  write-backs {}  rate {}",
        stats.hits, stats.misses, stats.write_backs, rate
    )).style(Style::default().fg(Color::Cyan)));

    let list = List::new(items)
        .block(Block::default()
            .title(format!(" {} ", cache.kind()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color)));

    frame.render_widget(list, area);
}

/// Draw memory view. Values are what a program would read.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu = app.sim.cpu();
    let visible_rows = (area.height as usize).saturating_sub(2);
    let start = cpu.mem.base().wrapping_add(app.mem_scroll as u16);

    let items: Vec<ListItem> = cpu.mem
        .dump(start, visible_rows)
        .into_iter()
        .map(|(addr, _)| {
            let value = app.sim.peek(addr).unwrap_or(0);
            let text = format!("x{:04X}: x{:04X}  {:>6}", addr, value, value as i16);

            let style = if addr == cpu.regs.pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if addr == cpu.latches.mar {
                Style::default().fg(Color::LightBlue)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw the tail of the program's console output.
fn draw_console(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let output = app.console.output();
    let rows = (area.height as usize).saturating_sub(2);
    let lines: Vec<&str> = output.lines().collect();
    let tail = lines[lines.len().saturating_sub(rows)..].join("\n");

    let paragraph = Paragraph::new(tail)
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Console ")
            .borders(Borders::ALL));

    frame.render_widget(paragraph, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint at PC"),
        Line::from("x: Reset  ↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}

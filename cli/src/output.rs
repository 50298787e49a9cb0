//! Output formatting utilities for CLI commands

use colored::Colorize;
use frameperf_shared::{MaterialTag, ProgramRecord, Report};

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a session report
pub fn report(report: &Report) {
    println!("\n{}", "=== Session ===".bold());
    println!(
        "  Duration:     {:.2} s, {} frames",
        report.session_time, report.total_frames
    );
    println!(
        "  Renderer:     {} ({}, {})",
        report.infos.renderer, report.infos.vendor, report.infos.version
    );

    println!("\n{}", "=== Timing ===".bold());
    println!(
        "  Frame rate:   avg {:>8.1} fps   max {:>8.1} fps",
        report.log.fps, report.max.log.fps
    );
    println!(
        "  CPU:          avg {:>8.2} ms    max {:>8.2} ms",
        report.log.cpu, report.max.log.cpu
    );
    println!(
        "  GPU:          avg {:>8.2} ms    max {:>8.2} ms",
        report.log.gpu, report.max.log.gpu
    );

    println!("\n{}", "=== Draws (per frame) ===".bold());
    println!(
        "  Calls:        avg {:>8.1}       max {:>8}",
        report.gl.calls, report.max.gl.calls
    );
    println!(
        "  Triangles:    avg {:>8.1}       max {:>8}",
        report.gl.triangles, report.max.gl.triangles
    );
    println!(
        "  Lines:        avg {:>8.1}       max {:>8}",
        report.gl.lines, report.max.gl.lines
    );
    println!(
        "  Points:       avg {:>8.1}       max {:>8}",
        report.gl.points, report.max.gl.points
    );

    println!("\n{}", "=== Memory ===".bold());
    println!(
        "  VRAM:         {:.2} MiB (textures {:.2}, geometry {:.2})",
        report.memory.vram, report.memory.tex, report.memory.geo
    );
    println!(
        "  RAM:          {:.2} MiB (max {:.2})",
        report.memory.ram, report.max_memory
    );
}

/// Print program attribution, largest share first
pub fn programs(records: &[ProgramRecord], shares: &[(MaterialTag, f64)]) {
    println!("\n{}", "=== Programs ===".bold());
    if records.is_empty() {
        println!("  No programs attributed yet.");
        return;
    }

    let mut rows: Vec<(&ProgramRecord, f64)> = records
        .iter()
        .map(|record| {
            let share = shares
                .iter()
                .find(|(tag, _)| *tag == record.tag)
                .map(|(_, pct)| *pct)
                .unwrap_or(0.0);
            (record, share)
        })
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (record, share) in rows {
        println!(
            "  [{:>5.1}%] {}  {} meshes, {} {}s{}",
            share,
            record.tag.to_string().cyan(),
            record.mesh_count(),
            record.draw_counts.total,
            record.draw_counts.kind.label().to_lowercase(),
            if record.visible { "" } else { " (hidden)" }
        );
    }
}

use colored::*;
use retrace::{RunReport, ScriptSummary, StoredReport};

pub fn print_report(report: &RunReport) {
    println!();
    println!("{}", "═".repeat(60));
    let headline = format!(
        "{}/{} steps succeeded ({:.2}%)",
        report.succeeded_count,
        report.total_steps,
        report.success_percent()
    );
    if report.stopped_early {
        println!("{} {}", "⏹ STOPPED:".yellow().bold(), headline);
    } else if report.succeeded_count == report.total_steps {
        println!("{} {}", "✅ PASSED:".green().bold(), headline);
    } else {
        println!("{} {}", "❌ FAILED:".red().bold(), headline);
    }
    println!("{}", "─".repeat(60));
    println!("   • Duration: {:.2}s", report.duration_seconds);
    if let Some(id) = &report.script_id {
        println!("   • Script: {id}");
    }

    println!("{}", "─".repeat(60));
    for line in &report.log_lines {
        if line.starts_with("[✓]") {
            println!("   {}", line.green());
        } else {
            println!("   {}", line.red());
        }
    }
    if !report.screenshots.is_empty() {
        println!("{}", "─".repeat(60));
        println!("📷 Failure screenshots:");
        for path in &report.screenshots {
            println!("   {}", path.display());
        }
    }
    println!("{}", "═".repeat(60));
}

pub fn print_scripts(scripts: &[ScriptSummary]) {
    if scripts.is_empty() {
        println!("No recorded scripts.");
        return;
    }
    println!(
        "{:<36}  {:<19}  {:>5}  {}",
        "ID".bold(),
        "CREATED".bold(),
        "STEPS".bold(),
        "TITLE".bold()
    );
    for script in scripts {
        let tags = if script.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", script.tags.join(", ")).dimmed().to_string()
        };
        println!(
            "{:<36}  {:<19}  {:>5}  {}{}",
            script.id,
            script.created_at.format("%Y-%m-%d %H:%M:%S"),
            script.step_count,
            script.title,
            tags
        );
    }
}

pub fn print_reports(reports: &[StoredReport]) {
    if reports.is_empty() {
        println!("No run reports.");
        return;
    }
    println!(
        "{:<36}  {:<19}  {:>8}  {:>9}  {}",
        "ID".bold(),
        "CREATED".bold(),
        "SUCCESS".bold(),
        "DURATION".bold(),
        "SCRIPT".bold()
    );
    for stored in reports {
        let report = &stored.report;
        let rate = format!("{:.2}%", report.success_percent());
        let rate = if report.succeeded_count == report.total_steps && !report.stopped_early {
            rate.green()
        } else {
            rate.red()
        };
        println!(
            "{:<36}  {:<19}  {:>8}  {:>8.2}s  {}",
            stored.id,
            report.created_at.format("%Y-%m-%d %H:%M:%S"),
            rate,
            report.duration_seconds,
            report.script_id.as_deref().unwrap_or("-")
        );
    }
}

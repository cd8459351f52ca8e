//! Output formatting: text rows or JSON on stdout.

use bastion_core::app::{ActivityView, RedumpOutcome};
use serde::Serialize;
use serde_json::json;

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn rows<T: Serialize>(&self, rows: &[T], line: impl Fn(&T) -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(rows)?);
        } else if rows.is_empty() {
            println!("No results");
        } else {
            for row in rows {
                println!("{}", line(row));
            }
        }
        Ok(())
    }

    pub fn single<T: Serialize>(&self, value: &T, text: impl Fn(&T) -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text(value));
        }
        Ok(())
    }

    pub fn redump(&self, outcomes: &[RedumpOutcome]) -> anyhow::Result<()> {
        if self.json {
            let rows: Vec<_> = outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(report) => json!({ "identifier": o.identifier, "ok": report }),
                    Err(err) => json!({
                        "identifier": o.identifier,
                        "error": { "kind": err.kind(), "message": err.to_string() },
                    }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }
        for outcome in outcomes {
            match &outcome.result {
                Ok(report) => {
                    println!(
                        "✓ {}: checked {}, changed {}",
                        outcome.identifier,
                        report.checked.len(),
                        report.changed.len()
                    );
                    for change in &report.changed {
                        println!("    {} {:?} -> {:?}", change.instance, change.from, change.to);
                    }
                }
                Err(err) => println!("✗ {}: {}", outcome.identifier, err),
            }
        }
        Ok(())
    }
}

pub fn activity_line(activity: &ActivityView) -> String {
    let refs: Vec<String> = [
        ("team", &activity.team),
        ("user", &activity.user),
        ("season", &activity.season),
        ("instance", &activity.challenge_instance),
        ("agent", &activity.agent),
    ]
    .into_iter()
    .filter_map(|(name, slug)| slug.as_ref().map(|s| format!("{name}={s}")))
    .collect();
    format!(
        "{} {:<28} by={} {}",
        activity.created_at.format("%Y-%m-%d %H:%M:%S"),
        format!("{:?}", activity.kind),
        activity.author.as_ref().map(|a| a.as_str()).unwrap_or("system"),
        refs.join(" ")
    )
}

//! Terminal rendering for reconciliation results.
//!
//! Extension traits that add colored output to tasksync-core types using
//! owo_colors.

use owo_colors::OwoColorize;
use tasksync_core::diff::{ChangeKind, ChangedEvent, Classification};
use tasksync_core::{NormalizedEvent, RunOutcome};

pub trait Render {
    fn render(&self) -> String;
}

impl Render for ChangeKind {
    fn render(&self) -> String {
        let symbol = self.symbol();
        match self {
            ChangeKind::New => symbol.green().to_string(),
            ChangeKind::Changed => symbol.yellow().to_string(),
            ChangeKind::Unchanged => symbol.dimmed().to_string(),
        }
    }
}

fn colorize(kind: ChangeKind, text: &str) -> String {
    match kind {
        ChangeKind::New => text.green().to_string(),
        ChangeKind::Changed => text.yellow().to_string(),
        ChangeKind::Unchanged => text.dimmed().to_string(),
    }
}

fn render_event(kind: ChangeKind, event: &NormalizedEvent) -> String {
    let label = colorize(kind, &event.to_string());
    format!("{} {} {}", kind.render(), label, event.start.dimmed())
}

/// Old → new start/end for a changed event.
fn render_drift(changed: &ChangedEvent) -> Vec<String> {
    let mut lines = Vec::new();
    let (old, new) = (&changed.previous, &changed.event);

    if old.start != new.start {
        lines.push(format!("{}: {} → {}", "start".dimmed(), old.start.red(), new.start.green()));
    }
    if old.end != new.end {
        lines.push(format!("{}: {} → {}", "end".dimmed(), old.end.red(), new.end.green()));
    }
    lines
}

/// Above this many events, only counts are shown
const COMPACT_THRESHOLD: usize = 5;

fn pluralize(count: usize) -> &'static str {
    if count == 1 { "event" } else { "events" }
}

pub trait ClassificationRender {
    fn render(&self, verbose: bool) -> String;
}

impl ClassificationRender for Classification {
    fn render(&self, verbose: bool) -> String {
        if self.is_empty() {
            return "   No changes".dimmed().to_string();
        }

        let mut lines = Vec::new();
        let total = self.new.len() + self.changed.len();

        if verbose || total <= COMPACT_THRESHOLD {
            for event in &self.new {
                lines.push(format!("   {}", render_event(ChangeKind::New, event)));
            }
            for changed in &self.changed {
                lines.push(format!("   {}", render_event(ChangeKind::Changed, &changed.event)));
                lines.extend(render_drift(changed).into_iter().map(|l| format!("      {l}")));
            }
        } else {
            if !self.new.is_empty() {
                let label = format!("({} new {})", self.new.len(), pluralize(self.new.len()));
                lines.push(format!("   {} {}", "+".green(), label.green()));
            }
            if !self.changed.is_empty() {
                let label = format!(
                    "({} changed {})",
                    self.changed.len(),
                    pluralize(self.changed.len())
                );
                lines.push(format!("   {} {}", "~".yellow(), label.yellow()));
            }
        }

        if verbose && !self.unchanged.is_empty() {
            let label = format!(
                "({} unchanged {})",
                self.unchanged.len(),
                pluralize(self.unchanged.len())
            );
            lines.push(format!("   {} {}", ChangeKind::Unchanged.render(), label.dimmed()));
        }

        lines.join("\n")
    }
}

impl Render for RunOutcome {
    fn render(&self) -> String {
        let summary = &self.applied.summary;
        let progress = &self.applied.progress;
        let mut lines = vec![format!(
            "{} {} fetched, {} rows in sheet",
            "Sync".bold(),
            self.plan.fetched,
            self.plan.persisted
        )];

        lines.push(self.plan.classification.render(false));

        if let Some(e) = &self.applied.interrupted {
            lines.push(format!(
                "   {} {}",
                "Write-back stopped early:".yellow(),
                e.to_string().yellow()
            ));
            lines.push(format!(
                "   {}",
                format!(
                    "{} inserted, {} of {} updated; the next run will retry",
                    progress.rows_inserted,
                    progress.rows_updated,
                    self.plan.classification.changed.len()
                )
                .dimmed()
            ));
        } else {
            lines.push(format!(
                "   {}",
                format!("Last run {}", summary.completed_at).dimmed()
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_core::{PersistedRow, RowRef};

    fn event(identity: &str, start: &str) -> NormalizedEvent {
        NormalizedEvent {
            identity: identity.into(),
            title: format!("Quiz {identity}"),
            category: "CS 101".into(),
            start: start.into(),
            end: "2024-01-01 10:00:00".into(),
            link: String::new(),
        }
    }

    fn plain(text: &str) -> String {
        // strip ANSI escapes
        let mut out = String::new();
        let mut in_escape = false;
        for c in text.chars() {
            match (in_escape, c) {
                (false, '\u{1b}') => in_escape = true,
                (true, 'm') => in_escape = false,
                (true, _) => {}
                (false, c) => out.push(c),
            }
        }
        out
    }

    #[test]
    fn test_empty_classification() {
        assert_eq!(plain(&Classification::default().render(false)), "   No changes");
    }

    #[test]
    fn test_full_view_lists_events_and_drift() {
        let previous = PersistedRow::from_cells(
            RowRef(2),
            &event("b", "2024-01-01 9:00:00").to_row(),
        );
        let classification = Classification {
            new: vec![event("a", "2024-01-02 9:00:00")],
            changed: vec![ChangedEvent {
                event: event("b", "2024-01-03 9:00:00"),
                previous,
            }],
            unchanged: vec![],
        };

        let text = plain(&classification.render(false));

        assert!(text.contains("+ Quiz a [CS 101] 2024-01-02 9:00:00"));
        assert!(text.contains("~ Quiz b [CS 101] 2024-01-03 9:00:00"));
        assert!(text.contains("start: 2024-01-01 9:00:00 → 2024-01-03 9:00:00"));
        assert!(!text.contains("end:"));
    }

    #[test]
    fn test_compact_view_above_threshold() {
        let classification = Classification {
            new: (0..6).map(|i| event(&i.to_string(), "s")).collect(),
            changed: vec![],
            unchanged: vec!["x".into()],
        };

        assert_eq!(plain(&classification.render(false)), "   + (6 new events)");
        assert!(plain(&classification.render(true)).contains("Quiz 5 [CS 101]"));
        assert!(plain(&classification.render(true)).contains("(1 unchanged event)"));
    }
}

use crate::types::Resource;
use chrono::{DateTime, Utc};
use crossterm::style::{Color, Stylize, style};
use std::hash::{Hash, Hasher};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const BANNER_WIDTH: usize = 80;

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(DATE_FORMAT).to_string()
}

/// Generate a color for a string based on hash.
pub fn get_color(s: &str) -> Color {
    let colors = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Cyan,
        Color::Magenta,
        Color::White,
        Color::Grey,
    ];
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    let hash = hasher.finish() as u32;
    colors[(hash % colors.len() as u32) as usize]
}

/// Stateless text styling, fixed at startup by `--color`/`--no-color`.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    color: bool,
}

impl Palette {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    #[allow(dead_code)]
    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn namespace(&self, namespace: &str) -> String {
        if self.color {
            style(namespace).with(get_color(namespace)).to_string()
        } else {
            namespace.to_string()
        }
    }

    pub fn white(&self, text: &str) -> String {
        if self.color {
            style(text).white().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn banner(&self, title: &str) -> String {
        self.white(&format!("{:*^width$}", title, width = BANNER_WIDTH))
    }

    pub fn rule(&self) -> String {
        self.white(&"*".repeat(BANNER_WIDTH))
    }

    /// One-line summary printed by the console observer.
    pub fn resource_line(&self, resource: &Resource) -> String {
        match resource {
            Resource::Pod(pod) => format!(
                "{} {}: [{}] {}",
                format_time(&pod.started_at),
                self.namespace(&pod.namespace),
                pod.phase,
                self.white(&pod.name)
            ),
            Resource::Event(event) => format!(
                "{} {}: [{}] on {} - {}",
                format_time(&event.last_seen),
                self.namespace(&event.namespace),
                event.reason,
                self.white(&format!("{}/{}", event.kind, event.name)),
                event.message
            ),
        }
    }
}

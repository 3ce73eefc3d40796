use chrono::{Local, TimeZone};
use eframe::egui;

use crate::common::ChatEvent;

/// One display line per event, branching on the event tag.
pub fn format_event(event: &ChatEvent) -> String {
    match event {
        ChatEvent::Message {
            username,
            text,
            timestamp,
        } => format!("[{}] <{username}> {text}", clock(*timestamp)),
        ChatEvent::UserJoined { username, .. } => format!("user joined: {username}"),
    }
}

fn clock(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|time| time.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

pub fn render(ui: &mut egui::Ui, events: &[ChatEvent]) {
    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .show(ui, |ui| {
            for event in events {
                let line = format_event(event);
                match event {
                    ChatEvent::Message { .. } => {
                        ui.label(line);
                    }
                    ChatEvent::UserJoined { .. } => {
                        ui.colored_label(egui::Color32::GREEN, egui::RichText::new(line).italics());
                    }
                }
            }
        });
}
